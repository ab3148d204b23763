use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::repos::{FollowInsert, FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error("not following `{0}`")]
    NotFollowing(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    AlreadyFollowing,
    /// Following yourself is ignored.
    SelfFollow,
}

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    pub async fn follow(
        &self,
        user: &UserRecord,
        author_username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self.find_author(author_username).await?;
        if author.id == user.id {
            return Ok(FollowOutcome::SelfFollow);
        }

        let outcome = match self.follows.insert_follow(user.id, author.id).await? {
            FollowInsert::Created => FollowOutcome::Followed,
            FollowInsert::AlreadyExists => FollowOutcome::AlreadyFollowing,
        };
        debug!(
            target = "application::follows::follow",
            user = %user.username,
            author = %author.username,
            outcome = ?outcome,
            "follow requested"
        );
        Ok(outcome)
    }

    pub async fn unfollow(&self, user: &UserRecord, author_username: &str) -> Result<(), FollowError> {
        let author = self.find_author(author_username).await?;
        if !self.follows.delete_follow(user.id, author.id).await? {
            return Err(FollowError::NotFollowing(author.username));
        }
        debug!(
            target = "application::follows::unfollow",
            user = %user.username,
            author = %author.username,
            "unfollowed"
        );
        Ok(())
    }

    async fn find_author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| FollowError::UnknownAuthor(username.to_string()))
    }
}
