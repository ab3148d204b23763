//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::PageSlice;
use crate::domain::entities::{
    CommentRecord, GroupRecord, PostRecord, PostView, SessionRecord, UserRecord,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Which posts a feed selects. Every scope is ordered newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScope {
    All,
    Group(i64),
    Author(i64),
    /// Posts by every author the given user follows.
    FollowedBy(i64),
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct CreateGroupParams {
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub author_id: i64,
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

/// Replaces the editable columns of a post; `pub_date` and the author never change.
#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: i64,
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub post_id: i64,
    pub author_id: i64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowInsert {
    Created,
    AlreadyExists,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError>;

    async fn find_user_by_username(&self, username: &str)
    -> Result<Option<UserRecord>, RepoError>;

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    /// Deletes the user together with their posts, comments, follows and sessions.
    async fn delete_user(&self, username: &str) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait GroupsRepo: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError>;

    async fn find_group(&self, id: i64) -> Result<Option<GroupRecord>, RepoError>;

    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError>;

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError>;

    /// Deletes the group; its posts stay and lose their group reference.
    async fn delete_group(&self, slug: &str) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError>;

    async fn list_posts(&self, scope: PostScope, slice: PageSlice)
    -> Result<Vec<PostView>, RepoError>;

    async fn find_post(&self, id: i64) -> Result<Option<PostView>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    async fn list_comments(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError>;

    async fn create_comment(&self, params: CreateCommentParams)
    -> Result<CommentRecord, RepoError>;
}

#[async_trait]
pub trait FollowsRepo: Send + Sync {
    async fn insert_follow(&self, user_id: i64, author_id: i64)
    -> Result<FollowInsert, RepoError>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError>;

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError>;

    async fn count_followers(&self, author_id: i64) -> Result<u64, RepoError>;

    async fn count_following(&self, user_id: i64) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait SessionsRepo: Send + Sync {
    async fn create_session(&self, session: SessionRecord) -> Result<(), RepoError>;

    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>, RepoError>;

    async fn delete_session(&self, id: Uuid) -> Result<(), RepoError>;

    async fn purge_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
