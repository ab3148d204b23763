//! Domain entities mirrored from persistent storage.

use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::posts::{DISPLAY_TIMESTAMP_FORMAT, preview};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub date_joined: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRecord {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
}

impl fmt::Display for GroupRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

/// A stored post row without its joined author and group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostRecord {
    pub id: i64,
    pub text: String,
    pub pub_date: OffsetDateTime,
    pub author_id: i64,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorRef {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRef {
    pub id: i64,
    pub title: String,
    pub slug: String,
}

/// A post joined with the author and group it references, as feeds list them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostView {
    pub id: i64,
    pub text: String,
    pub pub_date: OffsetDateTime,
    pub author: AuthorRef,
    pub group: Option<GroupRef>,
    pub image: Option<String>,
    pub comment_count: i64,
}

impl fmt::Display for PostView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = self
            .group
            .as_ref()
            .map(|group| group.title.as_str())
            .unwrap_or("None");
        let pub_date = self
            .pub_date
            .format(DISPLAY_TIMESTAMP_FORMAT)
            .map_err(|_| fmt::Error)?;
        write!(
            f,
            "{}, {}, {}, {}",
            self.author.username,
            group,
            pub_date,
            preview(&self.text)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentRecord {
    pub id: i64,
    pub post_id: i64,
    pub author: AuthorRef,
    pub text: String,
    pub created: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FollowRecord {
    pub id: i64,
    pub user_id: i64,
    pub author_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: i64,
    pub secret_hash: Vec<u8>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}
