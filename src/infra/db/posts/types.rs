use time::OffsetDateTime;

use crate::domain::entities::{AuthorRef, GroupRef, PostRecord, PostView};

#[derive(sqlx::FromRow)]
pub(crate) struct PostRow {
    pub(crate) id: i64,
    pub(crate) text: String,
    pub(crate) pub_date: OffsetDateTime,
    pub(crate) author_id: i64,
    pub(crate) group_id: Option<i64>,
    pub(crate) image: Option<String>,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            pub_date: row.pub_date,
            author_id: row.author_id,
            group_id: row.group_id,
            image: row.image,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PostViewRow {
    pub(crate) id: i64,
    pub(crate) text: String,
    pub(crate) pub_date: OffsetDateTime,
    pub(crate) image: Option<String>,
    pub(crate) author_id: i64,
    pub(crate) author_username: String,
    pub(crate) group_id: Option<i64>,
    pub(crate) group_title: Option<String>,
    pub(crate) group_slug: Option<String>,
    pub(crate) comment_count: i64,
}

impl From<PostViewRow> for PostView {
    fn from(row: PostViewRow) -> Self {
        let group = match (row.group_id, row.group_title, row.group_slug) {
            (Some(id), Some(title), Some(slug)) => Some(GroupRef { id, title, slug }),
            _ => None,
        };

        Self {
            id: row.id,
            text: row.text,
            pub_date: row.pub_date,
            author: AuthorRef {
                id: row.author_id,
                username: row.author_username,
            },
            group,
            image: row.image,
            comment_count: row.comment_count,
        }
    }
}
