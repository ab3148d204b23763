use async_trait::async_trait;

use crate::application::repos::{CreatePostParams, PostsWriteRepo, RepoError, UpdatePostParams};
use crate::domain::entities::PostRecord;
use crate::infra::db::map_sqlx_error;

use super::super::PostgresRepositories;
use super::types::PostRow;

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let CreatePostParams {
            author_id,
            text,
            group_id,
            image,
        } = params;

        let row = sqlx::query_as::<_, PostRow>(
            r#"
            INSERT INTO posts (text, author_id, group_id, image)
            VALUES ($1, $2, $3, $4)
            RETURNING id, text, pub_date, author_id, group_id, image
            "#,
        )
        .bind(text)
        .bind(author_id)
        .bind(group_id)
        .bind(image)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let UpdatePostParams {
            id,
            text,
            group_id,
            image,
        } = params;

        let row = sqlx::query_as::<_, PostRow>(
            r#"
            UPDATE posts
            SET text = $2, group_id = $3, image = $4
            WHERE id = $1
            RETURNING id, text, pub_date, author_id, group_id, image
            "#,
        )
        .bind(id)
        .bind(text)
        .bind(group_id)
        .bind(image)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }
}
