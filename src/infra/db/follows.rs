use async_trait::async_trait;

use crate::application::repos::{FollowInsert, FollowsRepo, RepoError};

use super::util::count_to_u64;
use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl FollowsRepo for PostgresRepositories {
    async fn insert_follow(&self, user_id: i64, author_id: i64) -> Result<FollowInsert, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO follows (user_id, author_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, author_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(author_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            Ok(FollowInsert::Created)
        } else {
            Ok(FollowInsert::AlreadyExists)
        }
    }

    async fn delete_follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(user_id)
            .bind(author_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
        )
        .bind(user_id)
        .bind(author_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn count_followers(&self, author_id: i64) -> Result<u64, RepoError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE author_id = $1")
            .bind(author_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(count_to_u64(count))
    }

    async fn count_following(&self, user_id: i64) -> Result<u64, RepoError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(count_to_u64(count))
    }
}
