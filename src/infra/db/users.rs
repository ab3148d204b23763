use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CreateUserParams, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    date_joined: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            date_joined: row.date_joined,
        }
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, date_joined FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, date_joined FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            RETURNING id, username, password_hash, date_joined
            "#,
        )
        .bind(&params.username)
        .bind(&params.password_hash)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn delete_user(&self, username: &str) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
