use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{RepoError, SessionsRepo};
use crate::domain::entities::SessionRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: i64,
    secret_hash: Vec<u8>,
    created_at: OffsetDateTime,
    expires_at: OffsetDateTime,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            secret_hash: row.secret_hash,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl SessionsRepo for PostgresRepositories {
    async fn create_session(&self, session: SessionRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, secret_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.secret_hash)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>, RepoError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, secret_hash, created_at, expires_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SessionRecord::from))
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn purge_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
