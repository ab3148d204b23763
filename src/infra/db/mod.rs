//! Postgres-backed repository implementations.

mod comments;
mod follows;
mod groups;
mod posts;
mod sessions;
mod users;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    Postgres, QueryBuilder,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::{HealthRepo, PostScope, RepoError};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    /// Appends the `AND ...` filter selecting `scope`; expects posts aliased as `p`.
    fn apply_post_scope(qb: &mut QueryBuilder<'_, Postgres>, scope: PostScope) {
        match scope {
            PostScope::All => {}
            PostScope::Group(group_id) => {
                qb.push(" AND p.group_id = ");
                qb.push_bind(group_id);
            }
            PostScope::Author(author_id) => {
                qb.push(" AND p.author_id = ");
                qb.push_bind(author_id);
            }
            PostScope::FollowedBy(user_id) => {
                qb.push(" AND p.author_id IN (SELECT f.author_id FROM follows f WHERE f.user_id = ");
                qb.push_bind(user_id);
                qb.push(")");
            }
        }
    }
}

#[async_trait]
impl HealthRepo for PostgresRepositories {
    async fn ping(&self) -> Result<(), RepoError> {
        self.health_check().await.map_err(map_sqlx_error)
    }
}
