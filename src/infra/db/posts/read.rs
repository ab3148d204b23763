use async_trait::async_trait;
use sqlx::QueryBuilder;

use crate::application::pagination::PageSlice;
use crate::application::repos::{PostScope, PostsRepo, RepoError};
use crate::domain::entities::PostView;
use crate::infra::db::map_sqlx_error;
use crate::infra::db::util::count_to_u64;

use super::super::PostgresRepositories;
use super::types::PostViewRow;
use super::{POST_VIEW_COLUMNS, POST_VIEW_FROM};

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE 1=1 ");
        Self::apply_post_scope(&mut qb, scope);

        let count: i64 = qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(count_to_u64(count))
    }

    async fn list_posts(
        &self,
        scope: PostScope,
        slice: PageSlice,
    ) -> Result<Vec<PostView>, RepoError> {
        let offset = i64::try_from(slice.offset).map_err(|_| RepoError::InvalidInput {
            message: format!("page offset {} out of range", slice.offset),
        })?;

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(POST_VIEW_COLUMNS);
        qb.push(POST_VIEW_FROM);
        qb.push(" WHERE 1=1 ");
        Self::apply_post_scope(&mut qb, scope);
        qb.push(" ORDER BY p.pub_date DESC, p.id DESC LIMIT ");
        qb.push_bind(i64::from(slice.limit));
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows = qb
            .build_query_as::<PostViewRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostView::from).collect())
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostView>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(POST_VIEW_COLUMNS);
        qb.push(POST_VIEW_FROM);
        qb.push(" WHERE p.id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<PostViewRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostView::from))
    }
}
