use async_trait::async_trait;

use crate::application::repos::{CreateGroupParams, GroupsRepo, RepoError};
use crate::domain::entities::GroupRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: i64,
    title: String,
    slug: String,
    description: Option<String>,
}

impl From<GroupRow> for GroupRecord {
    fn from(row: GroupRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            slug: row.slug,
            description: row.description,
        }
    }
}

#[async_trait]
impl GroupsRepo for PostgresRepositories {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT id, title, slug, description FROM groups ORDER BY title, id",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(GroupRecord::from).collect())
    }

    async fn find_group(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        let row = sqlx::query_as::<_, GroupRow>(
            "SELECT id, title, slug, description FROM groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(GroupRecord::from))
    }

    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let row = sqlx::query_as::<_, GroupRow>(
            "SELECT id, title, slug, description FROM groups WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(GroupRecord::from))
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let row = sqlx::query_as::<_, GroupRow>(
            r#"
            INSERT INTO groups (title, slug, description)
            VALUES ($1, $2, $3)
            RETURNING id, title, slug, description
            "#,
        )
        .bind(&params.title)
        .bind(&params.slug)
        .bind(params.description.as_deref())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn delete_group(&self, slug: &str) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM groups WHERE slug = $1")
            .bind(slug)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
