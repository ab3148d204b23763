use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::forms::{FormErrors, REQUIRED};
use crate::application::repos::{CreateGroupParams, GroupsRepo, RepoError};
use crate::domain::entities::GroupRecord;
use crate::domain::slug::{SlugAsyncError, generate_unique_slug, validate_slug};

pub const MAX_TITLE_CHARS: usize = 200;
pub const SLUG_TAKEN: &str = "Group with this Slug already exists.";

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("invalid group: {0}")]
    Invalid(FormErrors),
    #[error("unknown group `{0}`")]
    UnknownGroup(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Default)]
pub struct CreateGroupCommand {
    pub title: String,
    /// Derived from the title when absent.
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct GroupService {
    groups: Arc<dyn GroupsRepo>,
}

impl GroupService {
    pub fn new(groups: Arc<dyn GroupsRepo>) -> Self {
        Self { groups }
    }

    pub async fn list(&self) -> Result<Vec<GroupRecord>, GroupError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn create(&self, command: CreateGroupCommand) -> Result<GroupRecord, GroupError> {
        let mut errors = FormErrors::default();

        let title = command.title.trim().to_string();
        let title_len = title.chars().count();
        if title.is_empty() {
            errors.add("title", REQUIRED);
        } else if title_len > MAX_TITLE_CHARS {
            errors.add(
                "title",
                format!("Ensure this value has at most {MAX_TITLE_CHARS} characters (it has {title_len})."),
            );
        }

        let slug = match command.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => match validate_slug(slug) {
                Ok(()) => Some(slug.to_string()),
                Err(err) => {
                    errors.add("slug", err.to_string());
                    None
                }
            },
            _ if title.is_empty() => None,
            _ => match self.derive_free_slug(&title).await {
                Ok(slug) => Some(slug),
                Err(SlugAsyncError::Predicate(err)) => return Err(err.into()),
                Err(SlugAsyncError::Slug(err)) => {
                    errors.add("slug", err.to_string());
                    None
                }
            },
        };

        let (Some(slug), true) = (slug, errors.is_empty()) else {
            return Err(GroupError::Invalid(errors));
        };

        let description = command
            .description
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let group = self
            .groups
            .create_group(CreateGroupParams {
                title,
                slug,
                description,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => {
                    GroupError::Invalid(FormErrors::single("slug", SLUG_TAKEN))
                }
                other => GroupError::Repo(other),
            })?;

        info!(
            target = "application::groups::create",
            group_id = group.id,
            slug = %group.slug,
            "group created"
        );
        Ok(group)
    }

    /// Removes the group; its posts are kept without a group.
    pub async fn delete(&self, slug: &str) -> Result<(), GroupError> {
        if !self.groups.delete_group(slug).await? {
            return Err(GroupError::UnknownGroup(slug.to_string()));
        }
        info!(target = "application::groups::delete", slug, "group deleted");
        Ok(())
    }

    async fn derive_free_slug(&self, title: &str) -> Result<String, SlugAsyncError<RepoError>> {
        let groups = self.groups.clone();
        generate_unique_slug(title, move |candidate| {
            let groups = groups.clone();
            async move {
                groups
                    .find_group_by_slug(&candidate)
                    .await
                    .map(|existing| existing.is_none())
            }
        })
        .await
    }
}
