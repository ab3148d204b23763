//! Write side for posts and comments.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::forms::{
    FormErrors, ImageChange, ImageUpload, PostFormInput, validate_comment, validate_post,
};
use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostsRepo, PostsWriteRepo,
    RepoError, UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, PostView, UserRecord};

/// Persists validated post images and returns the stored relative path.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save_image(&self, upload: &ImageUpload) -> Result<String, ImageStoreError>;

    /// Removes an image saved for a write that did not go through.
    async fn discard_image(&self, stored_path: &str) -> Result<(), ImageStoreError>;
}

#[derive(Debug, Error)]
#[error("image storage failed: {message}")]
pub struct ImageStoreError {
    pub message: String,
}

impl ImageStoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post {post_id} by `{username}` not found")]
    UnknownPost { username: String, post_id: i64 },
    #[error("invalid submission: {0}")]
    Invalid(FormErrors),
    #[error(transparent)]
    Storage(#[from] ImageStoreError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub enum EditTarget {
    Editable(PostView),
    /// The editor is signed in but did not write the post.
    NotAuthor,
}

#[derive(Debug, Clone)]
pub enum EditOutcome {
    Updated(PostRecord),
    NotAuthor,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    writes: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    images: Arc<dyn ImageStore>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writes: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            posts,
            writes,
            groups,
            comments,
            images,
        }
    }

    /// Choices offered by the group select.
    pub async fn group_choices(&self) -> Result<Vec<GroupRecord>, PostError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn create(
        &self,
        author: &UserRecord,
        input: &PostFormInput,
    ) -> Result<PostRecord, PostError> {
        let groups = self.groups.list_groups().await?;
        let valid = validate_post(input, &groups).map_err(PostError::Invalid)?;

        let saved = match &valid.image {
            ImageChange::Replace(upload) => Some(self.images.save_image(upload).await?),
            ImageChange::Keep | ImageChange::Clear => None,
        };

        let record = match self
            .writes
            .create_post(CreatePostParams {
                author_id: author.id,
                text: valid.text,
                group_id: valid.group_id,
                image: saved.clone(),
            })
            .await
        {
            Ok(record) => record,
            Err(err) => {
                self.discard_saved(saved.as_deref()).await;
                return Err(err.into());
            }
        };

        info!(
            target = "blogroll::posts",
            post_id = record.id,
            author = %author.username,
            group_id = ?record.group_id,
            "post created"
        );
        Ok(record)
    }

    pub async fn load_for_edit(
        &self,
        editor: &UserRecord,
        username: &str,
        post_id: i64,
    ) -> Result<EditTarget, PostError> {
        let post = self.find_post(username, post_id).await?;
        if post.author.id != editor.id {
            return Ok(EditTarget::NotAuthor);
        }
        Ok(EditTarget::Editable(post))
    }

    pub async fn update(
        &self,
        editor: &UserRecord,
        username: &str,
        post_id: i64,
        input: &PostFormInput,
    ) -> Result<EditOutcome, PostError> {
        let post = match self.load_for_edit(editor, username, post_id).await? {
            EditTarget::Editable(post) => post,
            EditTarget::NotAuthor => return Ok(EditOutcome::NotAuthor),
        };

        let groups = self.groups.list_groups().await?;
        let valid = validate_post(input, &groups).map_err(PostError::Invalid)?;

        let saved = match &valid.image {
            ImageChange::Replace(upload) => Some(self.images.save_image(upload).await?),
            ImageChange::Keep | ImageChange::Clear => None,
        };
        let image = match &valid.image {
            ImageChange::Keep => post.image.clone(),
            ImageChange::Clear => None,
            ImageChange::Replace(_) => saved.clone(),
        };

        let record = match self
            .writes
            .update_post(UpdatePostParams {
                id: post.id,
                text: valid.text,
                group_id: valid.group_id,
                image,
            })
            .await
        {
            Ok(record) => record,
            Err(err) => {
                self.discard_saved(saved.as_deref()).await;
                return Err(err.into());
            }
        };

        info!(
            target = "blogroll::posts",
            post_id = record.id,
            author = %editor.username,
            "post updated"
        );
        Ok(EditOutcome::Updated(record))
    }

    async fn discard_saved(&self, stored_path: Option<&str>) {
        let Some(path) = stored_path else {
            return;
        };
        if let Err(err) = self.images.discard_image(path).await {
            warn!(
                target = "blogroll::posts",
                path,
                error = %err,
                "orphaned post image left on disk"
            );
        }
    }

    pub async fn add_comment(
        &self,
        author: &UserRecord,
        username: &str,
        post_id: i64,
        text: &str,
    ) -> Result<CommentRecord, PostError> {
        let post = self.find_post(username, post_id).await?;
        let text = validate_comment(text).map_err(PostError::Invalid)?;

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: author.id,
                text,
            })
            .await?;
        Ok(comment)
    }

    async fn find_post(&self, username: &str, post_id: i64) -> Result<PostView, PostError> {
        self.posts
            .find_post(post_id)
            .await?
            .filter(|post| post.author.username == username)
            .ok_or_else(|| PostError::UnknownPost {
                username: username.to_string(),
                post_id,
            })
    }
}
