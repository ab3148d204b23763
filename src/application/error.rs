use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{
        auth::AuthError, feed::FeedError, follows::FollowError, groups::GroupError,
        posts::PostError, repos::RepoError,
    },
    infra::error::InfraError,
};

/// Diagnostic attached to error responses so the logging middleware can
/// report the failure chain without the client seeing it.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn not_found(source: &'static str, detail: impl Into<String>) -> Self {
        Self::new(source, StatusCode::NOT_FOUND, "Page not found", detail)
    }

    pub fn internal(source: &'static str, error: &dyn StdError) -> Self {
        Self::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            error,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<FeedError> for HttpError {
    fn from(error: FeedError) -> Self {
        const SOURCE: &str = "application::error::feed_error";
        match error {
            FeedError::UnknownGroup(slug) => {
                HttpError::not_found(SOURCE, format!("no group with slug `{slug}`"))
            }
            FeedError::UnknownAuthor(username) => {
                HttpError::not_found(SOURCE, format!("no user named `{username}`"))
            }
            FeedError::UnknownPost { username, post_id } => HttpError::not_found(
                SOURCE,
                format!("no post {post_id} by `{username}`"),
            ),
            FeedError::Repo(err) => HttpError::internal(SOURCE, &err),
        }
    }
}

impl From<PostError> for HttpError {
    fn from(error: PostError) -> Self {
        const SOURCE: &str = "application::error::post_error";
        match error {
            PostError::UnknownPost { username, post_id } => HttpError::not_found(
                SOURCE,
                format!("no post {post_id} by `{username}`"),
            ),
            // Handlers re-render the form instead; reaching here is a bug.
            PostError::Invalid(errors) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid submission",
                &errors,
            ),
            PostError::Storage(err) => HttpError::internal(SOURCE, &err),
            PostError::Repo(err) => HttpError::internal(SOURCE, &err),
        }
    }
}

impl From<FollowError> for HttpError {
    fn from(error: FollowError) -> Self {
        const SOURCE: &str = "application::error::follow_error";
        match error {
            FollowError::UnknownAuthor(username) => {
                HttpError::not_found(SOURCE, format!("no user named `{username}`"))
            }
            FollowError::NotFollowing(username) => {
                HttpError::not_found(SOURCE, format!("not following `{username}`"))
            }
            FollowError::Repo(err) => HttpError::internal(SOURCE, &err),
        }
    }
}

impl From<AuthError> for HttpError {
    fn from(error: AuthError) -> Self {
        const SOURCE: &str = "application::error::auth_error";
        match error {
            AuthError::Invalid(errors) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid submission",
                &errors,
            ),
            AuthError::Hashing(message) => HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                message,
            ),
            AuthError::Repo(err) => HttpError::internal(SOURCE, &err),
        }
    }
}

impl From<RepoError> for HttpError {
    fn from(error: RepoError) -> Self {
        const SOURCE: &str = "application::error::repo_error";
        match error {
            RepoError::NotFound => HttpError::not_found(SOURCE, "record not found"),
            RepoError::Timeout => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                &error,
            ),
            other => HttpError::internal(SOURCE, &other),
        }
    }
}

/// Top-level failure of a CLI command or of server startup.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Group(#[from] GroupError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
