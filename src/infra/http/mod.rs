mod accounts;
mod follows;
mod middleware;
mod posts;
mod public;
mod session;

pub use public::{HttpState, SiteOptions, build_router};
pub use session::{MaybeViewer, RequireViewer, Viewer};

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::application::error::{ErrorReport, HttpError};
use crate::application::repos::RepoError;

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// `302 Found` to `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Post ids in URLs are plain digit runs; anything else is a missing page.
fn parse_post_id(source: &'static str, raw: &str) -> Result<i64, HttpError> {
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(HttpError::not_found(
            source,
            format!("`{raw}` is not a post id"),
        ));
    }
    raw.parse::<i64>()
        .map_err(|_| HttpError::not_found(source, format!("post id `{raw}` out of range")))
}

/// Accept only same-site absolute paths as redirect targets.
fn safe_redirect_target(candidate: Option<&str>) -> Option<&str> {
    candidate
        .map(str::trim)
        .filter(|value| value.starts_with('/') && !value.starts_with("//") && !value.contains('\\'))
}
