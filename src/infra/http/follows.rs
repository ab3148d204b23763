use axum::{
    extract::{Path, State},
    http::{
        HeaderMap, Uri,
        header::{HOST, REFERER},
    },
    response::Response,
};

use crate::application::error::HttpError;
use crate::presentation::views::profile_url;

use super::{found, public::HttpState, safe_redirect_target, session::RequireViewer};

pub(super) async fn profile_follow(
    State(state): State<HttpState>,
    RequireViewer(viewer): RequireViewer,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    // Repeat and self follows are silent no-ops.
    state.follows.follow(&viewer, &username).await?;
    Ok(found(&back_to(&headers, &username)))
}

pub(super) async fn profile_unfollow(
    State(state): State<HttpState>,
    RequireViewer(viewer): RequireViewer,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    state.follows.unfollow(&viewer, &username).await?;
    Ok(found(&back_to(&headers, &username)))
}

/// The referring page on this site, or the author's profile otherwise.
fn back_to(headers: &HeaderMap, username: &str) -> String {
    headers
        .get(REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(|referer| same_site_path(referer, headers))
        .unwrap_or_else(|| profile_url(username))
}

/// Reduces a referer to its path when it points back at the requested host.
fn same_site_path(referer: &str, headers: &HeaderMap) -> Option<String> {
    let uri: Uri = referer.trim().parse().ok()?;
    let Some(authority) = uri.authority() else {
        return safe_redirect_target(Some(referer)).map(str::to_string);
    };
    let host = headers.get(HOST)?.to_str().ok()?;
    if !authority.as_str().eq_ignore_ascii_case(host) {
        return None;
    }
    let target = uri.path_and_query().map_or("/", |value| value.as_str());
    safe_redirect_target(Some(target)).map(str::to_string)
}
