//! Session cookie resolution and the viewer extractors built on it.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tracing::warn;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::domain::entities::UserRecord;

use super::found;
use super::public::HttpState;

pub const LOGIN_PATH: &str = "/auth/login/";

/// The signed-in user for the current request, inserted by [`load_viewer`].
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<UserRecord>);

pub async fn load_viewer(
    State(state): State<HttpState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let user = match jar.get(&state.site.session_cookie) {
        Some(cookie) => match state.auth.authenticate(cookie.value()).await {
            Ok(user) => user,
            Err(err) => {
                warn!(
                    target = "blogroll::http::session",
                    error = %err,
                    "session lookup failed; continuing as guest"
                );
                None
            }
        },
        None => None,
    };

    request.extensions_mut().insert(Viewer(user));
    next.run(request).await
}

/// The viewer if signed in.
pub struct MaybeViewer(pub Option<UserRecord>);

impl<S> FromRequestParts<S> for MaybeViewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<Viewer>()
                .and_then(|viewer| viewer.0.clone()),
        ))
    }
}

/// The viewer; guests are sent to the login page with a `next` back here.
pub struct RequireViewer(pub UserRecord);

/// Query-value escapes that keep `/` readable in `?next=/path/`.
const NEXT_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub struct LoginRedirect {
    next: String,
}

impl LoginRedirect {
    pub fn location(&self) -> String {
        let next = utf8_percent_encode(&self.next, NEXT_ESCAPES);
        format!("{LOGIN_PATH}?next={next}")
    }
}

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        found(&self.location())
    }
}

impl<S> FromRequestParts<S> for RequireViewer
where
    S: Send + Sync,
{
    type Rejection = LoginRedirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts
            .extensions
            .get::<Viewer>()
            .and_then(|viewer| viewer.0.clone())
        {
            Some(user) => Ok(Self(user)),
            None => Err(LoginRedirect {
                next: parts
                    .uri
                    .path_and_query()
                    .map(|value| value.as_str().to_string())
                    .unwrap_or_else(|| parts.uri.path().to_string()),
            }),
        }
    }
}
