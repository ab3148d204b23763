//! Login, signup and logout.

use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::{info, warn};

use crate::application::{
    auth::{AuthError, IssuedSession},
    error::HttpError,
    forms::{FormErrors, LoginInput, SignupInput},
};
use crate::presentation::views::{
    LayoutContext, LoginTemplate, LoginView, SignupTemplate, SignupView, render_template_response,
};

use super::{found, public::HttpState, safe_redirect_target, session::MaybeViewer};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginForm {
    username: String,
    password: String,
    next: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct SignupForm {
    username: String,
    password1: String,
    password2: String,
}

pub(super) async fn login_form(
    MaybeViewer(viewer): MaybeViewer,
    Query(query): Query<NextQuery>,
) -> Response {
    let content = LoginView {
        username: String::new(),
        next: query.next.unwrap_or_default(),
        errors: FormErrors::default(),
    };
    let view = LayoutContext::new(viewer.as_ref(), "Log in", content);
    render_template_response(LoginTemplate { view }, StatusCode::OK)
}

pub(super) async fn login(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, HttpError> {
    let input = LoginInput {
        username: form.username.clone(),
        password: form.password,
    };

    match state.auth.login(&input).await {
        Ok((user, session)) => {
            info!(
                target = "blogroll::http::accounts",
                user_id = user.id,
                username = %user.username,
                "signed in"
            );
            let target = safe_redirect_target(Some(form.next.as_str())).unwrap_or("/");
            let jar = jar.add(session_cookie(&state, session));
            Ok((jar, found(target)).into_response())
        }
        Err(AuthError::Invalid(errors)) => {
            let content = LoginView {
                username: form.username,
                next: form.next,
                errors,
            };
            let view = LayoutContext::new(None, "Log in", content);
            Ok(render_template_response(LoginTemplate { view }, StatusCode::OK))
        }
        Err(err) => Err(err.into()),
    }
}

pub(super) async fn signup_form(MaybeViewer(viewer): MaybeViewer) -> Response {
    let content = SignupView {
        username: String::new(),
        errors: FormErrors::default(),
    };
    let view = LayoutContext::new(viewer.as_ref(), "Sign up", content);
    render_template_response(SignupTemplate { view }, StatusCode::OK)
}

/// New accounts are signed in straight away.
pub(super) async fn signup(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response, HttpError> {
    let input = SignupInput {
        username: form.username.clone(),
        password1: form.password1,
        password2: form.password2,
    };

    match state.auth.signup(&input).await {
        Ok(user) => {
            let session = state.auth.start_session(&user).await?;
            let jar = jar.add(session_cookie(&state, session));
            Ok((jar, found("/")).into_response())
        }
        Err(AuthError::Invalid(errors)) => {
            let content = SignupView {
                username: form.username,
                errors,
            };
            let view = LayoutContext::new(None, "Sign up", content);
            Ok(render_template_response(SignupTemplate { view }, StatusCode::OK))
        }
        Err(err) => Err(err.into()),
    }
}

pub(super) async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let cookie_name = state.site.session_cookie.clone();
    if let Some(cookie) = jar.get(&cookie_name)
        && let Err(err) = state.auth.logout(cookie.value()).await
    {
        warn!(
            target = "blogroll::http::accounts",
            error = %err,
            "failed to delete session on logout"
        );
    }

    let jar = jar.remove(Cookie::build((cookie_name, "")).path("/"));
    (jar, found("/")).into_response()
}

fn session_cookie(state: &HttpState, session: IssuedSession) -> Cookie<'static> {
    Cookie::build((state.site.session_cookie.clone(), session.token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.site.secure_cookie)
        .expires(session.expires_at)
        .build()
}
