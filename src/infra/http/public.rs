use std::{io::ErrorKind, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{
        HeaderValue, Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::error;

use crate::{
    application::{
        auth::AuthService,
        error::HttpError,
        feed::FeedService,
        follows::FollowService,
        posts::PostService,
        repos::HealthRepo,
    },
    cache::{FragmentCache, INDEX_PAGE_FRAGMENT, fragment_key},
    domain::{entities::UserRecord, posts::preview},
    infra::uploads::{UploadStorage, UploadStorageError},
    presentation::views::{
        AboutAuthorTemplate, AboutTechTemplate, FeedView, FollowTemplate, FollowView,
        GroupTemplate, GroupView, IndexFeedPartial, IndexTemplate, IndexView, LayoutContext,
        PostDetailView, PostTemplate, ProfileTemplate, ProfileView, render_fragment,
        render_not_found_response, render_template_response,
    },
};

use super::{
    accounts, db_health_response, follows,
    middleware::{catch_panic, log_responses, render_error_pages, set_request_context},
    parse_post_id, posts,
    session::{MaybeViewer, RequireViewer, load_viewer},
};

/// Per-deployment knobs the handlers need besides the services.
#[derive(Debug, Clone)]
pub struct SiteOptions {
    pub timezone: Tz,
    pub session_cookie: String,
    pub secure_cookie: bool,
    pub max_request_bytes: usize,
}

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub auth: Arc<AuthService>,
    pub cache: Arc<FragmentCache>,
    pub uploads: Arc<UploadStorage>,
    pub health: Arc<dyn HealthRepo>,
    pub site: SiteOptions,
}

pub fn build_router(state: HttpState) -> Router {
    let body_limit = state.site.max_request_bytes;

    Router::new()
        .route("/", get(index))
        .route(
            "/new/",
            get(posts::new_post_form)
                .post(posts::create_post)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/follow/", get(follow_index))
        .route("/group/{slug}/", get(group_posts))
        .route("/about/author/", get(about_author))
        .route("/about/tech/", get(about_tech))
        .route(
            "/auth/login/",
            get(accounts::login_form).post(accounts::login),
        )
        .route(
            "/auth/signup/",
            get(accounts::signup_form).post(accounts::signup),
        )
        .route(
            "/auth/logout/",
            get(accounts::logout).post(accounts::logout),
        )
        .route("/_health/db", get(public_health))
        .route("/media/{*path}", get(serve_media))
        .route("/static/{*path}", get(crate::infra::assets::serve_static))
        .route("/{username}/", get(profile))
        .route("/{username}/follow/", get(follows::profile_follow))
        .route("/{username}/unfollow/", get(follows::profile_unfollow))
        .route("/{username}/{post_id}/", get(post_view))
        .route(
            "/{username}/{post_id}/edit/",
            get(posts::edit_post_form)
                .post(posts::update_post)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/{username}/{post_id}/comment/",
            get(posts::comment_redirect).post(posts::add_comment),
        )
        .fallback(fallback)
        .layer(middleware::from_fn(catch_panic))
        .layer(middleware::from_fn(render_error_pages))
        .layer(middleware::from_fn_with_state(state.clone(), load_viewer))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageQuery {
    page: Option<String>,
}

/// The surrounding layout is per viewer; the feed fragment inside it is shared.
async fn index(
    State(state): State<HttpState>,
    MaybeViewer(viewer): MaybeViewer,
    Query(query): Query<PageQuery>,
) -> Response {
    let key = fragment_key(INDEX_PAGE_FRAGMENT, &[]);
    let ttl = state.cache.config().index_ttl;
    let tz = state.site.timezone;
    let feed = state.feed.clone();

    let fragment = state
        .cache
        .get_or_render(&key, ttl, || async move {
            let page = feed
                .index(query.page.as_deref())
                .await
                .map_err(HttpError::from)?;
            render_fragment(IndexFeedPartial {
                feed: FeedView::build(&page, tz, None),
            })
            .map_err(HttpError::from)
        })
        .await;

    match fragment {
        Ok(html) => {
            let view = LayoutContext::new(
                viewer.as_ref(),
                "Latest posts",
                IndexView {
                    fragment: html.to_string(),
                },
            );
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => err.into_response(),
    }
}

async fn group_posts(
    State(state): State<HttpState>,
    MaybeViewer(viewer): MaybeViewer,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let group = state.feed.group(&slug, query.page.as_deref()).await?;
    let content = GroupView::build(&group, state.site.timezone, viewer.as_ref());
    let view = LayoutContext::new(viewer.as_ref(), group.group.title.clone(), content);
    Ok(render_template_response(GroupTemplate { view }, StatusCode::OK))
}

async fn profile(
    State(state): State<HttpState>,
    MaybeViewer(viewer): MaybeViewer,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let profile = state
        .feed
        .profile(&username, query.page.as_deref(), viewer.as_ref())
        .await?;
    let content = ProfileView::build(&profile, state.site.timezone, viewer.as_ref());
    let view = LayoutContext::new(
        viewer.as_ref(),
        format!("Profile of {}", profile.author.username),
        content,
    );
    Ok(render_template_response(
        ProfileTemplate { view },
        StatusCode::OK,
    ))
}

async fn follow_index(
    State(state): State<HttpState>,
    RequireViewer(viewer): RequireViewer,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let page = state.feed.follow(&viewer, query.page.as_deref()).await?;
    let content = FollowView {
        feed: FeedView::build(&page, state.site.timezone, Some(&viewer)),
    };
    let view = LayoutContext::new(Some(&viewer), "Authors you follow", content);
    Ok(render_template_response(FollowTemplate { view }, StatusCode::OK))
}

async fn post_view(
    State(state): State<HttpState>,
    MaybeViewer(viewer): MaybeViewer,
    Path((username, post_id)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id("infra::http::public::post_view", &post_id)?;
    let detail = state
        .feed
        .post_detail(&username, post_id, viewer.as_ref())
        .await?;
    let content = PostDetailView::build(&detail, state.site.timezone, viewer.as_ref());
    Ok(render_post_page(viewer.as_ref(), content, StatusCode::OK))
}

pub(super) fn render_post_page(
    viewer: Option<&UserRecord>,
    content: PostDetailView,
    status: StatusCode,
) -> Response {
    let title = format!("Post {}", preview(&content.post.text));
    let view = LayoutContext::new(viewer, title, content);
    render_template_response(PostTemplate { view }, status)
}

async fn about_author(MaybeViewer(viewer): MaybeViewer) -> Response {
    let view = LayoutContext::new(viewer.as_ref(), "About the author", ());
    render_template_response(AboutAuthorTemplate { view }, StatusCode::OK)
}

async fn about_tech(MaybeViewer(viewer): MaybeViewer) -> Response {
    let view = LayoutContext::new(viewer.as_ref(), "Technologies", ());
    render_template_response(AboutTechTemplate { view }, StatusCode::OK)
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.uploads.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(UploadStorageError::InvalidPath) => {
            HttpError::not_found(SOURCE, format!("rejected media path `{path}`")).into_response()
        }
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            HttpError::not_found(SOURCE, format!("no media at `{path}`")).into_response()
        }
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored upload"
            );
            HttpError::internal(SOURCE, &err).into_response()
        }
    }
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

async fn fallback(MaybeViewer(viewer): MaybeViewer, request: Request<Body>) -> Response {
    render_not_found_response(viewer.as_ref(), request.uri().path())
}
