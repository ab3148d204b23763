//! Post create/edit forms and comment submission.

use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use axum_extra::extract::{Multipart, multipart::MultipartError};
use serde::Deserialize;

use crate::application::{
    error::HttpError,
    forms::{FormErrors, ImageUpload, PostFormInput},
    posts::{EditOutcome, EditTarget, PostError},
};
use crate::domain::entities::UserRecord;
use crate::presentation::views::{
    LayoutContext, PostDetailView, PostFormTemplate, PostFormView, post_url,
    render_template_response,
};

use super::{
    found, parse_post_id,
    public::{HttpState, render_post_page},
    session::RequireViewer,
};

const SOURCE: &str = "infra::http::posts";
const NEW_POST_PATH: &str = "/new/";

pub(super) async fn new_post_form(
    State(state): State<HttpState>,
    RequireViewer(viewer): RequireViewer,
) -> Result<Response, HttpError> {
    let groups = state.posts.group_choices().await?;
    let form = PostFormView::new(NEW_POST_PATH, "", "", &groups, FormErrors::default());
    Ok(render_form(&viewer, form))
}

pub(super) async fn create_post(
    State(state): State<HttpState>,
    RequireViewer(viewer): RequireViewer,
    mut multipart: Multipart,
) -> Result<Response, HttpError> {
    let input = read_post_form(&mut multipart).await?;

    match state.posts.create(&viewer, &input).await {
        Ok(_) => Ok(found("/")),
        Err(PostError::Invalid(errors)) => {
            let groups = state.posts.group_choices().await?;
            let form = PostFormView::new(NEW_POST_PATH, &input.text, &input.group, &groups, errors);
            Ok(render_form(&viewer, form))
        }
        Err(err) => Err(err.into()),
    }
}

pub(super) async fn edit_post_form(
    State(state): State<HttpState>,
    RequireViewer(viewer): RequireViewer,
    Path((username, post_id)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(SOURCE, &post_id)?;

    match state.posts.load_for_edit(&viewer, &username, post_id).await? {
        EditTarget::Editable(post) => {
            let groups = state.posts.group_choices().await?;
            let selected = post
                .group
                .as_ref()
                .map(|group| group.id.to_string())
                .unwrap_or_default();
            let form = PostFormView::new(
                edit_path(&username, post_id),
                &post.text,
                &selected,
                &groups,
                FormErrors::default(),
            )
            .editing(post.image.as_deref());
            Ok(render_form(&viewer, form))
        }
        EditTarget::NotAuthor => Ok(found(&post_url(&username, post_id))),
    }
}

pub(super) async fn update_post(
    State(state): State<HttpState>,
    RequireViewer(viewer): RequireViewer,
    Path((username, post_id)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(SOURCE, &post_id)?;
    let input = read_post_form(&mut multipart).await?;

    match state.posts.update(&viewer, &username, post_id, &input).await {
        Ok(EditOutcome::Updated(_)) | Ok(EditOutcome::NotAuthor) => {
            Ok(found(&post_url(&username, post_id)))
        }
        Err(PostError::Invalid(errors)) => {
            let current = state.feed.find_post(&username, post_id).await?;
            let groups = state.posts.group_choices().await?;
            let form = PostFormView::new(
                edit_path(&username, post_id),
                &input.text,
                &input.group,
                &groups,
                errors,
            )
            .editing(current.image.as_deref());
            Ok(render_form(&viewer, form))
        }
        Err(err) => Err(err.into()),
    }
}

pub(super) async fn comment_redirect(
    RequireViewer(_viewer): RequireViewer,
    Path((username, post_id)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(SOURCE, &post_id)?;
    Ok(found(&post_url(&username, post_id)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CommentForm {
    text: String,
}

pub(super) async fn add_comment(
    State(state): State<HttpState>,
    RequireViewer(viewer): RequireViewer,
    Path((username, post_id)): Path<(String, String)>,
    Form(form): Form<CommentForm>,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(SOURCE, &post_id)?;

    match state
        .posts
        .add_comment(&viewer, &username, post_id, &form.text)
        .await
    {
        Ok(_) => Ok(found(&post_url(&username, post_id))),
        Err(PostError::Invalid(errors)) => {
            let detail = state
                .feed
                .post_detail(&username, post_id, Some(&viewer))
                .await?;
            let content = PostDetailView::build(&detail, state.site.timezone, Some(&viewer))
                .with_comment_errors(&form.text, errors);
            Ok(render_post_page(Some(&viewer), content, StatusCode::OK))
        }
        Err(err) => Err(err.into()),
    }
}

fn edit_path(username: &str, post_id: i64) -> String {
    format!("{}edit/", post_url(username, post_id))
}

fn render_form(viewer: &UserRecord, form: PostFormView) -> Response {
    let title = if form.is_edit { "Edit post" } else { "New post" };
    let view = LayoutContext::new(Some(viewer), title, form);
    render_template_response(PostFormTemplate { view }, StatusCode::OK)
}

async fn read_post_form(multipart: &mut Multipart) -> Result<PostFormInput, HttpError> {
    let mut input = PostFormInput::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => input.text = field.text().await.map_err(multipart_error)?,
            "group" => input.group = field.text().await.map_err(multipart_error)?,
            "image-clear" => input.clear_image = true,
            "image" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(|mime| mime.to_string());
                let bytes = field.bytes().await.map_err(multipart_error)?;
                // Browsers submit an empty, unnamed part when no file was chosen.
                if !filename.is_empty() || !bytes.is_empty() {
                    input.image = Some(ImageUpload {
                        filename,
                        content_type,
                        bytes,
                    });
                }
            }
            _ => {}
        }
    }

    Ok(input)
}

fn multipart_error(err: MultipartError) -> HttpError {
    let status = err.status();
    HttpError::new(SOURCE, status, "Invalid form submission", err.to_string())
}
