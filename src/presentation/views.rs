use crate::application::error::{ErrorReport, HttpError};
use crate::application::feed::{GroupFeed, PostDetail, ProfileFeed};
use crate::application::forms::FormErrors;
use crate::application::pagination::{Page, PageLink};
use crate::domain::entities::{CommentRecord, GroupRecord, PostView, UserRecord};
use crate::domain::posts::HUMAN_DATE_FORMAT;
use crate::util::timezone::localize;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use chrono_tz::Tz;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

/// Render a fragment to a plain string, for storage in the fragment cache.
pub fn render_fragment<T: Template>(template: T) -> Result<String, TemplateRenderError> {
    template.render().map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_fragment",
            "Fragment rendering failed",
            err,
        )
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(viewer: Option<&UserRecord>, path: &str) -> Response {
    let view = LayoutContext::new(
        viewer,
        "Page not found",
        NotFoundView {
            path: path.to_string(),
        },
    );
    let mut response = render_template_response(NotFoundTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        format!("no page at `{path}`"),
    )
    .attach(&mut response);
    response
}

/// The generic failure page. Rendering falls back to a bare status when the
/// template itself fails, so this never recurses.
pub fn render_server_error_response(viewer: Option<&UserRecord>) -> Response {
    let view = LayoutContext::new(viewer, "Server error", ());
    let template = ServerErrorTemplate { view };
    match template.render() {
        Ok(html) => (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[derive(Clone)]
pub struct ViewerView {
    pub username: String,
    pub profile_url: String,
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub title: String,
    pub viewer: Option<ViewerView>,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(viewer: Option<&UserRecord>, title: impl Into<String>, content: T) -> Self {
        Self {
            title: title.into(),
            viewer: viewer.map(|user| ViewerView {
                username: user.username.clone(),
                profile_url: profile_url(&user.username),
            }),
            content,
        }
    }
}

pub fn profile_url(username: &str) -> String {
    format!("/{username}/")
}

pub fn post_url(username: &str, post_id: i64) -> String {
    format!("/{username}/{post_id}/")
}

pub fn group_url(slug: &str) -> String {
    format!("/group/{slug}/")
}

pub fn media_url(stored_path: &str) -> String {
    format!("/media/{stored_path}")
}

pub fn human_date(value: OffsetDateTime, tz: Tz) -> String {
    localize(value, tz)
        .format(HUMAN_DATE_FORMAT)
        .unwrap_or_else(|_| value.date().to_string())
}

#[derive(Clone)]
pub struct GroupLinkView {
    pub title: String,
    pub url: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub author: String,
    pub author_url: String,
    pub text: String,
    pub pub_date: String,
    pub group: Option<GroupLinkView>,
    pub image_url: Option<String>,
    pub comment_count: i64,
    pub url: String,
    pub edit_url: Option<String>,
}

impl PostCard {
    /// `editor` gets an edit link on their own posts; cached listings pass `None`.
    pub fn build(post: &PostView, tz: Tz, editor: Option<&UserRecord>) -> Self {
        let url = post_url(&post.author.username, post.id);
        let edit_url = editor
            .filter(|editor| editor.id == post.author.id)
            .map(|_| format!("{url}edit/"));

        Self {
            id: post.id,
            author: post.author.username.clone(),
            author_url: profile_url(&post.author.username),
            text: post.text.clone(),
            pub_date: human_date(post.pub_date, tz),
            group: post.group.as_ref().map(|group| GroupLinkView {
                title: group.title.clone(),
                url: group_url(&group.slug),
            }),
            image_url: post.image.as_deref().map(media_url),
            comment_count: post.comment_count,
            url,
            edit_url,
        }
    }
}

#[derive(Clone)]
pub struct PageLinkView {
    pub number: Option<u32>,
    pub current: bool,
}

#[derive(Clone)]
pub struct PaginatorView {
    pub number: u32,
    pub num_pages: u32,
    pub previous: Option<u32>,
    pub next: Option<u32>,
    pub links: Vec<PageLinkView>,
}

impl PaginatorView {
    pub fn from_page<T>(page: &Page<T>) -> Self {
        let links = page
            .links()
            .into_iter()
            .map(|link| match link {
                PageLink::Number(number) => PageLinkView {
                    number: Some(number),
                    current: number == page.number,
                },
                PageLink::Gap => PageLinkView {
                    number: None,
                    current: false,
                },
            })
            .collect();

        Self {
            number: page.number,
            num_pages: page.num_pages,
            previous: page.previous_page_number(),
            next: page.next_page_number(),
            links,
        }
    }

    pub fn has_other_pages(&self) -> bool {
        self.num_pages > 1
    }
}

#[derive(Clone)]
pub struct FeedView {
    pub cards: Vec<PostCard>,
    pub paginator: PaginatorView,
}

impl FeedView {
    pub fn build(page: &Page<PostView>, tz: Tz, editor: Option<&UserRecord>) -> Self {
        Self {
            cards: page
                .items
                .iter()
                .map(|post| PostCard::build(post, tz, editor))
                .collect(),
            paginator: PaginatorView::from_page(page),
        }
    }
}

/// The shared global feed; carries no per-viewer state so it can be cached.
#[derive(Template)]
#[template(path = "partials/index_feed.html")]
pub struct IndexFeedPartial {
    pub feed: FeedView,
}

pub struct IndexView {
    pub fragment: String,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<IndexView>,
}

pub struct GroupView {
    pub title: String,
    pub description: Option<String>,
    pub feed: FeedView,
}

impl GroupView {
    pub fn build(group: &GroupFeed, tz: Tz, viewer: Option<&UserRecord>) -> Self {
        Self {
            title: group.group.title.clone(),
            description: group.group.description.clone(),
            feed: FeedView::build(&group.page, tz, viewer),
        }
    }
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupView>,
}

pub struct ProfileView {
    pub username: String,
    pub post_count: u64,
    pub followers: u64,
    pub following: u64,
    pub show_follow_controls: bool,
    pub viewer_follows: bool,
    pub follow_url: String,
    pub unfollow_url: String,
    pub feed: FeedView,
}

impl ProfileView {
    pub fn build(profile: &ProfileFeed, tz: Tz, viewer: Option<&UserRecord>) -> Self {
        let base = profile_url(&profile.author.username);
        Self {
            username: profile.author.username.clone(),
            post_count: profile.page.count,
            followers: profile.followers,
            following: profile.following,
            show_follow_controls: viewer.is_some() && !profile.viewer_is_author,
            viewer_follows: profile.viewer_follows,
            follow_url: format!("{base}follow/"),
            unfollow_url: format!("{base}unfollow/"),
            feed: FeedView::build(&profile.page, tz, viewer),
        }
    }
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileView>,
}

pub struct FollowView {
    pub feed: FeedView,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FollowView>,
}

pub struct CommentView {
    pub author: String,
    pub author_url: String,
    pub text: String,
    pub created: String,
}

impl CommentView {
    fn build(comment: &CommentRecord, tz: Tz) -> Self {
        Self {
            author: comment.author.username.clone(),
            author_url: profile_url(&comment.author.username),
            text: comment.text.clone(),
            created: human_date(comment.created, tz),
        }
    }
}

pub struct CommentFormView {
    pub action: String,
    pub text: String,
    pub errors: FormErrors,
}

pub struct PostDetailView {
    pub post: PostCard,
    pub author_post_count: u64,
    pub comments: Vec<CommentView>,
    /// Present for signed-in viewers only.
    pub comment_form: Option<CommentFormView>,
}

impl PostDetailView {
    pub fn build(detail: &PostDetail, tz: Tz, viewer: Option<&UserRecord>) -> Self {
        let post = PostCard::build(&detail.post, tz, viewer);
        let comment_form = viewer.map(|_| CommentFormView {
            action: format!("{}comment/", post.url),
            text: String::new(),
            errors: FormErrors::default(),
        });

        Self {
            post,
            author_post_count: detail.author_post_count,
            comments: detail
                .comments
                .iter()
                .map(|comment| CommentView::build(comment, tz))
                .collect(),
            comment_form,
        }
    }

    /// Keep the rejected comment and its errors in the form.
    pub fn with_comment_errors(mut self, text: &str, errors: FormErrors) -> Self {
        if let Some(form) = self.comment_form.as_mut() {
            form.text = text.to_string();
            form.errors = errors;
        }
        self
    }
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostDetailView>,
}

pub struct GroupOptionView {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormView {
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupOptionView>,
    pub current_image: Option<String>,
    pub errors: FormErrors,
}

impl PostFormView {
    pub fn new(
        action: impl Into<String>,
        text: &str,
        selected_group: &str,
        groups: &[GroupRecord],
        errors: FormErrors,
    ) -> Self {
        let selected_group = selected_group.trim();
        Self {
            is_edit: false,
            action: action.into(),
            text: text.to_string(),
            groups: groups
                .iter()
                .map(|group| GroupOptionView {
                    id: group.id,
                    title: group.to_string(),
                    selected: group.id.to_string() == selected_group,
                })
                .collect(),
            current_image: None,
            errors,
        }
    }

    pub fn editing(mut self, current_image: Option<&str>) -> Self {
        self.is_edit = true;
        self.current_image = current_image.map(media_url);
        self
    }
}

#[derive(Template)]
#[template(path = "new.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormView>,
}

pub struct LoginView {
    pub username: String,
    pub next: String,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginView>,
}

pub struct SignupView {
    pub username: String,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "auth/signup.html")]
pub struct SignupTemplate {
    pub view: LayoutContext<SignupView>,
}

#[derive(Template)]
#[template(path = "about/author.html")]
pub struct AboutAuthorTemplate {
    pub view: LayoutContext<()>,
}

#[derive(Template)]
#[template(path = "about/tech.html")]
pub struct AboutTechTemplate {
    pub view: LayoutContext<()>,
}

pub struct NotFoundView {
    pub path: String,
}

#[derive(Template)]
#[template(path = "misc/404.html")]
pub struct NotFoundTemplate {
    pub view: LayoutContext<NotFoundView>,
}

#[derive(Template)]
#[template(path = "misc/500.html")]
pub struct ServerErrorTemplate {
    pub view: LayoutContext<()>,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::entities::{AuthorRef, GroupRef};

    fn sample_post() -> PostView {
        PostView {
            id: 7,
            text: "Hello <world>".to_string(),
            pub_date: datetime!(2024-03-05 10:00 UTC),
            author: AuthorRef {
                id: 1,
                username: "leo".to_string(),
            },
            group: Some(GroupRef {
                id: 2,
                title: "Cats".to_string(),
                slug: "cats".to_string(),
            }),
            image: Some("posts/2024/03/05/abc-cat.gif".to_string()),
            comment_count: 3,
        }
    }

    fn user(id: i64, username: &str) -> UserRecord {
        UserRecord {
            id,
            username: username.to_string(),
            password_hash: String::new(),
            date_joined: datetime!(2024-01-01 0:00 UTC),
        }
    }

    #[test]
    fn card_links_point_at_author_routes() {
        let card = PostCard::build(&sample_post(), chrono_tz::UTC, None);

        assert_eq!(card.url, "/leo/7/");
        assert_eq!(card.author_url, "/leo/");
        assert_eq!(card.pub_date, "5 March 2024");
        assert_eq!(card.image_url.as_deref(), Some("/media/posts/2024/03/05/abc-cat.gif"));
        assert_eq!(card.group.map(|group| group.url).as_deref(), Some("/group/cats/"));
        assert!(card.edit_url.is_none());
    }

    #[test]
    fn only_the_author_gets_an_edit_link() {
        let post = sample_post();
        let author = user(1, "leo");
        let other = user(2, "anna");

        assert_eq!(
            PostCard::build(&post, chrono_tz::UTC, Some(&author)).edit_url.as_deref(),
            Some("/leo/7/edit/")
        );
        assert!(PostCard::build(&post, chrono_tz::UTC, Some(&other)).edit_url.is_none());
    }

    #[test]
    fn index_fragment_escapes_post_text() {
        let page = Page {
            items: vec![sample_post()],
            number: 1,
            num_pages: 1,
            count: 1,
            per_page: 10,
        };
        let html = render_fragment(IndexFeedPartial {
            feed: FeedView::build(&page, chrono_tz::UTC, None),
        })
        .expect("fragment renders");

        assert!(html.contains("Hello &#60;world&#62;") || html.contains("Hello &lt;world&gt;"));
        assert!(html.contains("/group/cats/"));
    }

    #[test]
    fn not_found_page_shows_requested_path() {
        let response = render_not_found_response(None, "/missing/page/");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }

    #[test]
    fn group_choices_mark_the_selected_one() {
        let groups = vec![
            GroupRecord {
                id: 1,
                title: "Cats".to_string(),
                slug: "cats".to_string(),
                description: None,
            },
            GroupRecord {
                id: 2,
                title: "Dogs".to_string(),
                slug: "dogs".to_string(),
                description: None,
            },
        ];
        let form = PostFormView::new("/new/", "", " 2 ", &groups, FormErrors::default());

        assert!(!form.groups[0].selected);
        assert!(form.groups[1].selected);
    }

    #[tokio::test]
    async fn server_error_page_renders_with_status() {
        use http_body_util::BodyExt;

        let response = render_server_error_response(None);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let html = String::from_utf8(body.to_vec()).expect("utf-8");
        assert!(html.contains("data-template=\"misc/500\""));
    }
}
