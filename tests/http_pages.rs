//! Read-only pages: listings, pagination, the cached index fragment and 404s.

mod support;

use axum::http::StatusCode;

use blogroll::cache::{CacheConfig, INDEX_PAGE_FRAGMENT, fragment_key};

use support::{TestApp, body_text};

fn uncached() -> CacheConfig {
    CacheConfig {
        enabled: false,
        ..Default::default()
    }
}

fn card_count(html: &str) -> usize {
    html.matches("class=\"post-card\"").count()
}

#[tokio::test]
async fn index_lists_posts_newest_first() {
    let app = TestApp::with_cache(uncached());
    let (leo, _) = app.sign_in("leo").await;
    app.repos.insert_post(&leo, "first entry", None).await;
    app.repos.insert_post(&leo, "second entry", None).await;

    let response = app.get("/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;

    assert!(html.contains("data-template=\"index\""));
    let second = html.find("second entry").expect("second post listed");
    let first = html.find("first entry").expect("first post listed");
    assert!(second < first);
}

#[tokio::test]
async fn index_splits_thirteen_posts_into_ten_and_three() {
    let app = TestApp::with_cache(uncached());
    let (leo, _) = app.sign_in("leo").await;
    for i in 0..13 {
        app.repos
            .insert_post(&leo, &format!("entry-{i:02}"), None)
            .await;
    }

    let first = body_text(app.get("/", None).await).await;
    assert_eq!(card_count(&first), 10);
    assert!(first.contains("entry-12"));
    assert!(!first.contains("entry-02"));

    let second = body_text(app.get("/?page=2", None).await).await;
    assert_eq!(card_count(&second), 3);
    assert!(second.contains("entry-00"));
}

#[tokio::test]
async fn out_of_range_page_shows_last_page() {
    let app = TestApp::with_cache(uncached());
    let (leo, _) = app.sign_in("leo").await;
    for i in 0..13 {
        app.repos
            .insert_post(&leo, &format!("entry-{i:02}"), None)
            .await;
    }

    let response = app.get("/?page=99", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(card_count(&body_text(response).await), 3);

    let huge = body_text(app.get("/?page=99999999999999999999", None).await).await;
    assert_eq!(card_count(&huge), 3);

    let garbage = body_text(app.get("/?page=abc", None).await).await;
    assert_eq!(card_count(&garbage), 10);
}

#[tokio::test]
async fn index_fragment_is_cached_until_cleared() {
    let app = TestApp::new();
    let (leo, _) = app.sign_in("leo").await;
    app.repos.insert_post(&leo, "before caching", None).await;

    let key = fragment_key(INDEX_PAGE_FRAGMENT, &[]);
    assert!(!app.state.cache.contains(&key));

    let html = body_text(app.get("/", None).await).await;
    assert!(html.contains("before caching"));
    assert!(app.state.cache.contains(&key));

    app.repos.insert_post(&leo, "after caching", None).await;
    let cached = body_text(app.get("/", None).await).await;
    assert!(!cached.contains("after caching"));

    app.state.cache.clear();
    let fresh = body_text(app.get("/", None).await).await;
    assert!(fresh.contains("after caching"));
}

#[tokio::test]
async fn cached_fragment_keeps_per_viewer_layout() {
    let app = TestApp::new();
    let (_, cookie) = app.sign_in("leo").await;

    let guest = body_text(app.get("/", None).await).await;
    assert!(guest.contains("/auth/login/"));

    let signed_in = body_text(app.get("/", Some(&cookie)).await).await;
    assert!(signed_in.contains("/auth/logout/"));
}

#[tokio::test]
async fn group_page_lists_group_post_once() {
    let app = TestApp::with_cache(uncached());
    let (leo, _) = app.sign_in("leo").await;
    let test_group = app.repos.insert_group("Test group", "test_group").await;
    let dogs = app.repos.insert_group("Dogs", "dogs").await;
    let post_id = app.repos.insert_post(&leo, "meow", Some(test_group.id)).await;
    app.repos.insert_post(&leo, "woof", Some(dogs.id)).await;

    let response = app.get("/group/test_group/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;

    assert!(html.contains("data-template=\"group\""));
    assert_eq!(
        html.matches(&format!("data-post-id=\"{post_id}\"")).count(),
        1
    );
    assert!(!html.contains("woof"));

    let index = body_text(app.get("/", None).await).await;
    assert!(index.contains("href=\"/group/test_group/\""));
}

#[tokio::test]
async fn unknown_group_is_not_found() {
    let app = TestApp::new();

    let response = app.get("/group/missing/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("data-template=\"misc/404\""));
}

#[tokio::test]
async fn profile_shows_author_posts_and_counts() {
    let app = TestApp::with_cache(uncached());
    let (leo, _) = app.sign_in("leo").await;
    let (anna, _) = app.sign_in("anna").await;
    app.repos.insert_post(&leo, "by leo", None).await;
    app.repos.insert_post(&anna, "by anna", None).await;

    let response = app.get("/leo/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;

    assert!(html.contains("data-template=\"profile\""));
    assert!(html.contains("by leo"));
    assert!(!html.contains("by anna"));
    assert!(html.contains("Posts: 1"));
}

#[tokio::test]
async fn profile_pages_hold_five_posts() {
    let app = TestApp::with_cache(uncached());
    let (leo, _) = app.sign_in("leo").await;
    for i in 0..6 {
        app.repos
            .insert_post(&leo, &format!("entry-{i:02}"), None)
            .await;
    }

    let first = body_text(app.get("/leo/", None).await).await;
    assert_eq!(card_count(&first), 5);
    let second = body_text(app.get("/leo/?page=2", None).await).await;
    assert_eq!(card_count(&second), 1);
}

#[tokio::test]
async fn post_page_shows_post_and_author_count() {
    let app = TestApp::new();
    let (leo, _) = app.sign_in("leo").await;
    let post_id = app.repos.insert_post(&leo, "a single post", None).await;

    let response = app.get(&format!("/leo/{post_id}/"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;

    assert!(html.contains("data-template=\"post\""));
    assert!(html.contains("a single post"));
    assert!(html.contains("has 1 posts"));
    assert!(!html.contains("class=\"comment-form\""));
}

#[tokio::test]
async fn post_under_wrong_author_is_not_found() {
    let app = TestApp::new();
    let (leo, _) = app.sign_in("leo").await;
    app.sign_in("anna").await;
    let post_id = app.repos.insert_post(&leo, "leo's post", None).await;

    let response = app.get(&format!("/anna/{post_id}/"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_numeric_post_id_is_not_found() {
    let app = TestApp::new();
    app.sign_in("leo").await;

    let response = app.get("/leo/abc/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_paths_render_not_found_page() {
    let app = TestApp::new();

    for path in ["/nobody/", "/no/such/deep/path/", "/leo"] {
        let response = app.get(path, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        let html = body_text(response).await;
        assert!(html.contains("data-template=\"misc/404\""), "{path}");
    }

    let html = body_text(app.get("/nobody/", None).await).await;
    assert!(html.contains("nobody"));
}

#[tokio::test]
async fn about_pages_are_public() {
    let app = TestApp::new();

    let author = app.get("/about/author/", None).await;
    assert_eq!(author.status(), StatusCode::OK);
    assert!(body_text(author).await.contains("data-template=\"about/author\""));

    let tech = app.get("/about/tech/", None).await;
    assert_eq!(tech.status(), StatusCode::OK);
    assert!(body_text(tech).await.contains("data-template=\"about/tech\""));
}

#[tokio::test]
async fn health_and_static_assets_respond() {
    let app = TestApp::new();

    let health = app.get("/_health/db", None).await;
    assert_eq!(health.status(), StatusCode::NO_CONTENT);

    let css = app.get("/static/css/site.css", None).await;
    assert_eq!(css.status(), StatusCode::OK);
}
