//! Postgres repository behaviour. Needs `DATABASE_URL` pointing at a scratch
//! server; run with `cargo test -- --ignored`.

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use blogroll::application::pagination::PageSlice;
use blogroll::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateUserParams,
    FollowInsert, FollowsRepo, GroupsRepo, PostScope, PostsRepo, PostsWriteRepo, RepoError,
    SessionsRepo, UpdatePostParams, UsersRepo,
};
use blogroll::domain::entities::{SessionRecord, UserRecord};
use blogroll::infra::db::PostgresRepositories;

async fn user(repo: &PostgresRepositories, username: &str) -> UserRecord {
    repo.create_user(CreateUserParams {
        username: username.to_string(),
        password_hash: "not-a-real-hash".to_string(),
    })
    .await
    .expect("create user")
}

async fn post(repo: &PostgresRepositories, author: &UserRecord, text: &str, group_id: Option<i64>) -> i64 {
    repo.create_post(CreatePostParams {
        author_id: author.id,
        text: text.to_string(),
        group_id,
        image: None,
    })
    .await
    .expect("create post")
    .id
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn duplicate_username_is_reported(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    user(&repo, "leo").await;

    let err = repo
        .create_user(CreateUserParams {
            username: "leo".to_string(),
            password_hash: "x".to_string(),
        })
        .await
        .expect_err("duplicate username");
    assert!(matches!(err, RepoError::Duplicate { .. }));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn feeds_are_scoped_and_newest_first(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let leo = user(&repo, "leo").await;
    let anna = user(&repo, "anna").await;
    let cats = repo
        .create_group(CreateGroupParams {
            title: "Cats".to_string(),
            slug: "cats".to_string(),
            description: None,
        })
        .await
        .expect("create group");

    let first = post(&repo, &leo, "first", Some(cats.id)).await;
    let second = post(&repo, &leo, "second", None).await;
    post(&repo, &anna, "third", None).await;

    assert_eq!(repo.count_posts(PostScope::All).await.expect("count"), 3);
    assert_eq!(repo.count_posts(PostScope::Group(cats.id)).await.expect("count"), 1);
    assert_eq!(repo.count_posts(PostScope::Author(leo.id)).await.expect("count"), 2);

    let by_leo = repo
        .list_posts(PostScope::Author(leo.id), PageSlice { limit: 10, offset: 0 })
        .await
        .expect("list");
    let ids: Vec<i64> = by_leo.iter().map(|post| post.id).collect();
    assert_eq!(ids, vec![second, first]);

    let in_group = repo
        .list_posts(PostScope::Group(cats.id), PageSlice { limit: 10, offset: 0 })
        .await
        .expect("list");
    let group = in_group[0].group.as_ref().expect("group joined");
    assert_eq!(group.slug, "cats");
    assert_eq!(in_group[0].author.username, "leo");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn deleting_group_keeps_its_posts(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let leo = user(&repo, "leo").await;
    let cats = repo
        .create_group(CreateGroupParams {
            title: "Cats".to_string(),
            slug: "cats".to_string(),
            description: Some("All about cats".to_string()),
        })
        .await
        .expect("create group");
    let id = post(&repo, &leo, "meow", Some(cats.id)).await;

    assert!(repo.delete_group("cats").await.expect("delete"));
    let stored = repo.find_post(id).await.expect("find").expect("post kept");
    assert!(stored.group.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn update_replaces_text_and_keeps_date(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let leo = user(&repo, "leo").await;
    let id = post(&repo, &leo, "draft", None).await;
    let before = repo.find_post(id).await.expect("find").expect("post");

    let updated = repo
        .update_post(UpdatePostParams {
            id,
            text: "final".to_string(),
            group_id: None,
            image: Some("posts/2024/01/01/abc-cat.png".to_string()),
        })
        .await
        .expect("update");
    assert_eq!(updated.text, "final");
    assert_eq!(updated.pub_date, before.pub_date);

    let missing = repo
        .update_post(UpdatePostParams {
            id: id + 1000,
            text: "x".to_string(),
            group_id: None,
            image: None,
        })
        .await
        .expect_err("missing post");
    assert!(matches!(missing, RepoError::NotFound));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn comments_are_counted_and_listed(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let leo = user(&repo, "leo").await;
    let anna = user(&repo, "anna").await;
    let id = post(&repo, &leo, "discuss", None).await;

    for text in ["one", "two"] {
        repo.create_comment(CreateCommentParams {
            post_id: id,
            author_id: anna.id,
            text: text.to_string(),
        })
        .await
        .expect("comment");
    }

    let comments = repo.list_comments(id).await.expect("list");
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].text, "two");
    assert_eq!(comments[0].author.username, "anna");

    let view = repo.find_post(id).await.expect("find").expect("post");
    assert_eq!(view.comment_count, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn follows_are_unique_per_pair(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let leo = user(&repo, "leo").await;
    let anna = user(&repo, "anna").await;

    assert_eq!(
        repo.insert_follow(anna.id, leo.id).await.expect("follow"),
        FollowInsert::Created
    );
    assert_eq!(
        repo.insert_follow(anna.id, leo.id).await.expect("follow"),
        FollowInsert::AlreadyExists
    );
    assert!(repo.is_following(anna.id, leo.id).await.expect("check"));
    assert_eq!(repo.count_followers(leo.id).await.expect("count"), 1);
    assert_eq!(repo.count_following(anna.id).await.expect("count"), 1);

    post(&repo, &leo, "for followers", None).await;
    assert_eq!(
        repo.count_posts(PostScope::FollowedBy(anna.id))
            .await
            .expect("count"),
        1
    );

    assert!(repo.delete_follow(anna.id, leo.id).await.expect("unfollow"));
    assert!(!repo.delete_follow(anna.id, leo.id).await.expect("unfollow"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn expired_sessions_are_purged(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let leo = user(&repo, "leo").await;
    let now = OffsetDateTime::now_utc();

    let live = Uuid::new_v4();
    let stale = Uuid::new_v4();
    for (id, expires_at) in [(live, now + Duration::days(1)), (stale, now - Duration::hours(1))] {
        repo.create_session(SessionRecord {
            id,
            user_id: leo.id,
            secret_hash: vec![0; 32],
            created_at: now - Duration::days(2),
            expires_at,
        })
        .await
        .expect("create session");
    }

    assert_eq!(repo.purge_expired_sessions(now).await.expect("purge"), 1);
    assert!(repo.find_session(live).await.expect("find").is_some());
    assert!(repo.find_session(stale).await.expect("find").is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn deleting_user_cascades(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let leo = user(&repo, "leo").await;
    let anna = user(&repo, "anna").await;
    let id = post(&repo, &leo, "bye", None).await;
    repo.insert_follow(anna.id, leo.id).await.expect("follow");

    assert!(repo.delete_user("leo").await.expect("delete"));
    assert!(repo.find_post(id).await.expect("find").is_none());
    assert_eq!(repo.count_following(anna.id).await.expect("count"), 0);
    assert!(!repo.delete_user("leo").await.expect("delete again"));
}
