//! In-memory repositories and request helpers shared by the HTTP tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use http_body_util::BodyExt;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use blogroll::application::{
    auth::AuthService,
    feed::{FeedPageSizes, FeedService},
    follows::FollowService,
    pagination::PageSlice,
    posts::{ImageStore, PostService},
    repos::{
        CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateUserParams,
        FollowInsert, FollowsRepo, GroupsRepo, HealthRepo, PostScope, PostsRepo, PostsWriteRepo,
        RepoError, SessionsRepo, UpdatePostParams, UsersRepo,
    },
};
use blogroll::cache::{CacheConfig, FragmentCache};
use blogroll::domain::entities::{
    AuthorRef, CommentRecord, FollowRecord, GroupRecord, GroupRef, PostRecord, PostView,
    SessionRecord, UserRecord,
};
use blogroll::infra::{
    http::{HttpState, SiteOptions, build_router},
    uploads::UploadStorage,
};

pub const SESSION_COOKIE: &str = "blogroll_session";

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<PostRecord>,
    comments: Vec<(i64, i64, i64, String, OffsetDateTime)>,
    follows: Vec<FollowRecord>,
    sessions: Vec<SessionRecord>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn author(&self, id: i64) -> Result<AuthorRef, RepoError> {
        self.users
            .iter()
            .find(|user| user.id == id)
            .map(|user| AuthorRef {
                id: user.id,
                username: user.username.clone(),
            })
            .ok_or(RepoError::NotFound)
    }

    fn view(&self, post: &PostRecord) -> Result<PostView, RepoError> {
        let group = post.group_id.and_then(|group_id| {
            self.groups
                .iter()
                .find(|group| group.id == group_id)
                .map(|group| GroupRef {
                    id: group.id,
                    title: group.title.clone(),
                    slug: group.slug.clone(),
                })
        });
        let comment_count = self
            .comments
            .iter()
            .filter(|(_, post_id, ..)| *post_id == post.id)
            .count();

        Ok(PostView {
            id: post.id,
            text: post.text.clone(),
            pub_date: post.pub_date,
            author: self.author(post.author_id)?,
            group,
            image: post.image.clone(),
            comment_count: comment_count as i64,
        })
    }

    fn in_scope(&self, post: &PostRecord, scope: PostScope) -> bool {
        match scope {
            PostScope::All => true,
            PostScope::Group(group_id) => post.group_id == Some(group_id),
            PostScope::Author(author_id) => post.author_id == author_id,
            PostScope::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|follow| follow.user_id == user_id && follow.author_id == post.author_id),
        }
    }
}

/// Every repository trait backed by one set of vectors.
#[derive(Default)]
pub struct MemoryRepos {
    tables: Mutex<Tables>,
    failing_writes: AtomicBool,
}

impl MemoryRepos {
    pub async fn insert_group(&self, title: &str, slug: &str) -> GroupRecord {
        self.create_group(CreateGroupParams {
            title: title.to_string(),
            slug: slug.to_string(),
            description: None,
        })
        .await
        .expect("insert group")
    }

    pub async fn insert_post(&self, author: &UserRecord, text: &str, group_id: Option<i64>) -> i64 {
        self.create_post(CreatePostParams {
            author_id: author.id,
            text: text.to_string(),
            group_id,
            image: None,
        })
        .await
        .expect("insert post")
        .id
    }

    pub async fn post_text(&self, id: i64) -> Option<String> {
        let tables = self.tables.lock().await;
        tables
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| post.text.clone())
    }

    pub async fn post_image(&self, id: i64) -> Option<String> {
        let tables = self.tables.lock().await;
        tables
            .posts
            .iter()
            .find(|post| post.id == id)
            .and_then(|post| post.image.clone())
    }

    pub async fn latest_post_id(&self) -> Option<i64> {
        let tables = self.tables.lock().await;
        tables.posts.iter().map(|post| post.id).max()
    }

    /// Makes post inserts and updates fail like a lost database connection.
    pub fn fail_writes(&self) {
        self.failing_writes.store(true, Ordering::SeqCst);
    }

    fn check_writes(&self) -> Result<(), RepoError> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("connection reset".to_string()));
        }
        Ok(())
    }

    pub async fn post_count(&self) -> usize {
        self.tables.lock().await.posts.len()
    }

    pub async fn follow_count(&self) -> usize {
        self.tables.lock().await.follows.len()
    }

    pub async fn comment_texts(&self, post_id: i64) -> Vec<String> {
        let tables = self.tables.lock().await;
        tables
            .comments
            .iter()
            .filter(|(_, id, ..)| *id == post_id)
            .map(|(_, _, _, text, _)| text.clone())
            .collect()
    }
}

#[async_trait]
impl UsersRepo for MemoryRepos {
    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables
            .users
            .iter()
            .any(|user| user.username == params.username)
        {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let user = UserRecord {
            id: tables.next_id(),
            username: params.username,
            password_hash: params.password_hash,
            date_joined: OffsetDateTime::now_utc(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn delete_user(&self, username: &str) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let Some(id) = tables
            .users
            .iter()
            .find(|user| user.username == username)
            .map(|user| user.id)
        else {
            return Ok(false);
        };
        let post_ids: Vec<i64> = tables
            .posts
            .iter()
            .filter(|post| post.author_id == id)
            .map(|post| post.id)
            .collect();
        tables.users.retain(|user| user.id != id);
        tables.posts.retain(|post| post.author_id != id);
        tables
            .comments
            .retain(|(_, post_id, author_id, ..)| *author_id != id && !post_ids.contains(post_id));
        tables
            .follows
            .retain(|follow| follow.user_id != id && follow.author_id != id);
        tables.sessions.retain(|session| session.user_id != id);
        Ok(true)
    }
}

#[async_trait]
impl GroupsRepo for MemoryRepos {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        let mut groups = tables.groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(groups)
    }

    async fn find_group(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|group| group.id == id).cloned())
    }

    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|group| group.slug == slug).cloned())
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }
        let group = GroupRecord {
            id: tables.next_id(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        tables.groups.push(group.clone());
        Ok(group)
    }

    async fn delete_group(&self, slug: &str) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let Some(id) = tables
            .groups
            .iter()
            .find(|group| group.slug == slug)
            .map(|group| group.id)
        else {
            return Ok(false);
        };
        tables.groups.retain(|group| group.id != id);
        for post in tables.posts.iter_mut() {
            if post.group_id == Some(id) {
                post.group_id = None;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl PostsRepo for MemoryRepos {
    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .iter()
            .filter(|post| tables.in_scope(post, scope))
            .count() as u64)
    }

    async fn list_posts(
        &self,
        scope: PostScope,
        slice: PageSlice,
    ) -> Result<Vec<PostView>, RepoError> {
        let tables = self.tables.lock().await;
        let mut posts: Vec<&PostRecord> = tables
            .posts
            .iter()
            .filter(|post| tables.in_scope(post, scope))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));

        posts
            .into_iter()
            .skip(slice.offset as usize)
            .take(slice.limit as usize)
            .map(|post| tables.view(post))
            .collect()
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostView>, RepoError> {
        let tables = self.tables.lock().await;
        match tables.posts.iter().find(|post| post.id == id) {
            Some(post) => tables.view(post).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryRepos {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        self.check_writes()?;
        let mut tables = self.tables.lock().await;
        let post = PostRecord {
            id: tables.next_id(),
            text: params.text,
            pub_date: OffsetDateTime::now_utc(),
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
        };
        tables.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        self.check_writes()?;
        let mut tables = self.tables.lock().await;
        let post = tables
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        Ok(post.clone())
    }
}

#[async_trait]
impl CommentsRepo for MemoryRepos {
    async fn list_comments(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let tables = self.tables.lock().await;
        let mut comments = tables
            .comments
            .iter()
            .filter(|(_, id, ..)| *id == post_id)
            .map(|(id, post_id, author_id, text, created)| {
                Ok(CommentRecord {
                    id: *id,
                    post_id: *post_id,
                    author: tables.author(*author_id)?,
                    text: text.clone(),
                    created: *created,
                })
            })
            .collect::<Result<Vec<_>, RepoError>>()?;
        comments.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let created = OffsetDateTime::now_utc();
        let author = tables.author(params.author_id)?;
        tables.comments.push((
            id,
            params.post_id,
            params.author_id,
            params.text.clone(),
            created,
        ));
        Ok(CommentRecord {
            id,
            post_id: params.post_id,
            author,
            text: params.text,
            created,
        })
    }
}

#[async_trait]
impl FollowsRepo for MemoryRepos {
    async fn insert_follow(&self, user_id: i64, author_id: i64) -> Result<FollowInsert, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables
            .follows
            .iter()
            .any(|follow| follow.user_id == user_id && follow.author_id == author_id)
        {
            return Ok(FollowInsert::AlreadyExists);
        }
        let id = tables.next_id();
        tables.follows.push(FollowRecord {
            id,
            user_id,
            author_id,
        });
        Ok(FollowInsert::Created)
    }

    async fn delete_follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.follows.len();
        tables
            .follows
            .retain(|follow| !(follow.user_id == user_id && follow.author_id == author_id));
        Ok(tables.follows.len() != before)
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .follows
            .iter()
            .any(|follow| follow.user_id == user_id && follow.author_id == author_id))
    }

    async fn count_followers(&self, author_id: i64) -> Result<u64, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .follows
            .iter()
            .filter(|follow| follow.author_id == author_id)
            .count() as u64)
    }

    async fn count_following(&self, user_id: i64) -> Result<u64, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .follows
            .iter()
            .filter(|follow| follow.user_id == user_id)
            .count() as u64)
    }
}

#[async_trait]
impl SessionsRepo for MemoryRepos {
    async fn create_session(&self, session: SessionRecord) -> Result<(), RepoError> {
        self.tables.lock().await.sessions.push(session);
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .find(|session| session.id == id)
            .cloned())
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), RepoError> {
        self.tables
            .lock()
            .await
            .sessions
            .retain(|session| session.id != id);
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|session| session.expires_at > now);
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait]
impl HealthRepo for MemoryRepos {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// A router over fresh in-memory repositories.
pub struct TestApp {
    pub repos: Arc<MemoryRepos>,
    pub state: HttpState,
    pub router: Router,
    uploads_dir: tempfile::TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_cache(CacheConfig::default())
    }

    pub fn with_cache(cache: CacheConfig) -> Self {
        let repos = Arc::new(MemoryRepos::default());
        let uploads_dir = tempfile::tempdir().expect("tempdir");
        let uploads = Arc::new(
            UploadStorage::new(uploads_dir.path().to_path_buf()).expect("upload storage"),
        );
        let images: Arc<dyn ImageStore> = uploads.clone();

        let feed = FeedService::new(
            repos.clone(),
            repos.clone(),
            repos.clone(),
            repos.clone(),
            repos.clone(),
            FeedPageSizes::default(),
        );
        let posts = PostService::new(
            repos.clone(),
            repos.clone(),
            repos.clone(),
            repos.clone(),
            images,
        );
        let follows = FollowService::new(repos.clone(), repos.clone());
        let auth = AuthService::new(repos.clone(), repos.clone(), Duration::days(14));

        let state = HttpState {
            feed: Arc::new(feed),
            posts: Arc::new(posts),
            follows: Arc::new(follows),
            auth: Arc::new(auth),
            cache: Arc::new(FragmentCache::new(cache)),
            uploads,
            health: repos.clone(),
            site: SiteOptions {
                timezone: chrono_tz::UTC,
                session_cookie: SESSION_COOKIE.to_string(),
                secure_cookie: false,
                max_request_bytes: 2 * 1024 * 1024,
            },
        };
        let router = build_router(state.clone());

        Self {
            repos,
            state,
            router,
            uploads_dir,
        }
    }

    /// Registers `username` and returns the user with a ready `Cookie` header value.
    pub async fn sign_in(&self, username: &str) -> (UserRecord, String) {
        let user = self
            .state
            .auth
            .register(username, "correct-horse-battery")
            .await
            .expect("register user");
        let session = self
            .state
            .auth
            .start_session(&user)
            .await
            .expect("start session");
        (user, format!("{SESSION_COOKIE}={}", session.token))
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::get(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).expect("request"))
            .await
    }

    pub async fn post_form(&self, uri: &str, cookie: Option<&str>, body: &str) -> Response<Body> {
        let mut builder = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    /// Submits the post form as `multipart/form-data` without a file part.
    pub async fn post_multipart(
        &self,
        uri: &str,
        cookie: &str,
        fields: &[(&str, &str)],
    ) -> Response<Body> {
        self.post_multipart_file(uri, cookie, fields, None).await
    }

    /// Submits the post form with an optional `image` part of `(filename, bytes)`.
    pub async fn post_multipart_file(
        &self,
        uri: &str,
        cookie: &str,
        fields: &[(&str, &str)],
        image: Option<(&str, &[u8])>,
    ) -> Response<Body> {
        const BOUNDARY: &str = "blogroll-test-boundary";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((filename, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::post(uri)
            .header(header::COOKIE, cookie)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request");
        self.send(request).await
    }

    /// Number of files written under the upload directory.
    pub fn stored_file_count(&self) -> usize {
        fn count(dir: &Path) -> usize {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(Result::ok)
                        .map(|entry| {
                            let path = entry.path();
                            if path.is_dir() { count(&path) } else { 1 }
                        })
                        .sum()
                })
                .unwrap_or(0)
        }
        count(self.uploads_dir.path())
    }
}

/// A 1x1 transparent GIF.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x21, 0xF9,
    0x04, 0x01, 0x0A, 0x00, 0x01, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00,
    0x00, 0x02, 0x02, 0x4C, 0x01, 0x00, 0x3B,
];

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}
