use std::sync::Arc;

use thiserror::Error;

use crate::application::pagination::{Page, Paginator};
use crate::application::repos::{
    CommentsRepo, FollowsRepo, GroupsRepo, PostScope, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostView, UserRecord};

#[derive(Debug, Clone, Copy)]
pub struct FeedPageSizes {
    pub feed: u32,
    pub profile: u32,
}

impl Default for FeedPageSizes {
    fn default() -> Self {
        Self {
            feed: 10,
            profile: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group `{0}`")]
    UnknownGroup(String),
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error("post {post_id} by `{username}` not found")]
    UnknownPost { username: String, post_id: i64 },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: Page<PostView>,
}

#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: UserRecord,
    pub page: Page<PostView>,
    pub followers: u64,
    pub following: u64,
    /// Whether the viewer follows this author; always false for guests and
    /// for the author's own profile.
    pub viewer_follows: bool,
    pub viewer_is_author: bool,
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostView,
    pub author_post_count: u64,
    pub comments: Vec<CommentRecord>,
    pub viewer_can_edit: bool,
}

/// Read side of the site: every listing page goes through here.
#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    comments: Arc<dyn CommentsRepo>,
    page_sizes: FeedPageSizes,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        comments: Arc<dyn CommentsRepo>,
        page_sizes: FeedPageSizes,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
            comments,
            page_sizes,
        }
    }

    pub async fn index(&self, page: Option<&str>) -> Result<Page<PostView>, FeedError> {
        self.paginate(PostScope::All, self.page_sizes.feed, page)
            .await
    }

    pub async fn group(&self, slug: &str, page: Option<&str>) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_group_by_slug(slug)
            .await?
            .ok_or_else(|| FeedError::UnknownGroup(slug.to_string()))?;

        let page = self
            .paginate(PostScope::Group(group.id), self.page_sizes.feed, page)
            .await?;

        Ok(GroupFeed { group, page })
    }

    pub async fn profile(
        &self,
        username: &str,
        page: Option<&str>,
        viewer: Option<&UserRecord>,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self.find_author(username).await?;

        let page = self
            .paginate(PostScope::Author(author.id), self.page_sizes.profile, page)
            .await?;
        let followers = self.follows.count_followers(author.id).await?;
        let following = self.follows.count_following(author.id).await?;

        let viewer_is_author = viewer.is_some_and(|viewer| viewer.id == author.id);
        let viewer_follows = match viewer {
            Some(viewer) if !viewer_is_author => {
                self.follows.is_following(viewer.id, author.id).await?
            }
            _ => false,
        };

        Ok(ProfileFeed {
            author,
            page,
            followers,
            following,
            viewer_follows,
            viewer_is_author,
        })
    }

    /// Posts by the authors `viewer` follows.
    pub async fn follow(
        &self,
        viewer: &UserRecord,
        page: Option<&str>,
    ) -> Result<Page<PostView>, FeedError> {
        self.paginate(PostScope::FollowedBy(viewer.id), self.page_sizes.feed, page)
            .await
    }

    pub async fn post_detail(
        &self,
        username: &str,
        post_id: i64,
        viewer: Option<&UserRecord>,
    ) -> Result<PostDetail, FeedError> {
        let post = self.find_post(username, post_id).await?;
        let author_post_count = self
            .posts
            .count_posts(PostScope::Author(post.author.id))
            .await?;
        let comments = self.comments.list_comments(post.id).await?;
        let viewer_can_edit = viewer.is_some_and(|viewer| viewer.id == post.author.id);

        Ok(PostDetail {
            post,
            author_post_count,
            comments,
            viewer_can_edit,
        })
    }

    /// Looks a post up by author and id; a post under another author's URL is not found.
    pub async fn find_post(&self, username: &str, post_id: i64) -> Result<PostView, FeedError> {
        self.posts
            .find_post(post_id)
            .await?
            .filter(|post| post.author.username == username)
            .ok_or_else(|| FeedError::UnknownPost {
                username: username.to_string(),
                post_id,
            })
    }

    async fn find_author(&self, username: &str) -> Result<UserRecord, FeedError> {
        self.users
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| FeedError::UnknownAuthor(username.to_string()))
    }

    async fn paginate(
        &self,
        scope: PostScope,
        per_page: u32,
        raw_page: Option<&str>,
    ) -> Result<Page<PostView>, FeedError> {
        let count = self.posts.count_posts(scope).await?;
        let paginator = Paginator::new(count, per_page);
        let number = paginator.resolve(raw_page);
        let items = self
            .posts
            .list_posts(scope, paginator.slice(number))
            .await?;
        Ok(paginator.page(number, items))
    }
}
