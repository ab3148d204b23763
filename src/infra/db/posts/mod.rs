mod read;
mod types;
mod write;

/// Column list producing a [`types::PostViewRow`]; expects `posts p`,
/// `users u` and `groups g` in the FROM clause.
const POST_VIEW_COLUMNS: &str = "p.id, p.text, p.pub_date, p.image, \
     p.author_id, u.username AS author_username, \
     p.group_id, g.title AS group_title, g.slug AS group_slug, \
     (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count";

const POST_VIEW_FROM: &str =
    " FROM posts p JOIN users u ON u.id = p.author_id LEFT JOIN groups g ON g.id = p.group_id ";
