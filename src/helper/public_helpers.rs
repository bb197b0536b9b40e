use rusqlite::Connection;

use crate::helper::sanitization_helpers;
use crate::models::db_operations::{admin_db_operations, posts_db_operations, users_db_operations, DbError};
use crate::models::{BlogPost, Comment, CommentStatus, NotificationKind, PostMetadata, PostSummary, ReactionKind};
use crate::AppState;

/// Attaches counters and the viewer's flags to a post's metadata. `content`
/// is only given for single-post reads.
fn blog_post(
    conn: &Connection,
    id: String,
    metadata: PostMetadata,
    content: Option<String>,
    viewer: Option<i64>,
) -> Result<BlogPost, DbError> {
    let (is_liked, is_bookmarked) = match viewer {
        Some(user_id) => (
            users_db_operations::has_reaction(conn, &id, user_id, ReactionKind::Like)?,
            users_db_operations::has_reaction(conn, &id, user_id, ReactionKind::Bookmark)?,
        ),
        None => (false, false),
    };

    Ok(BlogPost {
        likes: users_db_operations::count_reactions(conn, &id, ReactionKind::Like)?,
        bookmarks: users_db_operations::count_reactions(conn, &id, ReactionKind::Bookmark)?,
        comments: admin_db_operations::count_comments(conn, &id)?,
        content_html: content.as_deref().map(sanitization_helpers::render_markdown),
        content,
        id,
        title: metadata.title,
        excerpt: metadata.excerpt,
        author: metadata.author,
        cover_image: metadata.cover_image,
        tags: metadata.tags,
        category: metadata.category,
        published_at: metadata.published_at,
        read_time: metadata.read_time,
        featured: metadata.featured,
        is_liked,
        is_bookmarked,
    })
}

fn blog_posts(state: &AppState, summaries: Vec<PostSummary>, viewer: Option<i64>) -> Result<Vec<BlogPost>, DbError> {
    let conn = state.pool.get()?;
    summaries.into_iter()
        .map(|summary| blog_post(&conn, summary.id, summary.metadata, None, viewer))
        .collect()
}

/// A single post as the viewer may see it. Scheduled and non-public posts are
/// only visible to their author.
pub fn fetch_post(state: &AppState, id: &str, viewer: Option<i64>) -> Result<Option<BlogPost>, DbError> {
    let Some(post) = posts_db_operations::read_post(&state.posts_db, id)? else {
        return Ok(None);
    };
    let is_author = viewer == Some(post.metadata.author.id);
    if !is_author && !post.metadata.is_listed(state.clock.now()) {
        return Ok(None);
    }
    let conn = state.pool.get()?;
    blog_post(&conn, post.id, post.metadata, Some(post.content), viewer).map(Some)
}

pub fn fetch_latest_posts(state: &AppState, viewer: Option<i64>, limit: u32, offset: u32) -> Result<Vec<BlogPost>, DbError> {
    let summaries = posts_db_operations::read_latest_post_summaries(&state.posts_db, state.clock.now(), limit, offset)?;
    blog_posts(state, summaries, viewer)
}

pub fn fetch_featured_posts(state: &AppState, viewer: Option<i64>, limit: u32) -> Result<Vec<BlogPost>, DbError> {
    let summaries = posts_db_operations::read_featured_post_summaries(&state.posts_db, state.clock.now(), limit)?;
    blog_posts(state, summaries, viewer)
}

pub fn fetch_posts_by_tag(state: &AppState, tag: &str, viewer: Option<i64>, limit: u32, offset: u32) -> Result<Vec<BlogPost>, DbError> {
    let summaries = posts_db_operations::read_post_summaries_by_tag(&state.posts_db, tag, state.clock.now(), limit, offset)?;
    blog_posts(state, summaries, viewer)
}

pub fn fetch_posts_by_category(state: &AppState, category: &str, viewer: Option<i64>, limit: u32, offset: u32) -> Result<Vec<BlogPost>, DbError> {
    let summaries = posts_db_operations::read_post_summaries_by_category(&state.posts_db, category, state.clock.now(), limit, offset)?;
    blog_posts(state, summaries, viewer)
}

/// An author's posts. Others only see the listed ones.
pub fn fetch_posts_by_author(state: &AppState, author_id: i64, viewer: Option<i64>, limit: u32, offset: u32) -> Result<Vec<BlogPost>, DbError> {
    let now = state.clock.now();
    let own = viewer == Some(author_id);
    let summaries: Vec<PostSummary> = posts_db_operations::read_post_summaries_by_author(&state.posts_db, author_id, u32::MAX, 0)?
        .into_iter()
        .filter(|summary| own || summary.metadata.is_listed(now))
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    blog_posts(state, summaries, viewer)
}

/// Toggles the viewer's reaction. A new like notifies the author unless they
/// liked their own post. `None` when the post does not exist.
pub fn toggle_reaction(
    state: &AppState,
    post_id: &str,
    user_id: i64,
    username: &str,
    kind: ReactionKind,
) -> Result<Option<BlogPost>, DbError> {
    let Some(post) = posts_db_operations::read_post(&state.posts_db, post_id)? else {
        return Ok(None);
    };
    let conn = state.pool.get()?;
    let active = users_db_operations::toggle_reaction(&conn, post_id, user_id, kind)?;

    if active && kind == ReactionKind::Like && post.metadata.author.id != user_id {
        admin_db_operations::create_notification(
            &conn,
            post.metadata.author.id,
            NotificationKind::Like,
            &format!("{} liked your post \"{}\"", username, post.metadata.title),
            Some(&format!("/posts/{}", post_id)),
            state.clock.now(),
        )?;
    }
    blog_post(&conn, post.id, post.metadata, None, Some(user_id)).map(Some)
}

/// Stores an approved comment stripped of HTML and notifies the author.
pub fn add_comment(
    state: &AppState,
    post_id: &str,
    user_id: i64,
    username: &str,
    content: &str,
) -> Result<Option<Comment>, DbError> {
    let Some(post) = posts_db_operations::read_post(&state.posts_db, post_id)? else {
        return Ok(None);
    };
    let conn = state.pool.get()?;
    let now = state.clock.now();
    let clean = sanitization_helpers::strip_all_html(content);
    let comment_id = admin_db_operations::create_comment(&conn, post_id, user_id, &clean, CommentStatus::Approved, now)?;

    if post.metadata.author.id != user_id {
        admin_db_operations::create_notification(
            &conn,
            post.metadata.author.id,
            NotificationKind::Comment,
            &format!("{} commented on \"{}\"", username, post.metadata.title),
            Some(&format!("/posts/{}#comment-{}", post_id, comment_id)),
            now,
        )?;
    }
    Ok(admin_db_operations::read_comment(&conn, comment_id)?)
}
