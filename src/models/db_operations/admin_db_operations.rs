use crate::models::{
    slugify, Category, Comment, CommentStatus, Notification, NotificationKind, ReportStatus,
    ReportTarget, ReportedContent, Subscriber, SubscriberStatus, Tag,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Result as RusqliteResult};

// ====================================================================
// ========================= NOTIFICATIONS ============================
// ====================================================================

fn notification_from_row(row: &Row) -> RusqliteResult<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        message: row.get(3)?,
        link: row.get(4)?,
        is_read: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn create_notification(
    conn: &Connection,
    user_id: i64,
    kind: NotificationKind,
    message: &str,
    link: Option<&str>,
    now: DateTime<Utc>,
) -> RusqliteResult<i64> {
    conn.execute(
        "INSERT INTO notifications (user_id, kind, message, link, is_read, created_at) VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        params![user_id, kind, message, link, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_notifications_for_user(conn: &Connection, user_id: i64, unread_only: bool) -> RusqliteResult<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, message, link, is_read, created_at FROM notifications
         WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![user_id, unread_only], notification_from_row)?;
    rows.collect()
}

pub fn count_unread_notifications(conn: &Connection, user_id: i64) -> RusqliteResult<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
        [user_id],
        |row| row.get(0),
    )
}

/// Scoped to the owner so one user cannot touch another's notifications.
pub fn mark_notification_read(conn: &Connection, user_id: i64, notification_id: i64) -> RusqliteResult<usize> {
    conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
        params![notification_id, user_id],
    )
}

pub fn mark_all_notifications_read(conn: &Connection, user_id: i64) -> RusqliteResult<usize> {
    conn.execute("UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0", [user_id])
}

pub fn delete_notification(conn: &Connection, user_id: i64, notification_id: i64) -> RusqliteResult<usize> {
    conn.execute(
        "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
        params![notification_id, user_id],
    )
}

// ====================================================================
// =========================== COMMENTS ===============================
// ====================================================================

const COMMENT_COLUMNS: &str = "c.id, c.post_id, c.author_id, COALESCE(u.name, 'Deleted user'), c.content, c.status, c.created_at";

fn comment_from_row(row: &Row) -> RusqliteResult<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        author_name: row.get(3)?,
        content: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn create_comment(
    conn: &Connection,
    post_id: &str,
    author_id: i64,
    content: &str,
    status: CommentStatus,
    now: DateTime<Utc>,
) -> RusqliteResult<i64> {
    conn.execute(
        "INSERT INTO comments (post_id, author_id, content, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![post_id, author_id, content, status, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_comment(conn: &Connection, comment_id: i64) -> RusqliteResult<Option<Comment>> {
    conn.query_row(
        &format!("SELECT {COMMENT_COLUMNS} FROM comments c LEFT JOIN users u ON u.id = c.author_id WHERE c.id = ?1"),
        [comment_id],
        comment_from_row,
    ).optional()
}

/// Oldest first, the order a thread is read in.
pub fn read_comments_for_post(conn: &Connection, post_id: &str, status: Option<CommentStatus>) -> RusqliteResult<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments c LEFT JOIN users u ON u.id = c.author_id
         WHERE c.post_id = ?1 AND (?2 IS NULL OR c.status = ?2)
         ORDER BY c.created_at, c.id"
    ))?;
    let rows = stmt.query_map(params![post_id, status], comment_from_row)?;
    rows.collect()
}

pub fn read_all_comments(conn: &Connection, status: Option<CommentStatus>, limit: u32, offset: u32) -> RusqliteResult<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments c LEFT JOIN users u ON u.id = c.author_id
         WHERE (?1 IS NULL OR c.status = ?1)
         ORDER BY c.created_at DESC, c.id DESC LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt.query_map(params![status, limit, offset], comment_from_row)?;
    rows.collect()
}

pub fn count_comments(conn: &Connection, post_id: &str) -> RusqliteResult<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id = ?1 AND status = 'approved'",
        [post_id],
        |row| row.get(0),
    )
}

pub fn count_all_comments(conn: &Connection) -> RusqliteResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))
}

pub fn update_comment_status(conn: &Connection, comment_id: i64, status: CommentStatus) -> RusqliteResult<usize> {
    conn.execute("UPDATE comments SET status = ?1 WHERE id = ?2", params![status, comment_id])
}

pub fn delete_comment(conn: &Connection, comment_id: i64) -> RusqliteResult<usize> {
    conn.execute("DELETE FROM comments WHERE id = ?1", [comment_id])
}

// ====================================================================
// ========================== SUBSCRIBERS =============================
// ====================================================================

fn subscriber_from_row(row: &Row) -> RusqliteResult<Subscriber> {
    Ok(Subscriber {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        status: row.get(3)?,
        subscribed_at: row.get(4)?,
    })
}

/// Subscribing again re-activates an unsubscribed address.
pub fn subscribe(conn: &Connection, email: &str, name: Option<&str>, now: DateTime<Utc>) -> RusqliteResult<()> {
    conn.execute(
        "INSERT INTO subscribers (email, name, status, subscribed_at) VALUES (?1, ?2, 'active', ?3)
         ON CONFLICT(email) DO UPDATE SET status = 'active', name = COALESCE(excluded.name, subscribers.name)",
        params![email.trim().to_lowercase(), name, now],
    )?;
    Ok(())
}

pub fn unsubscribe(conn: &Connection, email: &str) -> RusqliteResult<usize> {
    conn.execute(
        "UPDATE subscribers SET status = ?1 WHERE email = ?2",
        params![SubscriberStatus::Unsubscribed, email.trim().to_lowercase()],
    )
}

pub fn read_subscribers(conn: &Connection, status: Option<SubscriberStatus>) -> RusqliteResult<Vec<Subscriber>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, name, status, subscribed_at FROM subscribers
         WHERE (?1 IS NULL OR status = ?1) ORDER BY subscribed_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![status], subscriber_from_row)?;
    rows.collect()
}

pub fn count_active_subscribers(conn: &Connection) -> RusqliteResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM subscribers WHERE status = 'active'", [], |row| row.get(0))
}

pub fn delete_subscriber(conn: &Connection, subscriber_id: i64) -> RusqliteResult<usize> {
    conn.execute("DELETE FROM subscribers WHERE id = ?1", [subscriber_id])
}

// ====================================================================
// ====================== CATEGORIES AND TAGS =========================
// ====================================================================

pub fn create_category(conn: &Connection, name: &str, description: &str) -> RusqliteResult<i64> {
    conn.execute(
        "INSERT INTO categories (name, slug, description, post_count) VALUES (?1, ?2, ?3, 0)",
        params![name.trim(), slugify(name), description],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_categories(conn: &Connection) -> RusqliteResult<Vec<Category>> {
    let mut stmt = conn.prepare("SELECT id, name, slug, description, post_count FROM categories ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            description: row.get(3)?,
            post_count: row.get(4)?,
        })
    })?;
    rows.collect()
}

/// Posts keep their category text; nothing cascades.
pub fn delete_category(conn: &Connection, category_id: i64) -> RusqliteResult<usize> {
    conn.execute("DELETE FROM categories WHERE id = ?1", [category_id])
}

pub fn create_tag(conn: &Connection, name: &str) -> RusqliteResult<i64> {
    conn.execute(
        "INSERT INTO tags (name, slug, post_count) VALUES (?1, ?2, 0)",
        params![name.trim(), slugify(name)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_tags(conn: &Connection) -> RusqliteResult<Vec<Tag>> {
    let mut stmt = conn.prepare("SELECT id, name, slug, post_count FROM tags ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            post_count: row.get(3)?,
        })
    })?;
    rows.collect()
}

pub fn delete_tag(conn: &Connection, tag_id: i64) -> RusqliteResult<usize> {
    conn.execute("DELETE FROM tags WHERE id = ?1", [tag_id])
}

/// Bumps the counters of the category and tags a newly published post uses.
/// Names without a matching record are ignored.
pub fn increment_taxonomy_counts(conn: &Connection, category: &str, tags: &[String]) -> RusqliteResult<()> {
    if !category.trim().is_empty() {
        conn.execute(
            "UPDATE categories SET post_count = post_count + 1 WHERE slug = ?1",
            [slugify(category)],
        )?;
    }
    for tag in tags {
        conn.execute("UPDATE tags SET post_count = post_count + 1 WHERE slug = ?1", [slugify(tag)])?;
    }
    Ok(())
}

// ====================================================================
// ======================= REPORTED CONTENT ===========================
// ====================================================================

fn report_from_row(row: &Row) -> RusqliteResult<ReportedContent> {
    Ok(ReportedContent {
        id: row.get(0)?,
        content_type: row.get(1)?,
        content_id: row.get(2)?,
        reason: row.get(3)?,
        reporter_id: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn create_report(
    conn: &Connection,
    content_type: ReportTarget,
    content_id: &str,
    reason: &str,
    reporter_id: i64,
    now: DateTime<Utc>,
) -> RusqliteResult<i64> {
    conn.execute(
        "INSERT INTO reported_content (content_type, content_id, reason, reporter_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
        params![content_type, content_id, reason, reporter_id, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_reports(conn: &Connection, status: Option<ReportStatus>) -> RusqliteResult<Vec<ReportedContent>> {
    let mut stmt = conn.prepare(
        "SELECT id, content_type, content_id, reason, reporter_id, status, created_at FROM reported_content
         WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![status], report_from_row)?;
    rows.collect()
}

pub fn update_report_status(conn: &Connection, report_id: i64, status: ReportStatus) -> RusqliteResult<usize> {
    conn.execute("UPDATE reported_content SET status = ?1 WHERE id = ?2", params![status, report_id])
}
