//! Demo fixtures for a fresh install: a handful of accounts, taxonomy,
//! published posts and the reactions, comments and follows between them.
//! Every demo account logs in with [`DEMO_PASSWORD`].

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use redb::Database;
use rusqlite::Connection;
use uuid::Uuid;

use crate::helper::sanitization_helpers;
use crate::models::db_operations::{admin_db_operations, posts_db_operations, users_db_operations, DbError};
use crate::models::db_operations::users_db_operations::NewUser;
use crate::models::{
    CommentStatus, NotificationKind, PostAuthor, PostMetadata, PublishedPost, ReactionKind, Role, Visibility,
};
use crate::services::post_management::{read_time, word_count};

pub const DEMO_PASSWORD: &str = "Test1234!";

const DEMO_USERS: &[(&str, &str, &str, Role)] = &[
    ("admin@livlog.dev", "Livlog Admin", "admin", Role::Admin),
    ("mod@livlog.dev", "Mina Park", "mina", Role::Moderator),
    ("jisoo@livlog.dev", "Jisoo Kim", "jisoo", Role::User),
    ("alex@livlog.dev", "Alex Morgan", "alex", Role::User),
];

const CATEGORIES: &[(&str, &str)] = &[
    ("Technology", "Programming, tools and the web"),
    ("Lifestyle", "Everyday life and habits"),
    ("Travel", "Places and journeys"),
    ("Food", "Recipes and restaurants"),
];

const TAGS: &[&str] = &["rust", "web", "design", "productivity", "seoul", "cooking"];

const POSTS: &[(&str, &str, &str, &[&str])] = &[
    (
        "Getting started with Rust on the web",
        "Technology",
        "Rust has grown a solid web story.\n\n```rust\nfn main() { println!(\"hello\"); }\n```\n\nActix, serde and a database driver are all you need to begin.",
        &["rust", "web"],
    ),
    (
        "Designing a calm writing space",
        "Lifestyle",
        "A good editor gets out of the way. Auto-save, a quiet palette and a word count are enough.",
        &["design", "productivity"],
    ),
    (
        "Three days in Seoul",
        "Travel",
        "Markets in the morning, palaces in the afternoon and long walks along the Han river at night.",
        &["seoul"],
    ),
    (
        "Weeknight kimchi fried rice",
        "Food",
        "Day-old rice, ripe kimchi, butter and a fried egg on top. Dinner in fifteen minutes.",
        &["cooking"],
    ),
    (
        "What I learned shipping a side project",
        "Technology",
        "Scope down, ship early and write things down. Most problems are communication problems.",
        &["productivity", "web"],
    ),
];

const COMMENTS: &[&str] = &[
    "Great read, thanks for sharing!",
    "This is exactly what I needed today.",
    "Bookmarked for later.",
    "Could you write a follow-up on this?",
];

#[derive(Debug, Default, PartialEq)]
pub struct SeedReport {
    pub users: usize,
    pub categories: usize,
    pub tags: usize,
    pub posts: usize,
    pub comments: usize,
}

/// Inserts whatever fixtures are missing. Running it twice adds nothing new.
pub fn seed_demo_data(
    conn: &Connection,
    posts_db: &Database,
    hash_cost: u32,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<SeedReport, DbError> {
    let mut report = SeedReport::default();

    for (email, name, username, role) in DEMO_USERS {
        if users_db_operations::email_or_username_taken(conn, email, username)? {
            continue;
        }
        let new_user = NewUser { email, name, username, password: DEMO_PASSWORD, role: *role };
        users_db_operations::create_user(conn, &new_user, hash_cost, now)?;
        report.users += 1;
    }

    let existing_categories = admin_db_operations::read_categories(conn)?;
    for (name, description) in CATEGORIES {
        if existing_categories.iter().any(|c| c.name == *name) {
            continue;
        }
        admin_db_operations::create_category(conn, name, description)?;
        report.categories += 1;
    }

    let existing_tags = admin_db_operations::read_tags(conn)?;
    for name in TAGS {
        if existing_tags.iter().any(|t| t.name == *name) {
            continue;
        }
        admin_db_operations::create_tag(conn, name)?;
        report.tags += 1;
    }

    if !posts_db_operations::read_all_post_summaries(posts_db)?.is_empty() {
        log::info!("Posts already present; skipping demo posts.");
        return Ok(report);
    }

    let users = users_db_operations::read_all_users(conn)?;
    if users.is_empty() {
        return Ok(report);
    }

    for (title, category, content, tags) in POSTS {
        let Some(author) = users.choose(rng) else { break };
        let published_at = now - Duration::days(rng.gen_range(0..21)) - Duration::minutes(rng.gen_range(0..600));
        let post = demo_post(author.as_author(), title, category, content, tags, published_at);
        posts_db_operations::insert_post(posts_db, &post)?;
        admin_db_operations::increment_taxonomy_counts(conn, category, &post.metadata.tags)?;
        report.posts += 1;

        for reader in users.iter().filter(|u| u.id != author.id) {
            if rng.gen_bool(0.6) {
                users_db_operations::toggle_reaction(conn, &post.id, reader.id, ReactionKind::Like)?;
            }
            if rng.gen_bool(0.25) {
                users_db_operations::toggle_reaction(conn, &post.id, reader.id, ReactionKind::Bookmark)?;
            }
            if rng.gen_bool(0.3) {
                let text = COMMENTS.choose(rng).copied().unwrap_or("Nice post!");
                admin_db_operations::create_comment(conn, &post.id, reader.id, text, CommentStatus::Approved, published_at)?;
                admin_db_operations::create_notification(
                    conn,
                    author.id,
                    NotificationKind::Comment,
                    &format!("{} commented on \"{}\"", reader.username, title),
                    Some(&format!("/posts/{}", post.id)),
                    published_at,
                )?;
                report.comments += 1;
            }
        }
    }

    for follower in &users {
        for followee in users.iter().filter(|u| u.id != follower.id) {
            if rng.gen_bool(0.5) {
                users_db_operations::follow(conn, follower.id, followee.id)?;
            }
        }
    }

    for user in &users {
        admin_db_operations::create_notification(
            conn,
            user.id,
            NotificationKind::System,
            "Welcome to Livlog!",
            None,
            now,
        )?;
    }

    Ok(report)
}

fn demo_post(
    author: PostAuthor,
    title: &str,
    category: &str,
    content: &str,
    tags: &[&str],
    published_at: DateTime<Utc>,
) -> PublishedPost {
    let words = word_count(content);
    PublishedPost {
        id: Uuid::new_v4().to_string(),
        content: sanitization_helpers::sanitize_markdown_content(content),
        metadata: PostMetadata {
            title: title.to_string(),
            excerpt: sanitization_helpers::excerpt_from_content(content),
            author,
            cover_image: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            category: category.to_string(),
            visibility: Visibility::Public,
            featured: title.starts_with("Getting started"),
            created_at: published_at,
            published_at,
            word_count: words,
            read_time: read_time(words),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    #[test]
    fn seeding_twice_only_inserts_once() {
        let dir = TempDir::new().unwrap();
        let posts_db = Database::create(dir.path().join("posts.db")).unwrap();
        db_setup::setup_posts_db(&posts_db).unwrap();
        let mut conn = Connection::open_in_memory().unwrap();
        db_setup::setup_app_db(&mut conn).unwrap();
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(7);

        let first = seed_demo_data(&conn, &posts_db, 4, now, &mut rng).unwrap();
        assert_eq!(first.users, DEMO_USERS.len());
        assert_eq!(first.posts, POSTS.len());

        let second = seed_demo_data(&conn, &posts_db, 4, now, &mut rng).unwrap();
        assert_eq!(second, SeedReport::default());

        assert!(users_db_operations::verify_credentials(&conn, "jisoo@livlog.dev", DEMO_PASSWORD).unwrap().is_some());
        let tech = admin_db_operations::read_categories(&conn).unwrap()
            .into_iter()
            .find(|c| c.name == "Technology")
            .unwrap();
        assert_eq!(tech.post_count, 2);
    }
}
