use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a unit-only enum that is stored as lowercase text in SQLite and
/// serialized the same way over the API.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant(format!("{}: '{}'", stringify!($name), other))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse()
                    .map_err(|e: UnknownVariant| rusqlite::types::FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

#[derive(Debug, thiserror::Error)]
#[error("unknown value for {0}")]
pub struct UnknownVariant(pub String);

text_enum!(
    /// Ordered from least to most privileged so guards can compare roles.
    Role { User => "user", Moderator => "moderator", Admin => "admin" }
);

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn rank(role: &Role) -> u8 {
            match role {
                Role::User => 0,
                Role::Moderator => 1,
                Role::Admin => 2,
            }
        }
        rank(self).cmp(&rank(other))
    }
}

text_enum!(Visibility { Public => "public", Private => "private", FollowersOnly => "followers-only" });
text_enum!(NotificationKind { Like => "like", Comment => "comment", Follow => "follow", Mention => "mention", System => "system" });
text_enum!(CommentStatus { Approved => "approved", Pending => "pending", Spam => "spam" });
text_enum!(SubscriberStatus { Active => "active", Unsubscribed => "unsubscribed" });
text_enum!(ReportTarget { Post => "post", Comment => "comment", User => "user" });
text_enum!(ReportStatus { Pending => "pending", Resolved => "resolved", Dismissed => "dismissed" });
text_enum!(ReactionKind { Like => "like", Bookmark => "bookmark" });

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Public
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub username: String,
    pub avatar: Option<String>,
    pub bio: String,
    pub followers: i64,
    pub following: i64,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn as_author(&self) -> PostAuthor {
        PostAuthor {
            id: self.id,
            name: self.name.clone(),
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Denormalized author summary embedded into every published post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthor {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub avatar: Option<String>,
}

// ====================================================================
// ============================ DRAFTS ================================
// ====================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub cover_image: Option<String>,
    pub tags: Vec<String>,
    pub category: String,
    pub visibility: Visibility,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub word_count: usize,
    pub read_time: usize,
}

impl Draft {
    pub fn empty(id: String, now: DateTime<Utc>) -> Self {
        Draft {
            id,
            title: String::new(),
            content: String::new(),
            excerpt: String::new(),
            cover_image: None,
            tags: Vec::new(),
            category: String::new(),
            visibility: Visibility::Public,
            scheduled_at: None,
            created_at: now,
            updated_at: now,
            word_count: 0,
            read_time: 0,
        }
    }
}

/// A partial draft: the fields an editor sends on save. `None` leaves the
/// target field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DraftInput {
    pub id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
    pub visibility: Option<Visibility>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl DraftInput {
    /// Overwrites `draft` with every field present in `self`. An empty cover
    /// image clears it.
    pub fn apply_to(&self, draft: &mut Draft) {
        if let Some(title) = &self.title {
            draft.title = title.clone();
        }
        if let Some(content) = &self.content {
            draft.content = content.clone();
        }
        if let Some(excerpt) = &self.excerpt {
            draft.excerpt = excerpt.clone();
        }
        if let Some(cover) = &self.cover_image {
            draft.cover_image = Some(cover.trim().to_string()).filter(|s| !s.is_empty());
        }
        if let Some(tags) = &self.tags {
            draft.tags = tags.iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Some(category) = &self.category {
            draft.category = category.clone();
        }
        if let Some(visibility) = self.visibility {
            draft.visibility = visibility;
        }
        if self.scheduled_at.is_some() {
            draft.scheduled_at = self.scheduled_at;
        }
    }

    /// Folds newer editor edits into this buffer.
    pub fn merge(&mut self, newer: &DraftInput) {
        if newer.id.is_some() { self.id = newer.id.clone(); }
        if newer.title.is_some() { self.title = newer.title.clone(); }
        if newer.content.is_some() { self.content = newer.content.clone(); }
        if newer.excerpt.is_some() { self.excerpt = newer.excerpt.clone(); }
        if newer.cover_image.is_some() { self.cover_image = newer.cover_image.clone(); }
        if newer.tags.is_some() { self.tags = newer.tags.clone(); }
        if newer.category.is_some() { self.category = newer.category.clone(); }
        if newer.visibility.is_some() { self.visibility = newer.visibility; }
        if newer.scheduled_at.is_some() { self.scheduled_at = newer.scheduled_at; }
    }

    /// True when the title or the content holds any text at all.
    pub fn has_text(&self) -> bool {
        let non_empty = |field: &Option<String>| field.as_deref().map_or(false, |s| !s.is_empty());
        non_empty(&self.title) || non_empty(&self.content)
    }
}

impl From<&Draft> for DraftInput {
    fn from(draft: &Draft) -> Self {
        DraftInput {
            id: Some(draft.id.clone()),
            title: Some(draft.title.clone()),
            content: Some(draft.content.clone()),
            excerpt: Some(draft.excerpt.clone()),
            cover_image: Some(draft.cover_image.clone().unwrap_or_default()),
            tags: Some(draft.tags.clone()),
            category: Some(draft.category.clone()),
            visibility: Some(draft.visibility),
            scheduled_at: draft.scheduled_at,
        }
    }
}

// ====================================================================
// ======================== PUBLISHED POSTS ===========================
// ====================================================================

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PostMetadata {
    pub title: String,
    pub excerpt: String,
    pub author: PostAuthor,
    pub cover_image: Option<String>,
    pub tags: Vec<String>,
    pub category: String,
    pub visibility: Visibility,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub published_at: DateTime<Utc>,
    pub word_count: usize,
    pub read_time: usize,
}

impl PostMetadata {
    /// Public, and not scheduled past `now`.
    pub fn is_listed(&self, now: DateTime<Utc>) -> bool {
        self.visibility == Visibility::Public && self.published_at <= now
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PublishedPost {
    pub id: String,
    pub metadata: PostMetadata,
    pub content: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PostSummary {
    pub id: String,
    pub metadata: PostMetadata,
}

/// A published post as readers see it, with counters and per-viewer flags.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_html: Option<String>,
    pub author: PostAuthor,
    pub cover_image: Option<String>,
    pub tags: Vec<String>,
    pub category: String,
    pub published_at: DateTime<Utc>,
    pub read_time: usize,
    pub likes: i64,
    pub comments: i64,
    pub bookmarks: i64,
    pub is_liked: bool,
    pub is_bookmarked: bool,
    pub featured: bool,
}

// ====================================================================
// ========================= ADMIN RECORDS ============================
// ====================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: NotificationKind,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub post_id: String,
    pub author_id: i64,
    pub author_name: String,
    pub content: String,
    pub status: CommentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub status: SubscriberStatus,
    pub subscribed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub post_count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub post_count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReportedContent {
    pub id: i64,
    pub content_type: ReportTarget,
    pub content_id: String,
    pub reason: String,
    pub reporter_id: i64,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

/// Lowercases, trims and joins words with hyphens.
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub mod db_operations;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_draft() -> Draft {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Draft::empty("1709283600000".to_string(), now)
    }

    #[test]
    fn apply_to_only_touches_present_fields() {
        let mut draft = sample_draft();
        draft.title = "Keep".into();
        let input = DraftInput { content: Some("body".into()), ..Default::default() };
        input.apply_to(&mut draft);
        assert_eq!(draft.title, "Keep");
        assert_eq!(draft.content, "body");
    }

    #[test]
    fn empty_cover_image_clears_it() {
        let mut draft = sample_draft();
        draft.cover_image = Some("/img/a.png".into());
        DraftInput { cover_image: Some("  ".into()), ..Default::default() }.apply_to(&mut draft);
        assert_eq!(draft.cover_image, None);
    }

    #[test]
    fn has_text_needs_a_non_empty_title_or_content() {
        let input = DraftInput { title: Some(String::new()), excerpt: Some("only excerpt".into()), ..Default::default() };
        assert!(!input.has_text());
        let input = DraftInput { content: Some("x".into()), ..Default::default() };
        assert!(input.has_text());
    }

    #[test]
    fn draft_serializes_camel_case() {
        let json = serde_json::to_value(sample_draft()).unwrap();
        assert!(json.get("wordCount").is_some());
        assert!(json.get("readTime").is_some());
        assert_eq!(json["visibility"], "public");
    }

    #[test]
    fn visibility_parses_followers_only() {
        assert_eq!("followers-only".parse::<Visibility>().unwrap(), Visibility::FollowersOnly);
        assert!("friends".parse::<Visibility>().is_err());
    }

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(Role::Admin > Role::Moderator);
        assert!(Role::Moderator > Role::User);
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Rust & Web Dev "), "rust-web-dev");
    }
}
