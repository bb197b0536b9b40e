use chrono::{DateTime, Utc};
use redb::{Database, ReadOnlyTable, ReadableTable, StorageError, TableDefinition};
use uuid::Uuid;
use crate::models::db_operations::DbError;
use crate::models::{PostMetadata, PostSummary, PublishedPost};

type IndexKey = (&'static str, i64, &'static [u8; 16]);
type MetadataTable<'txn> = ReadOnlyTable<'txn, &'static [u8; 16], &'static str>;

// --- Tables for PUBLISHED posts ---
pub const POSTS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("posts");
pub const METADATA: TableDefinition<&[u8; 16], &str> = TableDefinition::new("metadata");
// Keys carry the negated publish timestamp so iteration yields newest first.
pub const CHRONOLOGICAL_INDEX: TableDefinition<(i64, &[u8; 16]), ()> = TableDefinition::new("chronological_index");
pub const TAG_INDEX: TableDefinition<IndexKey, ()> = TableDefinition::new("tag_index");
pub const CATEGORY_INDEX: TableDefinition<IndexKey, ()> = TableDefinition::new("category_index");

fn index_key(value: &str) -> String {
    value.trim().to_lowercase()
}

fn sort_key(metadata: &PostMetadata) -> i64 {
    -metadata.published_at.timestamp()
}

fn summary_from(id_bytes: &[u8; 16], metadata_json: &str) -> Option<PostSummary> {
    let post_uuid = Uuid::from_bytes(*id_bytes);
    match serde_json::from_str::<PostMetadata>(metadata_json) {
        Ok(metadata) => Some(PostSummary { id: post_uuid.to_string(), metadata }),
        Err(e) => {
            log::error!("Skipping post {}: metadata is not valid JSON: {}", post_uuid, e);
            None
        }
    }
}

/// Index row, or `None` after logging when redb cannot read it.
fn readable_entry<T>(item: Result<T, StorageError>, index: &str) -> Option<T> {
    match item {
        Ok(entry) => Some(entry),
        Err(e) => {
            log::error!("Skipping unreadable {} entry: {}", index, e);
            None
        }
    }
}

/// Metadata of the post an index entry points at. Missing or unreadable rows
/// are logged and skipped.
fn indexed_summary(metadata_table: &MetadataTable<'_>, id_bytes: &[u8; 16]) -> Option<PostSummary> {
    match metadata_table.get(id_bytes) {
        Ok(Some(metadata_json)) => summary_from(id_bytes, metadata_json.value()),
        Ok(None) => {
            log::error!("Skipping post {}: indexed but has no metadata row.", Uuid::from_bytes(*id_bytes));
            None
        }
        Err(e) => {
            log::error!("Skipping post {}: failed to read metadata: {}", Uuid::from_bytes(*id_bytes), e);
            None
        }
    }
}

pub fn insert_post(db: &Database, post: &PublishedPost) -> Result<(), DbError> {
    let post_id_bytes = Uuid::parse_str(&post.id)?.into_bytes();
    let metadata_json = serde_json::to_string(&post.metadata)?;
    let timestamp = sort_key(&post.metadata);

    let write_txn = db.begin_write()?;
    {
        let mut posts_table = write_txn.open_table(POSTS)?;
        let mut metadata_table = write_txn.open_table(METADATA)?;
        let mut chrono_index = write_txn.open_table(CHRONOLOGICAL_INDEX)?;
        let mut tag_index = write_txn.open_table(TAG_INDEX)?;
        let mut category_index = write_txn.open_table(CATEGORY_INDEX)?;

        posts_table.insert(&post_id_bytes, post.content.as_str())?;
        metadata_table.insert(&post_id_bytes, metadata_json.as_str())?;
        chrono_index.insert((timestamp, &post_id_bytes), ())?;

        for tag in &post.metadata.tags {
            let tag = index_key(tag);
            if !tag.is_empty() {
                tag_index.insert((tag.as_str(), timestamp, &post_id_bytes), ())?;
            }
        }
        let category = index_key(&post.metadata.category);
        if !category.is_empty() {
            category_index.insert((category.as_str(), timestamp, &post_id_bytes), ())?;
        }
    }
    write_txn.commit()?;
    Ok(())
}

pub fn read_post(db: &Database, id: &str) -> Result<Option<PublishedPost>, DbError> {
    let post_uuid = match Uuid::parse_str(id) {
        Ok(uuid) => uuid,
        Err(_) => return Ok(None),
    };
    let post_id_bytes = post_uuid.into_bytes();

    let read_txn = db.begin_read()?;
    let posts_table = read_txn.open_table(POSTS)?;
    let metadata_table = read_txn.open_table(METADATA)?;

    let content = match posts_table.get(&post_id_bytes)? {
        Some(guard) => guard.value().to_string(),
        None => return Ok(None),
    };
    let metadata: PostMetadata = match metadata_table.get(&post_id_bytes)? {
        Some(guard) => serde_json::from_str(guard.value())?,
        None => return Ok(None),
    };

    Ok(Some(PublishedPost { id: post_uuid.to_string(), metadata, content }))
}

/// Removes a post and every index entry pointing at it. Returns whether the
/// post existed.
pub fn delete_post(db: &Database, id: &str) -> Result<bool, DbError> {
    let post_uuid = match Uuid::parse_str(id) {
        Ok(uuid) => uuid,
        Err(_) => return Ok(false),
    };
    let post_id_bytes = post_uuid.into_bytes();

    let write_txn = db.begin_write()?;
    let existed = {
        let mut posts_table = write_txn.open_table(POSTS)?;
        let mut metadata_table = write_txn.open_table(METADATA)?;
        let mut chrono_index = write_txn.open_table(CHRONOLOGICAL_INDEX)?;
        let mut tag_index = write_txn.open_table(TAG_INDEX)?;
        let mut category_index = write_txn.open_table(CATEGORY_INDEX)?;

        let meta_to_delete: Option<PostMetadata> = metadata_table.get(&post_id_bytes)?
            .and_then(|guard| serde_json::from_str(guard.value()).ok());

        if let Some(meta) = &meta_to_delete {
            let timestamp = sort_key(meta);
            chrono_index.remove((timestamp, &post_id_bytes))?;
            for tag in &meta.tags {
                let tag = index_key(tag);
                tag_index.remove((tag.as_str(), timestamp, &post_id_bytes))?;
            }
            let category = index_key(&meta.category);
            category_index.remove((category.as_str(), timestamp, &post_id_bytes))?;
        }

        let content_removed = posts_table.remove(&post_id_bytes)?.is_some();
        metadata_table.remove(&post_id_bytes)?;
        content_removed || meta_to_delete.is_some()
    };
    write_txn.commit()?;
    Ok(existed)
}

/// Flips the `featured` flag in place. Returns `false` when the post is unknown.
pub fn set_featured(db: &Database, id: &str, featured: bool) -> Result<bool, DbError> {
    let post_uuid = match Uuid::parse_str(id) {
        Ok(uuid) => uuid,
        Err(_) => return Ok(false),
    };
    let post_id_bytes = post_uuid.into_bytes();

    let write_txn = db.begin_write()?;
    let found = {
        let mut metadata_table = write_txn.open_table(METADATA)?;
        let current: Option<PostMetadata> = match metadata_table.get(&post_id_bytes)? {
            Some(guard) => Some(serde_json::from_str(guard.value())?),
            None => None,
        };
        match current {
            Some(mut metadata) => {
                metadata.featured = featured;
                let metadata_json = serde_json::to_string(&metadata)?;
                metadata_table.insert(&post_id_bytes, metadata_json.as_str())?;
                true
            }
            None => false,
        }
    };
    write_txn.commit()?;
    Ok(found)
}

// --- Functions to READ published posts ---

pub fn read_latest_post_summaries(
    db: &Database,
    now: DateTime<Utc>,
    limit: u32,
    offset: u32,
) -> Result<Vec<PostSummary>, DbError> {
    let read_txn = db.begin_read()?;
    let chrono_index = read_txn.open_table(CHRONOLOGICAL_INDEX)?;
    let metadata_table = read_txn.open_table(METADATA)?;

    let posts = chrono_index
        .iter()?
        .filter_map(|item| readable_entry(item, "chronological index"))
        .filter_map(|(key, _value)| indexed_summary(&metadata_table, key.value().1))
        .filter(|summary| summary.metadata.is_listed(now))
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    Ok(posts)
}

pub fn read_featured_post_summaries(
    db: &Database,
    now: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<PostSummary>, DbError> {
    let read_txn = db.begin_read()?;
    let chrono_index = read_txn.open_table(CHRONOLOGICAL_INDEX)?;
    let metadata_table = read_txn.open_table(METADATA)?;

    let posts = chrono_index
        .iter()?
        .filter_map(|item| readable_entry(item, "chronological index"))
        .filter_map(|(key, _value)| indexed_summary(&metadata_table, key.value().1))
        .filter(|summary| summary.metadata.featured && summary.metadata.is_listed(now))
        .take(limit as usize)
        .collect();
    Ok(posts)
}

fn read_post_summaries_by_index(
    db: &Database,
    index: TableDefinition<IndexKey, ()>,
    value: &str,
    now: DateTime<Utc>,
    limit: u32,
    offset: u32,
) -> Result<Vec<PostSummary>, DbError> {
    let read_txn = db.begin_read()?;
    let index_table = read_txn.open_table(index)?;
    let metadata_table = read_txn.open_table(METADATA)?;

    let lower_value = index_key(value);
    let start_key = (lower_value.as_str(), i64::MIN, &[0u8; 16]);
    let end_key = (lower_value.as_str(), i64::MAX, &[255u8; 16]);

    let posts = index_table
        .range(start_key..=end_key)?
        .filter_map(|item| readable_entry(item, "taxonomy index"))
        .filter_map(|(key, _value)| indexed_summary(&metadata_table, key.value().2))
        .filter(|summary| summary.metadata.is_listed(now))
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    Ok(posts)
}

pub fn read_post_summaries_by_tag(
    db: &Database,
    tag: &str,
    now: DateTime<Utc>,
    limit: u32,
    offset: u32,
) -> Result<Vec<PostSummary>, DbError> {
    read_post_summaries_by_index(db, TAG_INDEX, tag, now, limit, offset)
}

pub fn read_post_summaries_by_category(
    db: &Database,
    category: &str,
    now: DateTime<Utc>,
    limit: u32,
    offset: u32,
) -> Result<Vec<PostSummary>, DbError> {
    read_post_summaries_by_index(db, CATEGORY_INDEX, category, now, limit, offset)
}

/// Every post regardless of visibility or schedule, newest first. Used by the
/// author's own listing and by analytics.
pub fn read_all_post_summaries(db: &Database) -> Result<Vec<PostSummary>, DbError> {
    let read_txn = db.begin_read()?;
    let chrono_index = read_txn.open_table(CHRONOLOGICAL_INDEX)?;
    let metadata_table = read_txn.open_table(METADATA)?;

    let posts = chrono_index
        .iter()?
        .filter_map(|item| readable_entry(item, "chronological index"))
        .filter_map(|(key, _value)| indexed_summary(&metadata_table, key.value().1))
        .collect();
    Ok(posts)
}

pub fn read_post_summaries_by_author(
    db: &Database,
    author_id: i64,
    limit: u32,
    offset: u32,
) -> Result<Vec<PostSummary>, DbError> {
    Ok(read_all_post_summaries(db)?
        .into_iter()
        .filter(|summary| summary.metadata.author.id == author_id)
        .skip(offset as usize)
        .take(limit as usize)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PostAuthor, Visibility};
    use crate::setup::db_setup;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn open_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::create(dir.path().join("posts.db")).unwrap();
        db_setup::setup_posts_db(&db).unwrap();
        (dir, db)
    }

    fn post(title: &str, category: &str, tags: &[&str], published_at: DateTime<Utc>) -> PublishedPost {
        PublishedPost {
            id: Uuid::new_v4().to_string(),
            content: format!("{title} body"),
            metadata: PostMetadata {
                title: title.to_string(),
                excerpt: String::new(),
                author: PostAuthor { id: 1, name: "Ana".into(), username: "ana".into(), avatar: None },
                cover_image: None,
                tags: tags.iter().map(|t| t.to_string()).collect(),
                category: category.to_string(),
                visibility: Visibility::Public,
                featured: false,
                created_at: published_at,
                published_at,
                word_count: 2,
                read_time: 1,
            },
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn latest_lists_newest_first_and_paginates() {
        let (_dir, db) = open_db();
        let t = base_time();
        for (i, title) in ["old", "mid", "new"].iter().enumerate() {
            insert_post(&db, &post(title, "Tech", &[], t + Duration::hours(i as i64))).unwrap();
        }
        let now = t + Duration::days(1);

        let titles: Vec<String> = read_latest_post_summaries(&db, now, 10, 0).unwrap()
            .into_iter().map(|s| s.metadata.title).collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);

        let page = read_latest_post_summaries(&db, now, 1, 1).unwrap();
        assert_eq!(page[0].metadata.title, "mid");
    }

    #[test]
    fn scheduled_and_private_posts_are_not_listed() {
        let (_dir, db) = open_db();
        let t = base_time();
        insert_post(&db, &post("future", "Tech", &[], t + Duration::days(3))).unwrap();
        let mut private = post("private", "Tech", &[], t);
        private.metadata.visibility = Visibility::Private;
        insert_post(&db, &private).unwrap();

        assert!(read_latest_post_summaries(&db, t + Duration::hours(1), 10, 0).unwrap().is_empty());
        assert_eq!(read_all_post_summaries(&db).unwrap().len(), 2);
    }

    #[test]
    fn tag_and_category_lookups_are_case_insensitive() {
        let (_dir, db) = open_db();
        let t = base_time();
        insert_post(&db, &post("a", "Travel", &["Rust", "Web"], t)).unwrap();
        insert_post(&db, &post("b", "Food", &["rust"], t + Duration::minutes(5))).unwrap();
        let now = t + Duration::hours(1);

        assert_eq!(read_post_summaries_by_tag(&db, "RUST", now, 10, 0).unwrap().len(), 2);
        assert_eq!(read_post_summaries_by_tag(&db, "web", now, 10, 0).unwrap().len(), 1);
        let travel = read_post_summaries_by_category(&db, "travel", now, 10, 0).unwrap();
        assert_eq!(travel.len(), 1);
        assert_eq!(travel[0].metadata.title, "a");
    }

    #[test]
    fn delete_removes_post_and_index_entries() {
        let (_dir, db) = open_db();
        let t = base_time();
        let doomed = post("doomed", "Tech", &["x"], t);
        insert_post(&db, &doomed).unwrap();

        assert!(delete_post(&db, &doomed.id).unwrap());
        assert!(read_post(&db, &doomed.id).unwrap().is_none());
        assert!(read_post_summaries_by_tag(&db, "x", t, 10, 0).unwrap().is_empty());
        assert!(!delete_post(&db, &doomed.id).unwrap());
        assert!(!delete_post(&db, "not-a-uuid").unwrap());
    }

    #[test]
    fn featured_flag_round_trips() {
        let (_dir, db) = open_db();
        let t = base_time();
        let p = post("star", "Tech", &[], t);
        insert_post(&db, &p).unwrap();

        assert!(set_featured(&db, &p.id, true).unwrap());
        let featured = read_featured_post_summaries(&db, t, 5).unwrap();
        assert_eq!(featured.len(), 1);
        assert!(read_post(&db, &p.id).unwrap().unwrap().metadata.featured);
        assert!(!set_featured(&db, &Uuid::new_v4().to_string(), true).unwrap());
    }

    #[test]
    fn corrupted_metadata_is_skipped_not_fatal() {
        let (_dir, db) = open_db();
        let t = base_time();
        let good = post("good", "Tech", &["x"], t);
        let broken = post("broken", "Tech", &["x"], t + Duration::minutes(1));
        insert_post(&db, &good).unwrap();
        insert_post(&db, &broken).unwrap();

        let broken_id = Uuid::parse_str(&broken.id).unwrap().into_bytes();
        let write_txn = db.begin_write().unwrap();
        write_txn.open_table(METADATA).unwrap().insert(&broken_id, "{not json").unwrap();
        write_txn.commit().unwrap();

        let now = t + Duration::hours(1);
        let titles: Vec<String> = read_latest_post_summaries(&db, now, 10, 0).unwrap()
            .into_iter().map(|s| s.metadata.title).collect();
        assert_eq!(titles, vec!["good"]);
        assert_eq!(read_post_summaries_by_tag(&db, "x", now, 10, 0).unwrap().len(), 1);
        assert_eq!(read_all_post_summaries(&db).unwrap().len(), 1);
    }
}
