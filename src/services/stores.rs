use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use redb::Database;

use crate::models::db_operations::{drafts_db_operations, posts_db_operations, DbError};
use crate::models::{Draft, PublishedPost};
use crate::services::post_management::{DraftStore, PublishedPostStore};

/// Drafts kept in the redb `drafts` table.
pub struct RedbDraftStore {
    db: Arc<Database>,
}

impl RedbDraftStore {
    pub fn new(db: Arc<Database>) -> Self {
        RedbDraftStore { db }
    }
}

impl DraftStore for RedbDraftStore {
    fn read_drafts(&self, owner: i64) -> Result<Vec<Draft>, DbError> {
        drafts_db_operations::read_drafts(&self.db, owner)
    }

    fn write_drafts(&self, owner: i64, drafts: &[Draft]) -> Result<(), DbError> {
        drafts_db_operations::write_drafts(&self.db, owner, drafts)
    }
}

/// Published posts kept in the redb posts tables and their indices.
pub struct RedbPostStore {
    db: Arc<Database>,
}

impl RedbPostStore {
    pub fn new(db: Arc<Database>) -> Self {
        RedbPostStore { db }
    }
}

impl PublishedPostStore for RedbPostStore {
    fn insert_published(&self, post: &PublishedPost) -> Result<(), DbError> {
        posts_db_operations::insert_post(&self.db, post)
    }

    fn remove_published(&self, id: &str) -> Result<(), DbError> {
        posts_db_operations::delete_post(&self.db, id).map(|_| ())
    }
}

#[derive(Default)]
pub struct MemoryDraftStore {
    drafts: Mutex<HashMap<i64, Vec<Draft>>>,
}

impl DraftStore for MemoryDraftStore {
    fn read_drafts(&self, owner: i64) -> Result<Vec<Draft>, DbError> {
        let drafts = self.drafts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(drafts.get(&owner).cloned().unwrap_or_default())
    }

    fn write_drafts(&self, owner: i64, new_drafts: &[Draft]) -> Result<(), DbError> {
        let mut drafts = self.drafts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if new_drafts.is_empty() {
            drafts.remove(&owner);
        } else {
            drafts.insert(owner, new_drafts.to_vec());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPostStore {
    posts: Mutex<Vec<PublishedPost>>,
}

impl MemoryPostStore {
    pub fn published(&self) -> Vec<PublishedPost> {
        self.posts.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl PublishedPostStore for MemoryPostStore {
    fn insert_published(&self, post: &PublishedPost) -> Result<(), DbError> {
        self.posts.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(post.clone());
        Ok(())
    }

    fn remove_published(&self, id: &str) -> Result<(), DbError> {
        self.posts.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).retain(|p| p.id != id);
        Ok(())
    }
}
