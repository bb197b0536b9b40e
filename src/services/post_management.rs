//! Draft lifecycle: saving, loading, deleting and publishing drafts, plus the
//! per-user editor sessions that the auto-save task flushes.
//!
//! A draft is in exactly one of three states from its owner's point of view:
//! absent, open but never saved (text only in the editor session), or open and
//! saved. `save_draft` moves to open-saved, `load_draft` opens a stored draft,
//! `delete_draft` and `publish_post` make it absent again.
//!
//! Every operation that touches one owner's drafts or editor session runs
//! under that owner's lock, so an auto-save tick and a request for the same
//! user never interleave their read-modify-write of the draft collection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::helper::sanitization_helpers;
use crate::models::db_operations::DbError;
use crate::models::{Draft, DraftInput, PostAuthor, PostMetadata, PublishedPost};
use crate::services::clock::Clock;

pub const WORDS_PER_MINUTE: usize = 200;

/// Persistence port for an owner's draft collection. The whole collection is
/// read and written at once.
pub trait DraftStore: Send + Sync {
    fn read_drafts(&self, owner: i64) -> Result<Vec<Draft>, DbError>;
    fn write_drafts(&self, owner: i64, drafts: &[Draft]) -> Result<(), DbError>;
}

/// Where publishing puts the post it creates.
pub trait PublishedPostStore: Send + Sync {
    fn insert_published(&self, post: &PublishedPost) -> Result<(), DbError>;
    fn remove_published(&self, id: &str) -> Result<(), DbError>;
}

#[derive(Error, Debug)]
pub enum DraftError {
    #[error("Draft not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] DbError),
}

/// Number of whitespace-separated tokens.
pub fn word_count(content: &str) -> usize {
    content.split_whitespace().count()
}

/// Minutes to read `words`, rounded up. Zero words read in zero minutes.
pub fn read_time(words: usize) -> usize {
    (words + WORDS_PER_MINUTE - 1) / WORDS_PER_MINUTE
}

fn refresh_metrics(draft: &mut Draft) {
    draft.word_count = word_count(&draft.content);
    draft.read_time = read_time(draft.word_count);
}

/// Millisecond timestamp of `now`, bumped until it is unused in `drafts`.
fn next_draft_id(drafts: &[Draft], now: DateTime<Utc>) -> String {
    let mut millis = now.timestamp_millis();
    while drafts.iter().any(|d| d.id == millis.to_string()) {
        millis += 1;
    }
    millis.to_string()
}

/// What a user's editor currently holds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSession {
    pub current_draft: Option<Draft>,
    /// Unsaved editor fields; auto-save persists these.
    pub fields: DraftInput,
    pub autosave_enabled: bool,
}

impl Default for EditorSession {
    fn default() -> Self {
        EditorSession { current_draft: None, fields: DraftInput::default(), autosave_enabled: true }
    }
}

impl EditorSession {
    fn open(&mut self, draft: &Draft) {
        self.fields = DraftInput::from(draft);
        self.current_draft = Some(draft.clone());
    }

    fn close(&mut self) {
        self.current_draft = None;
        self.fields = DraftInput::default();
    }
}

fn lock_owner(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|poisoned| {
        log::error!("Draft lock was poisoned! Recovering lock.");
        poisoned.into_inner()
    })
}

pub struct PostManager {
    drafts: Arc<dyn DraftStore>,
    published: Arc<dyn PublishedPostStore>,
    clock: Arc<dyn Clock>,
    sessions: RwLock<HashMap<i64, EditorSession>>,
    owner_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl PostManager {
    pub fn new(drafts: Arc<dyn DraftStore>, published: Arc<dyn PublishedPostStore>, clock: Arc<dyn Clock>) -> Self {
        PostManager {
            drafts,
            published,
            clock,
            sessions: RwLock::new(HashMap::new()),
            owner_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The lock serializing everything done to `owner`'s drafts and session.
    /// Take it before the sessions lock, never while holding it.
    fn owner_lock(&self, owner: i64) -> Arc<Mutex<()>> {
        let mut locks = self.owner_locks.lock().unwrap_or_else(|poisoned| {
            log::error!("Mutex for draft locks was poisoned! Recovering lock.");
            poisoned.into_inner()
        });
        locks.entry(owner).or_default().clone()
    }

    fn read_sessions(&self) -> RwLockReadGuard<'_, HashMap<i64, EditorSession>> {
        self.sessions.read().unwrap_or_else(|poisoned| {
            log::error!("RwLock for editor sessions was poisoned! Recovering lock.");
            poisoned.into_inner()
        })
    }

    fn write_sessions(&self) -> RwLockWriteGuard<'_, HashMap<i64, EditorSession>> {
        self.sessions.write().unwrap_or_else(|poisoned| {
            log::error!("RwLock for editor sessions was poisoned! Recovering lock.");
            poisoned.into_inner()
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Merges `partial` onto the open draft, or onto a fresh one when nothing
    /// is open, and stores the result. A present `id` selects that stored
    /// draft instead; an unknown one starts a fresh draft. Returns the saved
    /// draft's id.
    pub fn save_draft(&self, owner: i64, partial: &DraftInput) -> Result<String, DraftError> {
        let lock = self.owner_lock(owner);
        let _guard = lock_owner(&lock);
        self.save_locked(owner, partial)
    }

    fn save_locked(&self, owner: i64, partial: &DraftInput) -> Result<String, DraftError> {
        let now = self.clock.now();
        let mut drafts = self.drafts.read_drafts(owner)?;
        let open_draft = self.read_sessions().get(&owner).and_then(|s| s.current_draft.clone());

        let base = match &partial.id {
            Some(id) => drafts.iter().find(|d| &d.id == id).cloned(),
            None => open_draft,
        };
        let mut draft = match base {
            Some(existing) => existing,
            None => Draft::empty(next_draft_id(&drafts, now), now),
        };

        partial.apply_to(&mut draft);
        refresh_metrics(&mut draft);
        draft.updated_at = now;

        match drafts.iter_mut().find(|d| d.id == draft.id) {
            Some(slot) => *slot = draft.clone(),
            None => drafts.push(draft.clone()),
        }
        self.drafts.write_drafts(owner, &drafts)?;

        self.write_sessions().entry(owner).or_default().open(&draft);
        log::debug!("Draft {} saved for user {} ({} words).", draft.id, owner, draft.word_count);
        Ok(draft.id)
    }

    /// Opens a stored draft. Unknown ids leave the session untouched.
    pub fn load_draft(&self, owner: i64, id: &str) -> Result<Option<Draft>, DraftError> {
        let lock = self.owner_lock(owner);
        let _guard = lock_owner(&lock);
        let drafts = self.drafts.read_drafts(owner)?;
        let Some(draft) = drafts.into_iter().find(|d| d.id == id) else {
            return Ok(None);
        };
        self.write_sessions().entry(owner).or_default().open(&draft);
        Ok(Some(draft))
    }

    /// Returns whether a stored draft was removed.
    pub fn delete_draft(&self, owner: i64, id: &str) -> Result<bool, DraftError> {
        let lock = self.owner_lock(owner);
        let _guard = lock_owner(&lock);
        let mut drafts = self.drafts.read_drafts(owner)?;
        let before = drafts.len();
        drafts.retain(|d| d.id != id);
        let removed = drafts.len() != before;
        if removed {
            self.drafts.write_drafts(owner, &drafts)?;
        }
        self.close_if_current(owner, id);
        Ok(removed)
    }

    /// Turns a draft into a published post and drops it from the draft list.
    /// `scheduled_at` (or the draft's own schedule) becomes the publish time
    /// as given; it is not checked against the clock.
    pub fn publish_post(
        &self,
        author: &PostAuthor,
        draft_id: &str,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<PublishedPost, DraftError> {
        let owner = author.id;
        let lock = self.owner_lock(owner);
        let _guard = lock_owner(&lock);
        let now = self.clock.now();
        let mut drafts = self.drafts.read_drafts(owner)?;
        let position = drafts.iter()
            .position(|d| d.id == draft_id)
            .ok_or_else(|| DraftError::NotFound(draft_id.to_string()))?;
        let draft = drafts.remove(position);

        let post = published_from_draft(&draft, author, scheduled_at.or(draft.scheduled_at), now);
        self.published.insert_published(&post)?;

        if let Err(e) = self.drafts.write_drafts(owner, &drafts) {
            log::error!("Draft write failed while publishing draft {}. Rolling back post {}.", draft_id, post.id);
            self.published.remove_published(&post.id)?;
            return Err(e.into());
        }

        self.close_if_current(owner, draft_id);
        log::info!("User {} published draft {} as post {}.", owner, draft_id, post.id);
        Ok(post)
    }

    pub fn list_drafts(&self, owner: i64) -> Result<Vec<Draft>, DraftError> {
        Ok(self.drafts.read_drafts(owner)?)
    }

    pub fn current_draft(&self, owner: i64) -> Option<Draft> {
        self.read_sessions().get(&owner).and_then(|s| s.current_draft.clone())
    }

    pub fn session(&self, owner: i64) -> EditorSession {
        self.read_sessions().get(&owner).cloned().unwrap_or_default()
    }

    /// Records unsaved editor edits without touching storage.
    pub fn update_editor(&self, owner: i64, edits: &DraftInput) -> EditorSession {
        let lock = self.owner_lock(owner);
        let _guard = lock_owner(&lock);
        let mut sessions = self.write_sessions();
        let session = sessions.entry(owner).or_default();
        session.fields.merge(edits);
        session.clone()
    }

    /// Closes whatever is open and starts from an empty editor.
    pub fn new_draft(&self, owner: i64) -> EditorSession {
        let lock = self.owner_lock(owner);
        let _guard = lock_owner(&lock);
        let mut sessions = self.write_sessions();
        let session = sessions.entry(owner).or_default();
        session.close();
        session.clone()
    }

    pub fn set_autosave(&self, owner: i64, enabled: bool) -> EditorSession {
        let lock = self.owner_lock(owner);
        let _guard = lock_owner(&lock);
        let mut sessions = self.write_sessions();
        let session = sessions.entry(owner).or_default();
        session.autosave_enabled = enabled;
        session.clone()
    }

    /// Drops the editor session entirely, e.g. on logout.
    pub fn end_session(&self, owner: i64) {
        let lock = self.owner_lock(owner);
        let _guard = lock_owner(&lock);
        self.write_sessions().remove(&owner);
    }

    /// Saves every editor with auto-save on and a non-empty title or content.
    /// Returns `(owner, draft id)` for each save that succeeded.
    ///
    /// The editor fields are read again under the owner's lock, so a draft
    /// published or deleted since the tick started is never written back.
    pub fn autosave_tick(&self) -> Vec<(i64, String)> {
        let owners: Vec<i64> = self.read_sessions().keys().copied().collect();

        let mut saved = Vec::new();
        for owner in owners {
            let lock = self.owner_lock(owner);
            let _guard = lock_owner(&lock);
            let fields = match self.read_sessions().get(&owner) {
                Some(session) if session.autosave_enabled && session.fields.has_text() => session.fields.clone(),
                _ => continue,
            };
            match self.save_locked(owner, &fields) {
                Ok(id) => saved.push((owner, id)),
                Err(e) => log::error!("Auto-save failed for user {}: {}", owner, e),
            }
        }
        saved
    }

    fn close_if_current(&self, owner: i64, id: &str) {
        let mut sessions = self.write_sessions();
        if let Some(session) = sessions.get_mut(&owner) {
            let is_current = session.current_draft.as_ref().map_or(false, |d| d.id == id)
                || session.fields.id.as_deref() == Some(id);
            if is_current {
                session.close();
            }
        }
    }
}

fn published_from_draft(
    draft: &Draft,
    author: &PostAuthor,
    scheduled_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> PublishedPost {
    let excerpt = if draft.excerpt.trim().is_empty() {
        sanitization_helpers::excerpt_from_content(&draft.content)
    } else {
        sanitization_helpers::strip_all_html(&draft.excerpt)
    };
    let words = word_count(&draft.content);

    PublishedPost {
        id: Uuid::new_v4().to_string(),
        content: sanitization_helpers::sanitize_markdown_content(&draft.content),
        metadata: PostMetadata {
            title: sanitization_helpers::strip_all_html(&draft.title),
            excerpt,
            author: author.clone(),
            cover_image: draft.cover_image.as_deref().map(sanitization_helpers::strip_all_html),
            tags: draft.tags.clone(),
            category: draft.category.clone(),
            visibility: draft.visibility,
            featured: false,
            created_at: draft.created_at,
            published_at: scheduled_at.unwrap_or(now),
            word_count: words,
            read_time: read_time(words),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::services::stores::{MemoryDraftStore, MemoryPostStore};
    use chrono::{Duration, TimeZone};

    const OWNER: i64 = 1;

    struct Fixture {
        manager: PostManager,
        clock: Arc<ManualClock>,
        drafts: Arc<MemoryDraftStore>,
        posts: Arc<MemoryPostStore>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
        let drafts = Arc::new(MemoryDraftStore::default());
        let posts = Arc::new(MemoryPostStore::default());
        let manager = PostManager::new(drafts.clone(), posts.clone(), clock.clone());
        Fixture { manager, clock, drafts, posts }
    }

    fn author() -> PostAuthor {
        PostAuthor { id: OWNER, name: "Ana".into(), username: "ana".into(), avatar: None }
    }

    fn text(title: &str, content: &str) -> DraftInput {
        DraftInput { title: Some(title.into()), content: Some(content.into()), ..Default::default() }
    }

    #[test]
    fn word_count_counts_whitespace_separated_tokens() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   \n\t "), 0);
        assert_eq!(word_count("one two  three\nfour\tfive"), 5);
    }

    #[test]
    fn read_time_rounds_up_per_two_hundred_words() {
        assert_eq!(read_time(0), 0);
        assert_eq!(read_time(1), 1);
        assert_eq!(read_time(200), 1);
        assert_eq!(read_time(201), 2);
        assert_eq!(read_time(1000), 5);
    }

    #[test]
    fn first_save_creates_a_timestamp_keyed_draft() {
        let f = fixture();
        let id = f.manager.save_draft(OWNER, &text("A", "one two three")).unwrap();

        assert_eq!(id, f.clock.now().timestamp_millis().to_string());
        let stored = f.drafts.read_drafts(OWNER).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].word_count, 3);
        assert_eq!(stored[0].read_time, 1);
        assert_eq!(f.manager.current_draft(OWNER).unwrap().id, id);
    }

    #[test]
    fn saving_again_keeps_identity_and_refreshes_metrics() {
        let f = fixture();
        let id = f.manager.save_draft(OWNER, &text("A", "one")).unwrap();
        let created = f.drafts.read_drafts(OWNER).unwrap()[0].clone();

        f.clock.advance(Duration::seconds(30));
        let again = f.manager.save_draft(OWNER, &DraftInput { content: Some("one two".into()), ..Default::default() }).unwrap();

        assert_eq!(again, id);
        let stored = f.drafts.read_drafts(OWNER).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "A");
        assert_eq!(stored[0].word_count, 2);
        assert_eq!(stored[0].created_at, created.created_at);
        assert!(stored[0].updated_at > created.updated_at);
    }

    #[test]
    fn empty_drafts_are_accepted() {
        let f = fixture();
        let id = f.manager.save_draft(OWNER, &DraftInput::default()).unwrap();
        let draft = f.manager.load_draft(OWNER, &id).unwrap().unwrap();
        assert_eq!(draft.title, "");
        assert_eq!((draft.word_count, draft.read_time), (0, 0));
    }

    #[test]
    fn colliding_timestamps_get_distinct_ids() {
        let f = fixture();
        let first = f.manager.save_draft(OWNER, &text("A", "a")).unwrap();
        f.manager.new_draft(OWNER);
        let second = f.manager.save_draft(OWNER, &text("B", "b")).unwrap();

        assert_ne!(first, second);
        assert_eq!(second.parse::<i64>().unwrap(), first.parse::<i64>().unwrap() + 1);
        assert_eq!(f.manager.list_drafts(OWNER).unwrap().len(), 2);
    }

    #[test]
    fn explicit_id_targets_that_draft() {
        let f = fixture();
        let first = f.manager.save_draft(OWNER, &text("First", "a")).unwrap();
        f.manager.new_draft(OWNER);
        f.clock.advance(Duration::seconds(1));
        f.manager.save_draft(OWNER, &text("Second", "b")).unwrap();

        let input = DraftInput { id: Some(first.clone()), title: Some("First, edited".into()), ..Default::default() };
        assert_eq!(f.manager.save_draft(OWNER, &input).unwrap(), first);
        let titles: Vec<String> = f.manager.list_drafts(OWNER).unwrap().into_iter().map(|d| d.title).collect();
        assert_eq!(titles, vec!["First, edited", "Second"]);
    }

    #[test]
    fn unknown_explicit_id_starts_a_fresh_draft() {
        let f = fixture();
        let open = f.manager.save_draft(OWNER, &text("Open", "a")).unwrap();
        f.clock.advance(Duration::seconds(1));
        let input = DraftInput { id: Some("gone".into()), title: Some("Fresh".into()), ..Default::default() };
        let fresh = f.manager.save_draft(OWNER, &input).unwrap();

        assert_ne!(fresh, open);
        assert_eq!(f.manager.list_drafts(OWNER).unwrap().len(), 2);
    }

    #[test]
    fn loading_an_unknown_id_is_a_no_op() {
        let f = fixture();
        let id = f.manager.save_draft(OWNER, &text("A", "a")).unwrap();
        assert!(f.manager.load_draft(OWNER, "missing").unwrap().is_none());
        assert_eq!(f.manager.current_draft(OWNER).unwrap().id, id);
    }

    #[test]
    fn delete_then_load_leaves_nothing_open() {
        let f = fixture();
        let id = f.manager.save_draft(OWNER, &text("A", "a")).unwrap();

        assert!(f.manager.delete_draft(OWNER, &id).unwrap());
        assert!(f.manager.load_draft(OWNER, &id).unwrap().is_none());
        assert!(f.manager.current_draft(OWNER).is_none());
        assert!(!f.manager.delete_draft(OWNER, &id).unwrap());
    }

    #[test]
    fn deleting_another_draft_keeps_the_open_one() {
        let f = fixture();
        let first = f.manager.save_draft(OWNER, &text("A", "a")).unwrap();
        f.manager.new_draft(OWNER);
        let second = f.manager.save_draft(OWNER, &text("B", "b")).unwrap();

        f.manager.delete_draft(OWNER, &first).unwrap();
        assert_eq!(f.manager.current_draft(OWNER).unwrap().id, second);
    }

    #[test]
    fn publish_moves_the_draft_into_the_post_store() {
        let f = fixture();
        let id = f.manager.save_draft(OWNER, &DraftInput {
            title: Some("<b>Hello</b>".into()),
            content: Some("Hello <script>x</script> world".into()),
            tags: Some(vec!["rust".into()]),
            category: Some("Tech".into()),
            ..Default::default()
        }).unwrap();

        let post = f.manager.publish_post(&author(), &id, None).unwrap();

        assert!(f.manager.list_drafts(OWNER).unwrap().is_empty());
        assert!(f.manager.current_draft(OWNER).is_none());
        assert_eq!(f.posts.published(), vec![post.clone()]);
        assert_eq!(post.metadata.title, "Hello");
        assert!(!post.content.contains("<script>"));
        assert_eq!(post.metadata.published_at, f.clock.now());
        assert_eq!(post.metadata.excerpt, "Hello world");
        assert_eq!(post.metadata.tags, vec!["rust"]);
    }

    #[test]
    fn scheduled_publish_still_removes_the_draft() {
        let f = fixture();
        let id = f.manager.save_draft(OWNER, &text("Later", "soon")).unwrap();
        let when = f.clock.now() + Duration::days(2);

        let post = f.manager.publish_post(&author(), &id, Some(when)).unwrap();

        assert!(f.manager.list_drafts(OWNER).unwrap().is_empty());
        assert_eq!(post.metadata.published_at, when);
    }

    #[test]
    fn past_schedule_is_accepted_as_given() {
        let f = fixture();
        let id = f.manager.save_draft(OWNER, &text("Backdated", "x")).unwrap();
        let when = f.clock.now() - Duration::days(30);
        assert_eq!(f.manager.publish_post(&author(), &id, Some(when)).unwrap().metadata.published_at, when);
    }

    #[test]
    fn publishing_an_unknown_draft_fails() {
        let f = fixture();
        assert!(matches!(
            f.manager.publish_post(&author(), "nope", None),
            Err(DraftError::NotFound(id)) if id == "nope"
        ));
        assert!(f.posts.published().is_empty());
    }

    #[test]
    fn autosave_saves_non_empty_editors_only() {
        let f = fixture();
        f.manager.update_editor(OWNER, &text("Typing", ""));
        f.manager.update_editor(2, &text("", ""));

        let saved = f.manager.autosave_tick();

        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, OWNER);
        assert_eq!(f.manager.list_drafts(OWNER).unwrap()[0].title, "Typing");
        assert!(f.manager.list_drafts(2).unwrap().is_empty());
    }

    #[test]
    fn autosave_respects_the_toggle() {
        let f = fixture();
        f.manager.update_editor(OWNER, &text("Typing", "words"));
        f.manager.set_autosave(OWNER, false);
        assert!(f.manager.autosave_tick().is_empty());

        f.manager.set_autosave(OWNER, true);
        assert_eq!(f.manager.autosave_tick().len(), 1);
    }

    #[test]
    fn repeated_autosaves_update_the_same_draft() {
        let f = fixture();
        f.manager.update_editor(OWNER, &text("Typing", "one"));
        let first = f.manager.autosave_tick();

        f.clock.advance(Duration::seconds(30));
        f.manager.update_editor(OWNER, &DraftInput { content: Some("one two".into()), ..Default::default() });
        let second = f.manager.autosave_tick();

        assert_eq!(first[0].1, second[0].1);
        let drafts = f.manager.list_drafts(OWNER).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].word_count, 2);
    }

    #[test]
    fn editor_edits_are_not_persisted_until_saved() {
        let f = fixture();
        let session = f.manager.update_editor(OWNER, &text("Unsaved", "text"));
        assert_eq!(session.fields.title.as_deref(), Some("Unsaved"));
        assert!(session.current_draft.is_none());
        assert!(f.manager.list_drafts(OWNER).unwrap().is_empty());
    }

    #[test]
    fn sessions_are_isolated_per_owner() {
        let f = fixture();
        f.manager.save_draft(OWNER, &text("Mine", "a")).unwrap();
        f.manager.save_draft(2, &text("Theirs", "b")).unwrap();
        assert_eq!(f.manager.list_drafts(OWNER).unwrap().len(), 1);
        assert_eq!(f.manager.current_draft(2).unwrap().title, "Theirs");
    }

    /// Draft store that hands a one-shot action to another thread the first
    /// time drafts are read, so the action races the caller's save.
    #[derive(Default)]
    struct RacingDraftStore {
        inner: MemoryDraftStore,
        action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
        racer: Mutex<Option<std::thread::JoinHandle<()>>>,
    }

    impl RacingDraftStore {
        fn on_next_read(&self, action: impl FnOnce() + Send + 'static) {
            *self.action.lock().unwrap() = Some(Box::new(action));
        }

        fn join_racer(&self) {
            if let Some(handle) = self.racer.lock().unwrap().take() {
                handle.join().unwrap();
            }
        }
    }

    impl DraftStore for RacingDraftStore {
        fn read_drafts(&self, owner: i64) -> Result<Vec<Draft>, DbError> {
            let action = self.action.lock().unwrap().take();
            if let Some(action) = action {
                *self.racer.lock().unwrap() = Some(std::thread::spawn(action));
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            self.inner.read_drafts(owner)
        }

        fn write_drafts(&self, owner: i64, drafts: &[Draft]) -> Result<(), DbError> {
            self.inner.write_drafts(owner, drafts)
        }
    }

    fn racing_fixture() -> (Arc<PostManager>, Arc<RacingDraftStore>, Arc<MemoryPostStore>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
        let drafts = Arc::new(RacingDraftStore::default());
        let posts = Arc::new(MemoryPostStore::default());
        let manager = Arc::new(PostManager::new(drafts.clone(), posts.clone(), clock));
        (manager, drafts, posts)
    }

    #[test]
    fn publish_during_autosave_leaves_no_draft_behind() {
        let (manager, drafts, posts) = racing_fixture();
        let id = manager.save_draft(OWNER, &text("Secret", "first words")).unwrap();
        manager.update_editor(OWNER, &DraftInput { content: Some("first words and more".into()), ..Default::default() });

        let publisher = manager.clone();
        let draft_id = id.clone();
        drafts.on_next_read(move || {
            publisher.publish_post(&author(), &draft_id, None).unwrap();
        });
        manager.autosave_tick();
        drafts.join_racer();

        assert_eq!(posts.published().len(), 1);
        assert!(manager.list_drafts(OWNER).unwrap().is_empty());
        assert!(manager.current_draft(OWNER).is_none());
        assert!(manager.autosave_tick().is_empty());
        assert!(manager.list_drafts(OWNER).unwrap().is_empty());
    }

    #[test]
    fn delete_during_autosave_stays_deleted() {
        let (manager, drafts, _) = racing_fixture();
        let id = manager.save_draft(OWNER, &text("Doomed", "words")).unwrap();

        let deleter = manager.clone();
        let draft_id = id.clone();
        drafts.on_next_read(move || {
            assert!(deleter.delete_draft(OWNER, &draft_id).unwrap());
        });
        manager.autosave_tick();
        drafts.join_racer();

        assert!(manager.list_drafts(OWNER).unwrap().is_empty());
        assert!(manager.autosave_tick().is_empty());
    }

    #[test]
    fn editor_edits_made_during_autosave_are_kept() {
        let (manager, drafts, _) = racing_fixture();
        let id = manager.save_draft(OWNER, &text("Draft", "v1")).unwrap();
        manager.update_editor(OWNER, &DraftInput { content: Some("v2".into()), ..Default::default() });

        let editor = manager.clone();
        drafts.on_next_read(move || {
            editor.update_editor(OWNER, &DraftInput { title: Some("Newer".into()), ..Default::default() });
        });
        manager.autosave_tick();
        drafts.join_racer();

        let session = manager.session(OWNER);
        assert_eq!(session.fields.title.as_deref(), Some("Newer"));
        assert_eq!(session.current_draft.unwrap().id, id);
        assert_eq!(manager.list_drafts(OWNER).unwrap()[0].content, "v2");

        manager.autosave_tick();
        let stored = manager.list_drafts(OWNER).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Newer");
    }

    #[test]
    fn manual_save_during_autosave_keeps_both_drafts() {
        let (manager, drafts, _) = racing_fixture();
        manager.update_editor(OWNER, &text("Autosaved", "a"));

        let writer = manager.clone();
        drafts.on_next_read(move || {
            let input = DraftInput { id: Some("fresh".into()), title: Some("Manual".into()), ..Default::default() };
            writer.save_draft(OWNER, &input).unwrap();
        });
        manager.autosave_tick();
        drafts.join_racer();

        let mut titles: Vec<String> = manager.list_drafts(OWNER).unwrap().into_iter().map(|d| d.title).collect();
        titles.sort();
        assert_eq!(titles, vec!["Autosaved", "Manual"]);
    }
}
