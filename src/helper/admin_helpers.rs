use crate::models::db_operations::{admin_db_operations, posts_db_operations, users_db_operations, DbError};
use crate::models::PublishedPost;
use crate::AppState;

/// Bookkeeping after a successful publish. Failures here do not undo the
/// publish; they are logged.
pub fn record_publication(state: &AppState, post: &PublishedPost) {
    let result = state.pool.get()
        .map_err(DbError::from)
        .and_then(|conn| {
            admin_db_operations::increment_taxonomy_counts(&conn, &post.metadata.category, &post.metadata.tags)
                .map_err(DbError::from)
        });
    if let Err(e) = result {
        log::error!("Failed to update taxonomy counts for post {}: {}", post.id, e);
    }
}

/// Removes a published post together with its reactions. Comments and
/// taxonomy counters are left as they are.
pub fn delete_published_post(state: &AppState, post_id: &str) -> Result<bool, DbError> {
    if !posts_db_operations::delete_post(&state.posts_db, post_id)? {
        return Ok(false);
    }
    let conn = state.pool.get()?;
    let removed = users_db_operations::delete_reactions_for_post(&conn, post_id)?;
    log::info!("Deleted post {} and {} reaction(s).", post_id, removed);
    Ok(true)
}
