//! Background auto-save ticker.
//!
//! Every interval the task flushes the editor sessions that have auto-save on
//! and hold some text. The storage writes run on the blocking pool so request
//! workers never wait on them. A failed tick is logged and the loop carries on.

use std::sync::Arc;
use std::time::Duration;

use actix_web::rt::task::JoinHandle;

use crate::services::post_management::PostManager;

pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Spawns the ticker on the current actix runtime. Abort the handle on shutdown.
pub fn spawn_autosave_task(manager: Arc<PostManager>, interval: Duration) -> JoinHandle<()> {
    log::info!("Auto-save task started with a {}s interval.", interval.as_secs_f64());
    actix_web::rt::spawn(async move {
        let mut ticker = actix_web::rt::time::interval(interval);
        // The first tick completes immediately; nothing has been typed yet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let manager = manager.clone();
            match actix_web::rt::task::spawn_blocking(move || manager.autosave_tick()).await {
                Ok(saved) if !saved.is_empty() => log::debug!("Auto-saved {} draft(s).", saved.len()),
                Ok(_) => {}
                Err(e) => log::error!("Auto-save tick panicked: {}", e),
            }
        }
    })
}
