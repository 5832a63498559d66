use moka::sync::Cache;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::services::directory::Directory;

static USER_NAME_CACHE: OnceLock<Cache<String, String>> = OnceLock::new();

pub fn init_user_name_cache() {
    USER_NAME_CACHE.get_or_init(|| {
        Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build()
    });
    info!("User name cache initialized");
}

fn get_user_name_cache() -> &'static Cache<String, String> {
    USER_NAME_CACHE
        .get()
        .expect("User name cache not initialized. Call init_user_name_cache() first.")
}

/// Resolve a user's display name for lock notices, caching hits.
/// Directory failures degrade to no name rather than failing the
/// notice.
pub async fn display_name(directory: &dyn Directory, user_id: &str) -> Option<String> {
    let cache = get_user_name_cache();
    if let Some(name) = cache.get(user_id) {
        return Some(name);
    }
    match directory.display_name(user_id).await {
        Ok(Some(name)) => {
            cache.insert(user_id.to_string(), name.clone());
            Some(name)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to resolve display name for {}: {}", user_id, e);
            None
        }
    }
}

pub fn cached_name_count() -> u64 {
    USER_NAME_CACHE.get().map(|c| c.entry_count()).unwrap_or(0)
}
