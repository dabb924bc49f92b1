pub mod cache;
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::app::Result;

pub use cache::{CacheStore, PageKey, IMAGE_BUCKET, PAGE_BUCKET};
pub use sqlite::SqliteStore;

/// Sink for successful navigations, consulted only when the settings allow
/// history recording.
pub trait HistoryRecorder {
    fn record(&self, uri: &str, title: Option<&str>, visited_at: DateTime<Utc>) -> Result<()>;
}
