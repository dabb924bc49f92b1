use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the visited-pages history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
    pub id: i64,
    pub uri: String,
    pub title: Option<String>,
    pub visited_at: DateTime<Utc>,
}

impl Visit {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.uri)
    }
}
