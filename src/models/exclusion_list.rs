use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct ExclusionListEntry {
    pub id: i64,
    pub phone: String,
    pub reason: Option<String>,
    pub source: ExclusionSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "exclusion_source", rename_all = "snake_case")]
pub enum ExclusionSource {
    Import,
    Api,
    Manual,
}
