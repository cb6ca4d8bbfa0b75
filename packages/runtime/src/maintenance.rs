//! Recurring maintenance job types and their payloads.

use serde::{Deserialize, Serialize};

/// Purge old records. Payload: [`PurgePayload`].
pub const PURGE_LOGS: &str = "purge_logs";
/// Refresh planner statistics for one table. Payload: [`TablePayload`].
pub const REFRESH_STATISTICS: &str = "refresh_statistics";
/// Compact one table. Payload: [`TablePayload`].
pub const COMPACT_TABLE: &str = "compact_table";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgePayload {
    pub retention_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePayload {
    pub table: String,
}

impl PurgePayload {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({ "retention_days": self.retention_days })
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, String> {
        serde_json::from_value(value.clone()).map_err(|e| format!("bad purge payload: {}", e))
    }
}

impl TablePayload {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({ "table": self.table })
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, String> {
        serde_json::from_value(value.clone()).map_err(|e| format!("bad table payload: {}", e))
    }
}
