//! The persisted form of a `MigrationRun`
//!
//! Runs are written in one canonical JSON layout tagged with
//! `version`. Documents without a version are the older flat camelCase layout
//! and are upgraded on read.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::Result;
use crate::errors::VecMigrateError;
use crate::models::MigrationRun;
use crate::models::MigrationStatus;
use crate::models::TableProgress;
use crate::models::PROGRESS_SCHEMA_VERSION;

/// Canonical JSON for `run`
pub fn encode(run: &MigrationRun) -> Result<serde_json::Value> {
    let mut run = run.clone();
    run.version = PROGRESS_SCHEMA_VERSION;
    Ok(serde_json::to_value(run)?)
}

/// Decode either layout; anything else is a corrupted record
pub fn decode(document: serde_json::Value) -> Result<MigrationRun> {
    let version = document.get("version").and_then(serde_json::Value::as_u64);
    match version {
        Some(v) if v == u64::from(PROGRESS_SCHEMA_VERSION) => serde_json::from_value(document)
            .map_err(|e| VecMigrateError::CorruptProgress(e.to_string())),
        Some(v) => Err(VecMigrateError::CorruptProgress(format!(
            "unsupported progress schema version {v}"
        ))),
        None => {
            let legacy: LegacyRun = serde_json::from_value(document)
                .map_err(|e| VecMigrateError::CorruptProgress(e.to_string()))?;
            legacy.upgrade()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyTime {
    Millis(i64),
    Text(String),
}

impl LegacyTime {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            Self::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct LegacyTableProgress {
    total: u64,
    embedded: u64,
    offset: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRun {
    status: String,
    #[serde(default)]
    tables: Vec<String>,
    #[serde(default)]
    current_table: Option<String>,
    #[serde(default)]
    current: u64,
    #[serde(default)]
    total: u64,
    #[serde(default)]
    tokens_used: u64,
    #[serde(default)]
    estimated_cost: f64,
    #[serde(default)]
    start_time: Option<LegacyTime>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_count: u64,
    #[serde(default)]
    fallback_mode: bool,
    #[serde(default)]
    fallback_reason: Option<String>,
    #[serde(default)]
    batch_size: usize,
    #[serde(default)]
    worker_count: usize,
    #[serde(default)]
    processed_tables: Vec<String>,
    #[serde(default)]
    table_progress: BTreeMap<String, LegacyTableProgress>,
}

impl LegacyRun {
    fn upgrade(self) -> Result<MigrationRun> {
        let status = match self.status.as_str() {
            "idle" => MigrationStatus::Idle,
            "processing" => MigrationStatus::Processing,
            "paused" => MigrationStatus::Paused,
            "stopped" => MigrationStatus::Stopped,
            "completed" => MigrationStatus::Completed,
            "error" | "failed" => MigrationStatus::Error,
            other => {
                return Err(VecMigrateError::CorruptProgress(format!(
                    "unknown migration status '{other}'"
                )))
            }
        };

        let mut tables = self.tables;
        for name in self.table_progress.keys() {
            if !tables.contains(name) {
                tables.push(name.clone());
            }
        }

        let table_progress = self
            .table_progress
            .into_iter()
            .map(|(name, legacy)| {
                let mut progress = TableProgress::new(&name, &name, legacy.total, legacy.embedded);
                progress.offset = legacy.offset;
                (name, progress)
            })
            .collect();

        Ok(MigrationRun {
            version: PROGRESS_SCHEMA_VERSION,
            id: Uuid::new_v4(),
            status,
            tables,
            current_table: self.current_table,
            // Older writers could overshoot the total after source inserts
            total: self.total.max(self.current),
            current: self.current,
            tokens_used: self.tokens_used,
            estimated_cost: self.estimated_cost,
            start_time: self.start_time.as_ref().and_then(LegacyTime::to_datetime),
            error: self.error,
            error_count: self.error_count,
            fallback_mode: self.fallback_mode,
            fallback_reason: self.fallback_reason,
            batch_size: self.batch_size,
            worker_count: self.worker_count,
            provider: String::new(),
            model: String::new(),
            processed_tables: self.processed_tables,
            table_progress,
            updated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_canonical_document_is_versioned() {
        let run = MigrationRun::new(vec!["invoices".into()], 2, 1);
        let document = encode(&run).unwrap();
        assert_eq!(document["version"], 2);
        assert_eq!(document["status"], "idle");
        assert_eq!(decode(document).unwrap(), run);
    }

    #[test]
    fn test_legacy_layout_is_upgraded() {
        let legacy = json!({
            "status": "processing",
            "current": 120,
            "total": 300,
            "percentage": 40,
            "currentTable": "sorucevap",
            "error": null,
            "tokensUsed": 5400,
            "estimatedCost": 0.54,
            "startTime": 1_700_000_000_000_i64,
            "processedTables": ["ozelgeler"],
            "tableProgress": {
                "ozelgeler": {"total": 100, "embedded": 100, "processed": 100, "offset": 100},
                "sorucevap": {"total": 200, "embedded": 20, "processed": 20, "offset": 20}
            }
        });

        let run = decode(legacy).unwrap();
        assert_eq!(run.version, PROGRESS_SCHEMA_VERSION);
        assert_eq!(run.status, MigrationStatus::Processing);
        assert_eq!(run.current, 120);
        assert_eq!(run.tables, vec!["ozelgeler".to_string(), "sorucevap".to_string()]);
        assert_eq!(run.table_progress["sorucevap"].embedded_count, 20);
        assert_eq!(run.table_progress["sorucevap"].offset, 20);
        assert_eq!(
            run.start_time.unwrap().timestamp_millis(),
            1_700_000_000_000
        );
    }

    #[test]
    fn test_legacy_iso_start_time() {
        let run = decode(json!({
            "status": "paused",
            "startTime": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(run.status, MigrationStatus::Paused);
        assert!(run.start_time.is_some());
    }

    #[test]
    fn test_undecodable_documents_are_corrupt() {
        for document in [
            json!("not an object"),
            json!({"version": 2, "status": 7}),
            json!({"version": 99, "status": "idle"}),
            json!({"status": "exploded"}),
            json!({"current": 1}),
        ] {
            let err = decode(document).unwrap_err();
            assert!(matches!(err, VecMigrateError::CorruptProgress(_)));
            assert!(err.is_fatal());
        }
    }
}
