//! Resumable migration of source tables into the unified embedding store
//!
//! The [`MigrationManager`] owns the single [`MigrationRun`](crate::models::MigrationRun),
//! fans tables out to workers and exposes the control verbs (`start`, `pause`,
//! `resume`, `stop`, `clear`) plus progress snapshots. Storage is reached only
//! through the traits in [`store`].

pub mod control;
pub mod manager;
pub mod progress_codec;
pub mod redis_progress;
pub mod state;
pub mod store;
pub mod tables;
mod worker;

pub use control::ControlSignal;
pub use control::ControlToken;
pub use manager::ManagerSettings;
pub use manager::MigrationDeps;
pub use manager::MigrationManager;
pub use manager::StartRequest;
pub use redis_progress::RedisProgressStore;
pub use store::DedupIndex;
pub use store::HistoryLog;
pub use store::ProgressStore;
pub use store::SourceReader;
pub use store::UnifiedStoreWriter;
pub use tables::TableRegistry;
pub use tables::TableSpec;
