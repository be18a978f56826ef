//! CLI command handlers module
//!
//! - init: schema bootstrap
//! - migrate: migration lifecycle (migrate, progress, stop, clear)
//! - info: information display (tables, history, config)

pub mod info;
pub mod init;
pub mod migrate;

pub use info::*;
pub use init::*;
pub use migrate::*;
