pub mod app;
pub mod cli;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod errors;
pub mod logging;
pub mod migration;
pub mod models;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
pub mod tests;

pub use app::VecMigrate;
pub use config::AppConfig;
pub use errors::*;
