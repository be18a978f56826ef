//! Information display handlers (tables, history, config)

use std::collections::HashMap;

use tracing::warn;

use crate::cli::output::print_config;
use crate::cli::output::print_history;
use crate::cli::output::print_info;
use crate::cli::output::print_table_list;
use crate::cli::output::TableOverview;
use crate::migration::HistoryLog;
use crate::migration::SourceReader;
use crate::models::MigrationStatus;
use crate::AppConfig;
use crate::Result;
use crate::VecMigrate;

/// Handle tables command
pub async fn handle_tables_command(app: &VecMigrate) -> Result<()> {
    let registry = app.table_registry()?;
    if registry.is_empty() {
        print_info("No tables registered. Add [[tables]] entries to config.toml.");
        return Ok(());
    }

    let embedded: HashMap<String, u64> = app
        .database()
        .embedded_counts()
        .await?
        .into_iter()
        .map(|c| (c.source_table, c.embedded.max(0) as u64))
        .collect();

    let mut overview = Vec::with_capacity(registry.names().len());
    for name in registry.names() {
        let spec = registry.resolve(name)?;
        let total = match app.source().count_rows(&spec).await {
            Ok(total) => Some(total),
            Err(e) => {
                warn!(table = %name, "Could not count rows: {}", e);
                None
            }
        };
        overview.push(TableOverview {
            embedded: embedded.get(name).copied().unwrap_or(0),
            name: spec.name,
            display_name: spec.display_name,
            total,
        });
    }

    print_table_list(&overview);
    Ok(())
}

/// Handle history command
pub async fn handle_history_command(
    app: &VecMigrate,
    status: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let status = status
        .as_deref()
        .map(str::parse::<MigrationStatus>)
        .transpose()?;
    let entries = app.database().list(status, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print_history(&entries);
    }
    Ok(())
}

/// Handle config command
pub fn handle_config_command(config: &AppConfig) -> Result<()> {
    print_config(config);
    Ok(())
}
