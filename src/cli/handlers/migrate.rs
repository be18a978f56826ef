//! Migration handlers (migrate, progress, stop, clear)

use std::io::stdin;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::cli::output::print_error;
use crate::cli::output::print_info;
use crate::cli::output::print_progress;
use crate::cli::output::print_progress_line;
use crate::cli::output::print_prompt;
use crate::cli::output::print_run_summary;
use crate::cli::output::print_success;
use crate::cli::output::print_warning;
use crate::migration::progress_codec;
use crate::migration::StartRequest;
use crate::models::MigrationStatus;
use crate::models::ProgressReport;
use crate::Result;
use crate::VecMigrate;
use crate::VecMigrateError;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Handle migrate command: runs until the workers return or Ctrl-C pauses the run
pub async fn handle_migrate_command(
    app: &VecMigrate,
    tables: Vec<String>,
    batch_size: Option<usize>,
    workers: Option<usize>,
    resume: bool,
) -> Result<()> {
    let manager = app.migration_manager().await?;

    let tables = if tables.is_empty() && !resume {
        app.config().table_names()
    } else {
        tables
    };
    let request = StartRequest {
        tables,
        batch_size: batch_size.unwrap_or_else(|| app.config().batch_size()),
        worker_count: workers.unwrap_or_else(|| app.config().worker_count()),
        resume,
    };

    let run = manager.start(request).await?;
    print_info(&format!(
        "🚀 Migration {} started: {} tables, {}/{} records already embedded",
        run.id,
        run.tables.len(),
        run.current,
        run.total
    ));
    if run.fallback_mode {
        print_warning("Run is continuing in fallback mode");
    }
    print_info("Press Ctrl-C to pause; resume later with `vecmigrate migrate --resume`.");

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.tick().await;

    let finished = loop {
        tokio::select! {
            run = manager.wait() => break run,
            _ = tokio::signal::ctrl_c() => {
                print_warning("Interrupt received, pausing after in-flight records...");
                manager.pause().await?;
                break manager.wait().await;
            }
            _ = ticker.tick() => {
                print_progress_line(&manager.progress_report().await);
            }
        }
    };

    print_run_summary(&finished);
    match finished.status {
        MigrationStatus::Completed => {
            print_success("Migration completed");
            Ok(())
        }
        MigrationStatus::Paused => {
            print_info("Migration paused. Resume with `vecmigrate migrate --resume`.");
            Ok(())
        }
        MigrationStatus::Error => {
            let message = finished
                .error
                .unwrap_or_else(|| "migration failed".to_string());
            print_error(&message);
            Err(VecMigrateError::Custom(message))
        }
        status => {
            print_info(&format!("Migration ended as {status}"));
            Ok(())
        }
    }
}

/// Handle progress command
pub async fn handle_progress_command(app: &VecMigrate, json: bool) -> Result<()> {
    let store = app.progress_store()?;
    // Decoded without the restart downgrade so a live run still shows as processing
    let Some(document) = store.read_document().await? else {
        print_info("No migration has been recorded yet.");
        return Ok(());
    };
    let run = progress_codec::decode(document)?;

    let baseline = if run.status == MigrationStatus::Processing {
        0
    } else {
        run.current
    };
    let report = ProgressReport::from_run(&run, Utc::now(), baseline);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_progress(&report);
    }
    Ok(())
}

/// Handle stop command: abandons a paused run so the next migrate starts over
pub async fn handle_stop_command(app: &VecMigrate) -> Result<()> {
    let store = app.progress_store()?;
    let Some(mut run) = store.load().await? else {
        print_info("No migration has been recorded yet.");
        return Ok(());
    };

    if run.status != MigrationStatus::Paused {
        print_info(&format!("Migration {} is {}, nothing to stop.", run.id, run.status));
        return Ok(());
    }

    run.transition(MigrationStatus::Stopped)?;
    store.save(&run).await?;
    info!(run = %run.id, "Migration stopped");
    print_success(&format!("Migration {} stopped", run.id));
    Ok(())
}

/// Handle clear command
pub async fn handle_clear_command(app: &VecMigrate, force: bool) -> Result<()> {
    if !force {
        print_warning("This deletes the persisted migration progress.");
        print_warning("Embedded rows are kept; a new migration re-checks them and skips duplicates.");
        print_prompt("Are you sure you want to continue? (y/N)");

        let mut input = String::new();
        stdin().read_line(&mut input)?;
        if !matches!(input.trim().to_lowercase().as_str(), "y" | "yes") {
            print_info("Clear cancelled.");
            return Ok(());
        }
    }

    app.progress_store()?.clear().await?;
    info!("Migration progress cleared");
    print_success("Migration progress cleared");
    Ok(())
}
