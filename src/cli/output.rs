//! CLI output formatting utilities

use crate::models::MigrationHistoryEntry;
use crate::models::MigrationRun;
use crate::models::ProgressReport;
use crate::AppConfig;

/// One row of the `tables` listing
#[derive(Debug, Clone)]
pub struct TableOverview {
    pub name: String,
    pub display_name: String,
    /// `None` when the table could not be counted
    pub total: Option<u64>,
    pub embedded: u64,
}

/// Safely truncate a string at character boundary (not byte boundary)
#[must_use]
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

/// Format seconds as `1h 02m 03s`
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {secs:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}

pub fn print_table_list(tables: &[TableOverview]) {
    println!("📋 Registered tables ({}):", tables.len());
    for table in tables {
        let total = table
            .total
            .map_or_else(|| "unavailable".to_string(), |t| t.to_string());
        println!(
            "  - {} ({}) | rows: {} | embedded: {}",
            table.name, table.display_name, total, table.embedded
        );
    }
}

pub fn print_history(entries: &[MigrationHistoryEntry]) {
    if entries.is_empty() {
        println!("No migration runs recorded.");
        return;
    }
    println!("🕘 Migration history ({}):", entries.len());
    for entry in entries {
        println!(
            "  - {} | {} | {} | {}/{} ({:.1}%) | failed: {} | {} tokens, ${:.4} | {}",
            entry.started_at.format("%Y-%m-%d %H:%M:%S"),
            entry.run_id,
            entry.status,
            entry.processed_records,
            entry.total_records,
            entry.percentage(),
            entry.failed_records,
            entry.tokens_used,
            entry.estimated_cost,
            format_duration(entry.duration_seconds)
        );
        println!(
            "      tables: {} | model: {} ({})",
            truncate_str(&entry.tables.join(", "), 80),
            entry.model,
            entry.provider
        );
        if let Some(error) = &entry.error_message {
            println!("      ❌ {}", truncate_str(error, 120));
        }
    }
}

/// One-line progress update printed while a migration runs
pub fn print_progress_line(report: &ProgressReport) {
    let run = &report.run;
    let eta = report
        .estimated_seconds_remaining
        .map_or_else(|| "-".to_string(), format_duration);
    println!(
        "⏳ {}/{} ({:.1}%) | table: {} | {:.0} rec/min | ETA {} | errors: {}",
        run.current,
        run.total,
        report.percentage,
        run.current_table.as_deref().unwrap_or("-"),
        report.processing_speed,
        eta,
        run.error_count
    );
}

/// Detailed progress view for the `progress` command
pub fn print_progress(report: &ProgressReport) {
    let run = &report.run;
    println!("📊 Migration {}", run.id);
    println!("===================");
    println!("  Status: {}", run.status);
    println!("  Progress: {}/{} ({:.1}%)", run.current, run.total, report.percentage);
    if !run.provider.is_empty() {
        println!("  Provider: {} ({})", run.provider, run.model);
    }
    println!("  Batch size: {} | Workers: {}", run.batch_size, run.worker_count);
    if let Some(start) = run.start_time {
        println!("  Started: {}", start.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  Updated: {}", run.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Tokens used: {}", run.tokens_used);
    println!("  Estimated cost: ${:.4}", run.estimated_cost);
    if report.processing_speed > 0.0 {
        println!("  Speed: {:.0} records/min", report.processing_speed);
    }
    if let Some(eta) = report.estimated_seconds_remaining {
        println!("  Remaining: {}", format_duration(eta));
    }
    if run.error_count > 0 {
        println!("  Failed records: {}", run.error_count);
    }
    if run.fallback_mode {
        println!(
            "  ⚠️  Fallback embeddings in use: {}",
            run.fallback_reason.as_deref().unwrap_or("unknown reason")
        );
    }
    if let Some(error) = &run.error {
        println!("  ❌ Error: {}", truncate_str(error, 200));
    }

    if !run.table_progress.is_empty() {
        println!();
        println!("  Tables:");
        for progress in run.table_progress.values() {
            let state = if let Some(reason) = &progress.failed {
                format!("failed: {}", truncate_str(reason, 80))
            } else if progress.completed {
                "done".to_string()
            } else {
                format!("offset {}", progress.offset)
            };
            println!(
                "    - {} ({}): {}/{} | skipped {} | {}",
                progress.table_name,
                progress.display_name,
                progress.embedded_count,
                progress.total_in_table,
                progress.skipped,
                state
            );
        }
    }
}

/// Final summary once the workers have returned
pub fn print_run_summary(run: &MigrationRun) {
    println!();
    println!(
        "🏁 Migration {} finished with status '{}': {}/{} records, {} tokens, ${:.4}",
        run.id, run.status, run.current, run.total, run.tokens_used, run.estimated_cost
    );
    if run.error_count > 0 {
        print_warning(&format!("{} records failed", run.error_count));
    }
}

/// Print configuration
pub fn print_config(config: &AppConfig) {
    println!("📋 vecmigrate Configuration:");
    println!();

    println!("🗄️  Target database:");
    println!("  URL: {}", mask_database_url(config.database_url()));
    println!("  Max connections: {}", config.max_connections());
    println!("  Min connections: {}", config.min_connections());
    println!("  Connection timeout: {}s", config.connection_timeout());
    println!();

    if config.source_database.is_some() {
        println!("🗄️  Source database:");
        println!("  URL: {}", mask_database_url(&config.source_database().url));
        println!();
    }

    println!("📝 Logging:");
    println!("  Level: {}", config.logging.level);
    println!("  Backtrace: {}", config.logging.backtrace);
    println!();

    println!("🧠 Embeddings:");
    println!("  Provider: {}", config.embedding_provider());
    println!("  Model: {}", config.embedding_model());
    if let Some(dimension) = config.embeddings.dimension {
        println!("  Dimension: {dimension}");
    }
    println!(
        "  API key: {}",
        if config.embeddings.api_key.is_some() {
            "configured"
        } else {
            "from environment"
        }
    );
    println!("  Max retries: {}", config.embeddings.max_retries);
    println!();

    println!("🔄 Migration:");
    println!("  Batch size: {}", config.batch_size());
    println!("  Workers: {}", config.worker_count());
    println!("  Persist every: {} records", config.persist_every());
    println!("  Content max chars: {}", config.content_max_chars());
    println!("  Progress backend: {:?}", config.migration.progress_backend);
    println!("  Cache backend: {:?}", config.migration.cache_backend);
    println!();

    println!("📦 Redis:");
    println!("  URL: {}", mask_database_url(config.redis_url()));
    println!("  Namespace: {}", config.redis.namespace);
    println!();

    println!("📚 Tables: {:?}", config.table_names());
}

/// Mask database URL for logging (hide password)
fn mask_database_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(host) = parsed.host_str() {
            let port = parsed
                .port()
                .map_or_else(String::new, |p| format!(":{p}"));
            format!("{}://{}@{}{}", parsed.scheme(), parsed.username(), host, port)
        } else {
            "***masked***".to_string()
        }
    } else {
        "***invalid***".to_string()
    }
}

pub fn print_info(msg: &str) {
    println!("ℹ️  {msg}");
}

pub fn print_success(msg: &str) {
    println!("✅ {msg}");
}

pub fn print_warning(msg: &str) {
    println!("⚠️  {msg}");
}

pub fn print_error(msg: &str) {
    eprintln!("❌ {msg}");
}

pub fn print_prompt(msg: &str) {
    print!("{msg} ");
    let _ = std::io::Write::flush(&mut std::io::stdout());
}
