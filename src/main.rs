use clap::Parser;
use tracing::error;
use tracing::info;
use vecmigrate::cli::handle_clear_command;
use vecmigrate::cli::handle_config_command;
use vecmigrate::cli::handle_history_command;
use vecmigrate::cli::handle_init_command;
use vecmigrate::cli::handle_migrate_command;
use vecmigrate::cli::handle_progress_command;
use vecmigrate::cli::handle_stop_command;
use vecmigrate::cli::handle_tables_command;
use vecmigrate::cli::print_error;
use vecmigrate::cli::Cli;
use vecmigrate::cli::Commands;
use vecmigrate::AppConfig;
use vecmigrate::Result;
use vecmigrate::VecMigrate;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        print_error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };

    if cli.verbose {
        vecmigrate::logging::init_logging_with_level("debug")?;
    } else {
        vecmigrate::logging::init_logging_with_config(&config)?;
    }
    info!("Configuration loaded successfully");

    // Only needs the parsed file
    if matches!(cli.command, Commands::Config) {
        return handle_config_command(&config);
    }

    let app = VecMigrate::new(config).await?;

    match cli.command {
        Commands::Init { force } => handle_init_command(&app, force).await,
        Commands::Tables => handle_tables_command(&app).await,
        Commands::Migrate {
            tables,
            batch_size,
            workers,
            resume,
        } => handle_migrate_command(&app, tables, batch_size, workers, resume).await,
        Commands::Progress { json } => handle_progress_command(&app, json).await,
        Commands::History {
            status,
            limit,
            json,
        } => handle_history_command(&app, status, limit, json).await,
        Commands::Stop => handle_stop_command(&app).await,
        Commands::Clear { force } => handle_clear_command(&app, force).await,
        Commands::Config => handle_config_command(app.config()),
    }
}
