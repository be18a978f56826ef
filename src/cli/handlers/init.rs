//! Schema initialization handler

use crate::cli::output::print_info;
use crate::cli::output::print_success;
use crate::cli::output::print_warning;
use crate::Result;
use crate::VecMigrate;

/// Handle database initialization command
pub async fn handle_init_command(app: &VecMigrate, force: bool) -> Result<()> {
    if !force {
        print_warning("This will create the pgvector extension, unified_embeddings and migration_progress.");
        print_warning("This operation is safe - it uses CREATE IF NOT EXISTS.");
        println!("\nUse --force to proceed.");
        return Ok(());
    }

    print_info("🗄️  Initializing unified embedding store...");
    let dimension = match app.init_schema().await {
        Ok(dimension) => dimension,
        Err(e) => {
            if e.to_string().contains("vector") || e.to_string().contains("extension") {
                print_warning(&format!("Could not enable pgvector extension: {e}"));
                println!("  Run as a superuser: CREATE EXTENSION IF NOT EXISTS vector;");
                println!("  Then run: vecmigrate init --force");
            }
            return Err(e);
        }
    };

    print_success(&format!("unified_embeddings ready (vector({dimension}))"));
    print_success("migration_progress ready");
    println!();
    print_info("To start migrating, run:");
    println!("   vecmigrate migrate --tables <table,...>");

    Ok(())
}
