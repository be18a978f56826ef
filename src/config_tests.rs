//! Unit tests for configuration module
//!
//! These tests validate configuration parsing, defaults, and validation.

#[cfg(test)]
mod tests {
    use crate::config::*;

    const MINIMAL: &str = r#"
[database]
url = "postgresql://localhost/target"
max_connections = 10
min_connections = 1
connection_timeout = 5

[logging]
level = "debug"
backtrace = false

[embeddings]
provider = "google"
model = "text-embedding-004"
"#;

    // ====== Default Value Tests ======

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.batch_size(), 50);
        assert_eq!(config.worker_count(), 2);
        assert_eq!(config.persist_every(), 10);
        assert_eq!(config.content_max_chars(), 8000);
        assert_eq!(config.migration.progress_backend, ProgressBackend::Postgres);
        assert_eq!(config.migration.cache_backend, CacheBackend::Redis);
        assert_eq!(config.redis.cache_ttl_secs, 30 * 24 * 60 * 60);
        assert_eq!(config.embeddings.max_retries, 3);
        assert!(config.tables.is_empty());
    }

    #[test]
    fn test_source_database_defaults_to_target() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.source_database().url, "postgresql://localhost/target");
    }

    // ====== Table Registry Tests ======

    #[test]
    fn test_table_registry_parsing() {
        let toml = format!(
            r#"{MINIMAL}
[source_database]
url = "postgresql://localhost/source"
max_connections = 4
min_connections = 1
connection_timeout = 5

[[tables]]
name = "invoices"
display_name = "Invoices"
content = "description"

[[tables]]
name = "faq"
content = "CONCAT(\"Question\", ' ', \"Answer\")"
id_column = "faq_id"
"#
        );
        let config = AppConfig::from_toml_str(&toml).unwrap();

        assert_eq!(config.source_database().url, "postgresql://localhost/source");
        assert_eq!(config.table_names(), vec!["invoices", "faq"]);

        let faq = config.table("faq").unwrap();
        assert!(faq.display_name.is_none());
        assert_eq!(faq.id_column.as_deref(), Some("faq_id"));
        assert!(faq.content.starts_with("CONCAT"));
        assert!(config.table("missing").is_none());
    }

    // ====== Validation Tests ======

    #[test]
    fn test_zero_batch_size_rejected() {
        let toml = format!("{MINIMAL}\n[migration]\nbatch_size = 0\n");
        let result = AppConfig::from_toml_str(&toml);
        assert!(matches!(result, Err(crate::VecMigrateError::ConfigError(_))));
    }

    #[test]
    fn test_backend_selection() {
        let toml = format!(
            "{MINIMAL}\n[migration]\nprogress_backend = \"redis\"\ncache_backend = \"none\"\n"
        );
        let config = AppConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.migration.progress_backend, ProgressBackend::Redis);
        assert_eq!(config.migration.cache_backend, CacheBackend::None);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = AppConfig::from_toml_str("[database\nurl=");
        assert!(matches!(result, Err(crate::VecMigrateError::TomlParsing(_))));
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.embedding_provider(), "openai");
        assert_eq!(config.embedding_model(), "text-embedding-3-small");
        assert_eq!(config.max_connections(), 20);
    }

    // ====== File Loading Tests ======

    #[test]
    fn test_from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.embedding_provider(), "google");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::from_file(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(crate::VecMigrateError::Io(_))));
    }
}
