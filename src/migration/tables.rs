//! Static per-table settings
//!
//! Content expressions and key columns come only from configuration; request
//! input selects tables by name and nothing else.

use std::collections::HashMap;

use crate::config::default_content_expr;
use crate::config::TableConfig;
use crate::errors::Result;
use crate::errors::VecMigrateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Source table name (plain SQL identifier)
    pub name: String,
    /// Value written to `unified_embeddings.source_table`
    pub display_name: String,
    /// SQL expression producing the text to embed
    pub content: String,
    /// Explicit ordering key; discovered from the catalog when absent
    pub id_column: Option<String>,
}

impl TableSpec {
    /// Settings for a table missing from the registry
    pub fn unregistered(name: &str) -> Result<Self> {
        validate_identifier(name)?;
        Ok(Self {
            name: name.to_string(),
            display_name: name.to_string(),
            content: default_content_expr(),
            id_column: None,
        })
    }

    /// `"name"`, safe to splice into SQL
    #[must_use]
    pub fn quoted_name(&self) -> String {
        quote_identifier(&self.name)
    }

    /// The content expression, quoted when it is a bare column name
    #[must_use]
    pub fn content_sql(&self) -> String {
        if is_identifier(&self.content) {
            quote_identifier(&self.content)
        } else {
            self.content.clone()
        }
    }
}

/// Registered tables by source name
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: HashMap<String, TableSpec>,
    order: Vec<String>,
}

impl TableRegistry {
    pub fn from_config(tables: &[TableConfig]) -> Result<Self> {
        let mut registry = Self::default();
        for table in tables {
            validate_identifier(&table.name)?;
            if let Some(id) = &table.id_column {
                validate_identifier(id)?;
            }
            let spec = TableSpec {
                name: table.name.clone(),
                display_name: table
                    .display_name
                    .clone()
                    .unwrap_or_else(|| table.name.clone()),
                content: table.content.clone(),
                id_column: table.id_column.clone(),
            };
            if registry.tables.insert(table.name.clone(), spec).is_none() {
                registry.order.push(table.name.clone());
            }
        }
        Ok(registry)
    }

    /// Settings for `name`, falling back to the defaults for unregistered tables
    pub fn resolve(&self, name: &str) -> Result<TableSpec> {
        match self.tables.get(name) {
            Some(spec) => Ok(spec.clone()),
            None => TableSpec::unregistered(name),
        }
    }

    /// Registered table names in configuration order
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Whether `s` is a plain SQL identifier
#[must_use]
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && s.len() <= 63
}

pub fn validate_identifier(s: &str) -> Result<()> {
    if is_identifier(s) {
        Ok(())
    } else {
        Err(VecMigrateError::InvalidInput(format!(
            "'{s}' is not a valid table or column name"
        )))
    }
}

#[must_use]
pub fn quote_identifier(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}
