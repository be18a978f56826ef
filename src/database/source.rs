use async_trait::async_trait;
use tracing::debug;
use tracing::warn;

use super::Database;
use crate::migration::tables::quote_identifier;
use crate::migration::SourceReader;
use crate::migration::TableSpec;
use crate::models::SourcePage;
use crate::models::SourceRow;
use crate::Result;

/// How rows of a source table are ordered and identified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyColumn {
    /// Single-column primary key or configured id column
    Column(String),
    /// No usable key: rows are numbered in physical order.
    /// Ids are only stable while the table is not rewritten.
    RowNumber,
}

impl Database {
    /// Ordering key for `table`, cached after the first lookup
    pub async fn key_column(&self, table: &TableSpec) -> Result<KeyColumn> {
        if let Some(column) = &table.id_column {
            return Ok(KeyColumn::Column(column.clone()));
        }
        if let Some(key) = self.keys.get(&table.name) {
            return Ok(key.clone());
        }

        let columns = sqlx::query_scalar::<_, String>(
            r"
            SELECT a.attname::text
            FROM pg_index i
            JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
            WHERE i.indrelid = $1::regclass
            AND i.indisprimary
            ",
        )
        .bind(table.quoted_name())
        .fetch_all(&self.pool)
        .await?;

        let key = match columns.as_slice() {
            [column] => KeyColumn::Column(column.clone()),
            [] => {
                warn!(table = %table.name, "No primary key, falling back to row numbers");
                KeyColumn::RowNumber
            }
            _ => {
                warn!(
                    table = %table.name,
                    "Composite primary key {:?}, falling back to row numbers",
                    columns
                );
                KeyColumn::RowNumber
            }
        };
        debug!(table = %table.name, ?key, "Resolved ordering key");
        self.keys.insert(table.name.clone(), key.clone());
        Ok(key)
    }
}

#[async_trait]
impl SourceReader for Database {
    /// Rows whose content expression yields non-blank text
    async fn count_rows(&self, table: &TableSpec) -> Result<u64> {
        let content = table.content_sql();
        let count = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM {} WHERE ({content}) IS NOT NULL AND btrim(({content})::text) <> ''",
            table.quoted_name()
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn fetch_batch(
        &self,
        table: &TableSpec,
        offset: u64,
        limit: usize,
    ) -> Result<SourcePage> {
        let content = table.content_sql();
        let sql = match self.key_column(table).await? {
            KeyColumn::Column(column) => {
                let key = quote_identifier(&column);
                format!(
                    "SELECT ({key})::text AS id, ({content})::text AS text FROM {} ORDER BY {key} ASC LIMIT $1 OFFSET $2",
                    table.quoted_name()
                )
            }
            KeyColumn::RowNumber => format!(
                "SELECT (ROW_NUMBER() OVER (ORDER BY ctid))::text AS id, ({content})::text AS text FROM {} ORDER BY ctid LIMIT $1 OFFSET $2",
                table.quoted_name()
            ),
        };

        let rows = sqlx::query_as::<_, (Option<String>, Option<String>)>(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let fetched = rows.len();
        let rows: Vec<SourceRow> = rows
            .into_iter()
            .filter_map(|(id, text)| id.map(|id| SourceRow { id, text }))
            .collect();
        if rows.len() < fetched {
            warn!(
                table = %table.name,
                offset,
                missing = fetched - rows.len(),
                "Rows without an id in page"
            );
        }
        Ok(SourcePage { rows, fetched })
    }
}
