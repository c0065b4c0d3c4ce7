use std::path::{Path, PathBuf};

use flowmine_parser::{column_kind, column_values, CellValue, ColumnKind, LoadError, Table};
use polars::prelude::{DataFrame, PolarsError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database operation failed: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("cannot reset database file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read frame for table '{table}': {source}")]
    Frame {
        table: String,
        #[source]
        source: LoadError,
    },
    #[error("cannot build frame: {0}")]
    Polars(#[from] PolarsError),
}

/// Single-file SQLite database holding the raw sheets and the derived tables of
/// one run.
pub struct StagingStore {
    pool: SqlitePool,
    path: PathBuf,
}

enum SqlValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
}

impl SqlValue {
    fn from_cell(cell: CellValue) -> Self {
        match cell {
            CellValue::Null => SqlValue::Null,
            CellValue::Integer(value) => SqlValue::Integer(value),
            CellValue::Float(value) => SqlValue::Real(value),
            CellValue::Bool(value) => SqlValue::Integer(i64::from(value)),
            // Text and timestamps share the canonical Display rendering.
            other => SqlValue::Text(other.to_string()),
        }
    }
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Integer | ColumnKind::Boolean => "INTEGER",
        ColumnKind::Float => "REAL",
        ColumnKind::Datetime | ColumnKind::Text => "TEXT",
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl StagingStore {
    /// Opens a fresh database at `path`, deleting whatever a previous run left there.
    pub async fn create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            std::fs::remove_file(path).map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        debug!(path = %path.display(), "Opened staging database");
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    /// Stages one input sheet under its normalized name.
    pub async fn stage_table(&self, table: &Table, key: Option<&str>) -> Result<u64, StoreError> {
        self.write_frame(&table.name, &table.df, key).await
    }

    /// Replaces table `name` with the contents of `df`, indexing `key` when given.
    /// Returns the number of rows written.
    pub async fn write_frame(
        &self,
        name: &str,
        df: &DataFrame,
        key: Option<&str>,
    ) -> Result<u64, StoreError> {
        let frame_error = |source: LoadError| StoreError::Frame {
            table: name.to_string(),
            source,
        };

        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|column| column.to_string())
            .collect();

        let mut definitions = Vec::with_capacity(names.len());
        let mut columns: Vec<Vec<CellValue>> = Vec::with_capacity(names.len());
        for column in &names {
            let kind = column_kind(df, column).map_err(frame_error)?;
            definitions.push(format!("{} {}", quote_ident(column), sql_type(kind)));
            columns.push(column_values(df, column).map_err(frame_error)?);
        }

        let table = quote_ident(name);
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE {table} ({})",
            definitions.join(", ")
        ))
        .execute(&mut *tx)
        .await?;

        if let Some(key) = key.filter(|key| names.iter().any(|column| column.as_str() == *key)) {
            let index = quote_ident(&format!("idx_{name}_{key}"));
            sqlx::query(&format!(
                "CREATE INDEX {index} ON {table} ({})",
                quote_ident(key)
            ))
            .execute(&mut *tx)
            .await?;
        }

        let mut written = 0u64;
        if !names.is_empty() {
            let placeholders = vec!["?"; names.len()].join(", ");
            let quoted: Vec<String> = names.iter().map(|column| quote_ident(column)).collect();
            let insert = format!(
                "INSERT INTO {table} ({}) VALUES ({placeholders})",
                quoted.join(", ")
            );

            let mut columns: Vec<std::vec::IntoIter<CellValue>> =
                columns.into_iter().map(Vec::into_iter).collect();
            for _ in 0..df.height() {
                let mut query = sqlx::query(&insert);
                for column in columns.iter_mut() {
                    let value = column.next().map_or(SqlValue::Null, SqlValue::from_cell);
                    query = match value {
                        SqlValue::Null => query.bind(None::<String>),
                        SqlValue::Text(value) => query.bind(value),
                        SqlValue::Integer(value) => query.bind(value),
                        SqlValue::Real(value) => query.bind(value),
                    };
                }
                written += query.execute(&mut *tx).await?.rows_affected();
            }
        }

        tx.commit().await?;
        debug!(table = name, rows = written, "Staged table");
        Ok(written)
    }

    pub async fn row_count(&self, name: &str) -> Result<i64, StoreError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", quote_ident(name)))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    pub async fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r#"
                SELECT name
                FROM sqlite_master
                WHERE type = 'table'
                ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get("name")?);
        }
        Ok(names)
    }

    pub async fn close(self) {
        self.pool.close().await;
        info!(path = %self.path.display(), "Closed staging database");
    }
}
