mod table;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::RwLock;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool};

pub use table::TabularResult;

/// Runs a resolved report template against a data source. The routing core
/// never calls this; callers do after a `UseTemplate` decision.
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, template: &str) -> Result<TabularResult>;
}

/// Canned results keyed by template text.
#[derive(Clone, Default)]
pub struct MemoryExecutor {
    results: Arc<RwLock<HashMap<String, TabularResult>>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, template: &str, result: TabularResult) {
        self.results
            .write()
            .insert(template.trim().to_string(), result);
    }
}

impl QueryExecutor for MemoryExecutor {
    async fn execute(&self, template: &str) -> Result<TabularResult> {
        self.results
            .read()
            .get(template.trim())
            .cloned()
            .ok_or_else(|| anyhow!("no result registered for template"))
    }
}

#[derive(Clone)]
pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl QueryExecutor for SqliteExecutor {
    async fn execute(&self, template: &str) -> Result<TabularResult> {
        let rows = sqlx::query(template)
            .fetch_all(&self.pool)
            .await
            .context("report query failed")?;

        let columns = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|idx| cell_text(row, idx)).collect())
            .collect();

        Ok(TabularResult::new(columns, rows))
    }
}

fn cell_text(row: &SqliteRow, index: usize) -> String {
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.unwrap_or_default();
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map(|v| v.to_string()).unwrap_or_default();
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map(|v| v.to_string()).unwrap_or_default();
    }
    if let Ok(Some(bytes)) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return format!("<{} bytes>", bytes.len());
    }
    String::new()
}

#[derive(Clone)]
pub enum DataSource {
    Memory(MemoryExecutor),
    Sqlite(SqliteExecutor),
}

impl DataSource {
    pub fn memory() -> Self {
        Self::Memory(MemoryExecutor::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        Ok(Self::Sqlite(SqliteExecutor::connect(database_url).await?))
    }
}

impl QueryExecutor for DataSource {
    async fn execute(&self, template: &str) -> Result<TabularResult> {
        match self {
            DataSource::Memory(executor) => executor.execute(template).await,
            DataSource::Sqlite(executor) => executor.execute(template).await,
        }
    }
}
