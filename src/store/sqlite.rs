use super::CheckpointStore;
use crate::error::StoreError;
use crate::models::{
    ActionItem, RunId, RunInput, RunResults, RunStatus, RunStatusView, Settlement, UnitRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::debug;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS runs (
        run_id      TEXT PRIMARY KEY,
        target_url  TEXT NOT NULL,
        locale      TEXT NOT NULL,
        status      TEXT NOT NULL,
        progress    REAL NOT NULL DEFAULT 0,
        error       TEXT,
        started_at  TEXT,
        finished_at TEXT,
        created_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS unit_results (
        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id      TEXT NOT NULL REFERENCES runs(run_id),
        unit_id     TEXT NOT NULL,
        settlement  TEXT NOT NULL,
        recorded_at TEXT NOT NULL,
        UNIQUE (run_id, unit_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS action_plans (
        run_id     TEXT PRIMARY KEY REFERENCES runs(run_id),
        items      TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
];

/// SQLite-backed checkpoint store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool. Call [`SqliteStore::migrate`] before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open `database_url`, creating the file and schema when missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // each connection to an in-memory database is a separate database
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(options)
                .await?
        };
        let store = Self::new(pool);
        store.migrate().await?;
        debug!(database_url, "checkpoint_store_ready");
        Ok(store)
    }

    /// Create the tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn run_exists(&self, run_id: &RunId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM runs WHERE run_id = ?")
            .bind(run_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn settled_units(&self, run_id: &RunId) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT unit_id FROM unit_results WHERE run_id = ? ORDER BY seq ASC")
            .bind(run_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("unit_id").map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn create_run(&self, run_id: &RunId, input: &RunInput) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO runs (run_id, target_url, locale, status, progress, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(run_id.as_str())
        .bind(&input.target_url)
        .bind(&input.locale)
        .bind(RunStatus::Pending.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_result(
        &self,
        run_id: &RunId,
        unit_id: &str,
        settlement: &Settlement,
    ) -> Result<(), StoreError> {
        if !self.run_exists(run_id).await? {
            return Err(StoreError::NotFound(run_id.clone()));
        }
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO unit_results (run_id, unit_id, settlement, recorded_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(run_id.as_str())
        .bind(unit_id)
        .bind(serde_json::to_string(settlement)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_status(&self, status: &RunStatusView) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE runs
            SET status = ?, progress = ?, error = ?, started_at = ?, finished_at = ?
            WHERE run_id = ?
            "#,
        )
        .bind(status.status.as_str())
        .bind(status.progress)
        .bind(&status.error)
        .bind(status.started_at)
        .bind(status.finished_at)
        .bind(status.run_id.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(status.run_id.clone()));
        }
        Ok(())
    }

    async fn append_action_plan(
        &self,
        run_id: &RunId,
        items: &[ActionItem],
    ) -> Result<(), StoreError> {
        if !self.run_exists(run_id).await? {
            return Err(StoreError::NotFound(run_id.clone()));
        }
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO action_plans (run_id, items, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(run_id.as_str())
        .bind(serde_json::to_string(items)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_status(&self, run_id: &RunId) -> Result<RunStatusView, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT status, progress, error, started_at, finished_at
            FROM runs
            WHERE run_id = ?
            "#,
        )
        .bind(run_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(run_id.clone()))?;

        let status: String = row.try_get("status")?;
        Ok(RunStatusView {
            run_id: run_id.clone(),
            status: RunStatus::from_str(&status).map_err(StoreError::Corrupt)?,
            progress: row.try_get("progress")?,
            settled_units: self.settled_units(run_id).await?,
            error: row.try_get("error")?,
            started_at: row.try_get::<Option<DateTime<Utc>>, _>("started_at")?,
            finished_at: row.try_get::<Option<DateTime<Utc>>, _>("finished_at")?,
        })
    }

    async fn load_results(&self, run_id: &RunId) -> Result<RunResults, StoreError> {
        let status = self.load_status(run_id).await?;

        let run = sqlx::query("SELECT target_url, locale FROM runs WHERE run_id = ?")
            .bind(run_id.as_str())
            .fetch_one(&self.pool)
            .await?;
        let input = RunInput::new(
            run.try_get::<String, _>("target_url")?,
            run.try_get::<String, _>("locale")?,
        );

        let rows = sqlx::query(
            r#"
            SELECT unit_id, settlement, recorded_at
            FROM unit_results
            WHERE run_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(run_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        let mut units = Vec::with_capacity(rows.len());
        for row in rows {
            let settlement: String = row.try_get("settlement")?;
            units.push(UnitRecord {
                unit_id: row.try_get("unit_id")?,
                settlement: serde_json::from_str(&settlement)?,
                recorded_at: row.try_get("recorded_at")?,
            });
        }

        let action_plan = sqlx::query("SELECT items FROM action_plans WHERE run_id = ?")
            .bind(run_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.try_get::<String, _>("items"))
            .transpose()?
            .map(|items| serde_json::from_str(&items))
            .transpose()?;

        Ok(RunResults {
            input,
            status,
            units,
            action_plan,
        })
    }
}
