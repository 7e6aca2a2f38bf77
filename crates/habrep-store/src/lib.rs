//! Report persistence: the store contract, the Postgres backend, and an
//! in-memory double for tests.

use async_trait::async_trait;
use habrep_core::{Habit, Task, UserReport};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

pub const CRATE_NAME: &str = "habrep-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no report with id {0}")]
    NotFound(i64),
    /// A content-equal report is already stored under the given id. Raised by
    /// the fingerprint uniqueness constraint, so a lost insert race surfaces
    /// here instead of producing a duplicate row.
    #[error("content-equal report already stored as {0}")]
    Duplicate(i64),
    #[error(transparent)]
    Backend(#[from] sqlx::Error),
    #[error("serializing report content: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Narrow persistence contract for reports: insert, lookup by id, lookup by
/// content, close. One production backend (Postgres) and one in-memory test
/// double implement it; callers hold it as a trait object.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Insert and return the store-assigned report id. Fails with
    /// [`StoreError::Duplicate`] when a content-equal report already exists.
    async fn add(&self, report: &UserReport) -> Result<i64, StoreError>;

    /// Load a stored report; the returned report carries its id.
    async fn get_by_id(&self, report_id: i64) -> Result<UserReport, StoreError>;

    /// Id of an already-stored content-equal report, if any.
    async fn find_existing(&self, report: &UserReport) -> Result<Option<i64>, StoreError>;

    /// Release backend resources.
    async fn close(&self);
}

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS user_reports (
    report_id     BIGSERIAL PRIMARY KEY,
    user_id       TEXT NOT NULL,
    fingerprint   TEXT NOT NULL UNIQUE,
    tasks_today   TEXT NOT NULL,
    tasks_delayed TEXT NOT NULL,
    habits_good   TEXT NOT NULL,
    habits_bad    TEXT NOT NULL
)
"#;

const INSERT_SQL: &str = r#"
INSERT INTO user_reports
    (user_id, fingerprint, tasks_today, tasks_delayed, habits_good, habits_bad)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (fingerprint) DO NOTHING
RETURNING report_id
"#;

const FIND_BY_FINGERPRINT_SQL: &str = r#"
SELECT report_id
FROM user_reports
WHERE fingerprint = $1
"#;

const GET_BY_ID_SQL: &str = r#"
SELECT report_id, user_id, tasks_today, tasks_delayed, habits_good, habits_bad
FROM user_reports
WHERE report_id = $1
"#;

/// Pool-backed Postgres store. Each report row holds the user id, the
/// content fingerprint, and the four sequences as serialized JSON text.
pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    /// Connect and create the report table if missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::query(CREATE_TABLE_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn add(&self, report: &UserReport) -> Result<i64, StoreError> {
        let blobs = report.sequence_blobs()?;
        let fingerprint = blobs.fingerprint(&report.user_id);

        let inserted = sqlx::query(INSERT_SQL)
            .bind(&report.user_id)
            .bind(&fingerprint)
            .bind(&blobs.today_tasks)
            .bind(&blobs.delayed_tasks)
            .bind(&blobs.good_habits)
            .bind(&blobs.bad_habits)
            .fetch_optional(&self.pool)
            .await?;

        match inserted {
            Some(row) => Ok(row.try_get("report_id")?),
            // the conflict target ate the insert; hand back the winner's id
            None => {
                let row = sqlx::query(FIND_BY_FINGERPRINT_SQL)
                    .bind(&fingerprint)
                    .fetch_one(&self.pool)
                    .await?;
                Err(StoreError::Duplicate(row.try_get("report_id")?))
            }
        }
    }

    async fn get_by_id(&self, report_id: i64) -> Result<UserReport, StoreError> {
        let row = sqlx::query(GET_BY_ID_SQL)
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(report_id))?;

        Ok(UserReport {
            report_id: Some(row.try_get("report_id")?),
            user_id: row.try_get("user_id")?,
            today_tasks: serde_json::from_str::<Vec<Task>>(&row.try_get::<String, _>("tasks_today")?)?,
            delayed_tasks: serde_json::from_str::<Vec<Task>>(&row.try_get::<String, _>("tasks_delayed")?)?,
            good_habits: serde_json::from_str::<Vec<Habit>>(&row.try_get::<String, _>("habits_good")?)?,
            bad_habits: serde_json::from_str::<Vec<Habit>>(&row.try_get::<String, _>("habits_bad")?)?,
        })
    }

    async fn find_existing(&self, report: &UserReport) -> Result<Option<i64>, StoreError> {
        let fingerprint = report.fingerprint()?;
        let row = sqlx::query(FIND_BY_FINGERPRINT_SQL)
            .bind(&fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("report_id")?)),
            None => Ok(None),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// In-memory [`ReportStore`] with the same dedup semantics as the Postgres
/// backend, for tests and local runs without a database.
#[derive(Default)]
pub struct MemoryReportStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    rows: Vec<MemoryRow>,
}

struct MemoryRow {
    report_id: i64,
    fingerprint: String,
    report: UserReport,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn add(&self, report: &UserReport) -> Result<i64, StoreError> {
        let fingerprint = report.fingerprint()?;
        let mut inner = self.inner.lock().await;

        if let Some(row) = inner.rows.iter().find(|row| row.fingerprint == fingerprint) {
            return Err(StoreError::Duplicate(row.report_id));
        }

        inner.next_id += 1;
        let report_id = inner.next_id;
        let mut stored = report.clone();
        stored.report_id = Some(report_id);
        inner.rows.push(MemoryRow {
            report_id,
            fingerprint,
            report: stored,
        });
        debug!(report_id, "stored report in memory");
        Ok(report_id)
    }

    async fn get_by_id(&self, report_id: i64) -> Result<UserReport, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .rows
            .iter()
            .find(|row| row.report_id == report_id)
            .map(|row| row.report.clone())
            .ok_or(StoreError::NotFound(report_id))
    }

    async fn find_existing(&self, report: &UserReport) -> Result<Option<i64>, StoreError> {
        let fingerprint = report.fingerprint()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .rows
            .iter()
            .find(|row| row.fingerprint == fingerprint)
            .map(|row| row.report_id))
    }

    async fn close(&self) {}
}
