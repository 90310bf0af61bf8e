//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete
//! implementation of the `ReportStore` port from the `core` crate. It handles
//! all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mail_report_core::domain::{MessageReference, StoredReport, SummaryDocument};
use mail_report_core::ports::{PortError, PortResult, ReportStore};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ReportStore` port.
#[derive(Clone)]
pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    /// Creates a new `PgReportStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn load_references(&self, report_id: Uuid) -> PortResult<Vec<MessageReference>> {
        let records: Vec<ReferenceRecord> = sqlx::query_as(
            "SELECT message_id, thread_id, subject, from_addr, to_addr, sent_at, snippet, deep_link \
             FROM email_references WHERE report_id = $1 ORDER BY position ASC",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn hydrate(&self, record: ReportRecord) -> PortResult<StoredReport> {
        let references = self.load_references(record.id).await?;
        Ok(record.to_domain(references))
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ReportRecord {
    id: Uuid,
    date: NaiveDate,
    summary_json: Json<SummaryDocument>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ReportRecord {
    fn to_domain(self, references: Vec<MessageReference>) -> StoredReport {
        StoredReport {
            id: self.id,
            date: self.date,
            summary: self.summary_json.0,
            references,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ReferenceRecord {
    message_id: String,
    thread_id: String,
    subject: Option<String>,
    from_addr: Option<String>,
    to_addr: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    snippet: String,
    deep_link: String,
}
impl ReferenceRecord {
    fn to_domain(self) -> MessageReference {
        MessageReference {
            message_id: self.message_id,
            thread_id: self.thread_id,
            subject: self.subject,
            from_addr: self.from_addr,
            to_addr: self.to_addr,
            timestamp: self.sent_at,
            snippet: self.snippet,
            deep_link: self.deep_link,
        }
    }
}

const REPORT_COLUMNS: &str = "id, date, summary_json, created_at, updated_at";

//=========================================================================================
// `ReportStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReportStore for PgReportStore {
    async fn save(
        &self,
        date: NaiveDate,
        summary: &SummaryDocument,
        references: &[MessageReference],
    ) -> PortResult<Uuid> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Upsert by date: a rerun for the same day replaces the summary and
        // the full reference list, keeping the original row id.
        let (report_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO reports (id, date, summary_json) VALUES ($1, $2, $3) \
             ON CONFLICT (date) DO UPDATE \
             SET summary_json = EXCLUDED.summary_json, updated_at = NOW() \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(date)
        .bind(Json(summary))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        sqlx::query("DELETE FROM email_references WHERE report_id = $1")
            .bind(report_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        for (position, reference) in references.iter().enumerate() {
            sqlx::query(
                "INSERT INTO email_references \
                 (id, report_id, position, message_id, thread_id, subject, from_addr, to_addr, sent_at, snippet, deep_link) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(Uuid::new_v4())
            .bind(report_id)
            .bind(position as i32)
            .bind(&reference.message_id)
            .bind(&reference.thread_id)
            .bind(&reference.subject)
            .bind(&reference.from_addr)
            .bind(&reference.to_addr)
            .bind(reference.timestamp)
            .bind(&reference.snippet)
            .bind(&reference.deep_link)
            .execute(&mut *tx)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(report_id)
    }

    async fn get_by_id(&self, id: Uuid) -> PortResult<StoredReport> {
        let record: ReportRecord = sqlx::query_as(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Report {} not found", id)),
            _ => PortError::Unexpected(e.to_string()),
        })?;

        self.hydrate(record).await
    }

    async fn get_by_date(&self, date: NaiveDate) -> PortResult<StoredReport> {
        let record: ReportRecord = sqlx::query_as(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE date = $1 \
             ORDER BY updated_at DESC LIMIT 1"
        ))
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Report for {} not found", date))
            }
            _ => PortError::Unexpected(e.to_string()),
        })?;

        self.hydrate(record).await
    }

    async fn list(
        &self,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> PortResult<Vec<StoredReport>> {
        let records: Vec<ReportRecord> = sqlx::query_as(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports \
             WHERE ($1::date IS NULL OR date >= $1) \
               AND ($2::date IS NULL OR date <= $2) \
             ORDER BY date DESC"
        ))
        .bind(date_from)
        .bind(date_to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let mut reports = Vec::with_capacity(records.len());
        for record in records {
            reports.push(self.hydrate(record).await?);
        }
        Ok(reports)
    }

    async fn delete(&self, id: Uuid) -> PortResult<bool> {
        // References are removed by the ON DELETE CASCADE constraint.
        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
