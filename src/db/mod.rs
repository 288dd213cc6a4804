use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::models::{
    AnomalyLog, AnomalyType, BalanceStatus, DocumentType, LayoutIssue, ProcessedDocument, Severity,
};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid enum value for {field}: {value}")]
    InvalidEnum { field: &'static str, value: String },

    #[error("invalid JSON in {field}: {source}")]
    Json {
        field: &'static str,
        source: serde_json::Error,
    },
}

/// Filters for the dashboard-facing range queries.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub anomaly_type: Option<AnomalyType>,
    pub has_anomalies: Option<bool>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub processed_from: Option<DateTime<Utc>>,
    pub processed_to: Option<DateTime<Utc>>,
}

pub struct Database {
    conn: Connection,
}

const DOCUMENT_COLUMNS: &str = "paperless_doc_id, title, document_type, processed_at, \
     remote_modified_at, has_anomalies, balance_status, balance_diff, beginning_balance, \
     ending_balance, credits_total, debits_total, layout_score, layout_issues";

const LOG_COLUMNS: &str =
    "id, paperless_doc_id, anomaly_type, severity, description, amount, detected_at, resolved";

impl Database {
    pub fn new(db_path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let mut db = Database { conn };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let mut db = Database { conn };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&mut self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;

        let migrations = vec![
            (
                "001_create_processed_documents.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/001_create_processed_documents.sql"
                )),
            ),
            (
                "002_create_anomaly_logs.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/002_create_anomaly_logs.sql"
                )),
            ),
            (
                "003_create_settings.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/003_create_settings.sql"
                )),
            ),
        ];

        for (name, sql) in migrations {
            let applied: Option<String> = self
                .conn
                .query_row(
                    "SELECT name FROM schema_migrations WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;

            if applied.is_none() {
                let tx = self.conn.transaction()?;
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, datetime('now'))",
                    params![name],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    }

    /// Replace a document's stored results and its entire finding set in one
    /// transaction. Re-detection never merges with previous rows.
    pub fn replace_document(
        &mut self,
        doc: &ProcessedDocument,
        logs: &[AnomalyLog],
    ) -> Result<(), DatabaseError> {
        let layout_issues = serde_json::to_string(&doc.layout_issues).map_err(|e| {
            DatabaseError::Json {
                field: "layout_issues",
                source: e,
            }
        })?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM anomaly_logs WHERE paperless_doc_id = ?1",
            params![doc.paperless_doc_id],
        )?;
        tx.execute(
            "DELETE FROM processed_documents WHERE paperless_doc_id = ?1",
            params![doc.paperless_doc_id],
        )?;
        tx.execute(
            "INSERT INTO processed_documents (
                paperless_doc_id, title, document_type, processed_at, remote_modified_at,
                has_anomalies, balance_status, balance_diff, beginning_balance, ending_balance,
                credits_total, debits_total, layout_score, layout_issues
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                doc.paperless_doc_id,
                doc.title,
                doc.document_type.as_str(),
                doc.processed_at,
                doc.remote_modified_at,
                doc.has_anomalies,
                doc.balance_status.as_str(),
                doc.balance_diff,
                doc.beginning_balance,
                doc.ending_balance,
                doc.credits_total,
                doc.debits_total,
                doc.layout_score,
                layout_issues,
            ],
        )?;
        for log in logs {
            tx.execute(
                "INSERT INTO anomaly_logs (
                    id, paperless_doc_id, anomaly_type, severity, description, amount,
                    detected_at, resolved
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    log.id,
                    log.paperless_doc_id,
                    log.anomaly_type.as_str(),
                    log.severity.as_str(),
                    log.description,
                    log.amount,
                    log.detected_at,
                    log.resolved,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove a document and its findings. Log rows first, then the parent,
    /// inside one transaction. Returns whether a parent row existed.
    pub fn delete_document(&mut self, paperless_doc_id: i64) -> Result<bool, DatabaseError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM anomaly_logs WHERE paperless_doc_id = ?1",
            params![paperless_doc_id],
        )?;
        let removed = tx.execute(
            "DELETE FROM processed_documents WHERE paperless_doc_id = ?1",
            params![paperless_doc_id],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn get_document(
        &self,
        paperless_doc_id: i64,
    ) -> Result<Option<ProcessedDocument>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM processed_documents WHERE paperless_doc_id = ?1"
        ))?;
        let row = stmt
            .query_row(params![paperless_doc_id], document_row)
            .optional()?;
        row.map(document_from_row).transpose()
    }

    pub fn all_documents(&self) -> Result<Vec<ProcessedDocument>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM processed_documents ORDER BY processed_at DESC"
        ))?;
        let rows = stmt.query_map([], document_row)?;
        rows.map(|r| document_from_row(r?)).collect()
    }

    pub fn anomaly_logs_for(&self, paperless_doc_id: i64) -> Result<Vec<AnomalyLog>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM anomaly_logs WHERE paperless_doc_id = ?1 ORDER BY detected_at"
        ))?;
        let rows = stmt.query_map(params![paperless_doc_id], log_row)?;
        rows.map(|r| log_from_row(r?)).collect()
    }

    /// Range query over documents for the dashboard collaborator. The core
    /// never calls this.
    pub fn documents_filtered(
        &self,
        filter: &DocumentFilter,
    ) -> Result<Vec<ProcessedDocument>, DatabaseError> {
        let mut sql = format!("SELECT {DOCUMENT_COLUMNS} FROM processed_documents WHERE 1=1");
        let mut args: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(anomaly_type) = filter.anomaly_type {
            args.push(anomaly_type.as_str().to_string().into());
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM anomaly_logs a \
                 WHERE a.paperless_doc_id = processed_documents.paperless_doc_id \
                 AND a.anomaly_type = ?{})",
                args.len()
            ));
        }
        if let Some(has_anomalies) = filter.has_anomalies {
            args.push((has_anomalies as i64).into());
            sql.push_str(&format!(" AND has_anomalies = ?{}", args.len()));
        }
        if let Some(min) = filter.min_amount {
            args.push(min.into());
            sql.push_str(&format!(" AND ABS(balance_diff) >= ?{}", args.len()));
        }
        if let Some(max) = filter.max_amount {
            args.push(max.into());
            sql.push_str(&format!(" AND ABS(balance_diff) <= ?{}", args.len()));
        }
        if let Some(from) = filter.processed_from {
            args.push(from.to_rfc3339().into());
            sql.push_str(&format!(" AND processed_at >= ?{}", args.len()));
        }
        if let Some(to) = filter.processed_to {
            args.push(to.to_rfc3339().into());
            sql.push_str(&format!(" AND processed_at <= ?{}", args.len()));
        }
        sql.push_str(" ORDER BY processed_at DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), document_row)?;
        rows.map(|r| document_from_row(r?)).collect()
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut stmt = self.conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        Ok(stmt.query_row(params![key], |row| row.get(0)).optional()?)
    }
}

struct DocumentRow {
    paperless_doc_id: i64,
    title: String,
    document_type: String,
    processed_at: DateTime<Utc>,
    remote_modified_at: Option<DateTime<Utc>>,
    has_anomalies: bool,
    balance_status: String,
    balance_diff: Option<f64>,
    beginning_balance: Option<f64>,
    ending_balance: Option<f64>,
    credits_total: Option<f64>,
    debits_total: Option<f64>,
    layout_score: Option<f64>,
    layout_issues: String,
}

fn document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        paperless_doc_id: row.get(0)?,
        title: row.get(1)?,
        document_type: row.get(2)?,
        processed_at: row.get(3)?,
        remote_modified_at: row.get(4)?,
        has_anomalies: row.get(5)?,
        balance_status: row.get(6)?,
        balance_diff: row.get(7)?,
        beginning_balance: row.get(8)?,
        ending_balance: row.get(9)?,
        credits_total: row.get(10)?,
        debits_total: row.get(11)?,
        layout_score: row.get(12)?,
        layout_issues: row.get(13)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<ProcessedDocument, DatabaseError> {
    let document_type =
        DocumentType::parse(&row.document_type).ok_or_else(|| DatabaseError::InvalidEnum {
            field: "document_type",
            value: row.document_type.clone(),
        })?;
    let balance_status =
        BalanceStatus::parse(&row.balance_status).ok_or_else(|| DatabaseError::InvalidEnum {
            field: "balance_status",
            value: row.balance_status.clone(),
        })?;
    let layout_issues: Vec<LayoutIssue> =
        serde_json::from_str(&row.layout_issues).map_err(|e| DatabaseError::Json {
            field: "layout_issues",
            source: e,
        })?;

    Ok(ProcessedDocument {
        paperless_doc_id: row.paperless_doc_id,
        title: row.title,
        document_type,
        processed_at: row.processed_at,
        remote_modified_at: row.remote_modified_at,
        has_anomalies: row.has_anomalies,
        balance_status,
        balance_diff: row.balance_diff,
        beginning_balance: row.beginning_balance,
        ending_balance: row.ending_balance,
        credits_total: row.credits_total,
        debits_total: row.debits_total,
        layout_score: row.layout_score,
        layout_issues,
    })
}

struct LogRow {
    id: String,
    paperless_doc_id: i64,
    anomaly_type: String,
    severity: String,
    description: String,
    amount: Option<f64>,
    detected_at: DateTime<Utc>,
    resolved: bool,
}

fn log_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogRow> {
    Ok(LogRow {
        id: row.get(0)?,
        paperless_doc_id: row.get(1)?,
        anomaly_type: row.get(2)?,
        severity: row.get(3)?,
        description: row.get(4)?,
        amount: row.get(5)?,
        detected_at: row.get(6)?,
        resolved: row.get(7)?,
    })
}

fn log_from_row(row: LogRow) -> Result<AnomalyLog, DatabaseError> {
    let anomaly_type =
        AnomalyType::parse(&row.anomaly_type).ok_or_else(|| DatabaseError::InvalidEnum {
            field: "anomaly_type",
            value: row.anomaly_type.clone(),
        })?;
    let severity = Severity::parse(&row.severity).ok_or_else(|| DatabaseError::InvalidEnum {
        field: "severity",
        value: row.severity.clone(),
    })?;

    Ok(AnomalyLog {
        id: row.id,
        paperless_doc_id: row.paperless_doc_id,
        anomaly_type,
        severity,
        description: row.description,
        amount: row.amount,
        detected_at: row.detected_at,
        resolved: row.resolved,
    })
}
