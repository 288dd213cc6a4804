//! The reconciliation loop: three independently schedulable entry points
//! that keep the local result store and the remote tag state converged.
//! Per-document failures are counted in the pass summary; only an
//! unreachable store or a failed remote listing aborts a pass.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::db::Database;
use crate::error::RemoteError;
use crate::models::{AnomalyLog, DocumentType, PassSummary, ProcessedDocument};
use crate::services::detector;
use crate::services::paperless::{PaperlessClient, RemoteDocument};
use crate::services::tags;

const POLL_HIGH_WATER_KEY: &str = "poll_high_water";

enum DocOutcome {
    Processed,
    Orphaned,
    Failed,
}

pub struct Reconciler {
    db: Arc<Mutex<Database>>,
    client: PaperlessClient,
    settings: Settings,
}

impl Reconciler {
    pub fn new(db: Arc<Mutex<Database>>, client: PaperlessClient, settings: Settings) -> Self {
        Reconciler {
            db,
            client,
            settings,
        }
    }

    fn lock_db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| anyhow!("DB lock poisoned"))
    }

    /// Full detect-and-sync for documents the store has never seen, driven by
    /// a modified-since high-water mark.
    pub async fn scan_new(&self) -> Result<PassSummary> {
        let high_water = self
            .lock_db()?
            .get_setting(POLL_HIGH_WATER_KEY)?
            .and_then(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .ok()
                    .map(|t| t.with_timezone(&Utc))
            });

        let documents = self
            .client
            .list_documents(high_water)
            .await
            .map_err(|e| anyhow!("document listing failed: {e}"))?;
        info!(count = documents.len(), "scan: candidate documents");

        let deadline = self.deadline();
        let mut summary = PassSummary::default();
        let mut max_modified = high_water;

        for (idx, doc) in documents.iter().enumerate() {
            if deadline_passed(deadline) {
                warn!("pass timeout reached, abandoning remaining documents");
                summary.skipped += documents.len() - idx;
                break;
            }
            if let Some(modified) = doc.modified {
                if max_modified.map(|m| modified > m).unwrap_or(true) {
                    max_modified = Some(modified);
                }
            }
            if self.lock_db()?.get_document(doc.id)?.is_some() {
                debug!(doc_id = doc.id, "already processed, skipping");
                summary.skipped += 1;
                continue;
            }
            self.run_detection(doc, &mut summary).await?;
        }

        // A failed document must be seen again next cycle; hold the mark back
        // until a clean pass.
        if summary.failed == 0 {
            if let Some(mark) = max_modified {
                self.lock_db()?
                    .set_setting(POLL_HIGH_WATER_KEY, &mark.to_rfc3339())?;
            }
        }

        info!(?summary, "scan complete");
        Ok(summary)
    }

    /// Full detect-and-sync over every remote document the store has never
    /// seen, regardless of age. Used to seed an existing repository.
    pub async fn backfill_all(&self) -> Result<PassSummary> {
        let documents = self
            .client
            .list_documents(None)
            .await
            .map_err(|e| anyhow!("document listing failed: {e}"))?;
        info!(count = documents.len(), "backfill: total remote documents");

        let deadline = self.deadline();
        let mut summary = PassSummary::default();

        for (idx, doc) in documents.iter().enumerate() {
            if deadline_passed(deadline) {
                warn!("pass timeout reached, abandoning remaining documents");
                summary.skipped += documents.len() - idx;
                break;
            }
            if self.lock_db()?.get_document(doc.id)?.is_some() {
                summary.skipped += 1;
                continue;
            }
            self.run_detection(doc, &mut summary).await?;
        }

        info!(?summary, "backfill complete");
        Ok(summary)
    }

    /// Re-run full detection for documents whose remote modification
    /// timestamp is newer than the stored processing timestamp. The remote
    /// repository is the master copy.
    pub async fn recheck_modified(&self) -> Result<PassSummary> {
        let documents = self
            .client
            .list_documents(None)
            .await
            .map_err(|e| anyhow!("document listing failed: {e}"))?;

        let deadline = self.deadline();
        let mut summary = PassSummary::default();

        for (idx, doc) in documents.iter().enumerate() {
            if deadline_passed(deadline) {
                warn!("pass timeout reached, abandoning remaining documents");
                summary.skipped += documents.len() - idx;
                break;
            }
            // Unknown documents are the new-document poll's job.
            let Some(existing) = self.lock_db()?.get_document(doc.id)? else {
                continue;
            };
            let Some(modified) = doc.modified else {
                summary.skipped += 1;
                continue;
            };
            if modified <= existing.processed_at {
                summary.skipped += 1;
                continue;
            }
            info!(
                doc_id = doc.id,
                modified = %modified,
                processed = %existing.processed_at,
                "modified since last processing, re-running detection"
            );
            self.run_detection(doc, &mut summary).await?;
        }

        info!(?summary, "modification recheck complete");
        Ok(summary)
    }

    /// Re-project stored results onto remote tags without re-running
    /// detection. Corrects drift and migrates legacy bare tag names.
    pub async fn sync_tags(&self) -> Result<PassSummary> {
        let stored = self.lock_db()?.all_documents()?;
        info!(count = stored.len(), "tag sync: stored documents");

        let deadline = self.deadline();
        let mut summary = PassSummary::default();

        for (idx, doc) in stored.iter().enumerate() {
            if deadline_passed(deadline) {
                warn!("pass timeout reached, abandoning remaining documents");
                summary.skipped += stored.len() - idx;
                break;
            }
            let logs = self.lock_db()?.anomaly_logs_for(doc.paperless_doc_id)?;
            let desired = tags::project_tags(&logs);
            match self
                .client
                .replace_anomaly_tags(doc.paperless_doc_id, &desired)
                .await
            {
                Ok(_) => summary.processed += 1,
                Err(RemoteError::NotFound) => {
                    self.remove_orphan(doc.paperless_doc_id)?;
                    summary.orphaned += 1;
                }
                Err(e) => {
                    warn!(doc_id = doc.paperless_doc_id, error = %e, "tag sync failed");
                    summary.failed += 1;
                }
            }
        }

        info!(?summary, "tag sync complete");
        Ok(summary)
    }

    async fn run_detection(
        &self,
        doc: &RemoteDocument,
        summary: &mut PassSummary,
    ) -> Result<()> {
        match self.process_document(doc).await? {
            DocOutcome::Processed => summary.processed += 1,
            DocOutcome::Orphaned => summary.orphaned += 1,
            DocOutcome::Failed => summary.failed += 1,
        }
        Ok(())
    }

    /// One full detect-store-project-mutate cycle for a single document.
    /// Remote trouble is folded into the outcome; a store failure propagates
    /// and aborts the whole pass before any remote mutation for this
    /// document.
    async fn process_document(&self, remote: &RemoteDocument) -> Result<DocOutcome> {
        let doc_id = remote.id;

        let content = match &remote.content {
            Some(content) => content.clone(),
            None => match self.client.get_document_content(doc_id).await {
                Ok(content) => content,
                Err(RemoteError::NotFound) => {
                    self.remove_orphan(doc_id)?;
                    return Ok(DocOutcome::Orphaned);
                }
                Err(e) => {
                    warn!(doc_id, error = %e, "failed to fetch document content");
                    return Ok(DocOutcome::Failed);
                }
            },
        };
        if content.is_empty() {
            warn!(doc_id, "no OCR content available, detectors will see empty text");
        }

        let outcome = detector::detect(&remote.title, &content, &self.settings);
        let now = Utc::now();

        let logs: Vec<AnomalyLog> = outcome
            .findings
            .iter()
            .map(|finding| AnomalyLog {
                id: uuid::Uuid::new_v4().to_string(),
                paperless_doc_id: doc_id,
                anomaly_type: finding.anomaly_type,
                severity: finding.severity,
                description: finding.description.clone(),
                amount: finding.amount,
                detected_at: now,
                resolved: false,
            })
            .collect();

        let record = ProcessedDocument {
            paperless_doc_id: doc_id,
            title: remote.title.clone(),
            document_type: outcome.document_type,
            processed_at: now,
            remote_modified_at: remote.modified,
            has_anomalies: outcome.has_anomalies(),
            balance_status: outcome.balance.status,
            balance_diff: outcome.balance.diff,
            beginning_balance: outcome.balance.beginning,
            ending_balance: outcome.balance.ending,
            credits_total: outcome.balance.credits_total,
            debits_total: outcome.balance.debits_total,
            layout_score: outcome.layout.score,
            layout_issues: outcome.layout.issues.clone(),
        };

        self.lock_db()?.replace_document(&record, &logs)?;
        info!(
            doc_id,
            document_type = record.document_type.as_str(),
            anomalies = logs.len(),
            "detection results stored"
        );

        let desired = tags::project_tags(&logs);
        match self.client.replace_anomaly_tags(doc_id, &desired).await {
            Ok(_) => {}
            Err(RemoteError::NotFound) => {
                self.remove_orphan(doc_id)?;
                return Ok(DocOutcome::Orphaned);
            }
            Err(e) => {
                // Stored results are good; the next sync pass repairs the tags.
                warn!(doc_id, error = %e, "tag replacement failed");
                return Ok(DocOutcome::Failed);
            }
        }

        self.push_metadata(doc_id, &record).await;
        Ok(DocOutcome::Processed)
    }

    /// Push the inferred type and audit custom fields. Best-effort: these are
    /// conveniences layered over the tag state, and the next full pass
    /// rewrites them anyway.
    async fn push_metadata(&self, doc_id: i64, record: &ProcessedDocument) {
        if record.document_type != DocumentType::Unknown {
            if let Err(e) = self
                .client
                .set_document_type(doc_id, record.document_type.as_str())
                .await
            {
                warn!(doc_id, error = %e, "failed to push document type");
            }
        }

        if let Err(e) = self
            .client
            .set_custom_field(
                doc_id,
                "balance_check_status",
                json!(record.balance_status.as_str()),
                "string",
            )
            .await
        {
            warn!(doc_id, error = %e, "failed to push balance status field");
        }
        if let Some(diff) = record.balance_diff {
            let rounded = (diff * 100.0).round() / 100.0;
            if let Err(e) = self
                .client
                .set_custom_field(doc_id, "balance_diff_amount", json!(rounded), "float")
                .await
            {
                warn!(doc_id, error = %e, "failed to push balance diff field");
            }
        }
        if let Some(score) = record.layout_score {
            let rounded = (score * 100.0).round() / 100.0;
            if let Err(e) = self
                .client
                .set_custom_field(doc_id, "layout_score", json!(rounded), "float")
                .await
            {
                warn!(doc_id, error = %e, "failed to push layout score field");
            }
        }
    }

    fn remove_orphan(&self, doc_id: i64) -> Result<()> {
        info!(doc_id, "remote document gone, removing local records");
        let removed = self.lock_db()?.delete_document(doc_id)?;
        if !removed {
            debug!(doc_id, "no local record existed");
        }
        Ok(())
    }

    fn deadline(&self) -> Option<Instant> {
        self.settings.pass_timeout.map(|t| Instant::now() + t)
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.map(|d| Instant::now() >= d).unwrap_or(false)
}
