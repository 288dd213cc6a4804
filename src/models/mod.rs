use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    BankStatement,
    CreditCard,
    Invoice,
    Receipt,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::BankStatement => "bank_statement",
            DocumentType::CreditCard => "credit_card",
            DocumentType::Invoice => "invoice",
            DocumentType::Receipt => "receipt",
            DocumentType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bank_statement" => Some(DocumentType::BankStatement),
            "credit_card" => Some(DocumentType::CreditCard),
            "invoice" => Some(DocumentType::Invoice),
            "receipt" => Some(DocumentType::Receipt),
            "unknown" => Some(DocumentType::Unknown),
            _ => None,
        }
    }

    /// Types where beginning/ending balance arithmetic is meaningful.
    pub fn supports_balance_check(&self) -> bool {
        matches!(self, DocumentType::BankStatement | DocumentType::CreditCard)
    }

    /// Types expected to carry a "total" line somewhere in the document.
    pub fn expects_total_line(&self) -> bool {
        matches!(
            self,
            DocumentType::Invoice | DocumentType::Receipt | DocumentType::CreditCard
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceStatus {
    Pass,
    Fail,
    Warning,
    NotApplicable,
}

impl BalanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceStatus::Pass => "PASS",
            BalanceStatus::Fail => "FAIL",
            BalanceStatus::Warning => "WARNING",
            BalanceStatus::NotApplicable => "NOT_APPLICABLE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PASS" => Some(BalanceStatus::Pass),
            "FAIL" => Some(BalanceStatus::Fail),
            "WARNING" => Some(BalanceStatus::Warning),
            "NOT_APPLICABLE" => Some(BalanceStatus::NotApplicable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    BalanceMismatch,
    LayoutIrregularity,
    DuplicateLines,
    ReversedColumns,
    TruncatedTotal,
    PageDiscontinuity,
    CheckSequenceGap,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::BalanceMismatch => "balance_mismatch",
            AnomalyType::LayoutIrregularity => "layout_irregularity",
            AnomalyType::DuplicateLines => "duplicate_lines",
            AnomalyType::ReversedColumns => "reversed_columns",
            AnomalyType::TruncatedTotal => "truncated_total",
            AnomalyType::PageDiscontinuity => "page_discontinuity",
            AnomalyType::CheckSequenceGap => "check_sequence_gap",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "balance_mismatch" => Some(AnomalyType::BalanceMismatch),
            "layout_irregularity" => Some(AnomalyType::LayoutIrregularity),
            "duplicate_lines" => Some(AnomalyType::DuplicateLines),
            "reversed_columns" => Some(AnomalyType::ReversedColumns),
            "truncated_total" => Some(AnomalyType::TruncatedTotal),
            "page_discontinuity" => Some(AnomalyType::PageDiscontinuity),
            "check_sequence_gap" => Some(AnomalyType::CheckSequenceGap),
            _ => None,
        }
    }
}

/// One line-addressable layout problem, stored as JSON on the parent document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutIssue {
    pub line: usize,
    pub sample: String,
    pub issue: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub paperless_doc_id: i64,
    pub title: String,
    pub document_type: DocumentType,
    pub processed_at: DateTime<Utc>,
    pub remote_modified_at: Option<DateTime<Utc>>,
    pub has_anomalies: bool,
    pub balance_status: BalanceStatus,
    pub balance_diff: Option<f64>,
    pub beginning_balance: Option<f64>,
    pub ending_balance: Option<f64>,
    pub credits_total: Option<f64>,
    pub debits_total: Option<f64>,
    pub layout_score: Option<f64>,
    pub layout_issues: Vec<LayoutIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyLog {
    pub id: String,
    pub paperless_doc_id: i64,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub description: String,
    pub amount: Option<f64>,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceReport {
    pub status: BalanceStatus,
    pub beginning: Option<f64>,
    pub ending: Option<f64>,
    pub credits_total: Option<f64>,
    pub debits_total: Option<f64>,
    pub expected: Option<f64>,
    pub diff: Option<f64>,
}

impl BalanceReport {
    pub fn not_applicable() -> Self {
        BalanceReport {
            status: BalanceStatus::NotApplicable,
            beginning: None,
            ending: None,
            credits_total: None,
            debits_total: None,
            expected: None,
            diff: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutReport {
    pub score: Option<f64>,
    pub issues: Vec<LayoutIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub description: String,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionOutcome {
    pub document_type: DocumentType,
    pub balance: BalanceReport,
    pub layout: LayoutReport,
    pub findings: Vec<Finding>,
}

impl DetectionOutcome {
    pub fn has_anomalies(&self) -> bool {
        !self.findings.is_empty()
    }
}

/// Aggregate result of one reconciliation pass. Per-document failures are
/// counted, never raised.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PassSummary {
    pub processed: usize,
    pub skipped: usize,
    pub orphaned: usize,
    pub failed: usize,
}

impl std::fmt::Display for PassSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed={} skipped={} orphaned={} failed={}",
            self.processed, self.skipped, self.orphaned, self.failed
        )
    }
}
