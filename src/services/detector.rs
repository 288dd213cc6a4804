//! Runs the full detector battery over one document's text and metadata.
//! Pure over its inputs: no I/O, no clock, and malformed text degrades to
//! absent findings rather than errors.

use crate::config::Settings;
use crate::models::{
    AnomalyType, BalanceStatus, DetectionOutcome, Finding, Severity,
};
use crate::services::{balance, classify, layout, patterns};

const LAYOUT_CORRUPTION_FAIL_COUNT: usize = 5;

pub fn detect(title: &str, content: &str, settings: &Settings) -> DetectionOutcome {
    let document_type = classify::classify(title, content);

    let balance = balance::check_balance(
        content,
        document_type,
        settings.balance_tolerance,
        settings.balance_warning_threshold,
    );

    let layout = layout::analyze(content);

    let mut findings = Vec::new();

    if balance.status == BalanceStatus::Fail {
        let diff = balance.diff.unwrap_or(0.0);
        findings.push(Finding {
            anomaly_type: AnomalyType::BalanceMismatch,
            severity: balance_severity(diff),
            description: format!("Balance mismatch detected: difference of ${:.2}", diff.abs()),
            amount: Some(diff.abs()),
        });
    }

    let corrupt_lines = layout::corruption_count(&layout.issues);
    if corrupt_lines > LAYOUT_CORRUPTION_FAIL_COUNT {
        findings.push(Finding {
            anomaly_type: AnomalyType::LayoutIrregularity,
            severity: Severity::Medium,
            description: format!(
                "Found {corrupt_lines} lines with OCR artifacts (layout score {:.2})",
                layout.score.unwrap_or(0.0)
            ),
            amount: None,
        });
    }

    findings.extend(patterns::detect(content, document_type));

    DetectionOutcome {
        document_type,
        balance,
        layout,
        findings,
    }
}

fn balance_severity(diff: f64) -> Severity {
    let magnitude = diff.abs();
    if magnitude > 100.0 {
        Severity::High
    } else if magnitude > 10.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn failing_statement_produces_balance_finding() {
        let text = "Bank Statement\n\
                    Beginning Balance $10,000.00\n\
                    Total Deposits $5,000.00\n\
                    Total Withdrawals $3,196.40\n\
                    Ending Balance $15,000.00\n\
                    line\nline\nline\nline\nline\nline\n";
        let outcome = detect("March statement", text, &settings());
        assert_eq!(outcome.document_type, DocumentType::BankStatement);
        assert_eq!(outcome.balance.status, BalanceStatus::Fail);
        assert!(outcome.has_anomalies());
        let finding = outcome
            .findings
            .iter()
            .find(|f| f.anomaly_type == AnomalyType::BalanceMismatch)
            .expect("balance finding");
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.amount, Some(3196.40));
    }

    #[test]
    fn clean_statement_has_no_findings() {
        let text = "Bank Statement\n\
                    Beginning Balance $100.00\n\
                    Total Deposits $50.00\n\
                    Total Withdrawals $25.00\n\
                    Ending Balance $125.00\n\
                    line\nline\nline\nline\nline\nline\n";
        let outcome = detect("March statement", text, &settings());
        assert_eq!(outcome.balance.status, BalanceStatus::Pass);
        assert!(!outcome.has_anomalies());
        assert_eq!(outcome.layout.score, Some(1.0));
    }

    #[test]
    fn warning_band_is_not_an_anomaly() {
        let text = "Bank Statement\n\
                    Beginning Balance $100.00\n\
                    Total Deposits $50.00\n\
                    Total Withdrawals $25.00\n\
                    Ending Balance $125.50\n\
                    line\nline\nline\nline\nline\nline\n";
        let outcome = detect("March statement", text, &settings());
        assert_eq!(outcome.balance.status, BalanceStatus::Warning);
        assert!(!outcome.has_anomalies());
    }

    #[test]
    fn unknown_type_still_runs_layout_and_patterns() {
        let mut text = String::from("mystery content with a repeated entry\n");
        let repeated = "03/02 grocery store purchase downtown $42.17\n";
        text.push_str(repeated);
        text.push_str(repeated);
        for _ in 0..8 {
            text.push_str("ordinary narrative content line\n");
        }
        let outcome = detect("scan_0042", &text, &settings());
        assert_eq!(outcome.document_type, DocumentType::Unknown);
        assert_eq!(outcome.balance.status, BalanceStatus::NotApplicable);
        assert!(outcome
            .findings
            .iter()
            .any(|f| f.anomaly_type == AnomalyType::DuplicateLines));
    }

    #[test]
    fn detection_is_deterministic() {
        let text = "Invoice #44\nWidget $10.00\nTotal:\n";
        let first = detect("Invoice #44", text, &settings());
        let second = detect("Invoice #44", text, &settings());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
