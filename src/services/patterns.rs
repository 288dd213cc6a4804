//! Rule-based pattern detectors over OCR text: duplicated transactions,
//! amount-first column ordering, missing totals, page sequence problems, and
//! check number gaps.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use crate::models::{AnomalyType, DocumentType, Finding, Severity};
use crate::services::extract;

/// Structural boilerplate that legitimately repeats on every page. Lines
/// containing any of these are never counted as duplicate transactions.
const BOILERPLATE_KEYWORDS: &[&str] = &[
    "page",
    "account",
    "statement",
    "balance",
    "date",
    "description",
    "amount",
    "check",
    "deposit",
    "withdrawal",
    "branch",
    "address",
    "customer service",
    "member fdic",
    "routing",
    "account number",
    "annual percentage yield",
    "apy earned",
    "interest paid",
    "interest earned",
    "average daily balance",
    "minimum balance",
    "overdraft",
    "service charge",
    "maintenance fee",
    "confidential",
    "draft",
    "privileged",
];

const REVERSED_COLUMNS_MIN_LINES: usize = 3;
const CHECK_GAP_REPORT_LIMIT: usize = 5;

pub fn detect(content: &str, doc_type: DocumentType) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(duplicate_lines(content));
    findings.extend(reversed_columns(content));
    findings.extend(truncated_total(content, doc_type));
    findings.extend(page_discontinuity(content));
    if doc_type == DocumentType::BankStatement {
        findings.extend(check_sequence_gap(content));
    }
    findings
}

fn is_boilerplate(line: &str) -> bool {
    let lower = line.to_lowercase();
    BOILERPLATE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// A line counts as transaction-shaped when it carries an amount, or a date
/// together with a check-number token.
fn is_transaction_shaped(line: &str) -> bool {
    extract::has_amount_token(line)
        || (extract::has_date_token(line) && extract::has_check_number_token(line))
}

fn duplicate_lines(content: &str) -> Option<Finding> {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    for line in content.lines() {
        let clean = line.trim();
        if clean.len() <= 20 || !is_transaction_shaped(clean) || is_boilerplate(clean) {
            continue;
        }
        *seen.entry(clean).or_insert(0) += 1;
    }

    let duplicates: Vec<&str> = seen
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(line, _)| *line)
        .collect();
    if duplicates.is_empty() {
        return None;
    }

    let mut description = format!("Found {} duplicate transaction line(s)", duplicates.len());
    if let Some(example) = duplicates.first() {
        let snippet: String = example.chars().take(80).collect();
        description.push_str(&format!(", e.g. {:?}", snippet));
    }
    Some(Finding {
        anomaly_type: AnomalyType::DuplicateLines,
        severity: Severity::Medium,
        description,
        amount: None,
    })
}

/// Amount-first ordering on two-amount transaction lines suggests the debit
/// and description columns swapped during OCR. Kept heuristic on purpose;
/// severity never exceeds medium.
fn reversed_columns(content: &str) -> Option<Finding> {
    let leading_amount = Regex::new(r"^\s*\$[\d,]+\.\d{2}\s+[A-Za-z]").unwrap();
    let count = content
        .lines()
        .filter(|line| extract::amount_token_count(line) >= 2 && leading_amount.is_match(line))
        .count();

    if count < REVERSED_COLUMNS_MIN_LINES {
        return None;
    }
    Some(Finding {
        anomaly_type: AnomalyType::ReversedColumns,
        severity: Severity::Medium,
        description: format!(
            "Possible reversed column order: {count} transaction lines start with an amount"
        ),
        amount: None,
    })
}

fn truncated_total(content: &str, doc_type: DocumentType) -> Option<Finding> {
    if !doc_type.expects_total_line() {
        return None;
    }

    let total_line = Regex::new(r"(?i)\b(total|subtotal|amount due)\b").unwrap();
    let bare_label = Regex::new(r"(?im)^\s*.*\b(total|sum|subtotal)\b[\s:]*$").unwrap();

    if !total_line.is_match(content) {
        return Some(Finding {
            anomaly_type: AnomalyType::TruncatedTotal,
            severity: Severity::Medium,
            description: format!(
                "No total line found in a document of type {}",
                doc_type.as_str()
            ),
            amount: None,
        });
    }
    if bare_label.is_match(content) {
        return Some(Finding {
            anomaly_type: AnomalyType::TruncatedTotal,
            severity: Severity::Medium,
            description: "Total label without corresponding amount".to_string(),
            amount: None,
        });
    }
    None
}

/// Page markers are only ever evidence against a document, never their
/// absence: unmarked documents are not flagged, and a sequence starting past
/// page 1 is treated as an excerpt of a larger document.
fn page_discontinuity(content: &str) -> Option<Finding> {
    let markers = extract::page_markers(content);
    if markers.is_empty() {
        return None;
    }

    let found: BTreeSet<u32> = markers.iter().map(|m| m.page).collect();
    let declared = markers.iter().map(|m| m.total).max()?;
    let min_found = *found.iter().next()?;
    let max_found = *found.iter().last()?;

    if min_found > 1 {
        return None;
    }

    let internal_gaps: Vec<u32> = (min_found..=max_found)
        .filter(|p| !found.contains(p))
        .collect();
    if !internal_gaps.is_empty() {
        let gaps = internal_gaps
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Some(Finding {
            anomaly_type: AnomalyType::PageDiscontinuity,
            severity: Severity::High,
            description: format!(
                "Page stamps missing for page(s) {gaps} between pages {min_found} and {max_found}"
            ),
            amount: None,
        });
    }

    if (found.len() as u32) < declared {
        let missing = declared - found.len() as u32;
        return Some(Finding {
            anomaly_type: AnomalyType::PageDiscontinuity,
            severity: Severity::Medium,
            description: format!(
                "Page headers declare {declared} page(s) but only {} marker(s) found; \
                 {missing} page(s) may be missing",
                found.len()
            ),
            amount: None,
        });
    }
    None
}

fn check_sequence_gap(content: &str) -> Option<Finding> {
    let numbers: BTreeSet<u32> = extract::check_entries(content)
        .into_iter()
        .map(|(number, _)| number)
        .collect();
    if numbers.len() < 2 {
        return None;
    }

    let mut missing = Vec::new();
    let mut iter = numbers.iter().peekable();
    while let (Some(current), Some(next)) = (iter.next(), iter.peek()) {
        for n in current + 1..**next {
            missing.push(n);
        }
    }

    // Large gaps usually mean a new check book, not checks missing from this
    // statement.
    if missing.is_empty() || missing.len() > CHECK_GAP_REPORT_LIMIT {
        return None;
    }

    let listed = missing
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Some(Finding {
        anomaly_type: AnomalyType::CheckSequenceGap,
        severity: Severity::Medium,
        description: format!(
            "Missing check number(s) in sequence: {listed}. \
             These checks may be unaccounted for on this statement."
        ),
        amount: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types_of(findings: &[Finding]) -> Vec<AnomalyType> {
        findings.iter().map(|f| f.anomaly_type).collect()
    }

    #[test]
    fn repeated_page_header_is_not_a_duplicate() {
        // Identical header on every page, transaction-shaped (date + number)
        // but structural boilerplate.
        let header = "Account Number 1234 Statement Period 03/01 - 03/31\n";
        let text = format!("{header}03/02 grocery store purchase 42.17\n{header}");
        assert!(duplicate_lines(&text).is_none());
    }

    #[test]
    fn repeated_transaction_line_is_flagged() {
        let text = "03/02 grocery store purchase downtown $42.17\n\
                    03/02 grocery store purchase downtown $42.17\n";
        let finding = duplicate_lines(text).expect("duplicate expected");
        assert_eq!(finding.anomaly_type, AnomalyType::DuplicateLines);
        assert_eq!(finding.severity, Severity::Medium);
        assert!(finding.description.contains("1 duplicate"));
    }

    #[test]
    fn no_page_markers_never_flags() {
        let text = "just some transactions\n03/02 coffee $4.50\n";
        assert!(page_discontinuity(text).is_none());
    }

    #[test]
    fn missing_trailing_page_is_flagged() {
        let text = "Page 1 of 2\ncontent here\n";
        let finding = page_discontinuity(text).expect("discontinuity expected");
        assert_eq!(finding.anomaly_type, AnomalyType::PageDiscontinuity);
        assert!(finding.description.contains("declare 2"));
    }

    #[test]
    fn complete_marker_sequence_is_clean() {
        let text = "Page 1 of 2\ncontent\nPage 2 of 2\nmore content\n";
        assert!(page_discontinuity(text).is_none());
    }

    #[test]
    fn internal_gap_is_high_severity() {
        let text = "Page 1 of 3\nPage 3 of 3\n";
        let finding = page_discontinuity(text).expect("gap expected");
        assert_eq!(finding.severity, Severity::High);
        assert!(finding.description.contains("2"));
    }

    #[test]
    fn excerpt_starting_past_page_one_is_suppressed() {
        let text = "Page 2 of 5\nPage 3 of 5\n";
        assert!(page_discontinuity(text).is_none());
    }

    #[test]
    fn invoice_without_total_line_is_flagged() {
        let text = "Invoice #12\nWidget A $10.00\nWidget B $20.00\n";
        let finding = truncated_total(text, DocumentType::Invoice).expect("missing total");
        assert_eq!(finding.anomaly_type, AnomalyType::TruncatedTotal);
    }

    #[test]
    fn bare_total_label_is_flagged() {
        let text = "Invoice #12\nWidget A $10.00\nTotal:\n";
        let finding = truncated_total(text, DocumentType::Invoice).expect("bare label");
        assert!(finding.description.contains("without corresponding amount"));
    }

    #[test]
    fn total_with_amount_is_clean() {
        let text = "Invoice #12\nWidget A $10.00\nTotal: $10.00\n";
        assert!(truncated_total(text, DocumentType::Invoice).is_none());
    }

    #[test]
    fn bank_statements_do_not_expect_total_lines() {
        assert!(truncated_total("anything", DocumentType::BankStatement).is_none());
    }

    #[test]
    fn small_check_gap_is_reported() {
        let text = "1051 3/02 $250.00\n1052 3/05 $100.00\n1054 3/09 $75.00\n";
        let finding = check_sequence_gap(text).expect("gap expected");
        assert_eq!(finding.anomaly_type, AnomalyType::CheckSequenceGap);
        assert!(finding.description.contains("1053"));
    }

    #[test]
    fn huge_check_gap_means_new_checkbook() {
        let text = "1051 3/02 $250.00\n2051 3/05 $100.00\n";
        assert!(check_sequence_gap(text).is_none());
    }

    #[test]
    fn amount_first_lines_flag_reversed_columns() {
        let text = "$42.17 grocery store 03/02 balance 1,042.17\n\
                    $18.00 gas station 03/03 balance 1,024.17\n\
                    $7.50 coffee shop 03/04 balance 1,016.67\n";
        let finding = reversed_columns(text).expect("reversal expected");
        assert_eq!(finding.severity, Severity::Medium);
    }

    #[test]
    fn description_first_lines_are_clean() {
        let text = "03/02 grocery store $42.17 1,042.17\n\
                    03/03 gas station $18.00 1,024.17\n\
                    03/04 coffee shop $7.50 1,016.67\n";
        assert!(reversed_columns(text).is_none());
    }

    #[test]
    fn detect_runs_type_gated_rules() {
        let text = "1051 3/02 $250.00\n1052 3/05 $100.00\n1054 3/09 $75.00\n";
        let bank = detect(text, DocumentType::BankStatement);
        assert!(types_of(&bank).contains(&AnomalyType::CheckSequenceGap));
        let invoice = detect(text, DocumentType::Invoice);
        assert!(!types_of(&invoice).contains(&AnomalyType::CheckSequenceGap));
    }
}
