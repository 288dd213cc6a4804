//! Balance arithmetic for statement-like documents:
//! expected = beginning + credits - debits, compared against the printed
//! ending balance.

use crate::models::{BalanceReport, BalanceStatus, DocumentType};
use crate::services::extract;

struct FieldKeywords {
    beginning: &'static [&'static str],
    ending: &'static [&'static str],
    credits: &'static [&'static str],
    debits: &'static [&'static str],
}

const BANK_STATEMENT_FIELDS: FieldKeywords = FieldKeywords {
    beginning: &["beginning balance", "opening balance", "previous balance"],
    ending: &[
        "ending balance",
        "closing balance",
        "current balance",
        "new balance",
    ],
    credits: &[
        "total deposits and credits",
        "deposits and additions",
        "total deposits",
        "total credits",
        "total additions",
    ],
    debits: &[
        "total withdrawals and debits",
        "total withdrawals",
        "total subtractions",
        "total debits",
        "total checks",
        "paper checks paid",
    ],
};

// Charges raise a card balance and payments lower it, so mapping charges to
// credits and payments to debits keeps the single formula valid.
const CREDIT_CARD_FIELDS: FieldKeywords = FieldKeywords {
    beginning: &["previous balance"],
    ending: &["new balance", "statement balance", "current balance"],
    credits: &[
        "purchases and adjustments",
        "total purchases",
        "total charges",
        "fees charged",
    ],
    debits: &["payments and credits", "total payments"],
};

/// Check balance arithmetic. Any missing required field yields
/// `NotApplicable` with no difference; every other verdict carries the four
/// extracted figures for auditability.
pub fn check_balance(
    content: &str,
    doc_type: DocumentType,
    tolerance: f64,
    warning_threshold: f64,
) -> BalanceReport {
    if !doc_type.supports_balance_check() {
        return BalanceReport::not_applicable();
    }

    let fields = match doc_type {
        DocumentType::CreditCard => &CREDIT_CARD_FIELDS,
        _ => &BANK_STATEMENT_FIELDS,
    };

    let beginning = extract::amount_after_keywords(content, fields.beginning);
    let ending = extract::amount_after_keywords(content, fields.ending);
    let credits = extract::amount_after_keywords(content, fields.credits);
    let debits = extract::amount_after_keywords(content, fields.debits);

    let (Some(beginning), Some(ending), Some(credits), Some(debits)) =
        (beginning, ending, credits, debits)
    else {
        tracing::debug!(
            doc_type = doc_type.as_str(),
            "balance fields incomplete, skipping arithmetic"
        );
        return BalanceReport::not_applicable();
    };

    // Work at cent precision so representation error never tips a verdict
    // across the tolerance boundary.
    let expected = round_cents(beginning + credits - debits);
    let diff = round_cents(expected - ending);

    let status = if diff.abs() <= tolerance {
        BalanceStatus::Pass
    } else if diff.abs() <= warning_threshold {
        BalanceStatus::Warning
    } else {
        BalanceStatus::Fail
    };

    BalanceReport {
        status,
        beginning: Some(beginning),
        ending: Some(ending),
        credits_total: Some(credits),
        debits_total: Some(debits),
        expected: Some(expected),
        diff: Some(diff),
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 0.01;
    const WARNING: f64 = 1.00;

    fn statement(beginning: &str, credits: &str, debits: &str, ending: &str) -> String {
        format!(
            "Beginning Balance {beginning}\nTotal Deposits {credits}\n\
             Total Withdrawals {debits}\nEnding Balance {ending}\n"
        )
    }

    #[test]
    fn mismatch_is_a_fail_with_signed_difference() {
        let text = statement("$10,000.00", "$5,000.00", "$3,196.40", "$15,000.00");
        let report = check_balance(&text, DocumentType::BankStatement, TOLERANCE, WARNING);
        assert_eq!(report.status, BalanceStatus::Fail);
        assert_eq!(report.expected, Some(11803.60));
        let diff = report.diff.unwrap();
        assert!((diff - (-3196.40)).abs() < 1e-9, "diff was {diff}");
        assert_eq!(report.beginning, Some(10000.0));
        assert_eq!(report.debits_total, Some(3196.40));
    }

    #[test]
    fn diff_equal_to_tolerance_passes() {
        let text = statement("$100.00", "$50.00", "$25.00", "$125.01");
        let report = check_balance(&text, DocumentType::BankStatement, TOLERANCE, WARNING);
        assert_eq!(report.status, BalanceStatus::Pass);
    }

    #[test]
    fn diff_just_over_tolerance_does_not_pass() {
        let text = statement("$100.00", "$50.00", "$25.00", "$125.02");
        let report = check_balance(&text, DocumentType::BankStatement, TOLERANCE, WARNING);
        assert_eq!(report.status, BalanceStatus::Warning);
    }

    #[test]
    fn diff_beyond_warning_band_fails() {
        let text = statement("$100.00", "$50.00", "$25.00", "$130.00");
        let report = check_balance(&text, DocumentType::BankStatement, TOLERANCE, WARNING);
        assert_eq!(report.status, BalanceStatus::Fail);
    }

    #[test]
    fn missing_field_is_not_applicable() {
        let text = "Beginning Balance $100.00\nEnding Balance $125.00\n";
        let report = check_balance(text, DocumentType::BankStatement, TOLERANCE, WARNING);
        assert_eq!(report.status, BalanceStatus::NotApplicable);
        assert!(report.diff.is_none());
    }

    #[test]
    fn unsupported_type_is_not_applicable() {
        let text = statement("$100.00", "$50.00", "$25.00", "$125.00");
        let report = check_balance(&text, DocumentType::Invoice, TOLERANCE, WARNING);
        assert_eq!(report.status, BalanceStatus::NotApplicable);
    }

    #[test]
    fn credit_card_charges_count_as_credits() {
        let text = "Previous Balance $500.00\nTotal Purchases $250.00\n\
                    Total Payments $100.00\nNew Balance $650.00\n";
        let report = check_balance(text, DocumentType::CreditCard, TOLERANCE, WARNING);
        assert_eq!(report.status, BalanceStatus::Pass);
        assert_eq!(report.expected, Some(650.0));
    }
}
