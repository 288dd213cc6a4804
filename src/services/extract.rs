//! Best-effort extractors for noisy OCR text. Everything here returns an
//! `Option` or an empty collection; absence of a value is a normal outcome,
//! not an error.

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMarker {
    pub page: u32,
    pub total: u32,
}

/// Parse a currency amount out of a raw token. Tolerates thousands
/// separators, a leading currency symbol, parenthesized negatives, and stray
/// OCR noise characters stuck to the digits.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let negative = (trimmed.starts_with('(') && trimmed.ends_with(')'))
        || trimmed.starts_with('-')
        || trimmed.starts_with("($");

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    // More than one decimal point means the token is too garbled to trust.
    if cleaned.matches('.').count() > 1 {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Find the first amount following any of the given keywords, e.g.
/// "Ending Balance: $1,234.56". Keywords are matched case-insensitively in
/// the order given.
pub fn amount_after_keywords(content: &str, keywords: &[&str]) -> Option<f64> {
    for keyword in keywords {
        let pattern = format!(
            r"(?i){}[\s:]*(\()?\$?\s*([\d,]+\.?\d*)(\))?",
            regex::escape(keyword)
        );
        let re = Regex::new(&pattern).unwrap();
        if let Some(caps) = re.captures(content) {
            let parenthesized = caps.get(1).is_some() && caps.get(3).is_some();
            if let Some(value) = parse_amount(caps.get(2).unwrap().as_str()) {
                return Some(if parenthesized { -value } else { value });
            }
        }
    }
    None
}

/// All "page N of M" markers in the text. Markers that do not parse as
/// numbers are absent from the result, never guessed at.
pub fn page_markers(content: &str) -> Vec<PageMarker> {
    let re = Regex::new(r"(?i)page\s+(\d+)\s+of\s+(\d+)").unwrap();
    re.captures_iter(content)
        .filter_map(|caps| {
            let page = caps.get(1)?.as_str().parse().ok()?;
            let total = caps.get(2)?.as_str().parse().ok()?;
            Some(PageMarker { page, total })
        })
        .collect()
}

/// Check entries of the form "1234 3/14 $512.00": check number, date, amount.
pub fn check_entries(content: &str) -> Vec<(u32, f64)> {
    let re = Regex::new(r"\b(\d{4})\s+\d{1,2}[-/]\d{1,2}\s+\$?([\d,]+\.\d{2})").unwrap();
    re.captures_iter(content)
        .filter_map(|caps| {
            let number = caps.get(1)?.as_str().parse().ok()?;
            let amount = parse_amount(caps.get(2)?.as_str())?;
            Some((number, amount))
        })
        .collect()
}

pub fn has_amount_token(line: &str) -> bool {
    Regex::new(r"\$\s*[\d,]+\.\d{2}|\b[\d,]+\.\d{2}\b")
        .unwrap()
        .is_match(line)
}

pub fn has_date_token(line: &str) -> bool {
    Regex::new(r"\b\d{1,2}[-/]\d{1,2}(?:[-/]\d{2,4})?\b")
        .unwrap()
        .is_match(line)
}

pub fn has_check_number_token(line: &str) -> bool {
    Regex::new(r"\b\d{4}\b").unwrap().is_match(line)
}

/// Count of amount tokens on a line, for two-amount transaction shapes.
pub fn amount_token_count(line: &str) -> usize {
    Regex::new(r"\$?\s*[\d,]+\.\d{2}\b").unwrap().find_iter(line).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_separated_amounts() {
        assert_eq!(parse_amount("1234.56"), Some(1234.56));
        assert_eq!(parse_amount("$1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("12,887.90"), Some(12887.90));
    }

    #[test]
    fn parenthesized_amounts_are_negative() {
        assert_eq!(parse_amount("(1,234.56)"), Some(-1234.56));
        assert_eq!(parse_amount("($50.00)"), Some(-50.00));
    }

    #[test]
    fn ocr_noise_adjacent_to_digits_is_stripped() {
        assert_eq!(parse_amount("~$1,204"), Some(1204.0));
        assert_eq!(parse_amount("1,234.56~"), Some(1234.56));
    }

    #[test]
    fn garbage_is_absent_not_an_error() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount("1.2.3"), None);
    }

    #[test]
    fn keyword_anchored_amount() {
        let text = "Beginning Balance: $10,000.00\nEnding Balance $15,000.00";
        assert_eq!(
            amount_after_keywords(text, &["beginning balance"]),
            Some(10000.0)
        );
        assert_eq!(
            amount_after_keywords(text, &["closing balance", "ending balance"]),
            Some(15000.0)
        );
        assert_eq!(amount_after_keywords(text, &["total credits"]), None);
    }

    #[test]
    fn page_markers_parse_case_insensitively() {
        let text = "Page 1 of 3\nsome content\nPAGE 2 OF 3\npage 3 of 3";
        let markers = page_markers(text);
        assert_eq!(markers.len(), 3);
        assert_eq!(markers[0], PageMarker { page: 1, total: 3 });
        assert_eq!(markers[2], PageMarker { page: 3, total: 3 });
    }

    #[test]
    fn no_markers_means_empty() {
        assert!(page_markers("no page numbering anywhere").is_empty());
    }

    #[test]
    fn check_entries_capture_number_and_amount() {
        let text = "1051 3/02 $250.00\n1052 3/05 $1,100.40\nnot a check line";
        let entries = check_entries(text);
        assert_eq!(entries, vec![(1051, 250.0), (1052, 1100.40)]);
    }

    #[test]
    fn token_predicates() {
        assert!(has_amount_token("groceries 42.17"));
        assert!(has_date_token("3/14 coffee"));
        assert!(has_check_number_token("check 1051 cleared"));
        assert!(!has_amount_token("no numbers here"));
        assert_eq!(amount_token_count("$10.00 ... $20.00"), 2);
    }
}
