//! Line-addressable layout analysis. Each rule contributes to one issue
//! list; the 0-1 score is a summary over issue density, and the issue list is
//! the signal consumers are expected to surface.

use regex::Regex;

use crate::models::{LayoutIssue, LayoutReport};

pub const CORRUPTION_ISSUE: &str = "Excessive special characters (possible OCR error)";
pub const TRUNCATION_ISSUE: &str = "Line appears truncated (continues on next line)";
pub const MISALIGNMENT_ISSUE: &str = "Amount not aligned with other rows";
pub const EMPTY_BLOCK_ISSUE: &str = "Large empty section inside content";

const MIN_LINES: usize = 10;
const CORRUPTION_DENSITY: f64 = 0.4;
const TRUNCATION_MIN_LEN: usize = 50;
const MISALIGNMENT_MIN_ROWS: usize = 10;
const MISALIGNMENT_MAX_DEVIATION: f64 = 30.0;
const MISALIGNMENT_EXAMPLES: usize = 3;
const EMPTY_BLOCK_THRESHOLD: usize = 20;
const SAMPLE_LEN: usize = 100;

/// How many of the issues are OCR corruption findings. The detection engine
/// keys the layout anomaly off this count.
pub fn corruption_count(issues: &[LayoutIssue]) -> usize {
    issues.iter().filter(|i| i.issue == CORRUPTION_ISSUE).count()
}

pub fn analyze(content: &str) -> LayoutReport {
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() < MIN_LINES {
        return LayoutReport {
            score: None,
            issues: Vec::new(),
        };
    }

    let mut issues = Vec::new();
    scan_corruption(&lines, &mut issues);
    scan_truncation(&lines, &mut issues);
    scan_misalignment(&lines, &mut issues);
    scan_empty_blocks(&lines, &mut issues);

    LayoutReport {
        score: Some(score_for(&issues, lines.len())),
        issues,
    }
}

fn score_for(issues: &[LayoutIssue], total_lines: usize) -> f64 {
    if issues.is_empty() {
        return 1.0;
    }
    let weight = |issue: &LayoutIssue| match issue.issue.as_str() {
        CORRUPTION_ISSUE => 1.0,
        MISALIGNMENT_ISSUE => 0.6,
        TRUNCATION_ISSUE => 0.4,
        _ => 0.3,
    };
    let penalty: f64 = issues.iter().map(weight).sum::<f64>() / total_lines as f64;
    (1.0 - penalty).clamp(0.0, 1.0)
}

fn sample(line: &str) -> String {
    line.trim().chars().take(SAMPLE_LEN).collect()
}

fn scan_corruption(lines: &[&str], issues: &mut Vec<LayoutIssue>) {
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().len() <= 10 {
            continue;
        }
        let alnum = line.chars().filter(|c| c.is_alphanumeric()).count();
        let special = line
            .chars()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();
        if alnum > 0 && special as f64 / (alnum + special) as f64 > CORRUPTION_DENSITY {
            issues.push(LayoutIssue {
                line: idx + 1,
                sample: sample(line),
                issue: CORRUPTION_ISSUE.to_string(),
            });
        }
    }
}

fn scan_truncation(lines: &[&str], issues: &mut Vec<LayoutIssue>) {
    for (idx, line) in lines.iter().enumerate() {
        let stripped = line.trim_end();
        if stripped.len() <= TRUNCATION_MIN_LEN {
            continue;
        }
        let Some(last) = stripped.chars().last() else {
            continue;
        };
        if !last.is_alphanumeric() {
            continue;
        }
        let continues = lines
            .get(idx + 1)
            .map(|next| next.trim_start().chars().next().is_some_and(|c| c.is_lowercase()))
            .unwrap_or(false);
        if continues {
            let tail_start = stripped.chars().count().saturating_sub(50);
            issues.push(LayoutIssue {
                line: idx + 1,
                sample: stripped.chars().skip(tail_start).collect(),
                issue: TRUNCATION_ISSUE.to_string(),
            });
        }
    }
}

/// Tabular regions show up as a run of lines whose amount column sits at a
/// consistent offset; a line breaking that run is flagged.
fn scan_misalignment(lines: &[&str], issues: &mut Vec<LayoutIssue>) {
    let amount_re = Regex::new(r"\d+\.\d{2}").unwrap();
    let mut positions: Vec<(usize, usize, &str)> = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let pos = match line.find('$') {
            Some(p) => Some(p),
            None => amount_re.find(line).map(|m| m.start()),
        };
        if let Some(pos) = pos {
            positions.push((idx + 1, pos, *line));
        }
    }

    if positions.len() < MISALIGNMENT_MIN_ROWS {
        return;
    }

    let avg = positions.iter().map(|(_, p, _)| *p as f64).sum::<f64>() / positions.len() as f64;
    let outliers = positions
        .iter()
        .filter(|(_, pos, _)| (*pos as f64 - avg).abs() > MISALIGNMENT_MAX_DEVIATION)
        .take(MISALIGNMENT_EXAMPLES);
    for (line_num, _, line) in outliers {
        issues.push(LayoutIssue {
            line: *line_num,
            sample: sample(line),
            issue: MISALIGNMENT_ISSUE.to_string(),
        });
    }
}

fn scan_empty_blocks(lines: &[&str], issues: &mut Vec<LayoutIssue>) {
    let first_content = lines.iter().position(|l| !l.trim().is_empty());
    let last_content = lines.iter().rposition(|l| !l.trim().is_empty());
    let (Some(first), Some(last)) = (first_content, last_content) else {
        return;
    };

    let mut run_start = None;
    for idx in first..=last {
        if lines[idx].trim().is_empty() {
            run_start.get_or_insert(idx);
        } else if let Some(start) = run_start.take() {
            let run_len = idx - start;
            if run_len > EMPTY_BLOCK_THRESHOLD {
                issues.push(LayoutIssue {
                    line: start + 1,
                    sample: format!("[{run_len} blank lines]"),
                    issue: EMPTY_BLOCK_ISSUE.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filler_lines(n: usize) -> String {
        (0..n)
            .map(|i| format!("Transaction line number {i} for deposit records"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn clean_document_scores_one() {
        let report = analyze(&filler_lines(20));
        assert_eq!(report.score, Some(1.0));
        assert!(report.issues.is_empty());
    }

    #[test]
    fn short_document_has_no_score() {
        let report = analyze("one line\ntwo lines");
        assert!(report.score.is_none());
        assert!(report.issues.is_empty());
    }

    #[test]
    fn garbled_lines_are_flagged_with_line_numbers() {
        let mut text = filler_lines(12);
        text.push_str("\n#@%$^&*(!@#$ %^&*#@ ab\n");
        let report = analyze(&text);
        assert_eq!(corruption_count(&report.issues), 1);
        assert_eq!(report.issues[0].line, 13);
        assert!(report.score.unwrap() < 1.0);
    }

    #[test]
    fn blank_run_inside_content_is_flagged() {
        let mut text = filler_lines(10);
        text.push('\n');
        text.push_str(&"\n".repeat(25));
        text.push_str(&filler_lines(10));
        let report = analyze(&text);
        assert!(report
            .issues
            .iter()
            .any(|i| i.issue == EMPTY_BLOCK_ISSUE));
    }

    #[test]
    fn trailing_blank_lines_are_a_page_boundary_not_an_issue() {
        let mut text = filler_lines(12);
        text.push_str(&"\n".repeat(30));
        let report = analyze(&text);
        assert!(report.issues.iter().all(|i| i.issue != EMPTY_BLOCK_ISSUE));
    }

    #[test]
    fn misaligned_amount_breaks_the_tabular_run() {
        let mut rows: Vec<String> = (0..12)
            .map(|i| format!("03/{:02} payroll deposit        $1,{i:03}.00", i + 1))
            .collect();
        rows.push(format!(
            "03/14 odd row{}$999.00",
            " ".repeat(60)
        ));
        let report = analyze(&rows.join("\n"));
        assert!(report.issues.iter().any(|i| i.issue == MISALIGNMENT_ISSUE));
    }
}
