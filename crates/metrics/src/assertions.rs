//! Constraint-string assertion evaluator.

use regex::RegexBuilder;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AssertionResult {
    pub r#type: String,
    pub expected: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AssertionSummary {
    pub total: usize,
    pub passed: usize,
    pub results: Vec<AssertionResult>,
}

fn parse_constraints(raw: &str) -> Vec<(String, String)> {
    raw.split(['\n', ';'])
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .filter_map(|chunk| {
            let (name, value) = chunk.split_once(':')?;
            Some((name.trim().to_lowercase(), value.trim().to_string()))
        })
        .collect()
}

fn check_max_words(expected: &str, output_text: &str) -> (bool, String) {
    match expected.trim().parse::<usize>() {
        Ok(limit) => {
            let words = output_text.split_whitespace().count();
            (words <= limit, format!("words={words}, limit={limit}"))
        }
        Err(_) => (false, format!("invalid max_words value: {expected}")),
    }
}

/// Evaluates a `;`/newline-separated constraint string against `output_text`.
/// Unknown check names fail with an `"unsupported check: <name>"` detail.
pub fn evaluate_expected_constraints(raw_constraints: Option<&str>, output_text: &str) -> AssertionSummary {
    let checks = match raw_constraints {
        Some(raw) if !raw.trim().is_empty() => parse_constraints(raw),
        _ => Vec::new(),
    };

    if checks.is_empty() {
        return AssertionSummary {
            total: 0,
            passed: 0,
            results: Vec::new(),
        };
    }

    let results: Vec<AssertionResult> = checks
        .into_iter()
        .map(|(check_type, expected)| {
            let (passed, detail) = match check_type.as_str() {
                "contains" => {
                    let passed = output_text.contains(&expected);
                    (passed, format!("contains={passed}"))
                }
                "icontains" => {
                    let passed = output_text.to_lowercase().contains(&expected.to_lowercase());
                    (passed, format!("icontains={passed}"))
                }
                "not_contains" => {
                    let passed = !output_text.contains(&expected);
                    (passed, format!("not_contains={passed}"))
                }
                "regex" => match RegexBuilder::new(&expected).multi_line(true).build() {
                    Ok(re) => {
                        let passed = re.is_match(output_text);
                        (passed, format!("regex_match={passed}"))
                    }
                    Err(_) => (false, format!("invalid regex: {expected}")),
                },
                "max_words" => check_max_words(&expected, output_text),
                other => (false, format!("unsupported check: {other}")),
            };
            AssertionResult {
                r#type: check_type,
                expected,
                passed,
                detail,
            }
        })
        .collect();

    let passed = results.iter().filter(|r| r.passed).count();
    AssertionSummary {
        total: results.len(),
        passed,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_checks_pass() {
        let summary = evaluate_expected_constraints(
            Some("contains:Hello;regex:^Hello;max_words:3"),
            "Hello world",
        );
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 3);
    }

    #[test]
    fn unknown_check_fails_with_detail() {
        let summary = evaluate_expected_constraints(
            Some("contains:Alpha;not_contains:world;unknown_check:abc"),
            "Hello world",
        );
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 0);
        assert!(summary.results.iter().any(|r| r.detail == "unsupported check: unknown_check"));
    }

    #[test]
    fn empty_constraints_yield_empty_summary() {
        let summary = evaluate_expected_constraints(None, "anything");
        assert_eq!(summary.total, 0);
        assert_eq!(summary.passed, 0);
        assert!(summary.results.is_empty());
    }
}
