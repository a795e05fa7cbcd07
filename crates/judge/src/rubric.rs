//! The judge's fixed rubric prompt and strict-JSON score parser (spec.md §4.F).

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use store::Test;

/// System prompt prescribing strict JSON output, sent on every judge call.
pub const RUBRIC_SYSTEM_PROMPT: &str = "You are grading a language model's response to a benchmark prompt. \
Score the response on three axes, each in the inclusive range 0 to 10: \
writing_score (clarity, tone, correctness of prose), coding_score (correctness and \
quality of any code produced; score 0 if no code was requested), and tool_score \
(appropriate and correct use of tools; score 0 if no tools were relevant). Also give \
an overall score in the same 0-10 range and a short rationale. Respond with nothing but \
a single JSON object shaped exactly like: \
{\"writing_score\": <0-10>, \"coding_score\": <0-10>, \"tool_score\": <0-10>, \"overall\": <0-10>, \"rationale\": \"<text>\"}.";

/// Builds the user turn for one run-item's output.
pub fn build_user_prompt(test: &Test, output_text: &str) -> String {
    format!(
        "Test Name: {name}\nPrompt: {prompt}\nModel Output: {output}\nReturn JSON only, matching the schema described in the system prompt.",
        name = test.name,
        prompt = test.user_prompt,
        output = output_text,
    )
}

#[derive(Debug, Clone, Deserialize)]
struct RawRubric {
    writing_score: f64,
    coding_score: f64,
    tool_score: f64,
    overall: f64,
    rationale: String,
}

/// A parsed, bounds-checked rubric score.
#[derive(Debug, Clone, PartialEq)]
pub struct RubricScores {
    pub writing_score: f64,
    pub coding_score: f64,
    pub tool_score: f64,
    pub overall: f64,
    pub rationale: String,
}

fn in_bounds(score: f64) -> bool {
    (0.0..=10.0).contains(&score)
}

static BRACE_SPAN: OnceLock<Regex> = OnceLock::new();

fn brace_span_pattern() -> &'static Regex {
    BRACE_SPAN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static pattern is valid"))
}

/// Parses a judge response per spec.md §4.F step 4: direct parse when the
/// stripped text is itself a JSON object, otherwise the first `{...}` span;
/// any parse or bounds failure returns `None` so the caller can fall back to
/// a zero-score row.
pub fn parse_rubric_response(text: &str, raw_out: &mut Value) -> Option<RubricScores> {
    let stripped = text.trim();
    let candidate = if stripped.starts_with('{') && stripped.ends_with('}') {
        stripped.to_string()
    } else {
        brace_span_pattern().find(text)?.as_str().to_string()
    };

    let parsed: Value = serde_json::from_str(&candidate).ok()?;
    *raw_out = parsed.clone();
    let raw: RawRubric = serde_json::from_value(parsed).ok()?;

    if ![raw.writing_score, raw.coding_score, raw.tool_score, raw.overall]
        .into_iter()
        .all(in_bounds)
    {
        return None;
    }

    Some(RubricScores {
        writing_score: raw.writing_score,
        coding_score: raw.coding_score,
        tool_score: raw.tool_score,
        overall: raw.overall,
        rationale: raw.rationale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pure_json_response() {
        let mut raw = Value::Null;
        let scores = parse_rubric_response(
            r#"{"writing_score":8,"coding_score":7,"tool_score":9,"overall":8,"rationale":"solid"}"#,
            &mut raw,
        )
        .unwrap();
        assert_eq!(scores.overall, 8.0);
        assert_eq!(scores.rationale, "solid");
    }

    #[test]
    fn parses_json_embedded_in_prose() {
        let mut raw = Value::Null;
        let text = "Sure, here you go:\n{\"writing_score\":1,\"coding_score\":2,\"tool_score\":3,\"overall\":2,\"rationale\":\"ok\"} thanks";
        assert!(parse_rubric_response(text, &mut raw).is_some());
    }

    #[test]
    fn out_of_bounds_score_is_rejected() {
        let mut raw = Value::Null;
        let text = r#"{"writing_score":11,"coding_score":7,"tool_score":9,"overall":8,"rationale":"solid"}"#;
        assert!(parse_rubric_response(text, &mut raw).is_none());
    }

    #[test]
    fn garbage_text_is_rejected() {
        let mut raw = Value::Null;
        assert!(parse_rubric_response("not json at all", &mut raw).is_none());
    }
}
