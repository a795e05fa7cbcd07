use regex::Regex;
use std::sync::OnceLock;

static FENCE: OnceLock<Regex> = OnceLock::new();

fn fence_pattern() -> &'static Regex {
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:[a-zA-Z0-9_+-]+)?\n(.*?)```").expect("static pattern is valid")
    })
}

/// Extracts the contents of fenced code blocks, trimmed.
pub fn extract_code_blocks(text: &str) -> Vec<String> {
    fence_pattern()
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_multiple_fenced_blocks() {
        let text = "intro\n```rust\nfn main() {}\n```\nmid\n```\nplain\n```\n";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks, vec!["fn main() {}".to_string(), "plain".to_string()]);
    }

    #[test]
    fn no_fences_returns_empty() {
        assert!(extract_code_blocks("just text").is_empty());
    }
}
