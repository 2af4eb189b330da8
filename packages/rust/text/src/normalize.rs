//! Whitespace and control-character normalization for conversation text.
//!
//! Each pass is a function `&str -> String` applied in sequence. The result
//! is a single line with single spaces, so running it twice changes nothing.

use std::sync::LazyLock;

use regex::Regex;

/// Normalize raw conversation text for chunking.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut result = flatten_line_breaks(raw);
    result = strip_control_chars(&result);
    result = tighten_hyphens(&result);
    result = collapse_spaces(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Line breaks and tabs
// ---------------------------------------------------------------------------

fn flatten_line_breaks(text: &str) -> String {
    static BREAK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[\r\n\t]").expect("valid regex"));

    BREAK_RE.replace_all(text, " ").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 2: Remaining control characters
// ---------------------------------------------------------------------------

fn strip_control_chars(text: &str) -> String {
    static CONTROL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[\x00-\x1F]").expect("valid regex"));

    CONTROL_RE.replace_all(text, "").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 3: Spacing around hyphens
// ---------------------------------------------------------------------------

/// `"well - known"` becomes `"well-known"`.
fn tighten_hyphens(text: &str) -> String {
    static HYPHEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ ]*-[ ]*").expect("valid regex"));

    HYPHEN_RE.replace_all(text, "-").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 4: Space runs
// ---------------------------------------------------------------------------

fn collapse_spaces(text: &str) -> String {
    static SPACES_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r" {2,}").expect("valid regex"));

    SPACES_RE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_breaks_and_collapses_spaces() {
        let raw = "  \n[User]: Hello\tthere\r\n\n  how are   you?  ";
        assert_eq!(normalize(raw), "[User]: Hello there how are you?");
    }

    #[test]
    fn strips_control_characters() {
        assert_eq!(normalize("bell\x07 and\x00 null\x1B"), "bell and null");
    }

    #[test]
    fn tightens_hyphen_spacing() {
        assert_eq!(normalize("a - b  -c d-  e"), "a-b-c d-e");
        assert_eq!(normalize("well -\nknown"), "well-known");
    }

    #[test]
    fn empty_and_blank_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n\t "), "");
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "",
            "plain",
            "  lead and trail  ",
            "x -\t- y",
            "\n[User]: why?\n[ChatGPT Response]: because -  reasons.\x01",
            "café – naïve\u{a0}text  -  ok",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn keeps_non_ascii_text() {
        assert_eq!(normalize("über\ncafé"), "über café");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(512))]

            #[test]
            fn normalize_is_idempotent(raw in any::<String>()) {
                let once = normalize(&raw);
                prop_assert_eq!(normalize(&once), once);
            }

            #[test]
            fn normalize_is_idempotent_on_noisy_text(
                raw in r"[a-zA-Z\- \t\r\n\x00-\x1F\x{A0}é.?]{0,160}"
            ) {
                let once = normalize(&raw);
                prop_assert_eq!(normalize(&once), once.clone());
                prop_assert!(!once.contains("  "));
                prop_assert!(!once.contains(" -") && !once.contains("- "));
                prop_assert!(!once.chars().any(|c| c.is_ascii_control()));
            }
        }
    }
}
