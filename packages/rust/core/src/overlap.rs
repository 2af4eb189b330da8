//! Word-trigram overlap between a new section and the running summary.

use std::collections::HashSet;

/// Share of `section`'s word trigrams that also appear in `reference`.
///
/// Words are lowercased and stripped of surrounding punctuation. Returns 0.0
/// when `section` has fewer than three words.
pub fn trigram_overlap(section: &str, reference: &str) -> f64 {
    let section = trigrams(section);
    if section.is_empty() {
        return 0.0;
    }
    let reference = trigrams(reference);
    let shared = section.intersection(&reference).count();
    shared as f64 / section.len() as f64
}

fn trigrams(text: &str) -> HashSet<[String; 3]> {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    words
        .windows(3)
        .map(|w| [w[0].clone(), w[1].clone(), w[2].clone()])
        .collect()
}
