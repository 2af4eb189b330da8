//! Section positions and per-section prompt assembly.

use chatscribe_shared::{Chunk, RunningSummary};

use crate::context::trailing_window;
use crate::prompts::section_prompt;

/// Where a section sits in the article, which decides its framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionPosition {
    /// Opening section, more chunks follow.
    First,
    /// The only section.
    FirstAndOnly,
    Middle,
    /// Closing section of a multi-section article.
    Last,
}

impl SectionPosition {
    /// Position of section `index` out of `total`.
    pub fn of(index: usize, total: usize) -> Self {
        match (index, total) {
            (0, 0 | 1) => Self::FirstAndOnly,
            (0, _) => Self::First,
            (i, n) if i + 1 >= n => Self::Last,
            _ => Self::Middle,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Self::First => "[First part of chat with more to come]",
            Self::FirstAndOnly => "[First and only part of the chat]",
            Self::Middle => "[Middle section of the blog]",
            Self::Last => "[Last section of the blog]",
        }
    }

    /// Whether the prompt includes the running summary and trailing window.
    pub fn needs_context(&self) -> bool {
        matches!(self, Self::Middle | Self::Last)
    }
}

/// One section to write: its chunk, position and the prompt that asks for it.
#[derive(Debug, Clone)]
pub struct SectionRequest {
    pub index: usize,
    pub total: usize,
    pub position: SectionPosition,
    pub prompt: String,
}

impl SectionRequest {
    /// Frame `chunk` for position `index / total` given the article so far.
    pub fn new(
        index: usize,
        total: usize,
        chunk: &Chunk,
        summary: &RunningSummary,
        article: &str,
        window_words: usize,
    ) -> Self {
        let position = SectionPosition::of(index, total);
        let window = if position.needs_context() {
            trailing_window(article, window_words)
        } else {
            String::new()
        };
        let prompt = section_prompt(position, &chunk.content, &summary.digest, &window);
        Self {
            index,
            total,
            position,
            prompt,
        }
    }

    /// Progress percent for this section's increments, spread over 70..95.
    pub fn percent(&self) -> u8 {
        let total = self.total.max(1);
        (70 + (25 * self.index) / total).min(95) as u8
    }

    pub fn status(&self) -> String {
        format!("Generating section {} of {}...", self.index + 1, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_follow_index_and_total() {
        assert_eq!(SectionPosition::of(0, 1), SectionPosition::FirstAndOnly);
        assert_eq!(SectionPosition::of(0, 3), SectionPosition::First);
        assert_eq!(SectionPosition::of(1, 3), SectionPosition::Middle);
        assert_eq!(SectionPosition::of(2, 3), SectionPosition::Last);
        assert_eq!(SectionPosition::of(1, 2), SectionPosition::Last);
    }

    #[test]
    fn request_uses_window_only_for_later_sections() {
        let summary = RunningSummary {
            digest: "So far: starters.".into(),
        };
        let chunk = Chunk::new("[User]: how warm?");

        let first = SectionRequest::new(0, 3, &chunk, &summary, "", 200);
        assert!(!first.prompt.contains("So far: starters."));

        let article = "word ".repeat(300);
        let middle = SectionRequest::new(1, 3, &chunk, &summary, &article, 200);
        assert!(middle.prompt.contains("So far: starters."));
        let window = trailing_window(&article, 200);
        assert!(middle.prompt.contains(&window));
        assert!(!middle.prompt.contains(&"word ".repeat(201)));
    }

    #[test]
    fn percents_stay_in_generation_band() {
        let chunk = Chunk::new("c");
        let summary = RunningSummary::default();
        let percents: Vec<u8> = (0..7)
            .map(|i| SectionRequest::new(i, 7, &chunk, &summary, "", 200).percent())
            .collect();
        assert_eq!(percents.first(), Some(&70));
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert!(percents.iter().all(|p| (70..=95).contains(p)));
    }
}
