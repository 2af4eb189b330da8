//! Append-only article buffer with newline-separated sections.

/// The article as streamed so far.
///
/// Every non-empty piece handed to [`Article::push`] is returned exactly as it
/// must be forwarded to consumers, so concatenating the forwarded pieces
/// reproduces [`Article::as_str`].
#[derive(Debug, Clone, Default)]
pub struct Article {
    text: String,
    separator_pending: bool,
}

impl Article {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new section. A separating newline is owed before its first text.
    pub fn begin_section(&mut self) {
        self.separator_pending = !self.text.is_empty() && !self.text.ends_with('\n');
    }

    /// Append an increment, returning the text to forward (separator included).
    /// Empty increments are swallowed.
    pub fn push(&mut self, increment: &str) -> Option<String> {
        if increment.is_empty() {
            return None;
        }

        let forwarded = if std::mem::take(&mut self.separator_pending) {
            format!("\n{increment}")
        } else {
            increment.to_string()
        };
        self.text.push_str(&forwarded);
        Some(forwarded)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Byte length, usable as a mark for [`Article::since`].
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Text appended after `mark`, without the leading separator.
    pub fn since(&self, mark: usize) -> &str {
        self.text.get(mark..).unwrap_or_default().trim_start_matches('\n')
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
