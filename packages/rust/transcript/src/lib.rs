//! Shared-conversation page fetching and transcript extraction.
//!
//! A shared chat page embeds its conversation as a JSON document inside a
//! `<script>` tag. This crate fetches the page ([`HttpFetcher`]), locates that
//! JSON and walks it to an ordered list of [`Message`]s ([`extract_transcript`]).
//! Each step is a plain function returning a typed result; the pipeline
//! composes them.

mod extract;
mod fetch;

use chatscribe_shared::{Message, Role};

pub use extract::{CUSTOM_INSTRUCTIONS_SENTINEL, extract_json_from_scripts, extract_transcript};
pub use fetch::{HttpFetcher, PageFetcher};

/// Prefix placed before user turns in the rendered transcript.
const USER_LABEL: &str = "[User]:";

/// Prefix placed before every other turn.
const OTHER_LABEL: &str = "[ChatGPT Response]:";

/// Flatten messages into the single text the normalizer consumes.
///
/// Turns keep their order and are labelled by role so the model can tell
/// questions from answers once newlines are gone.
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let label = match m.role {
                Role::User => USER_LABEL,
                Role::Other => OTHER_LABEL,
            };
            format!("\n{label} {}", m.text.trim())
        })
        .collect::<Vec<_>>()
        .join(" ")
}
