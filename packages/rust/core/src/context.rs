//! Running-summary context kept between article sections.

use std::sync::Arc;

use tracing::{debug, warn};

use chatscribe_llm::Generator;
use chatscribe_shared::RunningSummary;

use crate::prompts::summary_prompt;

/// Owns the running summary of one run.
pub struct ContextManager {
    generator: Arc<dyn Generator>,
    summary: RunningSummary,
}

impl ContextManager {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            summary: RunningSummary::default(),
        }
    }

    pub fn summary(&self) -> &RunningSummary {
        &self.summary
    }

    /// Re-summarize the whole article, replacing the digest.
    ///
    /// A failed or empty reply keeps the previous summary.
    pub async fn refresh(&mut self, article: &str) -> &RunningSummary {
        match self.generator.complete(&summary_prompt(article)).await {
            Ok(reply) if !reply.trim().is_empty() => {
                self.summary.digest = reply.trim().to_string();
                debug!(chars = self.summary.digest.len(), "running summary refreshed");
            }
            Ok(_) => warn!("summary reply was empty, keeping previous summary"),
            Err(e) => warn!(error = %e, "summary refresh failed, keeping previous summary"),
        }
        &self.summary
    }
}

/// The last `words` whitespace-separated words of `article`.
pub fn trailing_window(article: &str, words: usize) -> String {
    let all: Vec<&str> = article.split_whitespace().collect();
    all[all.len().saturating_sub(words)..].join(" ")
}
