//! Script-tag JSON location and typed conversation extraction.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, instrument};

use chatscribe_shared::{ExtractError, Message, Role, Transcript};

/// Placeholder part the share page emits in place of removed custom instructions.
pub const CUSTOM_INSTRUCTIONS_SENTINEL: &str = "Original custom instructions no longer available";

/// Keys from the document root to the conversation data object.
const DATA_PATH: [&str; 4] = ["props", "pageProps", "serverResponse", "data"];

static SCRIPT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("valid selector"));

/// Return the first `<script>` body that parses as a JSON object.
pub fn extract_json_from_scripts(html: &str) -> Result<Value, ExtractError> {
    let doc = Html::parse_document(html);

    for script in doc.select(&SCRIPT_SEL) {
        let body: String = script.text().collect();
        let body = body.trim();
        if body.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(body) {
            Ok(value) if value.is_object() => return Ok(value),
            Ok(_) => continue,
            Err(_) => continue,
        }
    }

    Err(ExtractError::NoJson)
}

/// Pull the ordered conversation out of shared-page markup.
#[instrument(skip_all, fields(bytes = html.len()))]
pub fn extract_transcript(html: &str) -> Result<Transcript, ExtractError> {
    let root = extract_json_from_scripts(html)?;
    let transcript = transcript_from_json(&root)?;
    debug!(
        messages = transcript.messages.len(),
        title = transcript.title.as_deref().unwrap_or(""),
        "transcript extracted"
    );
    Ok(transcript)
}

/// Walk the known schema. The path down to `linear_conversation` is strict;
/// individual entries without a message (the root node, system stubs) are
/// skipped.
fn transcript_from_json(root: &Value) -> Result<Transcript, ExtractError> {
    let mut path = String::new();
    let mut data = root;
    for key in DATA_PATH {
        data = child(data, key, &mut path)?;
    }

    let title = data
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);

    let conversation = child(data, "linear_conversation", &mut path)?
        .as_array()
        .ok_or_else(|| ExtractError::MissingKey { path: path.clone() })?;

    let mut messages = Vec::new();
    for entry in conversation {
        let Some(message) = entry.get("message") else {
            continue;
        };
        let Some(author) = message
            .get("author")
            .and_then(|a| a.get("role"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        let Some(parts) = message
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
        else {
            continue;
        };

        let role = Role::from_author(author);
        for part in parts.iter().filter_map(Value::as_str) {
            if part.trim().is_empty() || part == CUSTOM_INSTRUCTIONS_SENTINEL {
                continue;
            }
            messages.push(Message::new(role, part));
        }
    }

    if messages.is_empty() {
        return Err(ExtractError::NoMessages);
    }

    Ok(Transcript { title, messages })
}

/// Step into `key`, extending `path` for the error message.
fn child<'a>(value: &'a Value, key: &str, path: &mut String) -> Result<&'a Value, ExtractError> {
    if !path.is_empty() {
        path.push('.');
    }
    path.push_str(key);
    value.get(key).ok_or_else(|| ExtractError::MissingKey { path: path.clone() })
}
