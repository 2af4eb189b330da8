//! Sentence and word-boundary splitting over normalized text.

/// Split normalized text into sentences.
///
/// A sentence ends at `.`, `?` or `!` followed by whitespace. Rejoining the
/// result with single spaces reproduces the normalized input.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if !matches!(ch, '.' | '?' | '!') {
            continue;
        }
        let Some(&(next_idx, next)) = chars.peek() else {
            break;
        };
        if next.is_whitespace() {
            let sentence = text[start..next_idx].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = next_idx;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Break a piece longer than `max_chars` on word boundaries.
///
/// Single words longer than `max_chars` are cut by character.
pub fn split_words(piece: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if piece.chars().count() <= max_chars {
        return vec![piece.to_string()];
    }

    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in piece.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for slice in chars.chunks(max_chars) {
                out.push(slice.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        out.push(current);
    }
    out
}
