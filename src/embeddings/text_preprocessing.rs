//! Text preparation applied to source content before it is hashed, embedded and stored

use sha2::Digest;
use sha2::Sha256;

/// Prepare source text for embedding
///
/// Returns `None` when nothing embeddable remains. The result is what gets
/// hashed for the cache, submitted to the provider and written to the store:
/// - NUL and other control characters (except newline and tab) become spaces,
///   since Postgres `TEXT` cannot hold NUL
/// - surrounding whitespace is trimmed
/// - the text is cut to `max_chars` characters on a char boundary
#[must_use]
pub fn prepare_content(text: &str, max_chars: usize) -> Option<String> {
    let sanitized: String = text
        .chars()
        .map(|c| match c {
            '\n' | '\t' => c,
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(truncate_chars(trimmed, max_chars).to_string())
}

/// Cut `text` to at most `max_chars` characters
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Hex SHA-256 of the exact text submitted to the provider
#[must_use]
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Token estimate used when a provider does not report usage
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
