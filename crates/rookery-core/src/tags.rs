//! Tag extraction from message bodies.

use std::collections::BTreeSet;

/// Derive the set of normalized labels from a message body.
///
/// Whitespace-separated tokens starting with `#` (topic) or `@`
/// (mention) become tags; trailing ASCII punctuation is dropped and the
/// remainder lowercased. A bare marker with nothing behind it is
/// ignored.
pub fn extract_tags(body: &str) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();

    for token in body.split_whitespace() {
        if !token.starts_with('#') && !token.starts_with('@') {
            continue;
        }

        let tag = token.trim_end_matches(|c: char| c.is_ascii_punctuation());
        if tag.len() < 2 {
            continue;
        }

        tags.insert(tag.to_lowercase());
    }

    tags
}
