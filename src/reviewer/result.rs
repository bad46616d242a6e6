//! Locating the structured result block inside free-form agent output.
//!
//! The agent is asked to end its reply with a fenced block tagged
//! `review-result` (or `json:review-result`). The block can appear anywhere
//! in the text; when there are several, the last one wins.

use regex::Regex;
use std::sync::LazyLock;

static RESULT_BLOCK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json:)?review-result[ \t]*\r?\n(.*?)```").unwrap()
});

/// Fence tag the prompt asks for.
pub const RESULT_BLOCK_TAG: &str = "review-result";

/// Returns the trimmed content of the last non-empty result block, if any.
pub fn extract_result_block(text: &str) -> Option<&str> {
    RESULT_BLOCK_REGEX
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
        .filter(|content| !content.is_empty())
        .last()
}

/// Whether the text contains a result block at all.
pub fn has_result_block(text: &str) -> bool {
    RESULT_BLOCK_REGEX.is_match(text)
}
