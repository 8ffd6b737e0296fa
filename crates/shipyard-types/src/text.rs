//! Output size and timing constants, and the tail truncation used for every
//! piece of process output attached to a report.

use std::time::Duration;

/// Characters of output retained for failure reports.
pub const MAX_LOG_LENGTH: usize = 100_000;

/// Minimum interval between two log chunk emissions for one task.
pub const LOG_LAG_TIME: Duration = Duration::from_millis(100);

/// Return the suffix of `text` holding at most `max_chars` characters.
pub fn tail(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("abc", 3), "abc");
    }

    #[test]
    fn long_text_keeps_the_end() {
        assert_eq!(tail("abcdef", 2), "ef");
        assert_eq!(tail("abcdef", 0), "");
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(tail("жжжж", 2), "жж");
    }

    proptest! {
        #[test]
        fn tail_is_a_bounded_suffix(text in ".{0,64}", max in 0usize..80) {
            let suffix = tail(&text, max);
            prop_assert!(text.ends_with(suffix));
            prop_assert_eq!(suffix.chars().count(), text.chars().count().min(max));
        }
    }
}
