//! Regex-based text heuristics.

use crate::application::ports::TextClassifier;
use regex::Regex;
use std::sync::LazyLock;

/// `<@U123ABC>` or `<@W123ABC>` user mention markup.
static USER_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@([UW][A-Z0-9]+)>").expect("valid mention pattern"));

/// A `re:` reply marker starting at a word boundary, any case.
static REPLY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bre:").expect("valid reply pattern"));

/// Lexical classifier for chat message text.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalClassifier;

impl LexicalClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl TextClassifier for LexicalClassifier {
    fn contains_user_mention(&self, text: &str) -> bool {
        USER_MENTION.is_match(text)
    }

    fn looks_like_reply(&self, text: &str) -> bool {
        REPLY_MARKER.is_match(text.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_mentions() {
        let classifier = LexicalClassifier::new();
        assert!(classifier.contains_user_mention("<@U12345> please check"));
        assert!(classifier.contains_user_mention("cc <@W0ABC>"));
        assert!(!classifier.contains_user_mention("<#C12345|general>"));
        assert!(!classifier.contains_user_mention("<@u12345>"));
        assert!(!classifier.contains_user_mention("@U12345"));
        assert!(!classifier.contains_user_mention(""));
    }

    #[test]
    fn test_reply_markers() {
        let classifier = LexicalClassifier::new();
        assert!(classifier.looks_like_reply("re: 了解しました"));
        assert!(classifier.looks_like_reply("Re: ご確認ください"));
        assert!(classifier.looks_like_reply("  RE: テスト "));
        assert!(classifier.looks_like_reply("<@U999> re: 了解"));

        assert!(!classifier.looks_like_reply("返信ありがとう"));
        assert!(!classifier.looks_like_reply("reference value"));
        assert!(!classifier.looks_like_reply("are: you sure"));
        assert!(!classifier.looks_like_reply(""));
    }
}
