// ============================================================
// Layer 4 - Text Cleaners
// ============================================================
// Normalises raw corpus text into whitespace separated tokens
// before vocabulary building and encoding. One cleaner per side:
//
// ChineseCleaner (source):
//   1. Keep only CJK Unified Ideographs in U+4E00..=U+9FA5.
//      Latin letters, digits, punctuation and spaces all go.
//   2. Chinese is written without spaces, so the remaining run of
//      characters is segmented into words with jieba (HMM on for
//      words missing from the dictionary).
//   3. Join the segments with single spaces.
//
//   "我爱 北京天安门!" -> "我 爱 北京 天安门"
//
// EnglishCleaner (target):
//   1. Lowercase.
//   2. Keep only ASCII letters, digits and whitespace.
//   3. Trim both ends. Inner whitespace is left as is, the
//      tokenizer splits on any run of whitespace.
//
//   "Hello, World!" -> "hello world"
//
// Both cleaners are pure: the same input always gives the same
// output and nothing is cached between calls.
//
// Reference: jieba-rs crate documentation
//            Rust Book §8 (Strings in Rust)

use jieba_rs::Jieba;

use crate::domain::traits::TextCleaner;

/// First and last code point of the CJK range the source side keeps.
const HAN_FIRST: char = '\u{4e00}';
const HAN_LAST: char = '\u{9fa5}';

// ─── ChineseCleaner ───────────────────────────────────────────────────────────
/// Source-side cleaner: Han characters only, segmented into words.
pub struct ChineseCleaner {
    /// Segmenter with the bundled default dictionary
    jieba: Jieba,
}

impl ChineseCleaner {
    /// Create a cleaner. Loads jieba's built-in dictionary, so build
    /// one and reuse it rather than creating one per sentence.
    pub fn new() -> Self {
        Self { jieba: Jieba::new() }
    }
}

impl Default for ChineseCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl TextCleaner for ChineseCleaner {
    fn clean(&self, text: &str) -> String {
        let han: String = text
            .chars()
            .filter(|c| (HAN_FIRST..=HAN_LAST).contains(c))
            .collect();

        if han.is_empty() {
            return String::new();
        }

        self.jieba
            .cut(&han, true)
            .into_iter()
            .filter(|word| !word.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ─── EnglishCleaner ───────────────────────────────────────────────────────────
/// Target-side cleaner: lowercase ASCII alphanumerics and whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishCleaner;

impl EnglishCleaner {
    pub fn new() -> Self {
        Self
    }
}

impl TextCleaner for EnglishCleaner {
    fn clean(&self, text: &str) -> String {
        let kept: String = text
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
            .collect();

        kept.trim().to_string()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_lowercases_and_strips_punctuation() {
        let c = EnglishCleaner::new();
        assert_eq!(c.clean("Hello, World!"), "hello world");
        assert_eq!(c.clean("It's 5 o'clock."), "its 5 oclock");
    }

    #[test]
    fn test_english_keeps_inner_whitespace_and_trims() {
        let c = EnglishCleaner::new();
        assert_eq!(c.clean("  a  b\tc  "), "a  b\tc");
    }

    #[test]
    fn test_english_drops_non_ascii_letters() {
        let c = EnglishCleaner::new();
        assert_eq!(c.clean("café 你好"), "caf");
    }

    #[test]
    fn test_english_empty_string() {
        assert_eq!(EnglishCleaner::new().clean(""), "");
    }

    #[test]
    fn test_chinese_removes_everything_outside_han_block() {
        let c = ChineseCleaner::new();
        let cleaned = c.clean("abc, 123!?");
        assert_eq!(cleaned, "");
    }

    #[test]
    fn test_chinese_segments_into_words() {
        let c = ChineseCleaner::new();
        let cleaned = c.clean("我们中出了一个叛徒");
        // Segmentation only inserts spaces; the characters are unchanged
        assert_eq!(cleaned.replace(' ', ""), "我们中出了一个叛徒");
        assert!(cleaned.split(' ').count() > 1);
        assert!(!cleaned.contains("  "));
    }

    #[test]
    fn test_chinese_strips_punctuation_before_segmenting() {
        let c = ChineseCleaner::new();
        let with_noise = c.clean("你好，世界！ hello 2024");
        let plain = c.clean("你好世界");
        assert_eq!(with_noise, plain);
    }

    #[test]
    fn test_cleaners_are_pure() {
        let zh = ChineseCleaner::new();
        let en = EnglishCleaner::new();
        let text = "今天天气很好 Today is NICE!";
        assert_eq!(zh.clean(text), zh.clean(text));
        assert_eq!(en.clean(text), en.clean(text));
    }
}
