// ============================================================
// Layer 3 - Vocabulary and Sequence Encoding
// ============================================================
// A Vocabulary is the bidirectional token <-> id mapping for one
// language side. Four ids are reserved and never move:
//
//   <pad> = 0   right padding of encoded sequences
//   <unk> = 1   any token the vocabulary does not know
//   <sos> = 2   start-of-sequence marker
//   <eos> = 3   end-of-sequence marker
//
// Every other token gets a unique id >= 4, in the order it was
// first seen. Building happens in two passes:
//
//   1. from_corpus():  count whitespace tokens, keep the ones that
//                      occur at least `min_freq` times
//   2. intersect():    drop every token the pretrained embedding
//                      source has no vector for, renumbering from 4
//
// After step 2 every non-reserved id has a pretrained vector row.
//
// Reference: Sutskever et al. (2014) Sequence to Sequence Learning

use std::collections::HashMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::domain::traits::EmbeddingSource;

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";
pub const SOS_TOKEN: &str = "<sos>";
pub const EOS_TOKEN: &str = "<eos>";

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;
pub const SOS_ID: u32 = 2;
pub const EOS_ID: u32 = 3;

/// The reserved tokens in id order.
pub const RESERVED_TOKENS: [&str; 4] = [PAD_TOKEN, UNK_TOKEN, SOS_TOKEN, EOS_TOKEN];

/// Token <-> id mapping. The position of a token in `tokens` is its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VocabularyFile", into = "VocabularyFile")]
pub struct Vocabulary {
    tokens: Vec<String>,
    ids:    HashMap<String, u32>,
}

/// On-disk layout: just the ordered token list.
#[derive(Serialize, Deserialize)]
struct VocabularyFile {
    tokens: Vec<String>,
}

impl TryFrom<VocabularyFile> for Vocabulary {
    type Error = anyhow::Error;

    fn try_from(file: VocabularyFile) -> Result<Self> {
        Vocabulary::from_tokens(file.tokens)
    }
}

impl From<Vocabulary> for VocabularyFile {
    fn from(vocab: Vocabulary) -> Self {
        VocabularyFile { tokens: vocab.tokens }
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::reserved_only()
    }
}

impl Vocabulary {
    /// A vocabulary holding only `<pad>`, `<unk>`, `<sos>` and `<eos>`.
    pub fn reserved_only() -> Self {
        let mut vocab = Self { tokens: Vec::new(), ids: HashMap::new() };
        for token in RESERVED_TOKENS {
            vocab.push(token);
        }
        vocab
    }

    /// Rebuild a vocabulary from an ordered token list (index = id).
    ///
    /// Fails if the reserved tokens are not at ids 0..=3 or a token
    /// appears twice.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self> {
        if tokens.len() < RESERVED_TOKENS.len() {
            bail!(
                "vocabulary has {} tokens, the {} reserved tokens are missing",
                tokens.len(),
                RESERVED_TOKENS.len()
            );
        }
        for (id, expected) in RESERVED_TOKENS.iter().enumerate() {
            if tokens[id] != *expected {
                bail!("reserved id {id} must be '{expected}', found '{}'", tokens[id]);
            }
        }

        let mut ids = HashMap::with_capacity(tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            if ids.insert(token.clone(), id as u32).is_some() {
                bail!("token '{token}' appears more than once in the vocabulary");
            }
        }
        Ok(Self { tokens, ids })
    }

    /// Frequency-filtered candidate vocabulary.
    ///
    /// Tokens occurring at least `min_freq` times across `sentences`
    /// are kept in first-seen order after the reserved tokens.
    pub fn from_corpus<S: AsRef<str>>(sentences: &[S], min_freq: usize) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut first_seen: Vec<&str> = Vec::new();

        for sentence in sentences {
            for token in sentence.as_ref().split_whitespace() {
                let count = counts.entry(token).or_insert(0);
                if *count == 0 {
                    first_seen.push(token);
                }
                *count += 1;
            }
        }

        let mut vocab = Self::reserved_only();
        for token in first_seen {
            if counts[token] >= min_freq && !vocab.contains(token) {
                vocab.push(token);
            }
        }
        vocab
    }

    /// Keep only the tokens `source` has a vector for.
    ///
    /// Reserved ids stay put; surviving tokens are renumbered from 4
    /// upwards in their current order, so ids stay contiguous.
    pub fn intersect<E: EmbeddingSource + ?Sized>(&self, source: &E) -> Self {
        let mut vocab = Self::reserved_only();
        for token in self.content_tokens() {
            if source.contains(token) && !vocab.contains(token) {
                vocab.push(token);
            }
        }
        vocab
    }

    fn push(&mut self, token: &str) {
        let id = self.tokens.len() as u32;
        self.tokens.push(token.to_string());
        self.ids.insert(token.to_string(), id);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(token)
    }

    /// Id of `token`, or `<unk>` when the token is unknown.
    pub fn id(&self, token: &str) -> u32 {
        self.ids.get(token).copied().unwrap_or(UNK_ID)
    }

    /// Token for `id`, or `<unk>` when the id is out of range.
    pub fn token(&self, id: u32) -> &str {
        self.tokens
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or(UNK_TOKEN)
    }

    /// Tokens with id >= 4, in id order.
    pub fn content_tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens[RESERVED_TOKENS.len()..].iter().map(String::as_str)
    }

    /// Encode a cleaned sentence into exactly `max_len` ids.
    ///
    ///   [<sos>, t1 .. tk, <eos>, <pad> ...]   with k <= max_len - 2
    ///
    /// Unknown tokens become `<unk>`. Training and inference must call
    /// this with the same `max_len`, which must leave room for `<sos>`
    /// and `<eos>` (at least 2).
    pub fn encode(&self, sentence: &str, max_len: usize) -> Vec<u32> {
        debug_assert!(max_len >= 2, "max_len {max_len} cannot hold <sos> and <eos>");
        let content = max_len.saturating_sub(2);

        let mut ids = Vec::with_capacity(max_len.max(2));
        ids.push(SOS_ID);
        ids.extend(
            sentence
                .split_whitespace()
                .take(content)
                .map(|token| self.id(token)),
        );
        ids.push(EOS_ID);
        ids.resize(max_len.max(ids.len()), PAD_ID);
        ids
    }

    /// Inverse mapping that skips `<pad>`, `<sos>` and `<eos>`; ids
    /// outside the vocabulary become `<unk>`.
    pub fn decode_ids(&self, ids: &[u32]) -> Vec<String> {
        ids.iter()
            .filter(|&&id| id != PAD_ID && id != SOS_ID && id != EOS_ID)
            .map(|&id| self.token(id).to_string())
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Minimal embedding source backed by a set of known tokens
    struct KnownTokens(HashSet<String>);

    impl KnownTokens {
        fn new(tokens: &[&str]) -> Self {
            Self(tokens.iter().map(|t| t.to_string()).collect())
        }
    }

    impl EmbeddingSource for KnownTokens {
        fn dim(&self) -> usize {
            1
        }
        fn contains(&self, token: &str) -> bool {
            self.0.contains(token)
        }
        fn vector(&self, _token: &str) -> Option<&[f32]> {
            None
        }
    }

    fn hello_world() -> Vocabulary {
        Vocabulary::from_tokens(
            ["<pad>", "<unk>", "<sos>", "<eos>", "hello", "world"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_encode_hello_world() {
        let v = hello_world();
        assert_eq!(v.encode("hello world", 6), vec![2, 4, 5, 3, 0, 0]);
    }

    #[test]
    fn test_encode_length_is_always_max_len() {
        let v = hello_world();
        for max_len in 2..12 {
            for sentence in ["", "hello", "hello world hello world hello world hello world"] {
                assert_eq!(v.encode(sentence, max_len).len(), max_len);
            }
        }
    }

    #[test]
    fn test_encode_non_padding_count() {
        let v = hello_world();
        let sentence = "hello unknown world hello";
        let k = 4;
        for max_len in 2..10 {
            let ids = v.encode(sentence, max_len);
            let non_pad = ids.iter().filter(|&&id| id != PAD_ID).count();
            assert_eq!(non_pad, k.min(max_len - 2) + 2);
        }
    }

    #[test]
    fn test_encode_truncates_and_maps_unknown() {
        let v = hello_world();
        // max_len 4 leaves room for two content tokens
        assert_eq!(v.encode("bogus hello world", 4), vec![2, 1, 4, 3]);
    }

    #[test]
    fn test_encode_shortest_row_is_sos_eos() {
        assert_eq!(hello_world().encode("hello world", 2), vec![SOS_ID, EOS_ID]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "cannot hold <sos> and <eos>")]
    fn test_encode_rejects_max_len_below_two() {
        hello_world().encode("hello", 1);
    }

    #[test]
    fn test_decode_ids_round_trip() {
        let v = hello_world();
        let ids = v.encode("hello there world", 8);
        assert_eq!(v.decode_ids(&ids), vec!["hello", "<unk>", "world"]);

        // Truncation keeps only the first max_len - 2 tokens
        let ids = v.encode("world hello world", 4);
        assert_eq!(v.decode_ids(&ids), vec!["world", "hello"]);
    }

    #[test]
    fn test_decode_unknown_id_is_unk() {
        let v = hello_world();
        assert_eq!(v.decode_ids(&[2, 4, 99, 5, 3]), vec!["hello", "<unk>", "world"]);
    }

    #[test]
    fn test_from_corpus_filters_by_frequency_in_first_seen_order() {
        let sentences = ["b a c", "a b", "a d"];
        let v = Vocabulary::from_corpus(&sentences, 2);
        // b first appears before a, both reach 2 occurrences
        assert_eq!((v.token(4), v.token(5)), ("b", "a"));
        assert_eq!(v.id("b"), 4);
        assert_eq!(v.id("a"), 5);
        assert_eq!(v.id("c"), UNK_ID);
    }

    #[test]
    fn test_reserved_ids_survive_any_corpus() {
        // Corpus containing the reserved tokens themselves
        let sentences = ["<eos> <pad> x", "<sos> <unk> x"];
        let v = Vocabulary::from_corpus(&sentences, 1);
        for (id, token) in RESERVED_TOKENS.iter().enumerate() {
            assert_eq!(v.id(token), id as u32);
        }
        assert_eq!(v.id("x"), 4);
        assert_eq!(v.len(), 5);
    }

    #[test]
    fn test_intersect_drops_and_renumbers() {
        let sentences = ["one two three four"];
        let candidates = Vocabulary::from_corpus(&sentences, 1);
        let source = KnownTokens::new(&["two", "four", "unrelated"]);

        let v = candidates.intersect(&source);
        assert_eq!(v.len(), 6);
        assert_eq!(v.id("two"), 4);
        assert_eq!(v.id("four"), 5);
        assert_eq!(v.id("one"), UNK_ID);
    }

    #[test]
    fn test_intersect_is_idempotent() {
        let sentences = ["a b c d e", "c d e f"];
        let source = KnownTokens::new(&["a", "c", "e", "f"]);
        let once = Vocabulary::from_corpus(&sentences, 1).intersect(&source);
        let twice = once.intersect(&source);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_inputs_give_reserved_only() {
        let empty: [&str; 0] = [];
        assert_eq!(Vocabulary::from_corpus(&empty, 1).len(), 4);

        let v = Vocabulary::from_corpus(&["a b"], 1).intersect(&KnownTokens::new(&[]));
        assert_eq!(v, Vocabulary::reserved_only());
    }

    #[test]
    fn test_from_tokens_rejects_bad_reserved() {
        let tokens = vec!["<unk>", "<pad>", "<sos>", "<eos>"]
            .into_iter()
            .map(String::from)
            .collect();
        assert!(Vocabulary::from_tokens(tokens).is_err());
    }

    #[test]
    fn test_from_tokens_rejects_duplicates() {
        let tokens = vec!["<pad>", "<unk>", "<sos>", "<eos>", "a", "a"]
            .into_iter()
            .map(String::from)
            .collect();
        assert!(Vocabulary::from_tokens(tokens).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let v = hello_world();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"tokens":["<pad>","<unk>","<sos>","<eos>","hello","world"]}"#);
        let back: Vocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);

        let broken = r#"{"tokens":["<pad>","<unk>"]}"#;
        assert!(serde_json::from_str::<Vocabulary>(broken).is_err());
    }
}
