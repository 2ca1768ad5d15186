// ============================================================
// Layer 3 - SentencePair Domain Type
// ============================================================
// One row of the parallel corpus: a Chinese source sentence and
// its English reference translation. Plain data, no behaviour
// beyond construction.

use serde::{Deserialize, Serialize};

/// A source/target sentence pair, raw or cleaned depending on the
/// pipeline stage that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentencePair {
    /// Chinese side
    pub source: String,

    /// English side
    pub target: String,
}

impl SentencePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}
