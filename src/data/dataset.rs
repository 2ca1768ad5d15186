use anyhow::{bail, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::sentence_pair::SentencePair;
use crate::domain::vocabulary::{Vocabulary, PAD_ID};

/// One fully encoded training example.
///
/// encoder_input:  <sos> src... <eos> <pad>...       (max_len)
/// decoder_input:  <sos> tgt... <eos> <pad>...       (max_len - 1, last id dropped)
/// decoder_target: tgt... <eos> <pad>...             (max_len - 1, first id dropped)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationItem {
    pub encoder_input:  Vec<u32>,
    pub decoder_input:  Vec<u32>,
    pub decoder_target: Vec<u32>,
}

impl TranslationItem {
    /// Number of target ids the loss scores: positions 1.. that are
    /// not padding.
    pub fn scored_targets(&self) -> usize {
        self.decoder_target
            .iter()
            .skip(1)
            .filter(|&&id| id != PAD_ID)
            .count()
    }
}

/// The encoded corpus artifact: three index-aligned collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedCorpus {
    pub encoder_input:  Vec<Vec<u32>>,
    pub decoder_input:  Vec<Vec<u32>>,
    pub decoder_target: Vec<Vec<u32>>,
}

impl EncodedCorpus {
    /// Encode cleaned sentence pairs with the same `max_len` on both sides.
    pub fn encode(
        pairs:        &[SentencePair],
        source_vocab: &Vocabulary,
        target_vocab: &Vocabulary,
        max_len:      usize,
    ) -> Self {
        let mut corpus = Self::default();
        for pair in pairs {
            let target = target_vocab.encode(&pair.target, max_len);
            corpus.encoder_input.push(source_vocab.encode(&pair.source, max_len));
            corpus.decoder_input.push(target[..target.len() - 1].to_vec());
            corpus.decoder_target.push(target[1..].to_vec());
        }
        corpus
    }

    pub fn len(&self) -> usize {
        self.encoder_input.len()
    }

    /// Sequence length of the encoder side, if the corpus is non-empty.
    pub fn max_len(&self) -> Option<usize> {
        self.encoder_input.first().map(Vec::len)
    }

    /// Check the three collections line up and every row has the
    /// expected width.
    pub fn validate(&self) -> Result<()> {
        let n = self.encoder_input.len();
        if self.decoder_input.len() != n || self.decoder_target.len() != n {
            bail!(
                "encoded corpus is misaligned: {} encoder rows, {} decoder inputs, {} decoder targets",
                n,
                self.decoder_input.len(),
                self.decoder_target.len()
            );
        }

        let Some(max_len) = self.max_len() else {
            return Ok(());
        };
        // <sos> w <eos> is the shortest row that still leaves a scored target
        if max_len < 3 {
            bail!("encoded corpus rows are {max_len} ids wide, need at least 3");
        }
        for i in 0..n {
            if self.encoder_input[i].len() != max_len
                || self.decoder_input[i].len() != max_len - 1
                || self.decoder_target[i].len() != max_len - 1
            {
                bail!("encoded corpus row {i} does not match max_len {max_len}");
            }
        }
        Ok(())
    }
}

pub struct TranslationDataset {
    items: Vec<TranslationItem>,
}

impl TranslationDataset {
    pub fn new(items: Vec<TranslationItem>) -> Self {
        Self { items }
    }

    /// Clone the items at `indices`, in that order.
    pub fn gather(&self, indices: &[usize]) -> Vec<TranslationItem> {
        indices.iter().filter_map(|&i| self.get(i)).collect()
    }
}

impl TryFrom<EncodedCorpus> for TranslationDataset {
    type Error = anyhow::Error;

    fn try_from(corpus: EncodedCorpus) -> Result<Self> {
        corpus.validate()?;
        let items = corpus
            .encoder_input
            .into_iter()
            .zip(corpus.decoder_input)
            .zip(corpus.decoder_target)
            .map(|((encoder_input, decoder_input), decoder_target)| TranslationItem {
                encoder_input,
                decoder_input,
                decoder_target,
            })
            .collect();
        Ok(Self::new(items))
    }
}

impl Dataset<TranslationItem> for TranslationDataset {
    fn get(&self, index: usize) -> Option<TranslationItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
