// ============================================================
// Layer 5 - Greedy Translator
// ============================================================
// Turns one source sentence into target text with a trained model.
//
//   1. Clean and encode the source with the training max_len
//   2. Run the encoder once; its hidden state is never recomputed
//   3. Start from <sos> and repeat at most max_len times:
//        feed only the last id + the carried hidden state
//        pick the argmax logit
//        stop (without appending) on <eos>
//   4. Map the produced ids back to tokens, join with spaces
//
// The loop bound is the only stop condition besides <eos>, so a
// model that never emits <eos> yields a truncated translation
// rather than hanging.
//
// Reference: Burn Book §3 (Building Blocks)
//            Sutskever et al. (2014) Sequence to Sequence Learning

use burn::{prelude::*, tensor::TensorData};

use crate::data::batcher::stack_rows;
use crate::domain::traits::TextCleaner;
use crate::domain::vocabulary::{Vocabulary, EOS_ID, SOS_ID};
use crate::ml::model::{HiddenState, Seq2SeqModel};

/// Greedy argmax decoding from `hidden`. Returns the produced ids,
/// excluding the leading `<sos>` and the terminating `<eos>`.
pub fn greedy_decode<B: Backend>(
    model:   &Seq2SeqModel<B>,
    hidden:  HiddenState<B>,
    max_len: usize,
    device:  &B::Device,
) -> Vec<u32> {
    let mut produced = Vec::with_capacity(max_len);
    let mut last     = SOS_ID;
    let mut hidden   = hidden;

    for _ in 0..max_len {
        let prev = Tensor::<B, 2, Int>::from_data(TensorData::new(vec![last as i64], [1, 1]), device);
        let (logits, next_hidden) = model.decode_step(prev, hidden);
        hidden = next_hidden;

        let next = logits.argmax(1).into_scalar().elem::<i64>() as u32;
        if next == EOS_ID {
            break;
        }
        produced.push(next);
        last = next;
    }

    produced
}

/// A loaded model plus everything needed to go from raw text to text.
pub struct GreedyTranslator<B: Backend, C: TextCleaner> {
    model:        Seq2SeqModel<B>,
    cleaner:      C,
    source_vocab: Vocabulary,
    target_vocab: Vocabulary,
    max_len:      usize,
    device:       B::Device,
}

impl<B: Backend, C: TextCleaner> GreedyTranslator<B, C> {
    pub fn new(
        model:        Seq2SeqModel<B>,
        cleaner:      C,
        source_vocab: Vocabulary,
        target_vocab: Vocabulary,
        max_len:      usize,
        device:       B::Device,
    ) -> Self {
        Self { model, cleaner, source_vocab, target_vocab, max_len, device }
    }

    /// Produced target ids for `text`, excluding `<sos>` and `<eos>`.
    pub fn translate_ids(&self, text: &str) -> Vec<u32> {
        let cleaned = self.cleaner.clean(text);
        let encoded = self.source_vocab.encode(&cleaned, self.max_len);
        tracing::debug!("Source '{}' -> {:?}", cleaned, encoded);

        let source = stack_rows::<B>(&[encoded.as_slice()], &self.device);
        let hidden = self.model.encode(source);
        greedy_decode(&self.model, hidden, self.max_len, &self.device)
    }

    /// Space-joined target tokens. Markup ids the decoder may still
    /// pick (`<pad>`, `<sos>`) never reach the text.
    pub fn translate(&self, text: &str) -> String {
        let ids = self.translate_ids(text);
        self.target_vocab.decode_ids(&ids).join(" ")
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::module::Param;

    use crate::data::cleaner::EnglishCleaner;
    use crate::domain::vocabulary::PAD_ID;
    use crate::ml::model::Seq2SeqConfig;

    type TestBackend = NdArray;

    const HIDDEN: usize = 8;

    fn vocab(extra: &[&str]) -> Vocabulary {
        let mut tokens: Vec<String> = ["<pad>", "<unk>", "<sos>", "<eos>"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        tokens.extend(extra.iter().map(|t| t.to_string()));
        Vocabulary::from_tokens(tokens).unwrap()
    }

    fn model(device: &<TestBackend as Backend>::Device) -> Seq2SeqModel<TestBackend> {
        Seq2SeqConfig::new(6, 6, 4, 4, HIDDEN, 2)
            .with_dropout(0.0)
            .init(device)
    }

    /// Zero projection weights with a large bias on `id`: argmax is always `id`.
    fn always_predicts(
        mut model: Seq2SeqModel<TestBackend>,
        id:        usize,
        device:    &<TestBackend as Backend>::Device,
    ) -> Seq2SeqModel<TestBackend> {
        let mut bias = vec![0.0f32; 6];
        bias[id] = 100.0;
        model.network.projection.weight =
            Param::from_tensor(Tensor::zeros([HIDDEN, 6], device));
        model.network.projection.bias = Some(Param::from_tensor(Tensor::from_data(
            TensorData::new(bias, [6]),
            device,
        )));
        model
    }

    fn translator(
        model: Seq2SeqModel<TestBackend>,
        max_len: usize,
    ) -> GreedyTranslator<TestBackend, EnglishCleaner> {
        GreedyTranslator::new(
            model,
            EnglishCleaner::new(),
            vocab(&["hello", "world"]),
            vocab(&["bonjour", "monde"]),
            max_len,
            Default::default(),
        )
    }

    #[test]
    fn test_immediate_eos_gives_empty_translation() {
        let device = Default::default();
        let t = translator(always_predicts(model(&device), EOS_ID as usize, &device), 10);
        assert_eq!(t.translate("hello world"), "");
    }

    #[test]
    fn test_decoding_stops_at_max_len() {
        let device = Default::default();
        let t = translator(always_predicts(model(&device), 4, &device), 7);
        assert_eq!(t.translate_ids("hello").len(), 7);
        assert_eq!(t.translate("hello"), vec!["bonjour"; 7].join(" "));
    }

    #[test]
    fn test_predicted_padding_is_not_printed() {
        let device = Default::default();
        let t = translator(always_predicts(model(&device), PAD_ID as usize, &device), 4);
        assert_eq!(t.translate_ids("hello"), vec![PAD_ID; 4]);
        assert_eq!(t.translate("hello"), "");
    }

    #[test]
    fn test_empty_input_terminates() {
        let device = Default::default();
        let t = translator(model(&device), 5);
        assert!(t.translate_ids("").len() <= 5);
    }

    #[test]
    fn test_greedy_decode_is_deterministic() {
        let device = Default::default();
        let t = translator(model(&device), 12);
        assert_eq!(t.translate_ids("hello world"), t.translate_ids("hello world"));
    }

    #[test]
    fn test_output_never_contains_eos() {
        let device = Default::default();
        let t = translator(model(&device), 12);
        let ids = t.translate_ids("world hello world");
        assert!(!ids.contains(&EOS_ID));
    }
}
