// ============================================================
// Layer 4 - Translation Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<TranslationItem>
// into integer tensors on one device.
//
//   Input:  N items, encoder rows of length L, decoder rows L - 1
//   Output: TranslationBatch with
//             encoder_input  [N, L]
//             decoder_input  [N, L - 1]
//             decoder_target [N, L - 1]
//
// Every row is already padded to the same width by the sequence
// encoder, so stacking is a flatten + reshape; no dynamic padding
// happens here.
//
// The batch also carries the number of target ids the loss will
// score, computed on the host. The trainer needs it to normalise
// losses of batches split across several devices.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::TranslationItem;

// ─── TranslationBatch ─────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TranslationBatch<B: Backend> {
    /// Encoded source sentences - [batch, max_len]
    pub encoder_input: Tensor<B, 2, Int>,

    /// Teacher-forcing decoder input - [batch, max_len - 1]
    pub decoder_input: Tensor<B, 2, Int>,

    /// Ground truth next tokens - [batch, max_len - 1]
    pub decoder_target: Tensor<B, 2, Int>,

    /// Non-pad ids in decoder_target[:, 1..]
    pub scored_targets: usize,
}

// ─── TranslationBatcher ───────────────────────────────────────────────────────
/// Holds the device the batch tensors are created on.
#[derive(Clone, Debug)]
pub struct TranslationBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> TranslationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

// ─── ItemBatcher ──────────────────────────────────────────────────────────────
/// Hands the loaded items back untouched, so a data loader can shuffle
/// and chunk the dataset while the caller decides which device each
/// part of the batch goes to.
#[derive(Clone, Debug, Default)]
pub struct ItemBatcher;

impl Batcher<TranslationItem, Vec<TranslationItem>> for ItemBatcher {
    fn batch(&self, items: Vec<TranslationItem>) -> Vec<TranslationItem> {
        items
    }
}

/// Flatten rows of equal width into a [rows, width] Int tensor.
pub fn stack_rows<B: Backend>(rows: &[&[u32]], device: &B::Device) -> Tensor<B, 2, Int> {
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    let flat: Vec<i64> = rows
        .iter()
        .flat_map(|row| row.iter().map(|&id| id as i64))
        .collect();

    Tensor::<B, 2, Int>::from_data(TensorData::new(flat, [rows.len(), width]), device)
}

impl<B: Backend> Batcher<TranslationItem, TranslationBatch<B>> for TranslationBatcher<B> {
    fn batch(&self, items: Vec<TranslationItem>) -> TranslationBatch<B> {
        let encoder_rows: Vec<&[u32]> = items.iter().map(|i| i.encoder_input.as_slice()).collect();
        let input_rows:   Vec<&[u32]> = items.iter().map(|i| i.decoder_input.as_slice()).collect();
        let target_rows:  Vec<&[u32]> = items.iter().map(|i| i.decoder_target.as_slice()).collect();

        TranslationBatch {
            encoder_input:  stack_rows(&encoder_rows, &self.device),
            decoder_input:  stack_rows(&input_rows, &self.device),
            decoder_target: stack_rows(&target_rows, &self.device),
            scored_targets: items.iter().map(TranslationItem::scored_targets).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_batch_shapes_and_values() {
        let device = Default::default();
        let batcher = TranslationBatcher::<NdArray>::new(device);

        let items = vec![
            TranslationItem {
                encoder_input:  vec![2, 4, 3, 0],
                decoder_input:  vec![2, 5, 3],
                decoder_target: vec![5, 3, 0],
            },
            TranslationItem {
                encoder_input:  vec![2, 4, 4, 3],
                decoder_input:  vec![2, 5, 6],
                decoder_target: vec![5, 6, 3],
            },
        ];

        let batch = batcher.batch(items);
        assert_eq!(batch.encoder_input.dims(), [2, 4]);
        assert_eq!(batch.decoder_input.dims(), [2, 3]);
        assert_eq!(batch.decoder_target.dims(), [2, 3]);
        // item 1 scores <eos>, item 2 scores 6 and <eos>
        assert_eq!(batch.scored_targets, 3);

        let values: Vec<i64> = batch
            .encoder_input
            .into_data()
            .convert::<i64>()
            .to_vec()
            .unwrap();
        assert_eq!(values, vec![2, 4, 3, 0, 2, 4, 4, 3]);
    }

    #[test]
    fn test_item_batcher_keeps_loader_order() {
        let items: Vec<TranslationItem> = (4..7)
            .map(|w| TranslationItem {
                encoder_input:  vec![2, w, 3],
                decoder_input:  vec![2, w],
                decoder_target: vec![w, 3],
            })
            .collect();
        assert_eq!(ItemBatcher.batch(items.clone()), items);
    }
}
