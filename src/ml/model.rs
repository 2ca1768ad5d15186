use anyhow::{anyhow, bail, Result};
use burn::{
    module::Param,
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::{
        activation::{log_softmax, sigmoid},
        TensorData,
    },
};

use crate::domain::traits::EmbeddingSource;
use crate::domain::vocabulary::{Vocabulary, PAD_ID, RESERVED_TOKENS};

/// Embedding width of learned tables, and of the reserved rows when a
/// pretrained source has no vectors at all.
pub const DEFAULT_EMBEDDING_DIM: usize = 200;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally, do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct Seq2SeqConfig {
    pub source_vocab_size:    usize,
    pub target_vocab_size:    usize,
    pub source_embedding_dim: usize,
    pub target_embedding_dim: usize,
    pub hidden_size:          usize,
    pub num_layers:           usize,
    #[config(default = 0.3)]
    pub dropout:              f64,
}

impl Seq2SeqConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Seq2SeqModel<B> {
        Seq2SeqModel {
            embeddings: self.init_embeddings(device),
            network:    self.init_network(device),
        }
    }

    fn init_embeddings<B: Backend>(&self, device: &B::Device) -> EmbeddingTables<B> {
        EmbeddingTables {
            source: EmbeddingConfig::new(self.source_vocab_size, self.source_embedding_dim).init(device),
            target: EmbeddingConfig::new(self.target_vocab_size, self.target_embedding_dim).init(device),
        }
    }

    fn init_network<B: Backend>(&self, device: &B::Device) -> Seq2SeqNetwork<B> {
        Seq2SeqNetwork {
            source_norm: LayerNormConfig::new(self.source_embedding_dim).init(device),
            target_norm: LayerNormConfig::new(self.target_embedding_dim).init(device),
            encoder:     self.build_gru_stack(self.source_embedding_dim, device),
            decoder:     self.build_gru_stack(self.target_embedding_dim, device),
            output_norm: LayerNormConfig::new(self.hidden_size).init(device),
            projection:  LinearConfig::new(self.hidden_size, self.target_vocab_size).init(device),
        }
    }

    fn build_gru_stack<B: Backend>(&self, d_input: usize, device: &B::Device) -> GruStack<B> {
        let layers = (0..self.num_layers.max(1))
            .map(|i| {
                let d_in = if i == 0 { d_input } else { self.hidden_size };
                GruLayer {
                    input:    LinearConfig::new(d_in, 3 * self.hidden_size).init(device),
                    hidden:   LinearConfig::new(self.hidden_size, 3 * self.hidden_size).init(device),
                    d_hidden: self.hidden_size,
                }
            })
            .collect();
        GruStack { layers, dropout: DropoutConfig::new(self.dropout).init() }
    }
}

/// One GRU layer. Gate rows are ordered reset, update, candidate:
///
/// ```text
/// r  = σ(W_ir x + b_ir + W_hr h + b_hr)
/// z  = σ(W_iz x + b_iz + W_hz h + b_hz)
/// n  = tanh(W_in x + b_in + r ⊙ (W_hn h + b_hn))
/// h' = (1 - z) ⊙ n + z ⊙ h
/// ```
#[derive(Module, Debug)]
pub struct GruLayer<B: Backend> {
    /// x → [r | z | n], [d_in, 3 * hidden]
    pub input:    Linear<B>,
    /// h → [r | z | n], [hidden, 3 * hidden]
    pub hidden:   Linear<B>,
    pub d_hidden: usize,
}

impl<B: Backend> GruLayer<B> {
    /// input: [batch, steps, d_in], initial: [batch, hidden] (zeros when None).
    /// Returns every step's state [batch, steps, hidden] and the last one.
    pub fn forward(
        &self,
        input:   Tensor<B, 3>,
        initial: Option<Tensor<B, 2>>,
    ) -> (Tensor<B, 3>, Tensor<B, 2>) {
        let [batch, steps, _] = input.dims();
        let width = 3 * self.d_hidden;

        // Input projections do not depend on the state: one matmul for all steps
        let projected = self.input.forward(input);
        let mut state = initial
            .unwrap_or_else(|| Tensor::zeros([batch, self.d_hidden], &projected.device()));

        let mut outputs = Vec::with_capacity(steps);
        for t in 0..steps {
            let x_t = projected
                .clone()
                .slice([0..batch, t..t + 1, 0..width])
                .reshape([batch, width]);
            state = self.step(x_t, state);
            outputs.push(state.clone());
        }

        (Tensor::stack::<3>(outputs, 1), state)
    }

    /// One time step from the projected input and the previous state.
    fn step(&self, x: Tensor<B, 2>, h: Tensor<B, 2>) -> Tensor<B, 2> {
        let [xr, xz, xn] = split_gates(x, self.d_hidden);
        let [hr, hz, hn] = split_gates(self.hidden.forward(h.clone()), self.d_hidden);

        let r = sigmoid(xr + hr);
        let z = sigmoid(xz + hz);
        let n = (xn + r * hn).tanh();

        // (1 - z) * n + z * h
        n.clone() + z * (h - n)
    }
}

fn split_gates<B: Backend>(gates: Tensor<B, 2>, hidden: usize) -> [Tensor<B, 2>; 3] {
    let [batch, _] = gates.dims();
    [
        gates.clone().slice([0..batch, 0..hidden]),
        gates.clone().slice([0..batch, hidden..2 * hidden]),
        gates.slice([0..batch, 2 * hidden..3 * hidden]),
    ]
}

/// Final hidden state of every layer of a GRU stack, [batch, hidden] each.
///
/// Returned by the encoder and threaded by value through every decoder
/// step; the model never stores it.
#[derive(Debug, Clone)]
pub struct HiddenState<B: Backend> {
    pub layers: Vec<Tensor<B, 2>>,
}

/// Stacked GRU layers with dropout on the outputs of every layer but
/// the last.
#[derive(Module, Debug)]
pub struct GruStack<B: Backend> {
    pub layers:  Vec<GruLayer<B>>,
    pub dropout: Dropout,
}

impl<B: Backend> GruStack<B> {
    /// input: [batch, steps, d_in] → output [batch, steps, hidden] and the
    /// per-layer state after the last step.
    pub fn forward(
        &self,
        input:   Tensor<B, 3>,
        initial: Option<&HiddenState<B>>,
    ) -> (Tensor<B, 3>, HiddenState<B>) {
        let depth      = self.layers.len();
        let mut x      = input;
        let mut finals = Vec::with_capacity(depth);

        for (i, gru) in self.layers.iter().enumerate() {
            let state = initial.and_then(|h| h.layers.get(i).cloned());
            let (output, last) = gru.forward(x, state);
            finals.push(last);

            x = if i + 1 < depth { self.dropout.forward(output) } else { output };
        }

        (x, HiddenState { layers: finals })
    }
}

/// Embedding group. Frozen in pretrained mode, so it gets its own
/// optimizer only when the tables are learned.
#[derive(Module, Debug)]
pub struct EmbeddingTables<B: Backend> {
    pub source: Embedding<B>,
    pub target: Embedding<B>,
}

/// Everything else: always trainable.
#[derive(Module, Debug)]
pub struct Seq2SeqNetwork<B: Backend> {
    pub source_norm: LayerNorm<B>,
    pub target_norm: LayerNorm<B>,
    pub encoder:     GruStack<B>,
    pub decoder:     GruStack<B>,
    pub output_norm: LayerNorm<B>,
    pub projection:  Linear<B>,
}

#[derive(Module, Debug)]
pub struct Seq2SeqModel<B: Backend> {
    pub embeddings: EmbeddingTables<B>,
    pub network:    Seq2SeqNetwork<B>,
}

impl<B: Backend> Seq2SeqModel<B> {
    /// source_ids: [batch, src_len] → final hidden state of every encoder layer
    pub fn encode(&self, source_ids: Tensor<B, 2, Int>) -> HiddenState<B> {
        let x = self.embeddings.source.forward(source_ids);
        let x = self.network.source_norm.forward(x);
        let (_, hidden) = self.network.encoder.forward(x, None);
        hidden
    }

    /// Run the decoder over target_ids [batch, steps] starting from `hidden`.
    /// Returns logits [batch, steps, target_vocab] and the carried state.
    pub fn decode(
        &self,
        target_ids: Tensor<B, 2, Int>,
        hidden:     &HiddenState<B>,
    ) -> (Tensor<B, 3>, HiddenState<B>) {
        let x = self.embeddings.target.forward(target_ids);
        let x = self.network.target_norm.forward(x);
        let (output, hidden) = self.network.decoder.forward(x, Some(hidden));
        let output = self.network.output_norm.forward(output);
        (self.network.projection.forward(output), hidden)
    }

    /// Teacher-forced pass over the whole target input.
    pub fn forward(
        &self,
        source_ids:   Tensor<B, 2, Int>,
        target_input: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let hidden = self.encode(source_ids);
        self.decode(target_input, &hidden).0
    }

    /// One decoder step. prev_ids: [batch, 1] → logits [batch, target_vocab]
    pub fn decode_step(
        &self,
        prev_ids: Tensor<B, 2, Int>,
        hidden:   HiddenState<B>,
    ) -> (Tensor<B, 2>, HiddenState<B>) {
        let (logits, hidden) = self.decode(prev_ids, &hidden);
        let [batch, _, vocab] = logits.dims();
        (logits.reshape([batch, vocab]), hidden)
    }

    /// Teacher-forced loss: summed token NLL over scored targets divided
    /// by `normalizer`. See [`masked_cross_entropy`].
    pub fn forward_loss(
        &self,
        source_ids:    Tensor<B, 2, Int>,
        target_input:  Tensor<B, 2, Int>,
        target_output: Tensor<B, 2, Int>,
        normalizer:    f64,
    ) -> Tensor<B, 1> {
        let logits = self.forward(source_ids, target_input);
        masked_cross_entropy(logits, target_output, normalizer)
    }

    /// Replace both embedding tables with the given matrices.
    /// Shapes must equal the tables built from the config.
    pub fn with_embeddings(mut self, source: Tensor<B, 2>, target: Tensor<B, 2>) -> Result<Self> {
        check_shape("source", self.embeddings.source.weight.dims(), source.dims())?;
        check_shape("target", self.embeddings.target.weight.dims(), target.dims())?;
        self.embeddings.source.weight = Param::from_tensor(source);
        self.embeddings.target.weight = Param::from_tensor(target);
        Ok(self)
    }

    /// Stop gradients flowing into the embedding tables.
    pub fn freeze_embeddings(mut self) -> Self {
        self.embeddings = self.embeddings.no_grad();
        self
    }
}

fn check_shape(side: &str, expected: [usize; 2], actual: [usize; 2]) -> Result<()> {
    if expected != actual {
        bail!(
            "{side} embedding matrix is {}x{}, model expects {}x{}",
            actual[0], actual[1], expected[0], expected[1]
        );
    }
    Ok(())
}

/// Cross entropy over positions 1.. of logits [batch, steps, vocab] and
/// targets [batch, steps], with `<pad>` targets masked out.
///
/// Returns sum(-log p(target)) / normalizer. With `normalizer` equal to
/// the number of scored targets this is the token mean; splitting a batch
/// into shards that share one normalizer keeps the summed loss equal to
/// the full-batch loss.
pub fn masked_cross_entropy<B: Backend>(
    logits:     Tensor<B, 3>,
    targets:    Tensor<B, 2, Int>,
    normalizer: f64,
) -> Tensor<B, 1> {
    let [batch, steps, vocab] = logits.dims();

    let logits  = logits.slice([0..batch, 1..steps, 0..vocab]);
    let targets = targets.slice([0..batch, 1..steps]);

    let log_probs = log_softmax(logits, 2);
    let picked = log_probs
        .gather(2, targets.clone().unsqueeze_dim::<3>(2))
        .reshape([batch, steps - 1]);
    let mask = targets.equal_elem(PAD_ID as i64).bool_not().float();

    (picked * mask).sum().neg().div_scalar(normalizer.max(1.0))
}

/// Build a [vocab.len(), dim] matrix: the four reserved rows from the
/// default Embedding initialiser, every other row copied from `source`
/// in id order. An empty source (dim 0) gives just the reserved rows,
/// [`DEFAULT_EMBEDDING_DIM`] wide.
pub fn pretrained_matrix<B: Backend, E: EmbeddingSource + ?Sized>(
    vocab:  &Vocabulary,
    source: &E,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    let dim = match source.dim() {
        0   => DEFAULT_EMBEDDING_DIM,
        dim => dim,
    };
    let reserved = EmbeddingConfig::new(RESERVED_TOKENS.len(), dim)
        .init::<B>(device)
        .weight
        .val();

    let mut flat: Vec<f32> = Vec::with_capacity(vocab.len().saturating_sub(RESERVED_TOKENS.len()) * dim);
    for token in vocab.content_tokens() {
        let vector = source
            .vector(token)
            .ok_or_else(|| anyhow!("No pretrained vector for vocabulary token '{token}'"))?;
        if vector.len() != dim {
            bail!("Vector for '{token}' has {} values, expected {dim}", vector.len());
        }
        flat.extend_from_slice(vector);
    }

    if flat.is_empty() {
        return Ok(reserved);
    }

    let rows    = flat.len() / dim;
    let content = Tensor::<B, 2>::from_data(TensorData::new(flat, [rows, dim]), device);
    Ok(Tensor::cat(vec![reserved, content], 0))
}
