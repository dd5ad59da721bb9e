use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use rand::Rng;

use crate::error::{ChatError, ChatResult};

/// Dimensions of the seq2seq network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Seq2SeqArgs {
    /// Output rows of the embeddings and the softmax head; id 0 is padding.
    pub vocab_size: usize,
    /// Embedding width.
    pub embed_dim: usize,
    /// GRU state width.
    pub hidden_dim: usize,
}

impl Default for Seq2SeqArgs {
    fn default() -> Self {
        Self {
            vocab_size: 1024,
            embed_dim: 128,
            hidden_dim: 136,
        }
    }
}

fn check_shape(tensor: &str, got: (usize, usize), expected: (usize, usize)) -> ChatResult<()> {
    if got == expected {
        Ok(())
    } else {
        Err(ChatError::ShapeMismatch {
            tensor: tensor.to_string(),
            expected,
            got,
        })
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Embedding layer mapping token ids to vectors.
#[derive(Clone, Debug)]
pub struct Embedding {
    weight: Array2<f32>, // vocab_size x dim
}

impl Embedding {
    pub fn new<R: Rng + ?Sized>(vocab_size: usize, dim: usize, rng: &mut R) -> Self {
        let weight = Array2::from_shape_fn((vocab_size, dim), |_| rng.gen_range(-0.1..0.1));
        Self { weight }
    }

    pub fn from_weight(weight: Array2<f32>) -> Self {
        Self { weight }
    }

    pub fn weight(&self) -> &Array2<f32> {
        &self.weight
    }

    /// Row for `token`; ids past the table read as zeros.
    pub fn lookup(&self, token: usize) -> Array1<f32> {
        if token < self.weight.nrows() {
            self.weight.row(token).to_owned()
        } else {
            Array1::zeros(self.weight.ncols())
        }
    }

    pub fn forward(&self, tokens: &[usize]) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((tokens.len(), self.weight.ncols()));
        for (i, &tok) in tokens.iter().enumerate() {
            out.row_mut(i).assign(&self.lookup(tok));
        }
        out
    }
}

/// Fully connected layer.
#[derive(Clone, Debug)]
pub struct Linear {
    weight: Array2<f32>, // out x in
    bias: Array1<f32>,
}

impl Linear {
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let weight =
            Array2::from_shape_fn((out_features, in_features), |_| rng.gen_range(-0.1..0.1));
        let bias = Array1::from_shape_fn(out_features, |_| rng.gen_range(-0.1..0.1));
        Self { weight, bias }
    }

    pub fn from_parts(weight: Array2<f32>, bias: Array1<f32>) -> ChatResult<Self> {
        check_shape("linear.bias", (1, bias.len()), (1, weight.nrows()))?;
        Ok(Self { weight, bias })
    }

    pub fn weight(&self) -> &Array2<f32> {
        &self.weight
    }

    pub fn bias(&self) -> &Array1<f32> {
        &self.bias
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn forward_vec(&self, x: ArrayView1<f32>) -> Array1<f32> {
        self.weight.dot(&x) + &self.bias
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut y = x.dot(&self.weight.t());
        y += &self.bias.view().insert_axis(Axis(0));
        y
    }
}

/// Gated recurrent unit with the reset gate applied after the recurrent
/// projection. Gate rows are ordered update, reset, candidate.
#[derive(Clone, Debug)]
pub struct Gru {
    input: Linear,     // 3h x in
    recurrent: Linear, // 3h x h
    units: usize,
}

impl Gru {
    pub fn new<R: Rng + ?Sized>(in_features: usize, units: usize, rng: &mut R) -> Self {
        Self {
            input: Linear::new(in_features, 3 * units, rng),
            recurrent: Linear::new(units, 3 * units, rng),
            units,
        }
    }

    pub fn from_parts(input: Linear, recurrent: Linear) -> ChatResult<Self> {
        let units = recurrent.in_features();
        check_shape(
            "gru.recurrent",
            recurrent.weight().dim(),
            (3 * units, units),
        )?;
        check_shape(
            "gru.input",
            input.weight().dim(),
            (3 * units, input.in_features()),
        )?;
        Ok(Self {
            input,
            recurrent,
            units,
        })
    }

    pub fn input(&self) -> &Linear {
        &self.input
    }

    pub fn recurrent(&self) -> &Linear {
        &self.recurrent
    }

    pub fn units(&self) -> usize {
        self.units
    }

    /// One recurrence step.
    pub fn step(&self, x: ArrayView1<f32>, h: ArrayView1<f32>) -> Array1<f32> {
        let n = self.units;
        let xw = self.input.forward_vec(x);
        let hu = self.recurrent.forward_vec(h);

        let z = (&xw.slice(s![..n]) + &hu.slice(s![..n])).mapv(sigmoid);
        let r = (&xw.slice(s![n..2 * n]) + &hu.slice(s![n..2 * n])).mapv(sigmoid);
        let candidate = (&xw.slice(s![2 * n..]) + &(&r * &hu.slice(s![2 * n..]))).mapv(f32::tanh);

        &z * &h + &((1.0 - &z) * &candidate)
    }
}

/// Embedding followed by a GRU run from a zero state.
#[derive(Clone, Debug)]
pub struct Encoder {
    embed: Embedding,
    gru: Gru,
}

impl Encoder {
    pub fn new(embed: Embedding, gru: Gru) -> Self {
        Self { embed, gru }
    }

    pub fn embed(&self) -> &Embedding {
        &self.embed
    }

    pub fn gru(&self) -> &Gru {
        &self.gru
    }

    /// Per-step outputs (`len x hidden`) and the final hidden state.
    pub fn encode_sequence(&self, ids: &[usize]) -> (Array2<f32>, Array1<f32>) {
        let embedded = self.embed.forward(ids);
        let mut outputs = Array2::<f32>::zeros((ids.len(), self.gru.units()));
        let mut h = Array1::<f32>::zeros(self.gru.units());
        for (i, x) in embedded.axis_iter(Axis(0)).enumerate() {
            h = self.gru.step(x, h.view());
            outputs.row_mut(i).assign(&h);
        }
        (outputs, h)
    }
}

/// One decode step: embedding, GRU cell, dense head with softmax.
#[derive(Clone, Debug)]
pub struct Decoder {
    embed: Embedding,
    gru: Gru,
    head: Linear,
}

impl Decoder {
    pub fn new(embed: Embedding, gru: Gru, head: Linear) -> Self {
        Self { embed, gru, head }
    }

    pub fn embed(&self) -> &Embedding {
        &self.embed
    }

    pub fn gru(&self) -> &Gru {
        &self.gru
    }

    pub fn head(&self) -> &Linear {
        &self.head
    }

    /// Probability over the vocabulary and the next hidden state.
    pub fn step(&self, prev_token: usize, hidden: ArrayView1<f32>) -> (Array1<f32>, Array1<f32>) {
        let x = self.embed.lookup(prev_token);
        let h = self.gru.step(x.view(), hidden);
        let logits = self.head.forward_vec(h.view());
        (softmax(&logits), h)
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &Array1<f32>) -> Array1<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Encoder/decoder pair with matching dimensions.
#[derive(Clone, Debug)]
pub struct Seq2Seq {
    pub args: Seq2SeqArgs,
    encoder: Encoder,
    decoder: Decoder,
}

impl Seq2Seq {
    /// Randomly initialised network, for demos and tests.
    pub fn random<R: Rng + ?Sized>(args: Seq2SeqArgs, rng: &mut R) -> Self {
        let encoder = Encoder::new(
            Embedding::new(args.vocab_size, args.embed_dim, rng),
            Gru::new(args.embed_dim, args.hidden_dim, rng),
        );
        let decoder = Decoder::new(
            Embedding::new(args.vocab_size, args.embed_dim, rng),
            Gru::new(args.embed_dim, args.hidden_dim, rng),
            Linear::new(args.hidden_dim, args.vocab_size, rng),
        );
        Self {
            args,
            encoder,
            decoder,
        }
    }

    /// Assemble from loaded layers, checking every shape against `args`.
    pub fn from_parts(args: Seq2SeqArgs, encoder: Encoder, decoder: Decoder) -> ChatResult<Self> {
        let Seq2SeqArgs {
            vocab_size: v,
            embed_dim: e,
            hidden_dim: h,
        } = args;
        check_shape("encoder.embedding", encoder.embed.weight.dim(), (v, e))?;
        check_shape("encoder.gru.input", encoder.gru.input.weight.dim(), (3 * h, e))?;
        check_shape("encoder.gru.recurrent", encoder.gru.recurrent.weight.dim(), (3 * h, h))?;
        check_shape("decoder.embedding", decoder.embed.weight.dim(), (v, e))?;
        check_shape("decoder.gru.input", decoder.gru.input.weight.dim(), (3 * h, e))?;
        check_shape("decoder.gru.recurrent", decoder.gru.recurrent.weight.dim(), (3 * h, h))?;
        check_shape("decoder.head", decoder.head.weight.dim(), (v, h))?;
        Ok(Self {
            args,
            encoder,
            decoder,
        })
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny() -> Seq2Seq {
        let mut rng = StdRng::seed_from_u64(1);
        Seq2Seq::random(
            Seq2SeqArgs {
                vocab_size: 12,
                embed_dim: 6,
                hidden_dim: 5,
            },
            &mut rng,
        )
    }

    #[test]
    fn encoder_shapes() {
        let model = tiny();
        let (outputs, h) = model.encoder().encode_sequence(&[2, 3, 4, 0, 0]);
        assert_eq!(outputs.dim(), (5, 5));
        assert_eq!(h.len(), 5);
        assert_eq!(outputs.row(4), h);
    }

    #[test]
    fn encoder_is_deterministic() {
        let model = tiny();
        let (_, a) = model.encoder().encode_sequence(&[1, 2, 3]);
        let (_, b) = model.encoder().encode_sequence(&[1, 2, 3]);
        assert_eq!(a, b);
    }

    #[test]
    fn decoder_step_yields_distribution() {
        let model = tiny();
        let (_, h) = model.encoder().encode_sequence(&[1, 2]);
        let (probs, next) = model.decoder().step(1, h.view());
        assert_eq!(probs.len(), 12);
        assert_eq!(next.len(), 5);
        assert!((probs.sum() - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn gru_state_stays_bounded() {
        let model = tiny();
        let (_, h) = model.encoder().encode_sequence(&[5; 40]);
        assert!(h.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn gru_with_closed_update_gate_keeps_state() {
        // Update gate saturated at 1 copies the previous state through.
        let units = 2;
        let mut bias = Array1::zeros(3 * units);
        bias.slice_mut(s![..units]).fill(50.0);
        let input = Linear::from_parts(Array2::zeros((3 * units, 3)), bias).unwrap();
        let recurrent =
            Linear::from_parts(Array2::zeros((3 * units, units)), Array1::zeros(3 * units))
                .unwrap();
        let gru = Gru::from_parts(input, recurrent).unwrap();
        let h = Array1::from(vec![0.25_f32, -0.5]);
        let next = gru.step(Array1::from(vec![1.0_f32, 2.0, 3.0]).view(), h.view());
        assert!((next[0] - 0.25).abs() < 1e-5);
        assert!((next[1] + 0.5).abs() < 1e-5);
    }

    #[test]
    fn mismatched_parts_are_rejected() {
        let model = tiny();
        let args = Seq2SeqArgs {
            vocab_size: 13,
            ..model.args.clone()
        };
        let err = Seq2Seq::from_parts(args, model.encoder().clone(), model.decoder().clone())
            .unwrap_err();
        assert!(matches!(err, ChatError::ShapeMismatch { .. }));
    }
}
