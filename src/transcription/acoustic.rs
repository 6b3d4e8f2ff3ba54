//! # Acoustic Scorer
//!
//! Maps feature frames to per-frame log-probabilities over the symbol
//! inventory with a small feed-forward network evaluated through Candle.
//!
//! ## Network:
//! 1. Optional per-dimension normalization (`norm.mean`, `norm.std`)
//! 2. Context splicing: each frame is concatenated with `context` neighbours
//!    on each side, replicating the edge frames
//! 3. Hidden layers `hidden.{i}` with the configured activation
//! 4. Output layer `output` followed by log-softmax over symbols
//!
//! ## Memory:
//! Frames are pushed through the network in chunks of `chunk_frames` so peak
//! tensor size does not grow with utterance length.

use crate::audio::FeatureFrames;
use crate::error::{EngineError, EngineResult};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{Linear, Module, VarBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Tanh,
    Gelu,
}

impl Activation {
    fn apply(self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Activation::Relu => xs.relu(),
            Activation::Tanh => xs.tanh(),
            Activation::Gelu => xs.gelu(),
        }
    }
}

/// Acoustic network shape, stored in the model header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcousticConfig {
    /// Frames of context spliced on each side of the centre frame
    pub context: usize,
    pub hidden_sizes: Vec<usize>,
    pub activation: Activation,
    /// Whether the weights carry `norm.mean`/`norm.std`
    pub normalize: bool,
}

/// Row-major `[n_frames, n_symbols]` matrix of log-probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    data: Vec<f32>,
    n_frames: usize,
    n_symbols: usize,
}

impl ScoreMatrix {
    pub fn new(data: Vec<f32>, n_frames: usize, n_symbols: usize) -> EngineResult<Self> {
        if data.len() != n_frames * n_symbols {
            return Err(EngineError::ModelInferenceError(format!(
                "score matrix holds {} values, expected {} x {}",
                data.len(),
                n_frames,
                n_symbols
            )));
        }
        Ok(Self {
            data,
            n_frames,
            n_symbols,
        })
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    pub fn n_symbols(&self) -> usize {
        self.n_symbols
    }

    pub fn row(&self, frame: usize) -> &[f32] {
        let start = frame * self.n_symbols;
        &self.data[start..start + self.n_symbols]
    }
}

struct Normalizer {
    mean: Vec<f32>,
    inv_std: Vec<f32>,
}

pub struct AcousticScorer {
    config: AcousticConfig,
    feature_dim: usize,
    n_symbols: usize,
    normalizer: Option<Normalizer>,
    hidden: Vec<Linear>,
    output: Linear,
    device: Device,
    chunk_frames: usize,
}

impl AcousticScorer {
    /// Build the network from safetensors bytes.
    ///
    /// ## Returns:
    /// - **Ok(AcousticScorer)**: every tensor present with the expected shape
    /// - **Err(InvalidModel)**: missing tensor, shape mismatch or unreadable weights
    pub fn load(
        config: &AcousticConfig,
        feature_dim: usize,
        n_symbols: usize,
        weights: Vec<u8>,
        device: &Device,
        chunk_frames: usize,
    ) -> EngineResult<Self> {
        let invalid = |e: candle_core::Error| EngineError::InvalidModel(format!("acoustic weights: {}", e));

        if feature_dim == 0 || n_symbols == 0 {
            return Err(EngineError::InvalidModel("acoustic model has zero-sized input or output".into()));
        }
        if config.hidden_sizes.iter().any(|&h| h == 0) {
            return Err(EngineError::InvalidModel("acoustic hidden layer of size 0".into()));
        }

        let vb = VarBuilder::from_buffered_safetensors(weights, DType::F32, device).map_err(invalid)?;

        let normalizer = if config.normalize {
            let mean = vb.get(feature_dim, "norm.mean").and_then(|t| t.to_vec1::<f32>()).map_err(invalid)?;
            let std = vb.get(feature_dim, "norm.std").and_then(|t| t.to_vec1::<f32>()).map_err(invalid)?;
            if mean.iter().chain(std.iter()).any(|v| !v.is_finite()) {
                return Err(EngineError::InvalidModel("normalization statistics are not finite".into()));
            }
            let inv_std = std.iter().map(|s| 1.0 / s.abs().max(1e-5)).collect();
            Some(Normalizer { mean, inv_std })
        } else {
            None
        };

        let mut in_dim = feature_dim * (2 * config.context + 1);
        let mut hidden = Vec::with_capacity(config.hidden_sizes.len());
        for (i, &size) in config.hidden_sizes.iter().enumerate() {
            hidden.push(candle_nn::linear(in_dim, size, vb.pp(format!("hidden.{}", i))).map_err(invalid)?);
            in_dim = size;
        }
        let output = candle_nn::linear(in_dim, n_symbols, vb.pp("output")).map_err(invalid)?;

        tracing::debug!(
            context = config.context,
            hidden_layers = hidden.len(),
            n_symbols,
            "acoustic network ready"
        );

        Ok(Self {
            config: config.clone(),
            feature_dim,
            n_symbols,
            normalizer,
            hidden,
            output,
            device: device.clone(),
            chunk_frames: chunk_frames.max(1),
        })
    }

    pub fn n_symbols(&self) -> usize {
        self.n_symbols
    }

    /// Width of one spliced input row.
    pub fn input_dim(&self) -> usize {
        self.feature_dim * (2 * self.config.context + 1)
    }

    /// Score every frame.
    ///
    /// ## Returns:
    /// - **Ok(ScoreMatrix)**: one row of log-probabilities per input frame
    /// - **Err(ModelInferenceError)**: dimension mismatch, tensor failure or non-finite output
    pub fn score(&self, frames: &FeatureFrames) -> EngineResult<ScoreMatrix> {
        if frames.dim() != self.feature_dim {
            return Err(EngineError::ModelInferenceError(format!(
                "feature dimension {} does not match network input {}",
                frames.dim(),
                self.feature_dim
            )));
        }

        let n_frames = frames.n_frames();
        let mut scores = Vec::with_capacity(n_frames * self.n_symbols);

        for start in (0..n_frames).step_by(self.chunk_frames) {
            let end = (start + self.chunk_frames).min(n_frames);
            let input = self.splice(frames, start, end);
            let rows = self.forward(input, end - start)?;

            for (offset, row) in rows.into_iter().enumerate() {
                if row.iter().any(|v| v.is_nan() || *v == f32::INFINITY) {
                    return Err(EngineError::ModelInferenceError(format!(
                        "non-finite acoustic score at frame {}",
                        start + offset
                    )));
                }
                scores.extend(row);
            }
        }

        ScoreMatrix::new(scores, n_frames, self.n_symbols)
    }

    fn splice(&self, frames: &FeatureFrames, start: usize, end: usize) -> Vec<f32> {
        let context = self.config.context as isize;
        let last = frames.n_frames() as isize - 1;
        let mut input = Vec::with_capacity((end - start) * self.input_dim());

        for centre in start..end {
            for offset in -context..=context {
                let index = (centre as isize + offset).clamp(0, last) as usize;
                let frame = frames.frame(index);
                match &self.normalizer {
                    Some(norm) => input.extend(
                        frame
                            .iter()
                            .zip(norm.mean.iter().zip(norm.inv_std.iter()))
                            .map(|(x, (mean, inv_std))| (x - mean) * inv_std),
                    ),
                    None => input.extend_from_slice(frame),
                }
            }
        }
        input
    }

    fn forward(&self, input: Vec<f32>, rows: usize) -> EngineResult<Vec<Vec<f32>>> {
        let mut xs = Tensor::from_vec(input, (rows, self.input_dim()), &self.device)?;
        for layer in &self.hidden {
            xs = self.config.activation.apply(&layer.forward(&xs)?)?;
        }
        let logits = self.output.forward(&xs)?;
        let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
        Ok(log_probs.to_vec2::<f32>()?)
    }
}
