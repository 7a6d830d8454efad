//! Inference engine seam and a small quantized reference model.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Per-tensor affine quantization: `real = (q - zero_point) * scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantParams {
    pub fn dequantize(self, raw: i8) -> f32 {
        (i32::from(raw) - self.zero_point) as f32 * self.scale
    }

    pub fn quantize(self, real: f32) -> i8 {
        let q = (real / self.scale).round() as i32 + self.zero_point;
        q.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8
    }
}

/// A loaded model with fixed-size int8 input and output tensors.
///
/// The caller fills [`input_mut`](Self::input_mut), calls
/// [`invoke`](Self::invoke), then reads [`output`](Self::output) together with
/// [`output_quant`](Self::output_quant). The engine owns its scratch memory.
pub trait InferenceEngine: Send {
    fn input_len(&self) -> usize;
    fn output_len(&self) -> usize;
    fn input_mut(&mut self) -> &mut [i8];
    fn invoke(&mut self) -> Result<()>;
    fn output(&self) -> &[i8];
    fn output_quant(&self) -> QuantParams;
}

impl<T: InferenceEngine + ?Sized> InferenceEngine for Box<T> {
    fn input_len(&self) -> usize {
        (**self).input_len()
    }

    fn output_len(&self) -> usize {
        (**self).output_len()
    }

    fn input_mut(&mut self) -> &mut [i8] {
        (**self).input_mut()
    }

    fn invoke(&mut self) -> Result<()> {
        (**self).invoke()
    }

    fn output(&self) -> &[i8] {
        (**self).output()
    }

    fn output_quant(&self) -> QuantParams {
        (**self).output_quant()
    }
}

/// On-disk description of a single fully-connected layer followed by softmax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub labels: Vec<String>,
    pub input: QuantParams,
    pub output: QuantParams,
    pub weight_scale: f32,
    /// One row of int8 weights per label.
    pub weights: Vec<Vec<i8>>,
    #[serde(default)]
    pub bias: Vec<f32>,
}

/// Reference engine for host builds, evaluating a [`LinearModel`].
#[derive(Debug, Clone)]
pub struct LinearEngine {
    model: LinearModel,
    input: Vec<i8>,
    output: Vec<i8>,
    logits: Vec<f32>,
}

impl LinearEngine {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read model {}", path.display()))?;
        let model: LinearModel = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse model {}", path.display()))?;
        Self::from_model(model).with_context(|| format!("invalid model {}", path.display()))
    }

    pub fn from_model(model: LinearModel) -> Result<Self> {
        let categories = model.labels.len();
        if categories == 0 {
            bail!("model has no output categories");
        }
        if model.weights.len() != categories {
            bail!(
                "model has {} weight rows for {categories} labels",
                model.weights.len()
            );
        }
        let input_len = model.weights[0].len();
        if input_len == 0 || model.weights.iter().any(|row| row.len() != input_len) {
            bail!("model weight rows must be non-empty and equally sized");
        }
        if !model.bias.is_empty() && model.bias.len() != categories {
            bail!(
                "model has {} biases for {categories} labels",
                model.bias.len()
            );
        }
        for (name, params) in [("input", model.input), ("output", model.output)] {
            if !(params.scale.is_finite() && params.scale > 0.0) {
                bail!("{name} scale must be positive, got {}", params.scale);
            }
            if !(i32::from(i8::MIN)..=i32::from(i8::MAX)).contains(&params.zero_point) {
                bail!(
                    "{name} zero point must fit in int8, got {}",
                    params.zero_point
                );
            }
        }
        Ok(Self {
            input: vec![0; input_len],
            output: vec![0; categories],
            logits: vec![0.0; categories],
            model,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.model.labels
    }
}

impl InferenceEngine for LinearEngine {
    fn input_len(&self) -> usize {
        self.input.len()
    }

    fn output_len(&self) -> usize {
        self.output.len()
    }

    fn input_mut(&mut self) -> &mut [i8] {
        &mut self.input
    }

    fn invoke(&mut self) -> Result<()> {
        let input_quant = self.model.input;
        for (idx, row) in self.model.weights.iter().enumerate() {
            let acc: f32 = row
                .iter()
                .zip(&self.input)
                .map(|(w, x)| f32::from(*w) * input_quant.dequantize(*x))
                .sum();
            let bias = self.model.bias.get(idx).copied().unwrap_or(0.0);
            self.logits[idx] = acc * self.model.weight_scale + bias;
        }
        if self.logits.iter().any(|v| !v.is_finite()) {
            bail!("non-finite activation in output layer");
        }

        let max = self.logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut total = 0.0f32;
        for logit in self.logits.iter_mut() {
            *logit = (*logit - max).exp();
            total += *logit;
        }
        for (out, prob) in self.output.iter_mut().zip(&self.logits) {
            *out = self.model.output.quantize(prob / total);
        }
        Ok(())
    }

    fn output(&self) -> &[i8] {
        &self.output
    }

    fn output_quant(&self) -> QuantParams {
        self.model.output
    }
}
