//! Tunable parameters of an expert.

use consilium_prompt::{ContrastPair, Exemplar};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Affine map from raw to reported confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub scale: f32,
    pub bias: f32,
}

impl Calibration {
    /// `clamp(scale * raw + bias, 0, 1)`.
    pub fn apply(&self, raw: f32) -> f32 {
        clamp_unit(self.scale * raw + self.bias)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            scale: 1.0,
            bias: 0.0,
        }
    }
}

/// Everything fine-tuning may change about an expert.
///
/// Shared as an immutable snapshot; training works on a clone and the
/// result is swapped in only on commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertState {
    /// Bumped on every committed fine-tuning run
    pub version: u64,

    pub temperature: f32,

    pub calibration: Calibration,

    /// Few-shot examples injected into every prompt, oldest first
    pub exemplars: Vec<Exemplar>,

    /// Prefer/avoid pairs learned by contrastive tuning, oldest first
    pub contrasts: Vec<ContrastPair>,

    /// Capacity of `exemplars` and of `contrasts`
    #[serde(rename = "maxExemplars")]
    pub max_exemplars: usize,
}

impl ExpertState {
    pub fn new(max_exemplars: usize) -> Self {
        Self {
            version: 0,
            temperature: DEFAULT_TEMPERATURE,
            calibration: Calibration::default(),
            exemplars: Vec::new(),
            contrasts: Vec::new(),
            max_exemplars,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.set_temperature(temperature);
        self
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = temperature.clamp(0.0, MAX_TEMPERATURE);
    }

    /// Keep scale and bias in a range where confidence stays informative.
    pub fn set_calibration(&mut self, scale: f32, bias: f32) {
        self.calibration = Calibration {
            scale: scale.clamp(0.1, 2.0),
            bias: bias.clamp(-1.0, 1.0),
        };
    }

    /// Add or refresh an exemplar, evicting the oldest when full.
    ///
    /// An exemplar with the same input replaces the earlier one.
    pub fn admit_exemplar(&mut self, exemplar: Exemplar) {
        if self.max_exemplars == 0 {
            return;
        }
        self.exemplars.retain(|e| e.input != exemplar.input);
        self.exemplars.push(exemplar);
        while self.exemplars.len() > self.max_exemplars {
            self.exemplars.remove(0);
        }
    }

    /// Add or refresh a contrast pair, evicting the oldest when full.
    pub fn admit_contrast(&mut self, pair: ContrastPair) {
        if self.max_exemplars == 0 {
            return;
        }
        self.contrasts.retain(|c| c != &pair);
        self.contrasts.push(pair);
        while self.contrasts.len() > self.max_exemplars {
            self.contrasts.remove(0);
        }
    }
}

impl Default for ExpertState {
    fn default() -> Self {
        Self::new(8)
    }
}

/// Clamp to `[0, 1]`, mapping NaN to 0.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
