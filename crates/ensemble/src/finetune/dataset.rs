//! Training datasets: loading, validation and the train/validation split.

use crate::error::FineTuneError;
use consilium_core::{AppError, AppResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

fn default_quality() -> f32 {
    1.0
}

fn default_validation_split() -> f32 {
    0.2
}

/// One supervised example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub input: String,

    #[serde(rename = "expectedOutput", alias = "expected_output")]
    pub expected_output: String,

    /// Weight of the example, in `[0, 1]`
    #[serde(rename = "qualityScore", alias = "quality_score", default = "default_quality")]
    pub quality_score: f32,

    /// Strategy-specific hints: `demonstration`, `negative`, `topic`
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TrainingExample {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            quality_score: default_quality(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality_score = quality;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }

    /// A string-valued metadata entry, if present and non-empty.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDataset {
    pub examples: Vec<TrainingExample>,

    /// Fraction of examples held out for validation, in `(0, 1)`
    #[serde(
        rename = "validationSplit",
        alias = "validation_split",
        default = "default_validation_split"
    )]
    pub validation_split: f32,
}

impl TrainingDataset {
    pub fn new(examples: Vec<TrainingExample>) -> Self {
        Self {
            examples,
            validation_split: default_validation_split(),
        }
    }

    pub fn with_validation_split(mut self, split: f32) -> Self {
        self.validation_split = split;
        self
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Parse one JSON example per line. Blank lines are skipped.
    pub fn from_jsonl_str(contents: &str) -> AppResult<Self> {
        let mut examples = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let example: TrainingExample = serde_json::from_str(line).map_err(|e| {
                AppError::Serialization(format!("line {}: {}", line_no + 1, e))
            })?;
            examples.push(example);
        }
        Ok(Self::new(examples))
    }

    /// Parse a YAML document holding either a dataset or a bare example list.
    pub fn from_yaml_str(contents: &str) -> AppResult<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum YamlDataset {
            Full(TrainingDataset),
            Examples(Vec<TrainingExample>),
        }

        Ok(match serde_yaml::from_str(contents)? {
            YamlDataset::Full(dataset) => dataset,
            YamlDataset::Examples(examples) => Self::new(examples),
        })
    }

    /// Load a dataset file, choosing the format by extension.
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let dataset = match extension.as_str() {
            "jsonl" | "ndjson" => Self::from_jsonl_str(&contents)?,
            "yaml" | "yml" => Self::from_yaml_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            other => {
                return Err(AppError::Config(format!(
                    "Unsupported dataset format '{}' for {}",
                    other,
                    path.display()
                )))
            }
        };

        tracing::debug!("Loaded {} training examples from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    /// Check the dataset can be split and trained on.
    pub fn validate(&self) -> Result<(), FineTuneError> {
        if self.examples.is_empty() {
            return Err(FineTuneError::InvalidDataset("dataset is empty".to_string()));
        }
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err(FineTuneError::InvalidDataset(format!(
                "validation split {} is outside (0, 1)",
                self.validation_split
            )));
        }
        if self.examples.len() < 2 {
            return Err(FineTuneError::InvalidDataset(
                "at least two examples are needed to fill both partitions".to_string(),
            ));
        }

        for (i, example) in self.examples.iter().enumerate() {
            if example.input.trim().is_empty() {
                return Err(FineTuneError::InvalidDataset(format!(
                    "example {} has an empty input",
                    i
                )));
            }
            if !(0.0..=1.0).contains(&example.quality_score) {
                return Err(FineTuneError::InvalidDataset(format!(
                    "example {} has quality score {} outside [0, 1]",
                    i, example.quality_score
                )));
            }
        }

        Ok(())
    }

    /// Split into (train, validation).
    ///
    /// The first `⌈n·(1−split)⌉` examples train and the rest validate, with
    /// both sides holding at least one example. A seed shuffles the order
    /// deterministically first.
    pub fn split(&self, seed: Option<u64>) -> (Vec<TrainingExample>, Vec<TrainingExample>) {
        let mut examples = self.examples.clone();
        if let Some(seed) = seed {
            examples.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        let n = examples.len();
        if n < 2 {
            return (examples, Vec::new());
        }

        let train_len = ((n as f32) * (1.0 - self.validation_split)).ceil() as usize;
        let train_len = train_len.clamp(1, n - 1);
        let validation = examples.split_off(train_len);
        (examples, validation)
    }
}
