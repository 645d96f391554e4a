// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! `[interaction]` section of the layered SpiralTorch configuration.
//!
//! ```toml
//! [interaction]
//! height = 512
//! n_emb = 26
//! in_width = 128
//! precision = "f16"   # f32 | f16 | bf16
//! compute = "tf32"    # standard | tf32
//! parallel_min_batch = 64
//! ```

use crate::layers::interaction::{DotInteraction, InteractionShape, DEFAULT_PARALLEL_MIN_BATCH};
use crate::{ComputeMode, DType, Element, PureResult, TensorError};
use serde::{Deserialize, Serialize};
use spiral_config::layered::{ConfigLayering, LayeredConfig, LayeredConfigError};

fn default_parallel_min_batch() -> usize {
    DEFAULT_PARALLEL_MIN_BATCH
}

/// Construction parameters of a [`DotInteraction`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InteractionConfig {
    pub height: usize,
    pub n_emb: usize,
    pub in_width: usize,
    #[serde(default)]
    pub precision: DType,
    #[serde(default)]
    pub compute: ComputeMode,
    #[serde(default = "default_parallel_min_batch")]
    pub parallel_min_batch: usize,
}

impl InteractionConfig {
    /// Key of the section inside the merged configuration.
    pub const SECTION: &'static str = "interaction";

    pub fn new(height: usize, n_emb: usize, in_width: usize) -> Self {
        Self {
            height,
            n_emb,
            in_width,
            precision: DType::default(),
            compute: ComputeMode::default(),
            parallel_min_batch: DEFAULT_PARALLEL_MIN_BATCH,
        }
    }

    pub fn shape(&self) -> PureResult<InteractionShape> {
        InteractionShape::new(self.height, self.n_emb, self.in_width)
    }

    /// Reads the `[interaction]` section, if present.
    pub fn from_layered(config: &LayeredConfig) -> Result<Option<Self>, ConfigError> {
        Ok(config.section(&[Self::SECTION])?)
    }

    /// Discovers the standard configuration layers and reads the section.
    pub fn discover() -> Result<Option<Self>, ConfigError> {
        let layered = LayeredConfig::load(ConfigLayering::discover())?;
        Self::from_layered(&layered)
    }

    /// Builds the operator described by this configuration. The configured
    /// precision must match the storage element `T`.
    pub fn build<T: Element>(&self, name: impl Into<String>) -> PureResult<DotInteraction<T>> {
        if self.precision != T::DTYPE {
            return Err(TensorError::InvalidValue {
                label: "interaction precision does not match the tensor element type",
            });
        }
        Ok(DotInteraction::new(name, self.shape()?)
            .with_compute_mode(self.compute)
            .with_parallel_min_batch(self.parallel_min_batch))
    }
}

impl<T: Element> DotInteraction<T> {
    /// Shorthand for [`InteractionConfig::build`].
    pub fn from_config(name: impl Into<String>, config: &InteractionConfig) -> PureResult<Self> {
        config.build(name)
    }
}

/// Failures while turning configuration files into an operator.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Layered(#[from] LayeredConfigError),
    #[error("invalid [interaction] section: {0}")]
    Section(#[from] serde_json::Error),
    #[error("invalid interaction configuration: {0}")]
    Tensor(#[from] TensorError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;
    use serde_json::json;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn defaults_fill_optional_fields() {
        let layered = LayeredConfig::from_value(json!({
            "interaction": { "height": 4, "n_emb": 2, "in_width": 8 }
        }));
        let cfg = InteractionConfig::from_layered(&layered).unwrap().unwrap();
        assert_eq!(cfg, InteractionConfig::new(4, 2, 8));
        let layer: DotInteraction<f32> = cfg.build("dot").unwrap();
        assert_eq!(layer.shape().out_len(), 8 + 3 + 1);
        assert_eq!(layer.compute_mode(), ComputeMode::Standard);
    }

    #[test]
    fn precision_must_match_storage_type() {
        let layered = LayeredConfig::from_value(json!({
            "interaction": {
                "height": 4, "n_emb": 2, "in_width": 8,
                "precision": "f16", "compute": "tf32"
            }
        }));
        let cfg = InteractionConfig::from_layered(&layered).unwrap().unwrap();
        assert!(matches!(
            DotInteraction::<f32>::from_config("dot", &cfg),
            Err(TensorError::InvalidValue { .. })
        ));
        let layer = DotInteraction::<f16>::from_config("dot", &cfg).unwrap();
        assert_eq!(layer.compute_mode(), ComputeMode::Tf32);
    }

    #[test]
    fn unknown_keys_and_bad_shapes_are_reported() {
        let layered = LayeredConfig::from_value(json!({
            "interaction": { "height": 4, "n_emb": 2, "in_width": 8, "widht": 3 }
        }));
        assert!(matches!(
            InteractionConfig::from_layered(&layered),
            Err(ConfigError::Section(_))
        ));
        let cfg = InteractionConfig::new(4, 0, 8);
        assert!(cfg.build::<f32>("dot").is_err());
    }

    #[test]
    fn layered_files_configure_the_operator() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let root = std::env::temp_dir()
            .join(format!("st_interact_cfg_{}_{nanos}", std::process::id()));
        fs::create_dir_all(&root).unwrap();
        fs::write(
            root.join("base.toml"),
            "[interaction]\nheight = 16\nn_emb = 26\nin_width = 128\n",
        )
        .unwrap();
        fs::write(
            root.join("run.json"),
            r#"{"interaction":{"height":512,"compute":"tf32","parallel_min_batch":128}}"#,
        )
        .unwrap();

        let layering = ConfigLayering::default()
            .with_base(root.join("base.toml"))
            .with_run(root.join("run.json"));
        let layered = LayeredConfig::load(layering).unwrap();
        let cfg = InteractionConfig::from_layered(&layered).unwrap().unwrap();
        assert_eq!(cfg.height, 512);
        assert_eq!(cfg.parallel_min_batch, 128);

        let layer = DotInteraction::<f32>::from_config("dot", &cfg).unwrap();
        assert_eq!(layer.shape().out_len(), 128 + 351 + 1);
        assert_eq!(layer.compute_mode(), ComputeMode::Tf32);

        fs::remove_dir_all(&root).unwrap();
    }
}
