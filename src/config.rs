//! Training and layer configuration.
//!
//! Both structs deserialize from JSON with every field optional; missing
//! fields take their [`Default`] value. [`TrainConfig::from_json_str`] and
//! [`LayerConfig::from_json_str`] validate after decoding.

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::nn::base::activation::Activation;
use crate::nn::base::conv::ConvOptions;
use crate::nn::base::init::{DEFAULT_GAIN, Initialization};
use crate::nn::base::loss::Loss;
use crate::nn::base::optim::{Adam, Optimizer, Sgd};
use crate::topo_error::{Result, TopoModelError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    #[default]
    Adam,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub learning_rate: f32,
    pub optimizer: OptimizerKind,
    /// Only used by SGD.
    pub momentum: f32,
    pub weight_decay: f32,
    pub loss: Loss,
    pub seed: u64,
    /// Log every `log_every` epochs; `0` disables progress logging.
    pub log_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 0.01,
            optimizer: OptimizerKind::Adam,
            momentum: 0.0,
            weight_decay: 0.0,
            loss: Loss::CrossEntropy,
            seed: 42,
            log_every: 10,
        }
    }
}

impl TrainConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(TopoModelError::InvalidConfig("epochs must be positive".into()));
        }
        // The optimizers re-check their own hyperparameters.
        self.build_optimizer().map(|_| ())
    }

    pub fn build_optimizer(&self) -> Result<Box<dyn Optimizer>> {
        Ok(match self.optimizer {
            OptimizerKind::Sgd => Box::new(Sgd::with_momentum(
                self.learning_rate,
                self.momentum,
                self.weight_decay,
            )?),
            OptimizerKind::Adam => Box::new(Adam::with_betas(
                self.learning_rate,
                0.9,
                0.999,
                self.weight_decay,
            )?),
        })
    }

    /// Generator every model in a run should be initialised from.
    pub fn rng(&self) -> SmallRng {
        SmallRng::seed_from_u64(self.seed)
    }
}

/// Per-layer knobs shared by every model constructor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub init: Initialization,
    pub gain: f32,
    pub attention: bool,
    pub aggr_norm: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            init: Initialization::XavierUniform,
            gain: DEFAULT_GAIN,
            attention: false,
            aggr_norm: false,
        }
    }
}

impl LayerConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.gain.is_finite() || self.gain <= 0.0 {
            return Err(TopoModelError::InvalidConfig(format!(
                "gain must be positive, got {}",
                self.gain
            )));
        }
        Ok(())
    }

    /// Convolution options with the given update and this config's knobs.
    pub fn conv_options(&self, update: Activation) -> ConvOptions {
        ConvOptions {
            aggr_norm: self.aggr_norm,
            update,
            attention: self.attention,
            with_linear_transform: true,
            init: self.init,
            gain: self.gain,
        }
    }

    /// Same as [`conv_options`](Self::conv_options) with attention forced off.
    pub fn plain_conv_options(&self, update: Activation) -> ConvOptions {
        ConvOptions {
            attention: false,
            ..self.conv_options(update)
        }
    }
}
