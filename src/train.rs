//! Model traits and a minimal full-batch training loop.

use ndarray::Array2;

use crate::config::TrainConfig;
use crate::metrics;
use crate::nn::base::loss::{self, Loss};
use crate::nn::base::parameter::Parametrized;
use crate::topo_error::{Result, TopoModelError};

/// A network mapping some precomputed input to one output matrix.
pub trait Model: Parametrized {
    type Input;

    fn forward(&self, input: &Self::Input) -> Result<Array2<f32>>;
}

/// A [`Model`] that can push an output gradient back into its parameters.
pub trait Differentiable: Model {
    /// Accumulate parameter gradients for `d loss / d output = grad_out`.
    fn backward(&mut self, input: &Self::Input, grad_out: &Array2<f32>) -> Result<()>;
}

/// Supervision for one sample.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    /// One class per output row; masked-out rows are ignored.
    Labels {
        labels: Vec<usize>,
        mask: Option<Vec<bool>>,
    },
    /// Dense target with the output's shape.
    Dense(Array2<f32>),
}

impl Target {
    pub fn labels(labels: Vec<usize>) -> Self {
        Target::Labels { labels, mask: None }
    }

    pub fn masked(labels: Vec<usize>, mask: Vec<bool>) -> Self {
        Target::Labels {
            labels,
            mask: Some(mask),
        }
    }
}

/// `(loss, gradient)` of `loss_kind` for one prediction.
pub fn compute_loss(loss_kind: Loss, pred: &Array2<f32>, target: &Target) -> Result<(f32, Array2<f32>)> {
    match (loss_kind, target) {
        (Loss::CrossEntropy, Target::Labels { labels, mask }) => {
            loss::softmax_cross_entropy(pred, labels, mask.as_deref())
        }
        (Loss::Mse, Target::Dense(y)) => loss::mse(pred, y),
        (Loss::BceWithLogits, Target::Dense(y)) => loss::bce_with_logits(pred, y),
        (kind, _) => Err(TopoModelError::InvalidConfig(format!(
            "loss {kind:?} does not accept this target"
        ))),
    }
}

fn sample_accuracy(pred: &Array2<f32>, target: &Target, loss_kind: Loss) -> Option<f32> {
    match (target, loss_kind) {
        (Target::Labels { labels, mask }, _) => {
            metrics::accuracy(pred, labels, mask.as_deref()).ok()
        }
        (Target::Dense(y), Loss::BceWithLogits) => metrics::binary_accuracy(pred, y).ok(),
        _ => None,
    }
}

/// Per-epoch means over the training samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainHistory {
    pub losses: Vec<f32>,
    /// `None` when the loss has no accuracy counterpart (e.g. MSE).
    pub accuracies: Vec<Option<f32>>,
}

impl TrainHistory {
    pub fn final_loss(&self) -> Option<f32> {
        self.losses.last().copied()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Trainer {
    config: TrainConfig,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Mean loss and accuracy of `model` over `data`.
    pub fn evaluate<M: Model>(
        &self,
        model: &M,
        data: &[(M::Input, Target)],
    ) -> Result<(f32, Option<f32>)> {
        if data.is_empty() {
            return Err(TopoModelError::EmptyInput("evaluation samples"));
        }
        let mut total = 0.0;
        let mut accs = Vec::with_capacity(data.len());
        for (input, target) in data {
            let pred = model.forward(input)?;
            total += compute_loss(self.config.loss, &pred, target)?.0;
            accs.push(sample_accuracy(&pred, target, self.config.loss));
        }
        Ok((total / data.len() as f32, mean(&accs)))
    }

    /// Train with one optimizer step per sample, for `config.epochs` epochs.
    pub fn fit<M: Differentiable>(
        &self,
        model: &mut M,
        data: &[(M::Input, Target)],
    ) -> Result<TrainHistory> {
        if data.is_empty() {
            return Err(TopoModelError::EmptyInput("training samples"));
        }
        let mut optimizer = self.config.build_optimizer()?;
        let mut history = TrainHistory::default();
        log::info!(
            "training {} parameters on {} samples for {} epochs",
            model.num_parameters(),
            data.len(),
            self.config.epochs
        );
        for epoch in 1..=self.config.epochs {
            let mut epoch_loss = 0.0;
            let mut accs = Vec::with_capacity(data.len());
            for (input, target) in data {
                model.zero_grad();
                let pred = model.forward(input)?;
                let (l, grad) = compute_loss(self.config.loss, &pred, target)?;
                if !l.is_finite() {
                    log::warn!("epoch {epoch}: non-finite loss {l}");
                }
                model.backward(input, &grad)?;
                optimizer.step(model)?;
                epoch_loss += l;
                accs.push(sample_accuracy(&pred, target, self.config.loss));
            }
            let epoch_loss = epoch_loss / data.len() as f32;
            let acc = mean(&accs);
            if self.config.log_every > 0 && epoch % self.config.log_every == 0 {
                match acc {
                    Some(a) => log::info!("epoch {epoch}: loss {epoch_loss:.4}, accuracy {a:.4}"),
                    None => log::info!("epoch {epoch}: loss {epoch_loss:.4}"),
                }
            }
            history.losses.push(epoch_loss);
            history.accuracies.push(acc);
        }
        Ok(history)
    }
}

fn mean(xs: &[Option<f32>]) -> Option<f32> {
    let vals: Vec<f32> = xs.iter().flatten().copied().collect();
    (!vals.is_empty()).then(|| vals.iter().sum::<f32>() / vals.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::base::init::Initialization;
    use crate::nn::base::linear::Linear;
    use crate::nn::base::parameter::Parameter;
    use crate::config::OptimizerKind;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    struct TinyLinear(Linear);

    impl Parametrized for TinyLinear {
        fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
            self.0.visit_parameters(visitor)
        }
        fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
            self.0.visit_parameters_mut(visitor)
        }
    }

    impl Model for TinyLinear {
        type Input = Array2<f32>;
        fn forward(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
            self.0.forward(input)
        }
    }

    impl Differentiable for TinyLinear {
        fn backward(&mut self, input: &Array2<f32>, grad_out: &Array2<f32>) -> Result<()> {
            self.0.backward(input, grad_out).map(|_| ())
        }
    }

    #[test]
    fn fits_linearly_separable_labels() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut model = TinyLinear(
            Linear::new("fc", 2, 2, true, Initialization::XavierUniform, 1.0, &mut rng).unwrap(),
        );
        let x = array![[1.0f32, 0.0], [0.0, 1.0], [0.9, 0.1], [0.2, 0.8]];
        let data = vec![(x, Target::labels(vec![0, 1, 0, 1]))];
        let trainer = Trainer::new(TrainConfig {
            epochs: 200,
            learning_rate: 0.5,
            optimizer: OptimizerKind::Sgd,
            ..Default::default()
        })
        .unwrap();
        let history = trainer.fit(&mut model, &data).unwrap();
        assert_eq!(history.losses.len(), 200);
        assert!(history.final_loss().unwrap() < history.losses[0]);
        assert_eq!(history.accuracies.last().copied().flatten(), Some(1.0));
        let (_, acc) = trainer.evaluate(&model, &data).unwrap();
        assert_eq!(acc, Some(1.0));
    }

    #[test]
    fn loss_target_mismatch_is_an_error() {
        let pred = array![[0.0f32]];
        assert!(compute_loss(Loss::Mse, &pred, &Target::labels(vec![0])).is_err());
        assert!(compute_loss(Loss::CrossEntropy, &pred, &Target::Dense(pred.clone())).is_err());
    }
}
