//! Model B: feed-forward regression network
//!
//! A `burn` MLP (ReLU hidden layers, linear output) trained on the ndarray
//! backend with Adam on a sample-weighted Huber loss against a standardised
//! target. Training stops early when the validation loss has not improved
//! for `patience` epochs, halving the learning rate on shorter plateaus, and
//! the best weights seen are the ones kept.
//!
//! Artifacts store plain per-layer parameters; loading rebuilds the module
//! on the inference backend.

use crate::config::NetworkConfig;
use crate::{Error, Result};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::module::{AutodiffModule, Module, Param};
use burn::nn::loss::{HuberLoss, HuberLossConfig};
use burn::nn::{Initializer, Linear, LinearConfig, Relu};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

type InferenceBackend = NdArray;
type TrainingBackend = Autodiff<InferenceBackend>;

const ADAM_EPSILON: f32 = 1e-8;
const PLATEAU_EPOCHS: usize = 5;
const MIN_LEARNING_RATE: f64 = 1e-5;

#[derive(Module, Debug)]
struct Mlp<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> Mlp<B> {
    /// He-uniform weights drawn from `rng`, zero biases
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn init(dims: &[usize], rng: &mut StdRng, device: &B::Device) -> Result<Self> {
        let layers: Vec<StoredLayer> = dims
            .windows(2)
            .map(|pair| {
                let (inputs, outputs) = (pair[0], pair[1]);
                let limit = (6.0 / inputs as f64).sqrt();
                StoredLayer {
                    inputs,
                    outputs,
                    weights: (0..inputs * outputs)
                        .map(|_| rng.gen_range(-limit..limit) as f32)
                        .collect(),
                    biases: vec![0.0; outputs],
                }
            })
            .collect();
        Self::from_layers(&layers, device)
    }

    fn from_layers(layers: &[StoredLayer], device: &B::Device) -> Result<Self> {
        let Some((output, hidden)) = layers.split_last() else {
            return Err(Error::Artifact("network has no layers".to_string()));
        };
        Ok(Self {
            hidden: hidden.iter().map(|l| l.to_linear(device)).collect(),
            output: output.to_linear(device),
            activation: Relu::new(),
        })
    }

    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self
            .hidden
            .iter()
            .fold(input, |x, layer| self.activation.forward(layer.forward(x)));
        self.output.forward(x)
    }

    fn export(&self) -> Result<Vec<StoredLayer>> {
        self.hidden
            .iter()
            .chain(std::iter::once(&self.output))
            .map(StoredLayer::from_linear)
            .collect()
    }
}

/// One dense layer's parameters, weights row-major `inputs x outputs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredLayer {
    inputs: usize,
    outputs: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl StoredLayer {
    fn to_linear<B: Backend>(&self, device: &B::Device) -> Linear<B> {
        let mut linear = LinearConfig::new(self.inputs, self.outputs)
            .with_initializer(Initializer::Zeros)
            .init(device);
        linear.weight = Param::from_tensor(Tensor::from_data(
            TensorData::new(self.weights.clone(), [self.inputs, self.outputs]),
            device,
        ));
        linear.bias = Some(Param::from_tensor(Tensor::from_data(
            TensorData::new(self.biases.clone(), [self.outputs]),
            device,
        )));
        linear
    }

    fn from_linear<B: Backend>(linear: &Linear<B>) -> Result<Self> {
        let [inputs, outputs] = linear.weight.val().dims();
        let weights = tensor_values(linear.weight.val())?;
        let biases = match &linear.bias {
            Some(bias) => tensor_values(bias.val())?,
            None => vec![0.0; outputs],
        };
        Ok(Self {
            inputs,
            outputs,
            weights,
            biases,
        })
    }

    fn is_well_formed(&self) -> bool {
        self.inputs > 0
            && self.outputs > 0
            && self.weights.len() == self.inputs * self.outputs
            && self.biases.len() == self.outputs
            && self.weights.iter().chain(&self.biases).all(|p| p.is_finite())
    }
}

fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| Error::Artifact(format!("network parameters are unreadable: {e:?}")))
}

#[allow(clippy::cast_possible_truncation)]
fn matrix<B: Backend>(rows: &[&[f64]], width: usize, device: &B::Device) -> Tensor<B, 2> {
    let values: Vec<f32> = rows.iter().flat_map(|r| r.iter().map(|&v| v as f32)).collect();
    Tensor::from_data(TensorData::new(values, [rows.len(), width]), device)
}

#[allow(clippy::cast_possible_truncation)]
fn column<B: Backend>(values: &[f64], device: &B::Device) -> Tensor<B, 2> {
    let values: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    let len = values.len();
    Tensor::from_data(TensorData::new(values, [len, 1]), device)
}

/// Weighted mean Huber loss over one batch
fn weighted_loss<B: Backend>(
    loss: &HuberLoss,
    predictions: Tensor<B, 2>,
    targets: Tensor<B, 2>,
    weights: Tensor<B, 2>,
    total_weight: f64,
) -> Tensor<B, 1> {
    (loss.forward_no_reduction(predictions, targets) * weights)
        .sum()
        .div_scalar(total_weight)
}

/// Rows, standardised targets and normalised weights for one index set
struct Batch<'a> {
    rows: Vec<&'a [f64]>,
    targets: Vec<f64>,
    weights: Vec<f64>,
}

impl<'a> Batch<'a> {
    fn gather(idx: &[usize], x: &'a [Vec<f64>], targets: &[f64], weights: &[f64]) -> Self {
        Self {
            rows: idx.iter().map(|&i| x[i].as_slice()).collect(),
            targets: idx.iter().map(|&i| targets[i]).collect(),
            weights: idx.iter().map(|&i| weights[i]).collect(),
        }
    }

    fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    fn loss<B: Backend>(
        &self,
        model: &Mlp<B>,
        loss: &HuberLoss,
        width: usize,
        device: &B::Device,
    ) -> Tensor<B, 1> {
        weighted_loss(
            loss,
            model.forward(matrix(&self.rows, width, device)),
            column(&self.targets, device),
            column(&self.weights, device),
            self.total_weight(),
        )
    }
}

/// How a [`NeuralNetwork::fit`] run ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSummary {
    /// Epochs actually run
    pub epochs_run: usize,
    /// Best validation loss (standardised Huber)
    pub best_validation_loss: f64,
    /// Learning rate at the end of training
    pub final_learning_rate: f64,
}

/// Trained multi-layer perceptron.
///
/// The module sits behind a mutex: burn modules are only required to be
/// `Send`, and the active model is shared across prediction threads.
#[derive(Debug)]
pub struct NeuralNetwork {
    module: Mutex<Mlp<InferenceBackend>>,
    architecture: Vec<usize>,
    target_mean: f64,
    target_scale: f64,
}

impl NeuralNetwork {
    /// Train on scaled rows.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for invalid hyperparameters and
    /// `Error::TrainingFailure` on bad input shapes, a constant target, or
    /// a non-finite loss
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss,
        clippy::too_many_lines
    )]
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        weights: &[f64],
        config: &NetworkConfig,
    ) -> Result<(Self, FitSummary)> {
        config.validate()?;
        let n = x.len();
        if n < 2 || y.len() != n || weights.len() != n {
            return Err(Error::TrainingFailure(format!(
                "network needs at least 2 matching rows (rows={n}, targets={}, weights={})",
                y.len(),
                weights.len()
            )));
        }
        let n_inputs = x[0].len();
        if n_inputs == 0 || x.iter().any(|row| row.len() != n_inputs) {
            return Err(Error::TrainingFailure("network rows have unequal widths".to_string()));
        }

        let count = n as f64;
        let target_mean = y.iter().sum::<f64>() / count;
        let target_scale = (y.iter().map(|t| (t - target_mean).powi(2)).sum::<f64>() / count).sqrt();
        if target_scale <= f64::EPSILON {
            return Err(Error::TrainingFailure(
                "target has zero variance; nothing to learn".to_string(),
            ));
        }
        let targets: Vec<f64> = y.iter().map(|t| (t - target_mean) / target_scale).collect();

        let mean_weight = weights.iter().sum::<f64>() / count;
        if !(mean_weight > 0.0) {
            return Err(Error::TrainingFailure("sample weights must be positive".to_string()));
        }
        let sample_weights: Vec<f64> = weights.iter().map(|w| w / mean_weight).collect();

        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        let n_val = (count * config.validation_fraction).floor() as usize;
        let (val_idx, mut train_idx) = if n_val == 0 || n_val >= n {
            (order.clone(), order)
        } else {
            let train = order.split_off(n_val);
            (order, train)
        };
        let validation = Batch::gather(&val_idx, x, &targets, &sample_weights);

        let mut architecture = Vec::with_capacity(config.hidden_layers.len() + 2);
        architecture.push(n_inputs);
        architecture.extend(config.hidden_layers.iter().copied());
        architecture.push(1);

        let device = NdArrayDevice::default();
        let huber = HuberLossConfig::new(config.huber_delta as f32).init();
        let mut model: Mlp<TrainingBackend> = Mlp::init(&architecture, &mut rng, &device)?;
        let mut optimizer = AdamConfig::new()
            .with_epsilon(ADAM_EPSILON)
            .init::<TrainingBackend, Mlp<TrainingBackend>>();

        let mut lr = config.learning_rate;
        let mut best = model.valid();
        let mut best_loss = f64::INFINITY;
        let mut stale = 0usize;
        let mut epochs_run = 0usize;

        for epoch in 0..config.epochs {
            epochs_run = epoch + 1;
            train_idx.shuffle(&mut rng);

            for chunk in train_idx.chunks(config.batch_size) {
                let batch = Batch::gather(chunk, x, &targets, &sample_weights);
                let loss = batch.loss(&model, &huber, n_inputs, &device);
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(lr, model, grads);
            }

            let current = model.valid();
            let val_loss: f64 = validation
                .loss(&current, &huber, n_inputs, &device)
                .into_scalar()
                .elem();
            if !val_loss.is_finite() {
                return Err(Error::TrainingFailure(format!(
                    "network loss became non-finite at epoch {epochs_run}"
                )));
            }

            if val_loss < best_loss - 1e-9 {
                best_loss = val_loss;
                best = current;
                stale = 0;
            } else {
                stale += 1;
                if stale % PLATEAU_EPOCHS == 0 {
                    lr = (lr * 0.5).max(MIN_LEARNING_RATE);
                }
                if stale >= config.patience {
                    tracing::debug!(epoch = epochs_run, best_loss, "early stopping");
                    break;
                }
            }
        }

        Ok((
            Self {
                module: Mutex::new(best),
                architecture,
                target_mean,
                target_scale,
            },
            FitSummary {
                epochs_run,
                best_validation_loss: best_loss,
                final_learning_rate: lr,
            },
        ))
    }

    fn module(&self) -> std::sync::MutexGuard<'_, Mlp<InferenceBackend>> {
        self.module.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Predict grams for a batch of scaled rows.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if any row has the wrong width
    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let width = self.n_inputs();
        if let Some(row) = rows.iter().find(|row| row.len() != width) {
            return Err(Error::InvalidInput(format!(
                "network expects {width} features, got {}",
                row.len()
            )));
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let device = NdArrayDevice::default();
        let rows: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
        let output = self.module().forward(matrix(&rows, width, &device));
        Ok(tensor_values(output)?
            .into_iter()
            .map(|v| f64::from(v) * self.target_scale + self.target_mean)
            .collect())
    }

    /// Predict grams for one scaled row.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` on a row of the wrong width
    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        self.predict_batch(std::slice::from_ref(&row.to_vec()))?
            .first()
            .copied()
            .ok_or_else(|| Error::InvalidInput("network returned no output".to_string()))
    }

    /// Input width
    #[must_use]
    pub fn n_inputs(&self) -> usize {
        self.architecture.first().copied().unwrap_or(0)
    }

    /// Layer widths including input and output
    #[must_use]
    pub fn architecture(&self) -> Vec<usize> {
        self.architecture.clone()
    }

    /// Structural check after deserialisation.
    ///
    /// # Errors
    ///
    /// Returns `Error::Artifact` when parameters are not finite or the
    /// target scaling is malformed
    pub fn validate(&self) -> Result<()> {
        if !self.module().export()?.iter().all(StoredLayer::is_well_formed) {
            return Err(Error::Artifact("network layer parameters are malformed".to_string()));
        }
        if !(self.target_scale > 0.0) || !self.target_mean.is_finite() {
            return Err(Error::Artifact("network target scaling is malformed".to_string()));
        }
        Ok(())
    }

    fn to_stored(&self) -> Result<StoredNetwork> {
        Ok(StoredNetwork {
            layers: self.module().export()?,
            target_mean: self.target_mean,
            target_scale: self.target_scale,
        })
    }
}

impl Clone for NeuralNetwork {
    fn clone(&self) -> Self {
        Self {
            module: Mutex::new(self.module().clone()),
            architecture: self.architecture.clone(),
            target_mean: self.target_mean,
            target_scale: self.target_scale,
        }
    }
}

impl PartialEq for NeuralNetwork {
    fn eq(&self, other: &Self) -> bool {
        if self.architecture != other.architecture
            || self.target_mean.to_bits() != other.target_mean.to_bits()
            || self.target_scale.to_bits() != other.target_scale.to_bits()
        {
            return false;
        }
        let ours = self.module().export();
        let theirs = other.module().export();
        matches!((ours, theirs), (Ok(a), Ok(b)) if a == b)
    }
}

/// On-disk form of a [`NeuralNetwork`]
#[derive(Serialize, Deserialize)]
struct StoredNetwork {
    layers: Vec<StoredLayer>,
    target_mean: f64,
    target_scale: f64,
}

impl TryFrom<StoredNetwork> for NeuralNetwork {
    type Error = Error;

    fn try_from(stored: StoredNetwork) -> Result<Self> {
        let Some(last) = stored.layers.last() else {
            return Err(Error::Artifact("network has no layers".to_string()));
        };
        if last.outputs != 1 {
            return Err(Error::Artifact("network output must be scalar".to_string()));
        }
        if stored.layers.windows(2).any(|pair| pair[0].outputs != pair[1].inputs) {
            return Err(Error::Artifact("network layers do not chain".to_string()));
        }
        if !stored.layers.iter().all(StoredLayer::is_well_formed) {
            return Err(Error::Artifact("network layer parameters are malformed".to_string()));
        }
        let mut architecture: Vec<usize> = stored.layers.iter().map(|l| l.inputs).collect();
        architecture.push(1);
        Ok(Self {
            module: Mutex::new(Mlp::from_layers(&stored.layers, &NdArrayDevice::default())?),
            architecture,
            target_mean: stored.target_mean,
            target_scale: stored.target_scale,
        })
    }
}

impl Serialize for NeuralNetwork {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_stored()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NeuralNetwork {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Self::try_from(StoredNetwork::deserialize(deserializer)?).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NetworkConfig {
        NetworkConfig {
            hidden_layers: vec![16, 8],
            learning_rate: 0.01,
            epochs: 200,
            patience: 30,
            ..NetworkConfig::default()
        }
    }

    fn linear_data() -> (Vec<Vec<f64>>, Vec<f64>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..80)
            .map(|i| {
                let a = f64::from(i % 10) / 5.0 - 1.0;
                let b = f64::from(i / 10) / 4.0 - 1.0;
                vec![a, b]
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 400.0 + 80.0 * r[0] - 40.0 * r[1]).collect();
        (x, y, vec![1.0; 80])
    }

    #[test]
    fn test_fits_linear_target() {
        let (x, y, w) = linear_data();
        let (net, summary) = NeuralNetwork::fit(&x, &y, &w, &config()).unwrap();
        assert!(summary.epochs_run > 0);
        let predictions = net.predict_batch(&x).unwrap();
        let mae: f64 = predictions.iter().zip(&y).map(|(p, t)| (p - t).abs()).sum::<f64>() / 80.0;
        assert!(mae < 20.0, "mae {mae}");
        net.validate().unwrap();
    }

    #[test]
    fn test_batch_matches_single_rows() {
        let (x, y, w) = linear_data();
        let cfg = NetworkConfig {
            epochs: 5,
            ..config()
        };
        let (net, _) = NeuralNetwork::fit(&x, &y, &w, &cfg).unwrap();
        let batch = net.predict_batch(&x[..4]).unwrap();
        for (row, expected) in x[..4].iter().zip(batch) {
            assert!((net.predict(row).unwrap() - expected).abs() < 1e-6);
        }
        assert!(net.predict_batch(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let (x, y, w) = linear_data();
        let cfg = NetworkConfig {
            epochs: 5,
            ..config()
        };
        let (a, _) = NeuralNetwork::fit(&x, &y, &w, &cfg).unwrap();
        let (b, _) = NeuralNetwork::fit(&x, &y, &w, &cfg).unwrap();
        for (pa, pb) in a.predict_batch(&x).unwrap().iter().zip(b.predict_batch(&x).unwrap()) {
            assert!((pa - pb).abs() < 1e-3, "{pa} vs {pb}");
        }
    }

    #[test]
    fn test_sample_weights_pull_the_fit() {
        // Two contradicting targets for the same input; the heavy one wins.
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![f64::from(i % 2)]).collect();
        let y: Vec<f64> = (0..40).map(|i| if i < 20 { 100.0 } else { 300.0 }).collect();
        let w: Vec<f64> = (0..40).map(|i| if i < 20 { 1.0 } else { 9.0 }).collect();
        let cfg = NetworkConfig {
            hidden_layers: vec![8],
            validation_fraction: 0.0,
            ..config()
        };
        let (net, _) = NeuralNetwork::fit(&x, &y, &w, &cfg).unwrap();
        assert!(net.predict(&[0.0]).unwrap() > 200.0);
    }

    #[test]
    fn test_constant_target_fails() {
        let (x, _, w) = linear_data();
        let y = vec![300.0; 80];
        assert!(matches!(
            NeuralNetwork::fit(&x, &y, &w, &config()),
            Err(Error::TrainingFailure(_))
        ));
    }

    #[test]
    fn test_divergence_is_reported() {
        let (x, y, w) = linear_data();
        let cfg = NetworkConfig {
            learning_rate: 1e30,
            ..config()
        };
        assert!(matches!(
            NeuralNetwork::fit(&x, &y, &w, &cfg),
            Err(Error::TrainingFailure(_))
        ));
    }

    #[test]
    fn test_invalid_huber_delta_is_an_error() {
        let (x, y, w) = linear_data();
        let cfg = NetworkConfig {
            huber_delta: -1.0,
            ..config()
        };
        assert!(matches!(NeuralNetwork::fit(&x, &y, &w, &cfg), Err(Error::Config(_))));
    }

    #[test]
    fn test_architecture_and_width_check() {
        let (x, y, w) = linear_data();
        let cfg = NetworkConfig {
            epochs: 1,
            ..config()
        };
        let (net, _) = NeuralNetwork::fit(&x, &y, &w, &cfg).unwrap();
        assert_eq!(net.architecture(), vec![2, 16, 8, 1]);
        assert!(matches!(net.predict(&[0.0]), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_json_round_trip_preserves_outputs() {
        let (x, y, w) = linear_data();
        let cfg = NetworkConfig {
            epochs: 3,
            ..config()
        };
        let (net, _) = NeuralNetwork::fit(&x, &y, &w, &cfg).unwrap();
        let json = serde_json::to_string(&net).unwrap();
        let reloaded: NeuralNetwork = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, net);
        assert_eq!(
            reloaded.predict(&x[3]).unwrap().to_bits(),
            net.predict(&x[3]).unwrap().to_bits()
        );
    }

    #[test]
    fn test_malformed_artifact_rejected() {
        let json = r#"{"layers":[{"inputs":2,"outputs":3,"weights":[0.0],"biases":[0.0,0.0,0.0]}],
                       "target_mean":0.0,"target_scale":1.0}"#;
        assert!(serde_json::from_str::<NeuralNetwork>(json).is_err());
    }
}
