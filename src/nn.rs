//! Neuron, layer and multi-layer perceptron built from [`Var`] operators.
//!
//! Models only build graphs. Computing and resetting gradients is left to the caller
//! through [`Var::backward`] and [`crate::zero_grad`].

use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::backwards::Var;
use crate::config::Config;
use crate::error::{Error, Result};

/// A component with trainable parameters.
pub trait Module {
    type Output;

    fn forward(&self, inputs: &[Var]) -> Result<Self::Output>;

    /// Trainable leaves, flattened in a stable order.
    fn parameters(&self) -> Vec<Var>;
}

/// `tanh(b + Σ wᵢ·xᵢ)`
#[derive(Clone, Debug)]
pub struct Neuron {
    weights: Vec<Var>,
    bias: Var,
}

impl Neuron {
    /// Weights and bias drawn uniformly from [-1, 1].
    pub fn new<R: Rng + ?Sized>(input_size: usize, rng: &mut R) -> Neuron {
        let weights = (0..input_size)
            .map(|_| Var::with_label(rng.gen_range(-1.0..=1.0), "w"))
            .collect();
        let bias = Var::with_label(rng.gen_range(-1.0..=1.0), "b");
        Neuron { weights, bias }
    }

    pub fn from_parameters(weights: &[f64], bias: f64) -> Neuron {
        Neuron {
            weights: weights.iter().map(|&w| Var::with_label(w, "w")).collect(),
            bias: Var::with_label(bias, "b"),
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[Var] {
        &self.weights
    }

    pub fn bias(&self) -> &Var {
        &self.bias
    }
}

impl Module for Neuron {
    type Output = Var;

    fn forward(&self, inputs: &[Var]) -> Result<Var> {
        if inputs.len() != self.weights.len() {
            return Err(Error::InputSize {
                expected: self.weights.len(),
                actual: inputs.len(),
            });
        }
        let activation = self
            .weights
            .iter()
            .zip(inputs)
            .fold(self.bias.clone(), |acc, (w, x)| acc + w * x);
        Ok(activation.tanh())
    }

    fn parameters(&self) -> Vec<Var> {
        let mut params = self.weights.clone();
        params.push(self.bias.clone());
        params
    }
}

/// Independent neurons over the same inputs.
#[derive(Clone, Debug)]
pub struct Layer {
    neurons: Vec<Neuron>,
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Layer {
        Layer {
            neurons: (0..output_size)
                .map(|_| Neuron::new(input_size, rng))
                .collect(),
        }
    }

    pub fn from_neurons(neurons: Vec<Neuron>) -> Layer {
        Layer { neurons }
    }

    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    pub fn output_size(&self) -> usize {
        self.neurons.len()
    }
}

impl Module for Layer {
    type Output = Vec<Var>;

    fn forward(&self, inputs: &[Var]) -> Result<Vec<Var>> {
        self.neurons.iter().map(|n| n.forward(inputs)).collect()
    }

    fn parameters(&self) -> Vec<Var> {
        self.neurons.iter().flat_map(Neuron::parameters).collect()
    }
}

/// Multi-layer perceptron: layers applied in sequence.
#[derive(Clone, Debug)]
pub struct Mlp {
    layers: Vec<Layer>,
}

impl Mlp {
    /// One layer per entry of `layer_sizes`, each fed by the previous one.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        layer_sizes: &[usize],
        rng: &mut R,
    ) -> Result<Mlp> {
        if layer_sizes.is_empty() {
            return Err(Error::EmptyNetwork);
        }
        let sizes: Vec<usize> = std::iter::once(input_size)
            .chain(layer_sizes.iter().copied())
            .collect();
        let layers = sizes
            .windows(2)
            .map(|pair| Layer::new(pair[0], pair[1], rng))
            .collect();
        let mlp = Mlp { layers };
        debug!(
            "built MLP {:?} with {} parameters",
            sizes,
            mlp.parameters().len()
        );
        Ok(mlp)
    }

    /// Network from `config`, initialised from a seeded generator.
    pub fn from_config(config: &Config) -> Result<Mlp> {
        config.validate()?;
        debug!(
            "initialising {} -> {} network from seed {}",
            config.input_size,
            config.output_size(),
            config.seed
        );
        let mut rng = StdRng::seed_from_u64(config.seed);
        Mlp::new(config.input_size, &config.layer_sizes, &mut rng)
    }

    pub fn from_layers(layers: Vec<Layer>) -> Result<Mlp> {
        if layers.is_empty() {
            return Err(Error::EmptyNetwork);
        }
        Ok(Mlp { layers })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Forward pass for a network whose last layer has one neuron.
    pub fn forward_scalar(&self, inputs: &[Var]) -> Result<Var> {
        let mut outputs = self.forward(inputs)?;
        match outputs.len() {
            1 => Ok(outputs.remove(0)),
            actual => Err(Error::OutputSize { actual }),
        }
    }
}

impl Module for Mlp {
    type Output = Vec<Var>;

    fn forward(&self, inputs: &[Var]) -> Result<Vec<Var>> {
        let mut activations = inputs.to_vec();
        for layer in &self.layers {
            activations = layer.forward(&activations)?;
        }
        Ok(activations)
    }

    fn parameters(&self) -> Vec<Var> {
        self.layers.iter().flat_map(Layer::parameters).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn inputs(values: &[f64]) -> Vec<Var> {
        values.iter().copied().map(Var::from).collect()
    }

    #[test]
    fn neuron_computes_tanh_of_weighted_sum() {
        let neuron = Neuron::from_parameters(&[0.5, -0.25, 1.0], 0.1);
        let out = neuron.forward(&inputs(&[1.0, 2.0, 3.0])).unwrap();
        assert_relative_eq!(out.data(), (0.1f64 + 0.5 - 0.5 + 3.0).tanh(), epsilon = 1e-12);
    }

    #[test]
    fn neuron_rejects_wrong_input_size() {
        let neuron = Neuron::from_parameters(&[0.5, -0.25], 0.0);
        let err = neuron.forward(&inputs(&[1.0])).unwrap_err();
        assert_eq!(
            err,
            Error::InputSize {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn neuron_parameters_are_weights_then_bias() {
        let neuron = Neuron::from_parameters(&[0.1, 0.2], 0.3);
        let params = neuron.parameters();
        assert_eq!(params.len(), 3);
        assert!(params[0].ptr_eq(&neuron.weights()[0]));
        assert!(params[2].ptr_eq(neuron.bias()));
        assert_eq!(params[2].label().as_deref(), Some("b"));
    }

    #[test]
    fn parameters_share_nodes_with_the_model() {
        let neuron = Neuron::from_parameters(&[2.0], 0.0);
        neuron.parameters()[0].set_data(-1.0).unwrap();
        assert_eq!(neuron.weights()[0].data(), -1.0);
    }

    #[test]
    fn layer_outputs_one_value_per_neuron() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Layer::new(3, 4, &mut rng);
        let out = layer.forward(&inputs(&[1.0, 0.0, -1.0])).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(layer.parameters().len(), 4 * (3 + 1));
        assert!(out.iter().all(|o| o.data().abs() < 1.0));
    }

    #[test]
    fn random_parameters_are_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let mlp = Mlp::new(3, &[4, 4, 1], &mut rng).unwrap();
        let params = mlp.parameters();
        assert_eq!(params.len(), 4 * 4 + 4 * 5 + 5);
        assert!(params.iter().all(|p| (-1.0..=1.0).contains(&p.data())));
        assert!(params.iter().all(|p| p.is_leaf() && p.grad() == 0.0));
    }

    #[test]
    fn mlp_rejects_empty_layer_list() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(Mlp::new(3, &[], &mut rng).unwrap_err(), Error::EmptyNetwork);
        assert_eq!(Mlp::from_layers(Vec::new()).unwrap_err(), Error::EmptyNetwork);
    }

    #[test]
    fn from_config_is_deterministic() {
        let config = Config::default();
        let a = Mlp::from_config(&config).unwrap();
        let b = Mlp::from_config(&config).unwrap();
        let data = |m: &Mlp| m.parameters().iter().map(Var::data).collect::<Vec<_>>();
        assert_eq!(data(&a), data(&b));
    }

    #[test]
    fn mlp_from_hand_made_layers() {
        let hidden = Layer::from_neurons(vec![
            Neuron::from_parameters(&[1.0, 0.0], 0.0),
            Neuron::from_parameters(&[0.0, 1.0], 0.0),
        ]);
        let output = Layer::from_neurons(vec![Neuron::from_parameters(&[0.5, -0.5], 0.1)]);
        let mlp = Mlp::from_layers(vec![hidden, output]).unwrap();
        assert_eq!(mlp.layers().len(), 2);
        assert_eq!(mlp.layers()[0].output_size(), 2);
        assert_eq!(mlp.parameters().len(), 2 * 3 + 3);

        let out = mlp.forward_scalar(&inputs(&[0.3, -0.2])).unwrap();
        let expected = (0.1 + 0.5 * 0.3f64.tanh() - 0.5 * (-0.2f64).tanh()).tanh();
        assert_relative_eq!(out.data(), expected, epsilon = 1e-12);

        out.backward();
        let output_bias = mlp.layers()[1].neurons()[0].bias();
        assert_relative_eq!(output_bias.grad(), 1.0 - expected * expected, epsilon = 1e-12);
    }

    #[test]
    fn forward_scalar_requires_single_output() {
        let mut rng = StdRng::seed_from_u64(3);
        let wide = Mlp::new(2, &[3, 2], &mut rng).unwrap();
        assert_eq!(
            wide.forward_scalar(&inputs(&[1.0, 1.0])).unwrap_err(),
            Error::OutputSize { actual: 2 }
        );

        let narrow = Mlp::new(2, &[3, 1], &mut rng).unwrap();
        assert!(narrow.forward_scalar(&inputs(&[1.0, 1.0])).is_ok());
    }

    #[test]
    fn backward_reaches_every_parameter() {
        let mut rng = StdRng::seed_from_u64(11);
        let mlp = Mlp::new(3, &[4, 1], &mut rng).unwrap();
        let out = mlp.forward_scalar(&inputs(&[0.5, -1.0, 2.0])).unwrap();
        out.backward();
        assert!(mlp.parameters().iter().all(|p| p.grad() != 0.0));
    }
}
