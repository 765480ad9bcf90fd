//! Finite-difference verification of backward-pass gradients.

use log::debug;

use crate::backwards::{zero_grad, Var};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradCheckOptions {
    /// Perturbation for the central difference.
    pub step: f64,
    pub abs_tol: f64,
    pub rel_tol: f64,
}

impl Default for GradCheckOptions {
    fn default() -> Self {
        Self {
            step: 1e-6,
            abs_tol: 1e-6,
            rel_tol: 1e-4,
        }
    }
}

/// Compares the gradient of `f(inputs)` with respect to each input against a central
/// finite difference.
///
/// `inputs` must be leaves. Their gradients are left as computed by the backward pass
/// (after a reset) and their values are restored before returning, including on error.
pub fn check_gradients<F>(inputs: &[Var], f: F, options: &GradCheckOptions) -> Result<()>
where
    F: Fn(&[Var]) -> Var,
{
    let output = f(inputs);
    zero_grad(inputs.iter().chain(std::iter::once(&output)));
    output.backward();
    let analytic_grads: Vec<f64> = inputs.iter().map(Var::grad).collect();

    for (input_index, (input, &analytic)) in inputs.iter().zip(&analytic_grads).enumerate() {
        let numeric = numeric_gradient(inputs, input, &f, options.step)?;

        if !analytic.is_finite() || !numeric.is_finite() {
            return Err(Error::NonFinite {
                input_index,
                analytic,
                numeric,
            });
        }
        let difference = (analytic - numeric).abs();
        if difference > options.abs_tol + options.rel_tol * numeric.abs() {
            return Err(Error::GradientMismatch {
                input_index,
                analytic,
                numeric,
                difference,
            });
        }
        debug!("input {input_index}: analytic {analytic}, numeric {numeric}");
    }
    Ok(())
}

fn numeric_gradient<F>(inputs: &[Var], input: &Var, f: &F, step: f64) -> Result<f64>
where
    F: Fn(&[Var]) -> Var,
{
    let original = input.data();
    let evaluate = |value: f64| -> Result<f64> {
        input.set_data(value)?;
        Ok(f(inputs).data())
    };
    let plus = evaluate(original + step);
    let minus = evaluate(original - step);
    input.set_data(original)?;
    Ok((plus? - minus?) / (2.0 * step))
}
