use serde::{Deserialize, Serialize};

/// How a neuron aggregates its incoming weighted signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputFunction {
    /// Sum of all weighted incoming signals (the usual dot product).
    Sum,
    /// Product of all weighted incoming signals.
    Mul,
}

/// Per-neuron shape parameters consumed by the activation functions.
///
/// They live on the neuron (not the function variant) so that a property
/// bundle can change the shape without swapping the function itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActParams {
    /// Steepness of the logistic curve.
    pub logistic_steepness: f64,
    /// Scale factor inside `tanh`.
    pub tanh_parm: f64,
    /// Negative-side slope for the leaky ReLU variant.
    pub leakage: f64,
    /// Slope of the smooth binary-difference step.
    pub bin_diff_slope: f64,
}

impl Default for ActParams {
    fn default() -> Self {
        ActParams {
            logistic_steepness: 1.0,
            tanh_parm: 1.0,
            leakage: 0.0,
            bin_diff_slope: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    /// `1 / (1 + e^(-steepness * x))`.
    Logistic,
    /// Pass-through.
    Identity,
    /// Pass-through clamped to [0, 1].
    Identity01,
    /// Pass-through clamped to [-1, 1].
    IdentityM11,
    /// `tanh(parm * x)`.
    TanH,
    /// Hard 0/1 step at zero. Not differentiable; nets containing a Binary
    /// neuron cannot be taught.
    Binary,
    /// ReLU; `leakage` gives the negative-side slope (0 = plain ReLU).
    Relu,
    /// `ln(1 + e^x)`, a smooth ReLU.
    Softplus,
    /// Smooth step `1 / (1 + e^(-slope * x))` with a configurable slope,
    /// the differentiable stand-in for `Binary`.
    BinDiff,
    /// Softmax is a layer-level activation: the engine collects every softmax
    /// neuron of a layer, exponentiates with the layer maximum subtracted, and
    /// normalizes by the sum. The element-wise `function()` is therefore never
    /// called for this variant.
    Softmax,
}

impl ActivationFunction {
    /// Element-wise activation of the aggregated net input.
    ///
    /// `Softmax` is excluded: the engine applies it per layer, never through
    /// this path.
    pub fn function(&self, x: f64, p: &ActParams) -> f64 {
        match self {
            ActivationFunction::Logistic => logistic(p.logistic_steepness * x),
            ActivationFunction::Identity => x,
            ActivationFunction::Identity01 => x.clamp(0.0, 1.0),
            ActivationFunction::IdentityM11 => x.clamp(-1.0, 1.0),
            ActivationFunction::TanH => (p.tanh_parm * x).tanh(),
            ActivationFunction::Binary => {
                if x >= 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationFunction::Relu => {
                if x > 0.0 {
                    x
                } else {
                    p.leakage * x
                }
            }
            ActivationFunction::Softplus => (1.0 + x.exp()).ln(),
            ActivationFunction::BinDiff => logistic(p.bin_diff_slope * x),
            ActivationFunction::Softmax => {
                unreachable!("softmax is applied at the layer level by the engine")
            }
        }
    }

    /// Element-wise derivative with respect to the net input, or `None` when
    /// the function has no derivative usable for backpropagation (`Binary`).
    ///
    /// For `Softmax` the trainer uses the diagonal Jacobian term computed from
    /// the stored activation instead; see `teach::trainer`.
    pub fn derivative(&self, x: f64, p: &ActParams) -> Option<f64> {
        let d = match self {
            ActivationFunction::Logistic => {
                let fx = logistic(p.logistic_steepness * x);
                p.logistic_steepness * fx * (1.0 - fx)
            }
            ActivationFunction::Identity => 1.0,
            ActivationFunction::Identity01 => {
                if (0.0..=1.0).contains(&x) {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationFunction::IdentityM11 => {
                if (-1.0..=1.0).contains(&x) {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationFunction::TanH => {
                let t = (p.tanh_parm * x).tanh();
                p.tanh_parm * (1.0 - t * t)
            }
            ActivationFunction::Binary => return None,
            ActivationFunction::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    p.leakage
                }
            }
            ActivationFunction::Softplus => logistic(x),
            ActivationFunction::BinDiff => {
                let fx = logistic(p.bin_diff_slope * x);
                p.bin_diff_slope * fx * (1.0 - fx)
            }
            // Placeholder; the trainer substitutes act * (1 - act).
            ActivationFunction::Softmax => 1.0,
        };
        Some(d)
    }

    /// Whether backpropagation is defined for this function.
    pub fn supports_teaching(&self) -> bool {
        !matches!(self, ActivationFunction::Binary)
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn logistic_midpoint_and_steepness() {
        let p = ActParams::default();
        assert_relative_eq!(ActivationFunction::Logistic.function(0.0, &p), 0.5);
        let steep = ActParams { logistic_steepness: 4.0, ..ActParams::default() };
        let gentle = ActivationFunction::Logistic.function(1.0, &p);
        let sharp = ActivationFunction::Logistic.function(1.0, &steep);
        assert!(sharp > gentle);
    }

    #[test]
    fn clamped_identities() {
        let p = ActParams::default();
        assert_eq!(ActivationFunction::Identity01.function(1.7, &p), 1.0);
        assert_eq!(ActivationFunction::Identity01.function(-0.3, &p), 0.0);
        assert_eq!(ActivationFunction::IdentityM11.function(-2.0, &p), -1.0);
        assert_eq!(ActivationFunction::Identity.function(3.25, &p), 3.25);
    }

    #[test]
    fn relu_leakage() {
        let p = ActParams { leakage: 0.1, ..ActParams::default() };
        assert_relative_eq!(ActivationFunction::Relu.function(-2.0, &p), -0.2);
        assert_relative_eq!(ActivationFunction::Relu.function(2.0, &p), 2.0);
        assert_relative_eq!(ActivationFunction::Relu.derivative(-1.0, &p).unwrap(), 0.1);
    }

    #[test]
    fn binary_has_no_derivative() {
        let p = ActParams::default();
        assert_eq!(ActivationFunction::Binary.function(0.0, &p), 1.0);
        assert_eq!(ActivationFunction::Binary.function(-0.01, &p), 0.0);
        assert!(ActivationFunction::Binary.derivative(0.0, &p).is_none());
        assert!(!ActivationFunction::Binary.supports_teaching());
    }

    #[test]
    fn logistic_derivative_matches_finite_difference() {
        let p = ActParams { logistic_steepness: 2.0, ..ActParams::default() };
        let f = ActivationFunction::Logistic;
        let h = 1e-6;
        for &x in &[-1.5, 0.0, 0.7] {
            let numeric = (f.function(x + h, &p) - f.function(x - h, &p)) / (2.0 * h);
            assert_relative_eq!(f.derivative(x, &p).unwrap(), numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn softplus_derivative_is_logistic() {
        let p = ActParams::default();
        let d = ActivationFunction::Softplus.derivative(0.0, &p).unwrap();
        assert_relative_eq!(d, 0.5);
    }
}
