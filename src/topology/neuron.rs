use serde::{Deserialize, Serialize};

use crate::activation::{ActParams, ActivationFunction, InputFunction};
use crate::error::{EngineError, Result};

/// Slot number of a neuron inside its network. Slots are stable: deleting a
/// neuron tombstones its slot, it never renumbers the others.
pub type NeuronId = usize;

/// Which group of the net a neuron belongs to.
///
/// Hidden neurons enter the net as `Unresolved` and are promoted to `Hidden`
/// (with a layer depth) by `Network::analyze` once they sit on a resolvable
/// forward path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LayerKind {
    Input,
    Hidden,
    Output,
    /// Context neurons feed activation back into earlier layers; their
    /// outgoing links always carry the previous think step's output.
    Context,
    Unresolved,
}

/// Policy converting a neuron's activation into its externally visible output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FireLevel {
    /// Schmitt-trigger binarization: output snaps to 1 when the activation
    /// reaches `fire_thres_high`, to 0 when it drops below `fire_thres_low`,
    /// and holds its previous value in between.
    Binary01,
    /// Output equals the activation unchanged.
    Activation,
}

/// The mutable property bundle of a neuron.
///
/// Set-operations validate the whole bundle before touching anything, so an
/// invalid bundle never partially applies (see `NeuronProps::validate`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronProps {
    pub input_func: InputFunction,
    pub act_func: ActivationFunction,
    /// Activation threshold, subtracted from the aggregated input (a bias
    /// with opposite sign). Trained unless locked.
    pub act_thres: f64,
    pub lock_act_thres: bool,
    /// Fraction in [0, 1] of the previous activation retained each step.
    pub act_sustain: f64,
    pub fire_level: FireLevel,
    /// Must be <= `fire_thres_high`.
    pub fire_thres_low: f64,
    pub fire_thres_high: f64,
    /// When enabled, externally applied/read values are mapped linearly
    /// between [`norm_range_low`, `norm_range_high`] and the internal [0, 1]
    /// activation range.
    pub use_normalization: bool,
    /// Must be < `norm_range_high`.
    pub norm_range_low: f64,
    pub norm_range_high: f64,
    pub act_params: ActParams,
}

impl Default for NeuronProps {
    fn default() -> Self {
        NeuronProps {
            input_func: InputFunction::Sum,
            act_func: ActivationFunction::Logistic,
            act_thres: 0.0,
            lock_act_thres: false,
            act_sustain: 0.0,
            fire_level: FireLevel::Activation,
            fire_thres_low: 0.5,
            fire_thres_high: 0.5,
            use_normalization: false,
            norm_range_low: 0.0,
            norm_range_high: 1.0,
            act_params: ActParams::default(),
        }
    }
}

impl NeuronProps {
    /// Checks the bundle's internal invariants.
    pub fn validate(&self) -> Result<()> {
        if self.fire_thres_low > self.fire_thres_high {
            return Err(EngineError::validation(format!(
                "fire_thres_low {} exceeds fire_thres_high {}",
                self.fire_thres_low, self.fire_thres_high
            )));
        }
        if self.norm_range_low >= self.norm_range_high {
            return Err(EngineError::validation(format!(
                "norm_range_low {} must be below norm_range_high {}",
                self.norm_range_low, self.norm_range_high
            )));
        }
        if !(0.0..=1.0).contains(&self.act_sustain) {
            return Err(EngineError::validation(format!(
                "act_sustain {} outside [0, 1]",
                self.act_sustain
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neuron {
    pub name: String,
    pub kind: LayerKind,
    /// Hidden-layer depth assigned by `Network::analyze`; 0 for other kinds.
    pub layer: usize,
    /// Current activation value.
    pub act: f64,
    /// Current fire-level output.
    pub out: f64,
    /// Aggregated pre-activation input from the last think step; kept so the
    /// trainer can evaluate activation derivatives.
    pub net_input: f64,
    pub props: NeuronProps,
}

impl Neuron {
    pub fn new(kind: LayerKind, name: impl Into<String>) -> Neuron {
        Neuron {
            name: name.into(),
            kind,
            layer: 0,
            act: 0.0,
            out: 0.0,
            net_input: 0.0,
            props: NeuronProps::default(),
        }
    }

    /// Zeroes all transient signal state.
    pub fn reset(&mut self) {
        self.act = 0.0;
        self.out = 0.0;
        self.net_input = 0.0;
    }

    /// Maps an external value into the internal [0, 1] activation range.
    /// Returns the value unchanged when normalization is disabled.
    pub fn normalize(&self, value: f64) -> f64 {
        if self.props.use_normalization {
            let (lo, hi) = (self.props.norm_range_low, self.props.norm_range_high);
            (value - lo) / (hi - lo)
        } else {
            value
        }
    }

    /// Inverse of `normalize`.
    pub fn denormalize(&self, value: f64) -> f64 {
        if self.props.use_normalization {
            let (lo, hi) = (self.props.norm_range_low, self.props.norm_range_high);
            lo + value * (hi - lo)
        } else {
            value
        }
    }
}
