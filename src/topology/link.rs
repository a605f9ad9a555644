use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::topology::neuron::NeuronId;

/// Longest allowed propagation length of a link.
pub const MAX_LINK_LENGTH: u32 = 10_000;

/// The mutable property bundle of a link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkProps {
    pub weight: f64,
    /// Locked weights are skipped by the teacher but still carry signal.
    pub lock_weight: bool,
    /// Propagation length in think steps, in [1, 10000]. A link of length
    /// `n` delivers its source's output with `n - 1` steps of delay.
    pub length: u32,
}

impl Default for LinkProps {
    fn default() -> Self {
        LinkProps { weight: 0.0, lock_weight: false, length: 1 }
    }
}

impl LinkProps {
    pub fn validate(&self) -> Result<()> {
        if self.length < 1 || self.length > MAX_LINK_LENGTH {
            return Err(EngineError::validation(format!(
                "link length {} outside [1, {}]",
                self.length, MAX_LINK_LENGTH
            )));
        }
        Ok(())
    }
}

/// A weighted, directed connection between two neurons.
///
/// Links are owned by the topology and die with either endpoint neuron.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub source: NeuronId,
    pub target: NeuronId,
    pub props: LinkProps,
    /// In-flight values for links with length > 1, oldest first. Transient:
    /// cleared by `Network::reset` and not persisted.
    #[serde(skip)]
    pub spikes: VecDeque<f64>,
    /// Pre-weight value this link handed to its target in the last think
    /// step; the trainer reads it back. Transient, not persisted.
    #[serde(skip)]
    pub(crate) delivered: f64,
}

impl Link {
    pub fn new(source: NeuronId, target: NeuronId) -> Link {
        Link {
            source,
            target,
            props: LinkProps::default(),
            spikes: VecDeque::new(),
            delivered: 0.0,
        }
    }

    pub fn touches(&self, id: NeuronId) -> bool {
        self.source == id || self.target == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_bounds_enforced() {
        let mut props = LinkProps::default();
        assert!(props.validate().is_ok());
        props.length = 0;
        assert!(props.validate().is_err());
        props.length = MAX_LINK_LENGTH + 1;
        assert!(props.validate().is_err());
        props.length = MAX_LINK_LENGTH;
        assert!(props.validate().is_ok());
    }
}
