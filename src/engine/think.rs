//! The activation engine: one `think_step` propagates signals from the input
//! neurons to the outputs in topological dependency order.
//!
//! Cycle breaking: links leaving a context neuron and links with a
//! propagation length above 1 deliver the *previous* step's stored output,
//! so they impose no same-step ordering. Everything else is evaluated
//! strictly after its dependencies.

use std::collections::BTreeMap;

use tracing::warn;

use crate::activation::{ActivationFunction, InputFunction};
use crate::error::{EngineError, Result};
use crate::math::store::ValueStore;
use crate::topology::neuron::{FireLevel, LayerKind, NeuronId};
use crate::topology::network::Network;

impl Network {
    // ── Input application ───────────────────────────────────────────────────

    /// Applies an activation value to the input neuron at `idx`.
    ///
    /// With normalization enabled the value is mapped from the neuron's
    /// declared range into the internal [0, 1] range; a value outside the
    /// declared range is accepted but flagged with a warning.
    pub fn apply_input_act(&mut self, idx: usize, value: f64) -> Result<()> {
        let id = self.input_id(idx)?;
        let neuron = self.neuron_mut(id)?;
        if neuron.props.use_normalization
            && !(neuron.props.norm_range_low..=neuron.props.norm_range_high).contains(&value)
        {
            warn!(
                input = idx,
                value,
                low = neuron.props.norm_range_low,
                high = neuron.props.norm_range_high,
                "input activation outside declared range"
            );
        }
        let act = neuron.normalize(value);
        neuron.act = act;
        // Inputs pass their activation straight through as output.
        neuron.out = act;
        Ok(())
    }

    /// Activation of the input neuron at `idx`, in external units.
    pub fn input_act(&self, idx: usize) -> Result<f64> {
        let id = self.input_id(idx)?;
        let neuron = self.neuron(id)?;
        Ok(neuron.denormalize(neuron.act))
    }

    // ── Activation ranges ───────────────────────────────────────────────────

    /// Declares the external activation range of the input neuron at `idx`
    /// and enables normalization on it.
    pub fn set_input_act_range(&mut self, idx: usize, min: f64, max: f64) -> Result<()> {
        let id = self.input_id(idx)?;
        self.set_act_range(id, min, max)
    }

    /// Declares the external activation range of the output neuron at `idx`
    /// and enables normalization on it.
    pub fn set_output_act_range(&mut self, idx: usize, min: f64, max: f64) -> Result<()> {
        let id = self.output_id(idx)?;
        self.set_act_range(id, min, max)
    }

    fn set_act_range(&mut self, id: NeuronId, min: f64, max: f64) -> Result<()> {
        if min >= max {
            return Err(EngineError::validation(format!(
                "activation range minimum {min} must be below maximum {max}"
            )));
        }
        let neuron = self.neuron_mut(id)?;
        neuron.props.use_normalization = true;
        neuron.props.norm_range_low = min;
        neuron.props.norm_range_high = max;
        Ok(())
    }

    pub fn input_act_range_min(&self, idx: usize) -> Result<f64> {
        let id = self.input_id(idx)?;
        Ok(self.neuron(id)?.props.norm_range_low)
    }

    pub fn input_act_range_max(&self, idx: usize) -> Result<f64> {
        let id = self.input_id(idx)?;
        Ok(self.neuron(id)?.props.norm_range_high)
    }

    pub fn output_act_range_min(&self, idx: usize) -> Result<f64> {
        let id = self.output_id(idx)?;
        Ok(self.neuron(id)?.props.norm_range_low)
    }

    pub fn output_act_range_max(&self, idx: usize) -> Result<f64> {
        let id = self.output_id(idx)?;
        Ok(self.neuron(id)?.props.norm_range_high)
    }

    // ── Output queries ──────────────────────────────────────────────────────

    /// Activation of the output neuron at `idx`.
    pub fn output_act(&self, idx: usize) -> Result<f64> {
        let id = self.output_id(idx)?;
        Ok(self.neuron(id)?.act)
    }

    /// Fire-level output of the output neuron at `idx`, in external units.
    pub fn output_out(&self, idx: usize) -> Result<f64> {
        let id = self.output_id(idx)?;
        Ok(self.neuron(id)?.out)
    }

    /// Output index with the highest activation, or `None` for a net without
    /// output neurons. This is a sentinel-style query, never an error.
    pub fn output_winner(&self) -> Option<usize> {
        let mut winner: Option<(usize, f64)> = None;
        for (idx, (_, n)) in self
            .iter_live()
            .filter(|(_, n)| n.kind == LayerKind::Output)
            .enumerate()
        {
            match winner {
                Some((_, best)) if n.act <= best => {}
                _ => winner = Some((idx, n.act)),
            }
        }
        winner.map(|(idx, _)| idx)
    }

    // ── Forward pass ────────────────────────────────────────────────────────

    /// Performs one think step of the net.
    ///
    /// Neurons are evaluated one depth level at a time so that a neuron
    /// always sees the *current* step's fired output of its same-step
    /// dependencies, including softmax layers, which are normalized as a
    /// whole before any deeper neuron reads them.
    pub fn think_step(&mut self) {
        let slots = self.neurons.len();
        let mut prev_out = ValueStore::zeros(slots);
        let mut prev_act = ValueStore::zeros(slots);
        for (id, n) in self.iter_live() {
            prev_out[id] = n.out;
            prev_act[id] = n.act;
        }

        // `order` is sorted by (depth, slot); walk it depth group by depth group.
        let order: Vec<NeuronId> = self.order().to_vec();
        let mut i = 0;
        while i < order.len() {
            let depth = self.neurons[order[i]].as_ref().map(|n| n.layer).unwrap_or(0);
            let mut j = i;
            while j < order.len()
                && self.neurons[order[j]].as_ref().map(|n| n.layer) == Some(depth)
            {
                j += 1;
            }
            let group = &order[i..j];

            for &id in group {
                self.aggregate_and_activate(id, &prev_out, &prev_act);
            }
            self.apply_softmax_groups(group, &prev_act);
            for &id in group {
                self.fire(id, &prev_out);
            }
            i = j;
        }

        // Advance the spike queues of delayed links.
        for i in 0..self.links.len() {
            let length = self.links[i].props.length;
            if length <= 1 {
                continue;
            }
            let src = self.links[i].source;
            let src_out = self.neurons[src].as_ref().map(|n| n.out).unwrap_or(0.0);
            let link = &mut self.links[i];
            link.spikes.push_back(src_out);
            while link.spikes.len() as u32 > length - 1 {
                link.spikes.pop_front();
            }
        }
    }

    /// Aggregates a neuron's incoming signals and applies its element-wise
    /// activation (softmax neurons only store their net input here).
    fn aggregate_and_activate(&mut self, id: NeuronId, prev_out: &ValueStore, prev_act: &ValueStore) {
        let Some(kind) = self.neurons[id].as_ref().map(|n| n.kind) else {
            return;
        };
        if kind == LayerKind::Input {
            return;
        }

        let mut terms: Vec<f64> = Vec::new();
        for li in 0..self.links.len() {
            if self.links[li].target != id {
                continue;
            }
            let link = &self.links[li];
            let delivered = if link.props.length > 1 {
                // Warm-up: a delayed link delivers zero until filled.
                if link.spikes.len() as u32 == link.props.length - 1 {
                    link.spikes.front().copied().unwrap_or(0.0)
                } else {
                    0.0
                }
            } else {
                match self.neurons[link.source].as_ref() {
                    Some(src) if src.kind == LayerKind::Context => prev_out[link.source],
                    Some(src) => src.out,
                    None => 0.0,
                }
            };
            terms.push(delivered * link.props.weight);
            self.links[li].delivered = delivered;
        }

        let Some(n) = self.neurons[id].as_mut() else {
            return;
        };
        let agg = match n.props.input_func {
            InputFunction::Sum => terms.iter().sum::<f64>(),
            InputFunction::Mul => {
                if terms.is_empty() {
                    0.0
                } else {
                    terms.iter().product()
                }
            }
        };
        n.net_input = agg - n.props.act_thres;
        if n.props.act_func != ActivationFunction::Softmax {
            let raw = n.props.act_func.function(n.net_input, &n.props.act_params);
            n.act = n.props.act_sustain * prev_act[id] + (1.0 - n.props.act_sustain) * raw;
        }
    }

    /// Derives a neuron's output from its activation via the fire-level
    /// policy, denormalizing output neurons back to external units.
    fn fire(&mut self, id: NeuronId, prev_out: &ValueStore) {
        let prev = prev_out[id];
        let Some(n) = self.neurons[id].as_mut() else {
            return;
        };
        if n.kind == LayerKind::Input {
            return;
        }
        let fired = match n.props.fire_level {
            FireLevel::Activation => n.act,
            FireLevel::Binary01 => {
                if n.act >= n.props.fire_thres_high {
                    1.0
                } else if n.act < n.props.fire_thres_low {
                    0.0
                } else if n.kind == LayerKind::Output {
                    // Stored outputs are in external units; map the held
                    // value back before it is denormalized again below.
                    n.normalize(prev)
                } else {
                    prev
                }
            }
        };
        n.out = if n.kind == LayerKind::Output {
            n.denormalize(fired)
        } else {
            fired
        };
    }

    /// Softmax is normalized per layer: raw exponentials with the layer
    /// maximum subtracted for numeric stability, then divided by their sum.
    /// `group` holds the ids of one depth level.
    fn apply_softmax_groups(&mut self, group: &[NeuronId], prev_act: &ValueStore) {
        let mut by_kind: BTreeMap<LayerKind, Vec<NeuronId>> = BTreeMap::new();
        for &id in group {
            if let Some(n) = self.neurons[id].as_ref() {
                if n.props.act_func == ActivationFunction::Softmax {
                    by_kind.entry(n.kind).or_default().push(id);
                }
            }
        }

        for ids in by_kind.values() {
            let max = ids
                .iter()
                .filter_map(|&id| self.neurons[id].as_ref())
                .map(|n| n.net_input)
                .fold(f64::NEG_INFINITY, f64::max);
            let mut exps = Vec::with_capacity(ids.len());
            for &id in ids {
                let e = self.neurons[id]
                    .as_ref()
                    .map(|n| (n.net_input - max).exp())
                    .unwrap_or(0.0);
                exps.push(e);
            }
            let sum: f64 = exps.iter().sum();
            for (&id, e) in ids.iter().zip(exps.iter()) {
                if let Some(n) = self.neurons[id].as_mut() {
                    let raw = e / sum;
                    n.act =
                        n.props.act_sustain * prev_act[id] + (1.0 - n.props.act_sustain) * raw;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::topology::link::LinkProps;
    use crate::topology::neuron::NeuronProps;

    /// 1-1 pass-through net with a fixed weight.
    fn wire(weight: f64) -> Network {
        let mut net = Network::new();
        let i = net.add_input("in");
        let o = net.add_output("out");
        net.add_link(i, o).unwrap();
        net.select_all_outputs(false);
        let mut props = NeuronProps::default();
        props.act_func = ActivationFunction::Identity;
        net.set_selected_neuron_props(&props).unwrap();
        net.clear_selection();
        let idx = net.link_index(i, o).unwrap();
        net.links[idx].props.weight = weight;
        net
    }

    #[test]
    fn forward_pass_is_deterministic() {
        let mut net = wire(0.75);
        net.apply_input_act(0, 0.4).unwrap();
        net.think_step();
        let first = net.output_act(0).unwrap();
        net.reset();
        net.apply_input_act(0, 0.4).unwrap();
        net.think_step();
        assert_eq!(net.output_act(0).unwrap(), first);
        assert_relative_eq!(first, 0.3);
    }

    #[test]
    fn threshold_acts_as_bias() {
        let mut net = wire(1.0);
        net.select_all_outputs(false);
        let mut props = NeuronProps::default();
        props.act_func = ActivationFunction::Identity;
        props.act_thres = 0.25;
        net.set_selected_neuron_props(&props).unwrap();
        net.apply_input_act(0, 1.0).unwrap();
        net.think_step();
        assert_relative_eq!(net.output_act(0).unwrap(), 0.75);
    }

    #[test]
    fn binary_fire_level_hysteresis() {
        let mut net = wire(1.0);
        net.select_all_outputs(false);
        let mut props = NeuronProps::default();
        props.act_func = ActivationFunction::Identity;
        props.fire_level = FireLevel::Binary01;
        props.fire_thres_low = 0.3;
        props.fire_thres_high = 0.7;
        net.set_selected_neuron_props(&props).unwrap();

        net.apply_input_act(0, 0.9).unwrap();
        net.think_step();
        assert_eq!(net.output_out(0).unwrap(), 1.0);

        // Between the thresholds the output holds its previous value.
        net.apply_input_act(0, 0.5).unwrap();
        net.think_step();
        assert_eq!(net.output_out(0).unwrap(), 1.0);

        net.apply_input_act(0, 0.1).unwrap();
        net.think_step();
        assert_eq!(net.output_out(0).unwrap(), 0.0);

        net.apply_input_act(0, 0.5).unwrap();
        net.think_step();
        assert_eq!(net.output_out(0).unwrap(), 0.0);
    }

    #[test]
    fn binary_hold_keeps_normalized_output_stable() {
        let mut net = wire(1.0);
        net.select_all_outputs(false);
        let mut props = NeuronProps::default();
        props.act_func = ActivationFunction::Identity;
        props.fire_level = FireLevel::Binary01;
        props.fire_thres_low = 0.3;
        props.fire_thres_high = 0.7;
        net.set_selected_neuron_props(&props).unwrap();
        net.set_output_act_range(0, -100.0, 100.0).unwrap();

        net.apply_input_act(0, 0.9).unwrap();
        net.think_step();
        assert_eq!(net.output_out(0).unwrap(), 100.0);

        // The hold branch must not denormalize the stored value a second
        // time.
        net.apply_input_act(0, 0.5).unwrap();
        net.think_step();
        assert_eq!(net.output_out(0).unwrap(), 100.0);

        net.apply_input_act(0, 0.1).unwrap();
        net.think_step();
        assert_eq!(net.output_out(0).unwrap(), -100.0);

        net.apply_input_act(0, 0.5).unwrap();
        net.think_step();
        assert_eq!(net.output_out(0).unwrap(), -100.0);
    }

    #[test]
    fn context_link_delivers_previous_step() {
        // in -> out -> ctx -> out (feedback); ctx output lags one step.
        let mut net = Network::new();
        let i = net.add_input("in");
        let o = net.add_output("out");
        let c = net.add_context("ctx");
        net.add_link(i, o).unwrap();
        net.add_link(o, c).unwrap();
        net.add_link(c, o).unwrap();
        for n in net.neurons.iter_mut().flatten() {
            n.props.act_func = ActivationFunction::Identity;
        }
        for link in &mut net.links {
            link.props.weight = 1.0;
        }

        net.apply_input_act(0, 1.0).unwrap();
        net.think_step();
        // Step 1: context was zero, output sees only the input.
        assert_relative_eq!(net.output_act(0).unwrap(), 1.0);
        net.think_step();
        // Step 2: context now carries step 1's output.
        assert_relative_eq!(net.output_act(0).unwrap(), 2.0);
    }

    #[test]
    fn delayed_link_warms_up_with_zeros() {
        let mut net = wire(1.0);
        let i = net.input_id(0).unwrap();
        let o = net.output_id(0).unwrap();
        let idx = net.link_index(i, o).unwrap();
        net.links[idx].props = LinkProps { weight: 1.0, lock_weight: false, length: 3 };

        net.apply_input_act(0, 0.8).unwrap();
        net.think_step();
        assert_eq!(net.output_act(0).unwrap(), 0.0);
        net.think_step();
        assert_eq!(net.output_act(0).unwrap(), 0.0);
        net.think_step();
        // Two steps of delay for length 3.
        assert_relative_eq!(net.output_act(0).unwrap(), 0.8);
    }

    #[test]
    fn reset_clears_spikes() {
        let mut net = wire(1.0);
        let i = net.input_id(0).unwrap();
        let o = net.output_id(0).unwrap();
        let idx = net.link_index(i, o).unwrap();
        net.links[idx].props.length = 2;
        net.apply_input_act(0, 0.6).unwrap();
        net.think_step();
        net.reset();
        net.think_step();
        assert_eq!(net.output_act(0).unwrap(), 0.0);
    }

    #[test]
    fn softmax_layer_sums_to_one() {
        let mut net = Network::new();
        let i = net.add_input("in");
        let o0 = net.add_output("a");
        let o1 = net.add_output("b");
        let o2 = net.add_output("c");
        for &o in &[o0, o1, o2] {
            net.add_link(i, o).unwrap();
        }
        net.select_all_outputs(false);
        let mut props = NeuronProps::default();
        props.act_func = ActivationFunction::Softmax;
        net.set_selected_neuron_props(&props).unwrap();
        net.links[0].props.weight = 1.0;
        net.links[1].props.weight = 2.0;
        net.links[2].props.weight = 400.0; // large enough to overflow a naive exp

        net.apply_input_act(0, 1.0).unwrap();
        net.think_step();
        let sum: f64 = (0..3).map(|k| net.output_act(k).unwrap()).sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        assert_eq!(net.output_winner(), Some(2));
        assert!(net.output_act(2).unwrap().is_finite());
    }

    #[test]
    fn normalized_output_maps_back_to_external_range() {
        let mut net = wire(1.0);
        net.set_output_act_range(0, -100.0, 100.0).unwrap();
        net.apply_input_act(0, 0.75).unwrap();
        net.think_step();
        // act 0.75 in [0,1] maps to 50 in [-100,100].
        assert_relative_eq!(net.output_out(0).unwrap(), 50.0);
        assert_relative_eq!(net.output_act(0).unwrap(), 0.75);
    }

    #[test]
    fn input_normalization_and_range_queries() {
        let mut net = wire(1.0);
        net.set_input_act_range(0, 0.0, 10.0).unwrap();
        assert_eq!(net.input_act_range_min(0).unwrap(), 0.0);
        assert_eq!(net.input_act_range_max(0).unwrap(), 10.0);
        net.apply_input_act(0, 5.0).unwrap();
        assert_relative_eq!(net.input_act(0).unwrap(), 5.0);
        net.think_step();
        assert_relative_eq!(net.output_act(0).unwrap(), 0.5);
    }

    #[test]
    fn winner_of_empty_net_is_none() {
        let net = Network::new();
        assert_eq!(net.output_winner(), None);
    }
}
