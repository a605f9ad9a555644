//! Supervised training: one `teach_step` runs every pattern of the bound
//! lesson through the net, accumulates the error gradient, and applies one
//! batch weight update.
//!
//! The engine deliberately exposes single steps instead of a blocking
//! "train until done" call: the caller owns the convergence policy and the
//! iteration budget, and can interleave progress reporting or abort between
//! steps.

use tracing::debug;

use crate::activation::ActivationFunction;
use crate::error::Result;
use crate::lesson::lesson::Lesson;
use crate::math::store::ValueStore;
use crate::teach::teacher::{TeachResult, Teacher};
use crate::topology::neuron::{LayerKind, NeuronId};
use crate::topology::network::Network;

/// Lifecycle of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeachState {
    Idle,
    Randomizing,
    Training,
    Converged,
    Failed,
    Stopped,
}

/// Bookkeeping of one training run: its state, step counter, and the
/// transient gradient buffers reused across steps.
#[derive(Debug, Clone)]
pub struct TeachRun {
    state: TeachState,
    steps_done: usize,
    abort_requested: bool,
    last_net_error: f64,
    deltas: ValueStore,
    err_acc: ValueStore,
    weight_grads: ValueStore,
    thres_grads: ValueStore,
}

impl Default for TeachRun {
    fn default() -> Self {
        TeachRun::new()
    }
}

impl TeachRun {
    pub fn new() -> TeachRun {
        TeachRun {
            state: TeachState::Idle,
            steps_done: 0,
            abort_requested: false,
            last_net_error: 0.0,
            deltas: ValueStore::default(),
            err_acc: ValueStore::default(),
            weight_grads: ValueStore::default(),
            thres_grads: ValueStore::default(),
        }
    }

    pub fn state(&self) -> TeachState {
        self.state
    }

    pub fn steps_done(&self) -> usize {
        self.steps_done
    }

    /// Aggregate net error measured by the most recent teach step.
    pub fn last_net_error(&self) -> f64 {
        self.last_net_error
    }

    /// Requests an abort; it takes effect at the next step boundary,
    /// never mid-step.
    pub fn request_abort(&mut self) {
        self.abort_requested = true;
    }

    pub(crate) fn enter_randomizing(&mut self) {
        self.state = TeachState::Randomizing;
        self.steps_done = 0;
    }

    pub(crate) fn enter_training(&mut self) {
        self.state = TeachState::Training;
    }

    /// Concludes the run: releases the transient gradient buffers and
    /// returns to `Idle`. Legal in any state and idempotent.
    pub fn stop(&mut self) {
        self.state = TeachState::Idle;
        self.steps_done = 0;
        self.abort_requested = false;
        self.deltas.clear();
        self.err_acc.clear();
        self.weight_grads.clear();
        self.thres_grads.clear();
    }
}

/// Performs one teach step (one full lesson pass).
///
/// `net_error_lesson` is the lesson used purely for the convergence
/// measurement; pass `None` to measure on the training lesson itself.
pub fn teach_step(
    net: &mut Network,
    lesson: &Lesson,
    net_error_lesson: Option<&Lesson>,
    teacher: &Teacher,
    run: &mut TeachRun,
) -> Result<TeachResult> {
    if run.abort_requested {
        run.state = TeachState::Stopped;
        return Ok(TeachResult::Aborted);
    }
    if teacher.max_teach_steps > 0 && run.steps_done >= teacher.max_teach_steps {
        run.state = TeachState::Stopped;
        return Ok(TeachResult::Aborted);
    }

    if let Some(failure) = check_preconditions(net, lesson, net_error_lesson) {
        run.state = TeachState::Failed;
        return Ok(failure);
    }
    run.state = TeachState::Training;

    let slots = net.neurons.len();
    run.deltas.resize(slots);
    run.thres_grads.resize(slots);
    run.err_acc.resize(slots);
    run.weight_grads.resize(net.links.len());
    run.weight_grads.reset();
    run.thres_grads.reset();

    // Output slot -> output index, for matching neurons to pattern columns.
    let output_ids: Vec<NeuronId> = net
        .iter_live()
        .filter(|(_, n)| n.kind == LayerKind::Output)
        .map(|(id, _)| id)
        .collect();

    let mut training_error = 0.0;
    for pattern in lesson.patterns() {
        for (idx, &value) in pattern.inputs.iter().enumerate() {
            net.apply_input_act(idx, value)?;
        }
        net.think_step();

        for (k, &id) in output_ids.iter().enumerate() {
            let out = net.neuron(id)?.out;
            let err = out - pattern.outputs[k];
            training_error += err * err;
        }

        backpropagate(net, pattern.outputs.as_slice(), &output_ids, run);
    }

    // Mean over patterns, batch-style weight update.
    let inv_n = 1.0 / lesson.pattern_count() as f64;
    for (idx, link) in net.links.iter_mut().enumerate() {
        if !link.props.lock_weight {
            link.props.weight -= teacher.learning_rate * run.weight_grads[idx] * inv_n;
        }
    }
    for (id, slot) in net.neurons.iter_mut().enumerate() {
        if let Some(n) = slot.as_mut() {
            if !n.props.lock_act_thres {
                n.props.act_thres -= teacher.learning_rate * run.thres_grads[id] * inv_n;
            }
        }
    }

    let net_error = match net_error_lesson {
        Some(err_lesson) => measure_error(net, err_lesson)?,
        None => training_error * inv_n,
    };
    run.last_net_error = net_error;
    run.steps_done += 1;
    debug!(step = run.steps_done, net_error, "teach step complete");

    if net_error <= teacher.target_net_error {
        run.state = TeachState::Converged;
        Ok(TeachResult::TargetNetErrorReached)
    } else {
        Ok(TeachResult::Ok)
    }
}

/// Mean over patterns of the summed squared output error, without touching
/// any weights.
pub fn measure_error(net: &mut Network, lesson: &Lesson) -> Result<f64> {
    let n = lesson.pattern_count();
    if n == 0 {
        return Ok(0.0);
    }
    let mut total = 0.0;
    for pattern in lesson.patterns() {
        for (idx, &value) in pattern.inputs.iter().enumerate() {
            net.apply_input_act(idx, value)?;
        }
        net.think_step();
        for (k, expected) in pattern.outputs.iter().enumerate() {
            let err = net.output_out(k)? - expected;
            total += err * err;
        }
    }
    Ok(total / n as f64)
}

fn check_preconditions(
    net: &mut Network,
    lesson: &Lesson,
    net_error_lesson: Option<&Lesson>,
) -> Option<TeachResult> {
    if !net.is_fully_resolved() {
        return Some(TeachResult::ArchitectureError);
    }
    if lesson.is_empty() {
        return Some(TeachResult::LessonEmpty);
    }
    if lesson.input_count() != net.input_count() || lesson.output_count() != net.output_count()
    {
        return Some(TeachResult::NotInSync);
    }
    if lesson.selected_pattern() >= lesson.pattern_count() {
        return Some(TeachResult::OutOfLessonRange);
    }
    if let Some(err_lesson) = net_error_lesson {
        if err_lesson.is_empty() {
            return Some(TeachResult::NetErrorLessonEmpty);
        }
        if err_lesson.input_count() != net.input_count()
            || err_lesson.output_count() != net.output_count()
        {
            return Some(TeachResult::NetErrorNotInSync);
        }
    }
    let incompatible = net
        .iter_live()
        .any(|(_, n)| n.kind != LayerKind::Input && !n.props.act_func.supports_teaching());
    if incompatible {
        return Some(TeachResult::IncompatibleActivation);
    }
    None
}

/// One backward pass for the pattern just propagated by `think_step`.
///
/// Deltas are error derivatives with respect to each neuron's net input.
/// Gradients flow only through undelayed, non-context links; delayed links
/// and context feedback deliver previous-step values and are treated as
/// constants (no backpropagation through time). Locked weights receive no
/// update but still pass gradient to their source.
fn backpropagate(net: &mut Network, expected: &[f64], output_ids: &[NeuronId], run: &mut TeachRun) {
    run.deltas.reset();
    run.err_acc.reset();

    let order: Vec<NeuronId> = net.order().to_vec();
    for &id in order.iter().rev() {
        let Some(n) = net.neurons[id].as_ref() else {
            continue;
        };
        if n.kind == LayerKind::Input {
            continue;
        }

        // Error in activation space: output neurons compare against the
        // expected value mapped into the internal range, everything else
        // accumulates from its downstream consumers.
        let mut err = run.err_acc[id];
        if n.kind == LayerKind::Output {
            if let Some(k) = output_ids.iter().position(|&oid| oid == id) {
                err += n.act - n.normalize(expected[k]);
            }
        }

        let dact = match n.props.act_func {
            // Diagonal Jacobian term of the layer softmax.
            ActivationFunction::Softmax => n.act * (1.0 - n.act),
            af => af.derivative(n.net_input, &n.props.act_params).unwrap_or(0.0),
        };
        let delta = err * dact;
        run.deltas[id] = delta;
        run.thres_grads[id] += -delta;

        if delta == 0.0 {
            continue;
        }

        // All incoming links with the pre-weight value each delivered during
        // the forward pass. Gradient flows only through undelayed, non-context
        // links; the rest enter Mul products as constant factors.
        let incoming: Vec<(usize, NeuronId, f64, f64, bool)> = net
            .links
            .iter()
            .enumerate()
            .filter(|(_, l)| l.target == id)
            .map(|(idx, l)| {
                let eligible = l.props.length == 1
                    && net.neurons[l.source]
                        .as_ref()
                        .map_or(false, |s| s.kind != LayerKind::Context);
                (idx, l.source, l.props.weight, l.delivered, eligible)
            })
            .collect();

        match n.props.input_func {
            crate::activation::InputFunction::Sum => {
                for &(idx, src, weight, value, eligible) in &incoming {
                    if !eligible {
                        continue;
                    }
                    run.weight_grads[idx] += delta * value;
                    run.err_acc[src] += delta * weight;
                }
            }
            crate::activation::InputFunction::Mul => {
                // Product rule: each term's partial is the product of every
                // other incoming term, delayed and context terms included.
                for (i, &(idx, src, weight, value, eligible)) in incoming.iter().enumerate() {
                    if !eligible {
                        continue;
                    }
                    let others: f64 = incoming
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, &(_, _, w, v, _))| w * v)
                        .product();
                    run.weight_grads[idx] += delta * value * others;
                    run.err_acc[src] += delta * weight * others;
                }
            }
        }
    }
}
