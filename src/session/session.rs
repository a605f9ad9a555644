//! A session owns the live objects a caller works with: a registry of nets,
//! a registry of lessons, the loaded teachers, and the state of the current
//! training run. All cross-object operations (training, applying lesson
//! patterns to a net) go through the session so that selection and run state
//! stay consistent.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::lesson::csv::{self, CsvSection, CsvSeparators};
use crate::lesson::lesson::Lesson;
use crate::teach::teacher::{self, TeachResult, Teacher};
use crate::teach::trainer::{self, TeachRun, TeachState};
use crate::topology::network::Network;

/// Stable handle to a net slot within a session.
pub type NetId = usize;

/// What `Session::think_lesson` records: the net's outputs for every pattern
/// plus the aggregate error against the lesson's output data.
#[derive(Debug, Clone, PartialEq)]
pub struct ThinkLessonResult {
    /// One output vector per pattern, in pattern order and external units.
    pub outputs: Vec<Vec<f64>>,
    /// Mean over patterns of the summed squared output error.
    pub net_error: f64,
}

pub struct Session {
    /// Net slots are tombstoned like neuron slots: closing a net leaves a
    /// hole and other handles stay valid.
    nets: Vec<Option<Network>>,
    /// Lesson slots are a dense, resizable page list; there is always at
    /// least one lesson.
    lessons: Vec<Lesson>,
    selected_net: Option<NetId>,
    selected_lesson: usize,
    /// Lesson used for the convergence measurement during training, when it
    /// differs from the training lesson.
    net_error_lesson: Option<usize>,
    teachers: Vec<Teacher>,
    active_teacher: Option<usize>,
    run: TeachRun,
    csv_separators: CsvSeparators,
    rng: StdRng,
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl Session {
    pub fn new() -> Session {
        Session::with_seed(rand::random())
    }

    /// A seeded session behaves deterministically across randomize calls.
    pub fn with_seed(seed: u64) -> Session {
        Session {
            nets: Vec::new(),
            lessons: vec![Lesson::new()],
            selected_net: None,
            selected_lesson: 0,
            net_error_lesson: None,
            teachers: Vec::new(),
            active_teacher: None,
            run: TeachRun::new(),
            csv_separators: CsvSeparators::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Drops every net, lesson, and teacher and returns the session to its
    /// initial state. The RNG keeps its sequence.
    pub fn clear(&mut self) {
        self.nets.clear();
        self.lessons = vec![Lesson::new()];
        self.selected_net = None;
        self.selected_lesson = 0;
        self.net_error_lesson = None;
        self.teachers.clear();
        self.active_teacher = None;
        self.run.stop();
        self.csv_separators = CsvSeparators::default();
    }

    // ── Net registry ────────────────────────────────────────────────────────

    /// Creates an empty net, selects it, and returns its handle. The lowest
    /// free slot is reused.
    pub fn new_net(&mut self) -> NetId {
        let net = Network::new();
        let id = match self.nets.iter().position(Option::is_none) {
            Some(slot) => {
                self.nets[slot] = Some(net);
                slot
            }
            None => {
                self.nets.push(Some(net));
                self.nets.len() - 1
            }
        };
        self.selected_net = Some(id);
        id
    }

    /// Loads a net from a JSON file into a fresh slot and selects it.
    pub fn open_net(&mut self, path: &str) -> Result<NetId> {
        let net = Network::load_json(path)?;
        let id = self.new_net();
        self.nets[id] = Some(net);
        info!(path, id, "net loaded");
        Ok(id)
    }

    pub fn save_net(&self, path: &str) -> Result<()> {
        self.net()?.save_json(path)
    }

    /// Closes a net slot. Closing the selected net deselects it; training on
    /// it must be stopped first.
    pub fn close_net(&mut self, id: NetId) -> Result<()> {
        if self.selected_net == Some(id) && self.run.state() == TeachState::Training {
            return Err(EngineError::state("cannot close a net that is training"));
        }
        let slot = self
            .nets
            .get_mut(id)
            .filter(|s| s.is_some())
            .ok_or_else(|| EngineError::not_found(format!("no net {id}")))?;
        *slot = None;
        if self.selected_net == Some(id) {
            self.selected_net = None;
        }
        Ok(())
    }

    pub fn net_count(&self) -> usize {
        self.nets.iter().filter(|s| s.is_some()).count()
    }

    pub fn select_net(&mut self, id: NetId) -> Result<()> {
        if self.nets.get(id).map_or(true, Option::is_none) {
            return Err(EngineError::not_found(format!("no net {id}")));
        }
        self.selected_net = Some(id);
        Ok(())
    }

    pub fn selected_net(&self) -> Option<NetId> {
        self.selected_net
    }

    /// The selected net; most single-net operations borrow it through here.
    pub fn net(&self) -> Result<&Network> {
        let id = self
            .selected_net
            .ok_or_else(|| EngineError::state("no net selected"))?;
        self.nets[id]
            .as_ref()
            .ok_or_else(|| EngineError::state("no net selected"))
    }

    pub fn net_mut(&mut self) -> Result<&mut Network> {
        let id = self
            .selected_net
            .ok_or_else(|| EngineError::state("no net selected"))?;
        self.nets[id]
            .as_mut()
            .ok_or_else(|| EngineError::state("no net selected"))
    }

    // ── Lesson registry ─────────────────────────────────────────────────────

    pub fn lesson_count(&self) -> usize {
        self.lessons.len()
    }

    /// Grows or shrinks the lesson list. At least one lesson always exists;
    /// shrinking clamps the selections to the new range.
    pub fn set_lesson_count(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(EngineError::validation("a session needs at least one lesson"));
        }
        self.lessons.resize_with(count, Lesson::new);
        self.selected_lesson = self.selected_lesson.min(count - 1);
        if let Some(idx) = self.net_error_lesson {
            if idx >= count {
                self.net_error_lesson = None;
            }
        }
        Ok(())
    }

    pub fn select_lesson(&mut self, idx: usize) -> Result<()> {
        if idx >= self.lessons.len() {
            return Err(EngineError::not_found(format!("no lesson {idx}")));
        }
        self.selected_lesson = idx;
        Ok(())
    }

    pub fn selected_lesson(&self) -> usize {
        self.selected_lesson
    }

    pub fn lesson(&self) -> &Lesson {
        &self.lessons[self.selected_lesson]
    }

    pub fn lesson_mut(&mut self) -> &mut Lesson {
        &mut self.lessons[self.selected_lesson]
    }

    /// Designates a lesson as the net-error lesson, or clears the
    /// designation with `None`.
    pub fn set_net_error_lesson(&mut self, idx: Option<usize>) -> Result<()> {
        if let Some(i) = idx {
            if i >= self.lessons.len() {
                return Err(EngineError::not_found(format!("no lesson {i}")));
            }
        }
        self.net_error_lesson = idx;
        Ok(())
    }

    pub fn net_error_lesson(&self) -> Option<usize> {
        self.net_error_lesson
    }

    pub fn load_lesson(&mut self, path: &str) -> Result<()> {
        self.lessons[self.selected_lesson] = Lesson::load_json(path)?;
        info!(path, idx = self.selected_lesson, "lesson loaded");
        Ok(())
    }

    pub fn save_lesson(&self, path: &str) -> Result<()> {
        self.lesson().save_json(path)
    }

    pub fn import_lesson_csv(
        &mut self,
        path: &str,
        with_header: bool,
        section: CsvSection,
    ) -> Result<()> {
        let seps = self.csv_separators;
        csv::import_lesson(self.lesson_mut(), path, with_header, section, seps)
    }

    pub fn export_lesson_csv(
        &self,
        path: &str,
        max_cols: usize,
        with_header: bool,
        section: CsvSection,
    ) -> Result<()> {
        csv::export_lesson(self.lesson(), path, max_cols, with_header, section, self.csv_separators)
    }

    /// Copies the net's input/output neuron names onto the lesson's columns.
    /// Widths must already match.
    pub fn lesson_names_from_net(&mut self) -> Result<()> {
        let net_id = self
            .selected_net
            .ok_or_else(|| EngineError::state("no net selected"))?;
        let net = self.nets[net_id]
            .as_ref()
            .ok_or_else(|| EngineError::state("no net selected"))?;
        let lesson = &self.lessons[self.selected_lesson];
        if lesson.input_count() != net.input_count()
            || lesson.output_count() != net.output_count()
        {
            return Err(EngineError::state("lesson widths do not match the net"));
        }
        let inputs: Vec<String> =
            (0..net.input_count()).map(|i| net.input_name(i).map(String::from)).collect::<Result<_>>()?;
        let outputs: Vec<String> =
            (0..net.output_count()).map(|i| net.output_name(i).map(String::from)).collect::<Result<_>>()?;
        let lesson = &mut self.lessons[self.selected_lesson];
        for (i, name) in inputs.into_iter().enumerate() {
            lesson.set_input_name(i, name)?;
        }
        for (i, name) in outputs.into_iter().enumerate() {
            lesson.set_output_name(i, name)?;
        }
        Ok(())
    }

    /// Renames the net's input/output neurons from the lesson's column names.
    /// Widths must already match.
    pub fn lesson_names_to_net(&mut self) -> Result<()> {
        let net_id = self
            .selected_net
            .ok_or_else(|| EngineError::state("no net selected"))?;
        let lesson = &self.lessons[self.selected_lesson];
        let inputs: Vec<String> = lesson.input_names().to_vec();
        let outputs: Vec<String> = lesson.output_names().to_vec();
        let net = self.nets[net_id]
            .as_mut()
            .ok_or_else(|| EngineError::state("no net selected"))?;
        if inputs.len() != net.input_count() || outputs.len() != net.output_count() {
            return Err(EngineError::state("lesson widths do not match the net"));
        }
        for (i, name) in inputs.into_iter().enumerate() {
            let id = net.input_id(i)?;
            net.neuron_mut(id)?.name = name;
        }
        for (i, name) in outputs.into_iter().enumerate() {
            let id = net.output_id(i)?;
            net.neuron_mut(id)?.name = name;
        }
        Ok(())
    }

    pub fn csv_separators(&self) -> CsvSeparators {
        self.csv_separators
    }

    pub fn set_csv_separators(&mut self, seps: CsvSeparators) -> Result<()> {
        seps.validate()?;
        self.csv_separators = seps;
        Ok(())
    }

    // ── Teachers ────────────────────────────────────────────────────────────

    pub fn load_teachers(&mut self, path: &str) -> Result<usize> {
        self.teachers = teacher::load_teacher_file(path)?;
        self.active_teacher = None;
        Ok(self.teachers.len())
    }

    pub fn save_teachers(&self, path: &str) -> Result<()> {
        teacher::save_teacher_file(path, &self.teachers)
    }

    pub fn add_teacher(&mut self, teacher: Teacher) -> Result<usize> {
        teacher.validate()?;
        self.teachers.push(teacher);
        Ok(self.teachers.len() - 1)
    }

    pub fn teacher_count(&self) -> usize {
        self.teachers.len()
    }

    pub fn teacher(&self, idx: usize) -> Result<&Teacher> {
        self.teachers
            .get(idx)
            .ok_or_else(|| EngineError::not_found(format!("no teacher {idx}")))
    }

    pub fn teacher_name(&self, idx: usize) -> Result<&str> {
        Ok(&self.teacher(idx)?.name)
    }

    /// Selects the active teacher by name. Rejected while a run is in
    /// progress; stop it first.
    pub fn select_teacher(&mut self, name: &str) -> Result<()> {
        if self.run.state() == TeachState::Training {
            return Err(EngineError::state(
                "cannot switch teachers while training is in progress",
            ));
        }
        let idx = self
            .teachers
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| EngineError::not_found(format!("no teacher named {name:?}")))?;
        self.active_teacher = Some(idx);
        Ok(())
    }

    pub fn active_teacher(&self) -> Option<&Teacher> {
        self.active_teacher.and_then(|i| self.teachers.get(i))
    }

    // ── Thinking ────────────────────────────────────────────────────────────

    pub fn think_step(&mut self) -> Result<()> {
        self.net_mut()?.think_step();
        Ok(())
    }

    /// Applies the selected lesson pattern's inputs to the selected net.
    pub fn apply_pattern(&mut self) -> Result<()> {
        let idx = self.selected_lesson;
        let net_id = self
            .selected_net
            .ok_or_else(|| EngineError::state("no net selected"))?;
        let lesson = &self.lessons[idx];
        if lesson.input_count() != self.nets[net_id].as_ref().map_or(0, |n| n.input_count()) {
            return Err(EngineError::state(
                "lesson input count does not match the net",
            ));
        }
        let pattern = lesson.pattern(lesson.selected_pattern())?;
        let inputs = pattern.inputs.clone();
        let net = self.net_mut()?;
        for (i, value) in inputs.into_iter().enumerate() {
            net.apply_input_act(i, value)?;
        }
        Ok(())
    }

    /// Runs one think step per lesson pattern, recording the outputs of each
    /// pass and the mean squared error against the lesson's output data.
    pub fn think_lesson(&mut self) -> Result<ThinkLessonResult> {
        let idx = self.selected_lesson;
        let net_id = self
            .selected_net
            .ok_or_else(|| EngineError::state("no net selected"))?;
        let net = self.nets[net_id]
            .as_mut()
            .ok_or_else(|| EngineError::state("no net selected"))?;
        let lesson = &self.lessons[idx];

        let mut outputs = Vec::with_capacity(lesson.pattern_count());
        let mut total = 0.0;
        for pattern in lesson.patterns() {
            for (i, &value) in pattern.inputs.iter().enumerate() {
                net.apply_input_act(i, value)?;
            }
            net.think_step();
            let mut outs = Vec::with_capacity(net.output_count());
            for k in 0..net.output_count() {
                outs.push(net.output_out(k)?);
            }
            for (out, expected) in outs.iter().zip(pattern.outputs.iter()) {
                let err = out - expected;
                total += err * err;
            }
            outputs.push(outs);
        }
        let net_error = if outputs.is_empty() { 0.0 } else { total / outputs.len() as f64 };
        Ok(ThinkLessonResult { outputs, net_error })
    }

    // ── Training ────────────────────────────────────────────────────────────

    /// Randomizes the selected net's unlocked weights and thresholds.
    pub fn randomize_net(&mut self) -> Result<()> {
        let id = self
            .selected_net
            .ok_or_else(|| EngineError::state("no net selected"))?;
        let net = self.nets[id]
            .as_mut()
            .ok_or_else(|| EngineError::state("no net selected"))?;
        self.run.enter_randomizing();
        net.randomize(&mut self.rng);
        self.run.stop();
        Ok(())
    }

    /// Runs one teach step with the active teacher on the selected net and
    /// lesson. Training problems come back as a `TeachResult` code; only
    /// missing selections and I/O are `Err`.
    pub fn teach_step(&mut self) -> Result<TeachResult> {
        let net_id = self
            .selected_net
            .ok_or_else(|| EngineError::state("no net selected"))?;
        let teacher = self
            .active_teacher()
            .ok_or_else(|| EngineError::state("no teacher selected"))?
            .clone();
        let selected = self.selected_lesson;
        let net = self.nets[net_id]
            .as_mut()
            .ok_or_else(|| EngineError::state("no net selected"))?;
        let lesson = &self.lessons[selected];
        let err_lesson = self
            .net_error_lesson
            .filter(|&i| i != selected)
            .map(|i| &self.lessons[i]);
        trainer::teach_step(net, lesson, err_lesson, &teacher, &mut self.run)
    }

    /// Ends the current run. Legal in any state and idempotent.
    pub fn stop_teaching(&mut self) {
        self.run.stop();
    }

    pub fn teach_state(&self) -> TeachState {
        self.run.state()
    }

    pub fn teach_steps_done(&self) -> usize {
        self.run.steps_done()
    }

    pub fn request_teach_abort(&mut self) {
        self.run.request_abort();
    }

    /// Net error measured by the most recent teach step.
    pub fn last_net_error(&self) -> f64 {
        self.run.last_net_error()
    }

    /// Uniform random value in `[0, 1)` from the session's generator.
    pub fn random(&mut self) -> f64 {
        use rand::Rng;
        self.rng.gen::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;

    fn wired_session() -> Session {
        let mut session = Session::with_seed(7);
        session.new_net();
        let net = session.net_mut().unwrap();
        let i = net.add_input("in");
        let o = net.add_output("out");
        net.add_link(i, o).unwrap();
        for n in net.neurons.iter_mut().flatten() {
            n.props.act_func = ActivationFunction::Identity;
        }
        let lesson = session.lesson_mut();
        lesson.set_input_count(1).unwrap();
        lesson.set_output_count(1).unwrap();
        lesson.add_pattern();
        lesson.set_pattern_input(0, 1.0).unwrap();
        lesson.set_pattern_output(0, 1.0).unwrap();
        session
    }

    #[test]
    fn net_slots_are_reused_lowest_first() {
        let mut session = Session::with_seed(1);
        let a = session.new_net();
        let b = session.new_net();
        let c = session.new_net();
        assert_eq!((a, b, c), (0, 1, 2));
        session.close_net(b).unwrap();
        assert_eq!(session.new_net(), 1);
        assert_eq!(session.net_count(), 3);
    }

    #[test]
    fn closing_selected_net_deselects() {
        let mut session = Session::with_seed(1);
        let id = session.new_net();
        session.close_net(id).unwrap();
        assert_eq!(session.selected_net(), None);
        assert!(matches!(session.net(), Err(EngineError::State(_))));
        assert!(matches!(session.close_net(id), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn lesson_list_never_empty() {
        let mut session = Session::with_seed(1);
        assert_eq!(session.lesson_count(), 1);
        assert!(session.set_lesson_count(0).is_err());
        session.set_lesson_count(3).unwrap();
        session.select_lesson(2).unwrap();
        session.set_net_error_lesson(Some(1)).unwrap();
        session.set_lesson_count(1).unwrap();
        assert_eq!(session.selected_lesson(), 0);
        assert_eq!(session.net_error_lesson(), None);
    }

    #[test]
    fn teacher_selection_by_name() {
        let mut session = Session::with_seed(1);
        session.add_teacher(Teacher::new("slow", 0.1, 1e-3)).unwrap();
        session.add_teacher(Teacher::new("fast", 0.9, 1e-3)).unwrap();
        session.select_teacher("fast").unwrap();
        assert_eq!(session.active_teacher().unwrap().learning_rate, 0.9);
        assert!(matches!(
            session.select_teacher("missing"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn teach_step_trains_selected_net() {
        let mut session = wired_session();
        session.add_teacher(Teacher::new("t", 0.5, 1e-9)).unwrap();
        session.select_teacher("t").unwrap();
        let before = session.think_lesson().unwrap().net_error;
        assert_eq!(session.teach_step().unwrap(), TeachResult::Ok);
        let after = session.think_lesson().unwrap().net_error;
        assert!(after < before);
        assert_eq!(session.teach_state(), TeachState::Training);
        session.stop_teaching();
        assert_eq!(session.teach_state(), TeachState::Idle);
        session.stop_teaching();
        assert_eq!(session.teach_state(), TeachState::Idle);
    }

    #[test]
    fn apply_pattern_checks_widths() {
        let mut session = wired_session();
        session.apply_pattern().unwrap();
        assert_eq!(session.net().unwrap().input_act(0).unwrap(), 1.0);
        session.lesson_mut().clear_patterns();
        session.lesson_mut().set_input_count(3).unwrap();
        session.lesson_mut().add_pattern();
        assert!(matches!(session.apply_pattern(), Err(EngineError::State(_))));
    }

    #[test]
    fn think_lesson_records_outputs_per_pattern() {
        let mut session = wired_session();
        session.net_mut().unwrap().links[0].props.weight = 0.5;
        let lesson = session.lesson_mut();
        lesson.add_pattern();
        lesson.set_pattern_input(0, 2.0).unwrap();

        let result = session.think_lesson().unwrap();
        assert_eq!(result.outputs, vec![vec![0.5], vec![1.0]]);
        // ((0.5 - 1)^2 + (1 - 0)^2) / 2
        assert_eq!(result.net_error, 0.625);
    }

    #[test]
    fn names_move_between_net_and_lesson() {
        let mut session = wired_session();
        session.lesson_names_from_net().unwrap();
        assert_eq!(session.lesson().input_name(0).unwrap(), "in");
        assert_eq!(session.lesson().output_name(0).unwrap(), "out");

        session.lesson_mut().set_input_name(0, "renamed").unwrap();
        session.lesson_names_to_net().unwrap();
        assert_eq!(session.net().unwrap().input_name(0).unwrap(), "renamed");
    }

    #[test]
    fn clear_resets_everything() {
        let mut session = wired_session();
        session.add_teacher(Teacher::new("t", 0.5, 1e-3)).unwrap();
        session.set_lesson_count(4).unwrap();
        session.clear();
        assert_eq!(session.net_count(), 0);
        assert_eq!(session.lesson_count(), 1);
        assert_eq!(session.teacher_count(), 0);
        assert_eq!(session.teach_state(), TeachState::Idle);
    }

    #[test]
    fn randomize_changes_weights_deterministically() {
        let mut a = wired_session();
        let mut b = wired_session();
        a.randomize_net().unwrap();
        b.randomize_net().unwrap();
        let wa = a.net().unwrap().links()[0].props.weight;
        let wb = b.net().unwrap().links()[0].props.weight;
        assert_eq!(wa, wb);
        assert!((-0.5..0.5).contains(&wa));
        assert_eq!(a.teach_state(), TeachState::Idle);
    }
}
