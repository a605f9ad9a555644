use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// On-disk format revision written into every saved teacher file.
pub const TEACHER_FORMAT_VERSION: u32 = 1;

fn default_format() -> u32 {
    TEACHER_FORMAT_VERSION
}

/// A named binding of training hyperparameters. The lesson a teacher trains
/// on is whatever lesson the session has selected when the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub name: String,
    pub learning_rate: f64,
    /// Training stops with `TargetNetErrorReached` once the aggregate net
    /// error falls to this value or below.
    pub target_net_error: f64,
    /// Step budget enforced by the engine; 0 leaves the budget entirely to
    /// the caller's loop.
    #[serde(default)]
    pub max_teach_steps: usize,
}

impl Teacher {
    pub fn new(name: impl Into<String>, learning_rate: f64, target_net_error: f64) -> Teacher {
        Teacher {
            name: name.into(),
            learning_rate,
            target_net_error,
            max_teach_steps: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(EngineError::validation("teacher name must not be empty"));
        }
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return Err(EngineError::validation(format!(
                "learning rate {} must be positive and finite",
                self.learning_rate
            )));
        }
        if self.target_net_error < 0.0 {
            return Err(EngineError::validation(format!(
                "target net error {} must not be negative",
                self.target_net_error
            )));
        }
        Ok(())
    }
}

/// Result code of one teach step.
///
/// `Ok` means the step completed and training may continue; every other
/// code either finishes the run or names the precondition that failed.
/// Training errors are step results, never fatal to the session: the caller
/// decides whether to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeachResult {
    /// Step completed, target not yet reached.
    Ok,
    /// The target net error has been reached; the run is finished.
    TargetNetErrorReached,
    /// Reserved: this engine's teachers never grow the net.
    MaxNeuronsAdded,
    /// The run was aborted (stop requested, or the teacher's step budget
    /// is exhausted).
    Aborted,
    /// Lesson input/output widths do not match the net's.
    NotInSync,
    /// A neuron's activation function has no derivative usable for
    /// backpropagation.
    IncompatibleActivation,
    /// The lesson's selected pattern lies outside the lesson.
    OutOfLessonRange,
    /// The net contains unresolved neurons and cannot be trained.
    ArchitectureError,
    /// The selected lesson has no patterns.
    LessonEmpty,
    /// The designated net-error lesson has no patterns.
    NetErrorLessonEmpty,
    /// The designated net-error lesson does not match the net's widths.
    NetErrorNotInSync,
}

impl TeachResult {
    /// Whether the run can continue with another step.
    pub fn can_continue(&self) -> bool {
        matches!(self, TeachResult::Ok)
    }
}

/// Serialized collection of teachers.
#[derive(Debug, Serialize, Deserialize)]
struct TeacherFile {
    #[serde(default = "default_format")]
    format: u32,
    teachers: Vec<Teacher>,
}

/// Loads a teacher file (JSON list of named teachers).
pub fn load_teacher_file(path: &str) -> Result<Vec<Teacher>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let parsed: TeacherFile = serde_json::from_reader(reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    if parsed.format > TEACHER_FORMAT_VERSION {
        return Err(EngineError::validation(format!(
            "unsupported teacher format {} (this build reads up to {})",
            parsed.format, TEACHER_FORMAT_VERSION
        )));
    }
    for teacher in &parsed.teachers {
        teacher.validate()?;
    }
    Ok(parsed.teachers)
}

/// Saves teachers as a pretty-printed JSON file.
pub fn save_teacher_file(path: &str, teachers: &[Teacher]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    let out = TeacherFile { format: TEACHER_FORMAT_VERSION, teachers: teachers.to_vec() };
    serde_json::to_writer_pretty(writer, &out)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyperparameters_validated() {
        assert!(Teacher::new("t", 0.5, 1e-3).validate().is_ok());
        assert!(Teacher::new("", 0.5, 1e-3).validate().is_err());
        assert!(Teacher::new("t", 0.0, 1e-3).validate().is_err());
        assert!(Teacher::new("t", 0.5, -1.0).validate().is_err());
    }

    #[test]
    fn teacher_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teachers.json");
        let path = path.to_str().unwrap();
        let teachers = vec![
            Teacher::new("XOR Teacher", 0.5, 1e-3),
            Teacher { max_teach_steps: 500, ..Teacher::new("Capped", 0.1, 1e-4) },
        ];
        save_teacher_file(path, &teachers).unwrap();
        let restored = load_teacher_file(path).unwrap();
        assert_eq!(restored, teachers);
    }

    #[test]
    fn only_ok_continues() {
        assert!(TeachResult::Ok.can_continue());
        assert!(!TeachResult::TargetNetErrorReached.can_continue());
        assert!(!TeachResult::NotInSync.can_continue());
    }
}
