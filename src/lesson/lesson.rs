use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::lesson::pattern::Pattern;

/// On-disk format revision written into every saved lesson file.
pub const LESSON_FORMAT_VERSION: u32 = 1;

fn default_format() -> u32 {
    LESSON_FORMAT_VERSION
}

/// An ordered sequence of training patterns with declared input and output
/// widths. Every pattern's vectors match the declared widths at all times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(default = "default_format")]
    format: u32,
    input_names: Vec<String>,
    output_names: Vec<String>,
    patterns: Vec<Pattern>,
    selected: usize,
    /// When false the lesson carries input data only (e.g. raw recordings);
    /// exports skip the output section.
    output_data_enabled: bool,
}

impl Default for Lesson {
    fn default() -> Self {
        Lesson::new()
    }
}

impl Lesson {
    pub fn new() -> Lesson {
        Lesson {
            format: LESSON_FORMAT_VERSION,
            input_names: Vec::new(),
            output_names: Vec::new(),
            patterns: Vec::new(),
            selected: 0,
            output_data_enabled: true,
        }
    }

    // ── Declared widths ─────────────────────────────────────────────────────

    pub fn input_count(&self) -> usize {
        self.input_names.len()
    }

    pub fn output_count(&self) -> usize {
        self.output_names.len()
    }

    /// Changing the width of a non-empty lesson would orphan its pattern
    /// data, so it is rejected; clear the patterns first.
    pub fn set_input_count(&mut self, count: usize) -> Result<()> {
        if !self.patterns.is_empty() && count != self.input_count() {
            return Err(EngineError::state(
                "cannot change input count of a non-empty lesson",
            ));
        }
        resize_names(&mut self.input_names, count, "In");
        Ok(())
    }

    pub fn set_output_count(&mut self, count: usize) -> Result<()> {
        if !self.patterns.is_empty() && count != self.output_count() {
            return Err(EngineError::state(
                "cannot change output count of a non-empty lesson",
            ));
        }
        resize_names(&mut self.output_names, count, "Out");
        Ok(())
    }

    pub fn input_name(&self, idx: usize) -> Result<&str> {
        self.input_names
            .get(idx)
            .map(String::as_str)
            .ok_or_else(|| EngineError::validation(format!("no lesson input {idx}")))
    }

    pub fn output_name(&self, idx: usize) -> Result<&str> {
        self.output_names
            .get(idx)
            .map(String::as_str)
            .ok_or_else(|| EngineError::validation(format!("no lesson output {idx}")))
    }

    pub fn set_input_name(&mut self, idx: usize, name: impl Into<String>) -> Result<()> {
        let slot = self
            .input_names
            .get_mut(idx)
            .ok_or_else(|| EngineError::validation(format!("no lesson input {idx}")))?;
        *slot = name.into();
        Ok(())
    }

    pub fn set_output_name(&mut self, idx: usize, name: impl Into<String>) -> Result<()> {
        let slot = self
            .output_names
            .get_mut(idx)
            .ok_or_else(|| EngineError::validation(format!("no lesson output {idx}")))?;
        *slot = name.into();
        Ok(())
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn output_data_enabled(&self) -> bool {
        self.output_data_enabled
    }

    pub fn enable_output_data(&mut self, enabled: bool) {
        self.output_data_enabled = enabled;
    }

    // ── Patterns ────────────────────────────────────────────────────────────

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Appends a zeroed pattern and selects it.
    pub fn add_pattern(&mut self) -> usize {
        self.patterns
            .push(Pattern::zeroed(self.input_count(), self.output_count()));
        self.selected = self.patterns.len() - 1;
        self.selected
    }

    /// Deletes the selected pattern; the selection moves to the previous
    /// pattern (or 0).
    pub fn delete_pattern(&mut self) -> Result<()> {
        if self.patterns.is_empty() {
            return Err(EngineError::state("lesson has no patterns to delete"));
        }
        self.patterns.remove(self.selected);
        self.selected = self.selected.min(self.patterns.len().saturating_sub(1));
        Ok(())
    }

    pub fn clear_patterns(&mut self) {
        self.patterns.clear();
        self.selected = 0;
    }

    pub fn select_pattern(&mut self, idx: usize) -> Result<()> {
        if idx >= self.patterns.len() {
            return Err(EngineError::validation(format!(
                "pattern index {idx} outside lesson of size {}",
                self.patterns.len()
            )));
        }
        self.selected = idx;
        Ok(())
    }

    pub fn selected_pattern(&self) -> usize {
        self.selected
    }

    pub fn pattern(&self, idx: usize) -> Result<&Pattern> {
        self.patterns
            .get(idx)
            .ok_or_else(|| EngineError::validation(format!("no pattern {idx}")))
    }

    fn current_mut(&mut self) -> Result<&mut Pattern> {
        let idx = self.selected;
        self.patterns
            .get_mut(idx)
            .ok_or_else(|| EngineError::state("lesson has no patterns"))
    }

    fn current(&self) -> Result<&Pattern> {
        self.patterns
            .get(self.selected)
            .ok_or_else(|| EngineError::state("lesson has no patterns"))
    }

    pub fn set_pattern_input(&mut self, idx: usize, value: f64) -> Result<()> {
        if idx >= self.input_count() {
            return Err(EngineError::validation(format!("no lesson input {idx}")));
        }
        self.current_mut()?.inputs[idx] = value;
        Ok(())
    }

    pub fn pattern_input(&self, idx: usize) -> Result<f64> {
        self.current()?
            .inputs
            .get(idx)
            .copied()
            .ok_or_else(|| EngineError::validation(format!("no lesson input {idx}")))
    }

    pub fn set_pattern_output(&mut self, idx: usize, value: f64) -> Result<()> {
        if idx >= self.output_count() {
            return Err(EngineError::validation(format!("no lesson output {idx}")));
        }
        self.current_mut()?.outputs[idx] = value;
        Ok(())
    }

    pub fn pattern_output(&self, idx: usize) -> Result<f64> {
        self.current()?
            .outputs
            .get(idx)
            .copied()
            .ok_or_else(|| EngineError::validation(format!("no lesson output {idx}")))
    }

    /// Replaces the whole pattern set. Used by the text importers; every row
    /// must already match the declared widths.
    pub(crate) fn replace_patterns(&mut self, patterns: Vec<Pattern>) -> Result<()> {
        for (i, p) in patterns.iter().enumerate() {
            if p.inputs.len() != self.input_count() || p.outputs.len() != self.output_count() {
                return Err(EngineError::validation(format!(
                    "pattern {i} does not match declared widths {}x{}",
                    self.input_count(),
                    self.output_count()
                )));
            }
        }
        self.patterns = patterns;
        self.selected = 0;
        Ok(())
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    /// Serializes the lesson to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        Ok(())
    }

    /// Deserializes a lesson from a JSON file previously written by
    /// `save_json`, re-checking the width invariant.
    pub fn load_json(path: &str) -> Result<Lesson> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let lesson: Lesson = serde_json::from_reader(reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if lesson.format > LESSON_FORMAT_VERSION {
            return Err(EngineError::validation(format!(
                "unsupported lesson format {} (this build reads up to {})",
                lesson.format, LESSON_FORMAT_VERSION
            )));
        }
        for (i, p) in lesson.patterns.iter().enumerate() {
            if p.inputs.len() != lesson.input_count()
                || p.outputs.len() != lesson.output_count()
            {
                return Err(EngineError::validation(format!(
                    "pattern {i} does not match declared widths"
                )));
            }
        }
        Ok(lesson)
    }
}

fn resize_names(names: &mut Vec<String>, count: usize, prefix: &str) {
    let old = names.len();
    names.truncate(count);
    for i in old..count {
        names.push(format!("{prefix}{}", i + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_lesson() -> Lesson {
        let mut lesson = Lesson::new();
        lesson.set_input_count(2).unwrap();
        lesson.set_output_count(1).unwrap();
        for (a, b, y) in [(0.0, 0.0, 0.0), (0.0, 1.0, 1.0), (1.0, 0.0, 1.0), (1.0, 1.0, 0.0)] {
            lesson.add_pattern();
            lesson.set_pattern_input(0, a).unwrap();
            lesson.set_pattern_input(1, b).unwrap();
            lesson.set_pattern_output(0, y).unwrap();
        }
        lesson
    }

    #[test]
    fn widths_locked_while_patterns_exist() {
        let mut lesson = xor_lesson();
        assert!(matches!(
            lesson.set_input_count(3),
            Err(EngineError::State(_))
        ));
        // Same width is a no-op, not an error.
        assert!(lesson.set_input_count(2).is_ok());
        lesson.clear_patterns();
        assert!(lesson.set_input_count(3).is_ok());
        assert_eq!(lesson.input_count(), 3);
    }

    #[test]
    fn add_pattern_selects_it() {
        let mut lesson = xor_lesson();
        assert_eq!(lesson.selected_pattern(), 3);
        lesson.select_pattern(1).unwrap();
        assert_eq!(lesson.pattern_input(1).unwrap(), 1.0);
        assert_eq!(lesson.pattern_output(0).unwrap(), 1.0);
    }

    #[test]
    fn delete_clamps_selection() {
        let mut lesson = xor_lesson();
        lesson.select_pattern(3).unwrap();
        lesson.delete_pattern().unwrap();
        assert_eq!(lesson.pattern_count(), 3);
        assert_eq!(lesson.selected_pattern(), 2);
    }

    #[test]
    fn out_of_range_value_access_rejected() {
        let mut lesson = xor_lesson();
        assert!(matches!(
            lesson.set_pattern_input(2, 1.0),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            lesson.select_pattern(4),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn default_column_names_are_numbered() {
        let lesson = xor_lesson();
        assert_eq!(lesson.input_name(0).unwrap(), "In1");
        assert_eq!(lesson.input_name(1).unwrap(), "In2");
        assert_eq!(lesson.output_name(0).unwrap(), "Out1");
    }
}
