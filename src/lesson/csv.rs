//! Delimited-text import/export for lessons.
//!
//! Format:
//! - UTF-8, one pattern per line, fields joined by the configured list
//!   separator (default `,`)
//! - Decimal separator is configurable (default `.`); values are converted
//!   on the way in and out
//! - Double-quoted fields with embedded separators are handled on import
//! - "Full" files carry a header row with the column names; "raw" files are
//!   numbers only

use std::fs;

use crate::error::{EngineError, Result};
use crate::lesson::lesson::Lesson;
use crate::lesson::pattern::Pattern;

/// Field and decimal separators used by the text importers/exporters.
/// Defaults are locale-independent: `,` and `.`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvSeparators {
    pub list_separator: char,
    pub decimal_separator: char,
}

impl Default for CsvSeparators {
    fn default() -> Self {
        CsvSeparators { list_separator: ',', decimal_separator: '.' }
    }
}

impl CsvSeparators {
    pub fn validate(&self) -> Result<()> {
        if self.list_separator == self.decimal_separator {
            return Err(EngineError::validation(
                "list separator and decimal separator must differ",
            ));
        }
        Ok(())
    }
}

/// Which columns of the lesson an export/import covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvSection {
    /// Inputs followed by outputs (outputs only when the lesson's output
    /// data section is enabled).
    Full,
    InputsOnly,
    OutputsOnly,
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Writes the lesson as delimited text. `max_cols` of 0 exports the full
/// width; a positive value caps the number of columns per row.
pub fn export_lesson(
    lesson: &Lesson,
    path: &str,
    max_cols: usize,
    with_header: bool,
    section: CsvSection,
    seps: CsvSeparators,
) -> Result<()> {
    seps.validate()?;
    let mut out = String::new();

    if with_header {
        let names: Vec<&str> = match section {
            CsvSection::Full => {
                let mut names: Vec<&str> =
                    lesson.input_names().iter().map(String::as_str).collect();
                if lesson.output_data_enabled() {
                    names.extend(lesson.output_names().iter().map(String::as_str));
                }
                names
            }
            CsvSection::InputsOnly => {
                lesson.input_names().iter().map(String::as_str).collect()
            }
            CsvSection::OutputsOnly => {
                lesson.output_names().iter().map(String::as_str).collect()
            }
        };
        out.push_str(&join_row(
            names.iter().map(|n| quote_field(n, seps.list_separator)),
            max_cols,
            seps.list_separator,
        ));
        out.push('\n');
    }

    for pattern in lesson.patterns() {
        let values: Vec<f64> = match section {
            CsvSection::Full => {
                let mut v = pattern.inputs.clone();
                if lesson.output_data_enabled() {
                    v.extend_from_slice(&pattern.outputs);
                }
                v
            }
            CsvSection::InputsOnly => pattern.inputs.clone(),
            CsvSection::OutputsOnly => pattern.outputs.clone(),
        };
        out.push_str(&join_row(
            values.iter().map(|v| format_value(*v, seps.decimal_separator)),
            max_cols,
            seps.list_separator,
        ));
        out.push('\n');
    }

    fs::write(path, out)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Reads delimited text into the lesson.
///
/// The lesson's declared widths drive the parse: `Full` rows must carry
/// `input_count + output_count` fields (input count only when the output
/// section is disabled), `InputsOnly`/`OutputsOnly` rows the respective
/// width. A header row, when present, renames the columns.
/// `OutputsOnly` keeps the existing patterns and overwrites their outputs;
/// the other sections replace the pattern set.
pub fn import_lesson(
    lesson: &mut Lesson,
    path: &str,
    with_header: bool,
    section: CsvSection,
    seps: CsvSeparators,
) -> Result<()> {
    seps.validate()?;
    let text = fs::read_to_string(path)?;

    let in_w = lesson.input_count();
    let out_w = if lesson.output_data_enabled() { lesson.output_count() } else { 0 };
    let expected = match section {
        CsvSection::Full => in_w + out_w,
        CsvSection::InputsOnly => in_w,
        CsvSection::OutputsOnly => lesson.output_count(),
    };
    if expected == 0 {
        return Err(EngineError::state(
            "lesson widths must be declared before importing",
        ));
    }

    let mut lines = text.lines();
    let mut header: Option<Vec<String>> = None;
    if with_header {
        let line = lines
            .next()
            .ok_or_else(|| EngineError::validation("file has no header row"))?;
        let cells = split_row(line, seps.list_separator);
        if cells.len() != expected {
            return Err(EngineError::validation(format!(
                "header has {} columns, lesson expects {expected}",
                cells.len()
            )));
        }
        header = Some(cells);
    }

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (row_idx, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let cells = split_row(line, seps.list_separator);
        if cells.len() != expected {
            return Err(EngineError::validation(format!(
                "row {}: expected {expected} columns, got {}",
                row_idx + 1,
                cells.len()
            )));
        }
        let values = cells
            .iter()
            .map(|c| parse_value(c, seps.decimal_separator, row_idx + 1))
            .collect::<Result<Vec<f64>>>()?;
        rows.push(values);
    }

    match section {
        CsvSection::Full => {
            let patterns = rows
                .into_iter()
                .map(|row| {
                    let (ins, outs) = row.split_at(in_w);
                    let mut outputs = outs.to_vec();
                    outputs.resize(lesson.output_count(), 0.0);
                    Pattern { inputs: ins.to_vec(), outputs }
                })
                .collect();
            lesson.replace_patterns(patterns)?;
        }
        CsvSection::InputsOnly => {
            let out_count = lesson.output_count();
            let patterns = rows
                .into_iter()
                .map(|inputs| Pattern { inputs, outputs: vec![0.0; out_count] })
                .collect();
            lesson.replace_patterns(patterns)?;
        }
        CsvSection::OutputsOnly => {
            if rows.len() != lesson.pattern_count() {
                return Err(EngineError::validation(format!(
                    "output rows ({}) do not match pattern count ({})",
                    rows.len(),
                    lesson.pattern_count()
                )));
            }
            let mut patterns = lesson.patterns().to_vec();
            for (p, outputs) in patterns.iter_mut().zip(rows) {
                p.outputs = outputs;
            }
            lesson.replace_patterns(patterns)?;
        }
    }

    if let Some(names) = header {
        match section {
            CsvSection::Full => {
                for (i, name) in names.iter().take(in_w).enumerate() {
                    lesson.set_input_name(i, name.clone())?;
                }
                for (i, name) in names.iter().skip(in_w).enumerate() {
                    lesson.set_output_name(i, name.clone())?;
                }
            }
            CsvSection::InputsOnly => {
                for (i, name) in names.iter().enumerate() {
                    lesson.set_input_name(i, name.clone())?;
                }
            }
            CsvSection::OutputsOnly => {
                for (i, name) in names.iter().enumerate() {
                    lesson.set_output_name(i, name.clone())?;
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn join_row<I: Iterator<Item = String>>(fields: I, max_cols: usize, sep: char) -> String {
    let fields: Vec<String> = if max_cols == 0 {
        fields.collect()
    } else {
        fields.take(max_cols).collect()
    };
    fields.join(&sep.to_string())
}

fn quote_field(field: &str, sep: char) -> String {
    if field.contains(sep) || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_value(value: f64, dec_sep: char) -> String {
    let s = value.to_string();
    if dec_sep != '.' {
        s.replace('.', &dec_sep.to_string())
    } else {
        s
    }
}

fn parse_value(cell: &str, dec_sep: char, row_num: usize) -> Result<f64> {
    let normalized = if dec_sep != '.' {
        cell.trim().replace(dec_sep, ".")
    } else {
        cell.trim().to_string()
    };
    normalized.parse::<f64>().map_err(|_| {
        EngineError::validation(format!("row {row_num}: '{cell}' is not a valid number"))
    })
}

/// Splits a single row, honouring double-quoted fields.
pub fn split_row(line: &str, sep: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '"' => {
                if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                    // Escaped quote inside a quoted field.
                    current.push('"');
                    i += 2;
                    continue;
                }
                in_quotes = !in_quotes;
            }
            c if c == sep && !in_quotes => {
                fields.push(current.clone());
                current.clear();
            }
            c => current.push(c),
        }
        i += 1;
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lesson() -> Lesson {
        let mut lesson = Lesson::new();
        lesson.set_input_count(2).unwrap();
        lesson.set_output_count(1).unwrap();
        lesson.add_pattern();
        lesson.set_pattern_input(0, 0.5).unwrap();
        lesson.set_pattern_input(1, 1.25).unwrap();
        lesson.set_pattern_output(0, 1.0).unwrap();
        lesson
    }

    #[test]
    fn split_row_handles_quotes() {
        let cells = split_row("\"a,b\",2,\"say \"\"hi\"\"\"", ',');
        assert_eq!(cells, vec!["a,b", "2", "say \"hi\""]);
    }

    #[test]
    fn identical_separators_rejected() {
        let lesson = sample_lesson();
        let seps = CsvSeparators { list_separator: ',', decimal_separator: ',' };
        let err = export_lesson(&lesson, "/dev/null", 0, true, CsvSection::Full, seps);
        assert!(matches!(err, Err(EngineError::Validation(_))));
    }

    #[test]
    fn decimal_separator_applied_both_ways() {
        assert_eq!(format_value(1.25, ','), "1,25");
        assert_eq!(parse_value("1,25", ',', 1).unwrap(), 1.25);
        assert!(parse_value("abc", ',', 3).is_err());
    }

    #[test]
    fn full_round_trip_with_separators() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lesson.csv");
        let path = path.to_str().unwrap();
        let seps = CsvSeparators { list_separator: ';', decimal_separator: ',' };

        let lesson = sample_lesson();
        export_lesson(&lesson, path, 0, true, CsvSection::Full, seps).unwrap();

        let mut restored = Lesson::new();
        restored.set_input_count(2).unwrap();
        restored.set_output_count(1).unwrap();
        import_lesson(&mut restored, path, true, CsvSection::Full, seps).unwrap();

        assert_eq!(restored.pattern_count(), 1);
        assert_eq!(restored.patterns()[0], lesson.patterns()[0]);
        assert_eq!(restored.input_name(1).unwrap(), "In2");
    }

    #[test]
    fn raw_export_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let path = path.to_str().unwrap();
        let lesson = sample_lesson();
        export_lesson(&lesson, path, 0, false, CsvSection::Full, CsvSeparators::default())
            .unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "0.5,1.25,1\n");
    }

    #[test]
    fn max_cols_caps_row_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capped.csv");
        let path = path.to_str().unwrap();
        let lesson = sample_lesson();
        export_lesson(&lesson, path, 2, false, CsvSection::Full, CsvSeparators::default())
            .unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "0.5,1.25\n");
    }

    #[test]
    fn outputs_only_import_overwrites_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outs.csv");
        let path = path.to_str().unwrap();
        std::fs::write(path, "0.75\n").unwrap();

        let mut lesson = sample_lesson();
        import_lesson(&mut lesson, path, false, CsvSection::OutputsOnly, CsvSeparators::default())
            .unwrap();
        assert_eq!(lesson.patterns()[0].outputs, vec![0.75]);
        assert_eq!(lesson.patterns()[0].inputs, vec![0.5, 1.25]);
    }

    #[test]
    fn width_mismatch_reported_with_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        let path = path.to_str().unwrap();
        std::fs::write(path, "1,2,3\n1,2\n").unwrap();

        let mut lesson = sample_lesson();
        let err = import_lesson(&mut lesson, path, false, CsvSection::Full, CsvSeparators::default());
        match err {
            Err(EngineError::Validation(msg)) => assert!(msg.contains("row 2")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
