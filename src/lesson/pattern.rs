use serde::{Deserialize, Serialize};

/// One training pattern: an input vector and an expected output vector.
///
/// Vector lengths always equal the owning lesson's declared input/output
/// counts; the lesson enforces this on every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub inputs: Vec<f64>,
    pub outputs: Vec<f64>,
}

impl Pattern {
    pub fn zeroed(input_count: usize, output_count: usize) -> Pattern {
        Pattern {
            inputs: vec![0.0; input_count],
            outputs: vec![0.0; output_count],
        }
    }
}
