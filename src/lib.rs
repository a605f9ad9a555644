pub mod math;
pub mod activation;
pub mod error;
pub mod topology;
pub mod engine;
pub mod lesson;
pub mod teach;
pub mod session;

// Convenience re-exports
pub use activation::activation::{ActivationFunction, InputFunction};
pub use error::{EngineError, Result};
pub use lesson::csv::{CsvSection, CsvSeparators};
pub use lesson::lesson::Lesson;
pub use session::session::{Session, ThinkLessonResult};
pub use teach::teacher::{TeachResult, Teacher};
pub use teach::trainer::TeachState;
pub use topology::link::LinkProps;
pub use topology::network::Network;
pub use topology::neuron::{FireLevel, LayerKind, NeuronProps};
