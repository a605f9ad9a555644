pub mod teacher;
pub mod trainer;

pub use teacher::{load_teacher_file, save_teacher_file, TeachResult, Teacher};
pub use trainer::{measure_error, teach_step, TeachRun, TeachState};
