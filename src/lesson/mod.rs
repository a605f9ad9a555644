pub mod csv;
pub mod lesson;
pub mod pattern;

pub use csv::{CsvSection, CsvSeparators};
pub use lesson::Lesson;
pub use pattern::Pattern;
