pub mod session;

pub use session::{NetId, Session, ThinkLessonResult};
