pub mod task;
pub mod user;

pub use task::{Task, TaskInput, UNASSIGNED};
pub use user::{User, UserInput};
