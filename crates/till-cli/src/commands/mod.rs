pub mod common;
pub mod completions;
pub mod entity;
pub mod history;
pub mod session;
pub mod sync;
pub mod undo;
