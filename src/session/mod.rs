//! Runtime session integration

pub mod hook;
pub mod state;

pub use hook::{check_and_submit, SessionHook, SessionStart};
pub use state::SessionRecord;
