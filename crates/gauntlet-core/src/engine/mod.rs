pub mod fix;
pub mod improve;
pub mod rebuild;
pub mod runner;

pub use fix::{FixOutcome, FixStep};
pub use improve::{Controller, LoopConfig, LoopError, LoopOutcome, LoopResult, LoopState, Stage};
pub use rebuild::{CommandRebuilder, Rebuilder};
pub use runner::{Assistant, ProcessAssistant, SessionHandle};

/// Flag that puts the assistant in unattended mode.
pub const AUTO_APPROVE_FLAG: &str = "--allow-all-tools";
