pub mod locate;
pub mod schema;
pub mod session;

pub use locate::{SessionSnapshot, TranscriptLocator};
pub use schema::{Event, EventData};
pub use session::{SessionEvents, ToolCall};
