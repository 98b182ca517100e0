//! Per-sender conversational memory and its persistence.

pub mod model;
pub mod snapshot;
pub mod store;

pub use model::{ConversationRecord, Role, SenderId, Turn};
pub use snapshot::{SnapshotFile, SnapshotTrigger, SnapshotWorker};
pub use store::{ConversationStore, ConversationSummary, Snapshot};
