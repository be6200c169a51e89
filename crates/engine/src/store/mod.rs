// Persistence: durable key-value medium, snapshot history, quota recovery.

pub mod medium;
pub mod recovery;
pub mod snapshots;

pub use medium::{DurableMedium, MediumError, MemoryMedium, SqliteMedium};
pub use snapshots::SnapshotStore;
