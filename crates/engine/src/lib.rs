// palimpsest-engine: local-first document versioning engine.

pub mod autosave;
pub mod config;
pub mod crdt;
pub mod documents;
pub mod project;
pub mod restore;
pub mod snapshot;
pub mod store;

pub use palimpsest_common as common;
pub use project::Project;
