// Conflict-free replicated project state.

pub mod doc;

pub use doc::ProjectDoc;
