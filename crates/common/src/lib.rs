// palimpsest-common: shared types and utilities for the Palimpsest workspace

pub mod diff;
pub mod error;
pub mod path;
pub mod types;
