// Project-relative path canonicalization for document keys.
//
// Every public engine entry point normalizes the caller's path before using
// it as a buffer key, so `./notes.tex`, `notes.tex`, and `notes.tex/` all
// address the same document.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Maximum allowed path length in characters (after normalization).
const MAX_PATH_CHARS: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path exceeds maximum length of {MAX_PATH_CHARS} characters")]
    TooLong,

    #[error("path contains directory traversal component: {0}")]
    Traversal(String),

    #[error("path contains null byte")]
    NullByte,

    #[error("path contains invalid component: {0}")]
    InvalidComponent(String),
}

/// Normalize a project-relative document path.
///
/// Rules:
/// - Apply Unicode NFKC normalization
/// - Convert all separators to `/`
/// - Collapse consecutive `/` into one
/// - Strip leading and trailing `/`
/// - Reject `..` traversal components; drop bare `.` components
/// - Reject null bytes, empty paths, and whitespace-only components
/// - Enforce the 512-character limit after normalization
pub fn normalize_path(input: &str) -> Result<String, PathError> {
    if input.is_empty() {
        return Err(PathError::Empty);
    }

    if input.contains('\0') {
        return Err(PathError::NullByte);
    }

    let normalized: String = input.nfkc().collect();
    let unified = normalized.replace('\\', "/");

    let mut components = Vec::new();
    for component in unified.split('/').filter(|s| !s.is_empty()) {
        if component == ".." {
            return Err(PathError::Traversal("..".to_string()));
        }
        if component == "." {
            continue;
        }
        if component.trim().is_empty() {
            return Err(PathError::InvalidComponent(
                "(whitespace-only component)".to_string(),
            ));
        }
        components.push(component);
    }

    if components.is_empty() {
        return Err(PathError::Empty);
    }

    let result = components.join("/");
    if result.chars().count() > MAX_PATH_CHARS {
        return Err(PathError::TooLong);
    }

    Ok(result)
}
