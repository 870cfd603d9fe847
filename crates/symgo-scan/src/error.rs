//! Scanner-facing error types.

use std::fmt;

use crate::position::{Pos, Position};

/// Internal lex/parse failure, positioned in file-set offsets.
///
/// Converted into a [`ScanError`] (with the position resolved to
/// `file:line:col`) at the scanner boundary.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyntaxError {
    pub message: String,
    pub pos: Pos,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, pos: Pos) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            pos,
        }
    }
}

/// Error surfaced by [`Scanner::scan`](crate::Scanner::scan) and by
/// implementations of [`PackageResolver`](crate::PackageResolver).
#[derive(Debug, Clone, PartialEq)]
pub enum ScanError {
    /// The import path names no package known to the source set.
    UnknownPackage { path: String },
    /// A file of the package failed to lex or parse.
    Syntax {
        message: String,
        location: Option<Position>,
    },
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::UnknownPackage { path } => write!(f, "unknown package {path:?}"),
            ScanError::Syntax { message, location } => match location {
                Some(loc) => write!(f, "{loc}: {message}"),
                None => write!(f, "{message}"),
            },
        }
    }
}

impl std::error::Error for ScanError {}
