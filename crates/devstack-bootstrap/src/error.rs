//! Error types for script assembly
//!
//! Every error aborts the whole assembly run. No partial script is ever
//! returned alongside an error.

use std::path::{Path, PathBuf};

/// Errors raised while assembling or unpacking a bootstrap script
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// Template path does not resolve to a readable file
    #[error("template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    /// Source directory does not exist or is not a directory
    #[error("source directory not found: {}", .0.display())]
    SourceDirNotFound(PathBuf),

    /// Placeholder token does not appear in the template
    #[error("placeholder '{token}' not found in template")]
    PlaceholderNotFound {
        /// Configured placeholder
        token: String,
    },

    /// Placeholder token appears more than once in the template
    #[error("placeholder '{token}' appears {count} times in template, expected exactly once")]
    PlaceholderAmbiguous {
        /// Configured placeholder
        token: String,
        /// Occurrences found
        count: usize,
    },

    /// A source payload contains the placeholder token itself
    #[error("source file '{file}' contains the placeholder '{token}'")]
    PlaceholderInSource {
        /// Offending source file
        file: String,
        /// Configured placeholder
        token: String,
    },

    /// Placeholder token survives substitution because it overlaps the
    /// heredoc wrapper text
    #[error("placeholder '{token}' remains in the assembled script (delimiter '{delimiter}')")]
    PlaceholderInOutput {
        /// Configured placeholder
        token: String,
        /// Configured delimiter
        delimiter: String,
    },

    /// A source payload contains a line equal to the wrapper delimiter
    #[error("source file '{file}' contains the delimiter '{delimiter}' at line {line}")]
    DelimiterCollision {
        /// Offending source file
        file: String,
        /// Configured delimiter
        delimiter: String,
        /// 1-based line number of the collision
        line: usize,
    },

    /// File name cannot be embedded safely in a quoted shell word
    #[error("unsafe file name for embedding: {name:?}")]
    UnsafeFileName {
        /// Rejected name
        name: String,
    },

    /// Source payload is not UTF-8 text
    #[error("source file '{file}' is not valid UTF-8 text")]
    NonUtf8Source {
        /// Offending source file
        file: String,
    },

    /// Delimiter is empty or contains whitespace or quotes
    #[error("invalid delimiter: {0:?}")]
    InvalidDelimiter(String),

    /// Placeholder token is empty
    #[error("placeholder token must not be empty")]
    EmptyPlaceholder,

    /// A wrapped unit in a script has no closing delimiter line
    #[error("wrapped unit for '{file}' is not terminated by '{delimiter}'")]
    UnterminatedUnit {
        /// File named by the begin line
        file: String,
        /// Delimiter that was expected
        delimiter: String,
    },

    /// Any other I/O failure
    #[error("io error on {}: {source}", .path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },
}

impl AssemblyError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map a template read failure, keeping `NotFound` distinct
    pub(crate) fn template_read(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::TemplateNotFound(path.to_path_buf()),
            _ => Self::io(path, source),
        }
    }

    /// Create unsafe file name error
    pub fn unsafe_file_name(name: impl Into<String>) -> Self {
        Self::UnsafeFileName { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_not_found_keeps_path() {
        let err = AssemblyError::template_read(
            Path::new("missing.sh.template"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(err, AssemblyError::TemplateNotFound(ref p) if p == Path::new("missing.sh.template")));
        assert_eq!(err.to_string(), "template not found: missing.sh.template");
    }

    #[test]
    fn other_template_failures_are_io() {
        let err = AssemblyError::template_read(
            Path::new("t"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, AssemblyError::Io { .. }));
    }
}
