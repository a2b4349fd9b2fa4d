//! Source payload discovery
//!
//! Enumerates the top level of a source directory, keeps the regular files
//! accepted by a [`SourceFilter`] and reads them as UTF-8 text. The result is
//! sorted by file name so assembled output does not depend on the order the
//! file system happens to list entries in.

use crate::error::AssemblyError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Extension selected when no filter is configured
pub const DEFAULT_EXTENSION: &str = "py";

/// Predicate deciding which directory entries become payloads
#[derive(Clone)]
pub enum SourceFilter {
    /// Accept every regular file
    Any,
    /// Accept files whose extension equals the value (no leading dot)
    Extension(String),
    /// Accept files for which the closure returns true
    Custom(Arc<dyn Fn(&Path) -> bool + Send + Sync>),
}

impl SourceFilter {
    /// Filter on a file extension; a leading dot is ignored
    #[inline]
    #[must_use]
    pub fn extension(ext: impl AsRef<str>) -> Self {
        Self::Extension(ext.as_ref().trim_start_matches('.').to_string())
    }

    /// Filter with an arbitrary path predicate
    #[must_use]
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Check whether a path is selected
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            Self::Any => true,
            Self::Extension(ext) => path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == ext),
            Self::Custom(predicate) => predicate(path),
        }
    }
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self::extension(DEFAULT_EXTENSION)
    }
}

impl fmt::Debug for SourceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Extension(ext) => f.debug_tuple("Extension").field(ext).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One source file selected for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    content: String,
}

impl SourceFile {
    /// Create a payload from a bare file name and its text
    ///
    /// # Errors
    /// Returns `UnsafeFileName` if the name cannot be quoted for the shell
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Result<Self, AssemblyError> {
        let name = name.into();
        validate_file_name(&name)?;
        Ok(Self {
            name,
            content: content.into(),
        })
    }

    /// File name (no directory component)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw file text
    #[inline]
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Reject names that would break out of a single-quoted shell word or
/// escape the working directory
pub(crate) fn validate_file_name(name: &str) -> Result<(), AssemblyError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| c == '\'' || c == '/' || c.is_control());
    if bad {
        return Err(AssemblyError::unsafe_file_name(name));
    }
    Ok(())
}

/// Collect the selected top-level files of `dir`, sorted by name
///
/// Subdirectories are never descended into.
///
/// # Errors
/// - `SourceDirNotFound` if `dir` is missing or not a directory
/// - `UnsafeFileName` for a selected entry whose name cannot be embedded
/// - `NonUtf8Source` for a selected file that is not UTF-8 text
/// - `Io` for any other read failure
pub fn collect_sources(dir: &Path, filter: &SourceFilter) -> Result<Vec<SourceFile>, AssemblyError> {
    if !dir.is_dir() {
        return Err(AssemblyError::SourceDirNotFound(dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| AssemblyError::io(dir, e))?;
    let mut files = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| AssemblyError::io(dir, e))?;
        let path = entry.path();

        if !filter.matches(&path) {
            continue;
        }

        let metadata = std::fs::metadata(&path).map_err(|e| AssemblyError::io(&path, e))?;
        if !metadata.is_file() {
            tracing::debug!(path = %path.display(), "skipping non-file entry");
            continue;
        }

        let name = entry
            .file_name()
            .into_string()
            .map_err(|raw| AssemblyError::unsafe_file_name(raw.to_string_lossy()))?;

        let bytes = std::fs::read(&path).map_err(|e| AssemblyError::io(&path, e))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| AssemblyError::NonUtf8Source { file: name.clone() })?;

        files.push(SourceFile::new(name, content)?);
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));

    tracing::debug!(
        dir = %dir.display(),
        count = files.len(),
        "collected source payloads"
    );

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn extension_filter_ignores_leading_dot() {
        let filter = SourceFilter::extension(".py");
        assert!(filter.matches(Path::new("src/app.py")));
        assert!(!filter.matches(Path::new("src/app.pyc")));
        assert!(!filter.matches(Path::new("src/README")));
    }

    #[test]
    fn custom_filter_is_applied() {
        let filter = SourceFilter::custom(|p| p.to_string_lossy().contains("auth"));
        assert!(filter.matches(Path::new("auth.py")));
        assert!(!filter.matches(Path::new("app.py")));
        assert_eq!(format!("{filter:?}"), "Custom(..)");
    }

    #[test]
    fn rejects_names_that_break_quoting() {
        assert!(validate_file_name("app.py").is_ok());
        assert!(validate_file_name("it's.py").is_err());
        assert!(validate_file_name("a\nb.py").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("").is_err());
    }

    #[test]
    fn collects_sorted_top_level_matches_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.py"), "print(2)").unwrap();
        fs::write(dir.path().join("a.py"), "print(1)").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();
        fs::create_dir(dir.path().join("pkg.py")).unwrap();
        fs::write(dir.path().join("pkg.py").join("inner.py"), "nested").unwrap();

        let files = collect_sources(dir.path(), &SourceFilter::default()).unwrap();
        let names: Vec<_> = files.iter().map(SourceFile::name).collect();
        assert_eq!(names, vec!["a.py", "b.py"]);
        assert_eq!(files[0].content(), "print(1)");
    }

    #[test]
    fn missing_dir_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            collect_sources(&missing, &SourceFilter::Any),
            Err(AssemblyError::SourceDirNotFound(_))
        ));
    }

    #[test]
    fn binary_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("blob.py"), [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            collect_sources(dir.path(), &SourceFilter::default()),
            Err(AssemblyError::NonUtf8Source { ref file }) if file == "blob.py"
        ));
    }
}
