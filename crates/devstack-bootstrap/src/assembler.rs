//! Script assembly
//!
//! Reads the template, collects the payloads, wraps each one and substitutes
//! the joined units for the single placeholder token.

use crate::error::AssemblyError;
use crate::source::{collect_sources, SourceFile, SourceFilter};
use crate::unit::{validate_delimiter, wrap, DEFAULT_DELIMITER};
use std::path::Path;

/// Placeholder used when none is configured
pub const DEFAULT_PLACEHOLDER: &str = "%SOURCE_FILES%";

/// Separator between consecutive wrapped units (one blank line)
const UNIT_SEPARATOR: &str = "\n\n";

/// Output of a successful assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledScript {
    text: String,
    files: Vec<String>,
}

impl AssembledScript {
    /// Full script text
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume into the script text
    #[inline]
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }

    /// Names of the embedded files, in script order
    #[inline]
    #[must_use]
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Blake3 digest of the script text (hex)
    #[must_use]
    pub fn digest(&self) -> String {
        blake3::hash(self.text.as_bytes()).to_hex().to_string()
    }
}

/// Assembles first-boot scripts from a template and a source directory
///
/// The placeholder, delimiter and filter are fixed when the assembler is
/// built; they are not negotiated per call.
#[derive(Debug, Clone)]
pub struct ScriptAssembler {
    placeholder: String,
    delimiter: String,
    filter: SourceFilter,
}

impl ScriptAssembler {
    /// Assembler with the default placeholder, delimiter and `.py` filter
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            filter: SourceFilter::default(),
        }
    }

    /// With placeholder token
    #[inline]
    #[must_use]
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// With heredoc delimiter
    #[inline]
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// With source filter
    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: SourceFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Placeholder token
    #[inline]
    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Heredoc delimiter
    #[inline]
    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Read the template and sources from disk and assemble them
    ///
    /// # Errors
    /// - `TemplateNotFound` if the template path does not resolve
    /// - `SourceDirNotFound` if the source directory is missing
    /// - any error of [`ScriptAssembler::assemble_str`]
    pub fn assemble(
        &self,
        template_path: impl AsRef<Path>,
        source_dir: impl AsRef<Path>,
    ) -> Result<AssembledScript, AssemblyError> {
        let template_path = template_path.as_ref();
        let source_dir = source_dir.as_ref();

        let template = std::fs::read_to_string(template_path)
            .map_err(|e| AssemblyError::template_read(template_path, e))?;
        let sources = collect_sources(source_dir, &self.filter)?;

        let script = self.assemble_str(&template, &sources)?;
        let digest = script.digest();

        tracing::info!(
            template = %template_path.display(),
            source_dir = %source_dir.display(),
            files = script.files().len(),
            bytes = script.text().len(),
            digest = &digest[..16],
            "assembled bootstrap script"
        );

        Ok(script)
    }

    /// Assemble from an in-memory template and payloads, keeping their order
    ///
    /// # Errors
    /// - `InvalidDelimiter` / `EmptyPlaceholder` for a misconfigured assembler
    /// - `PlaceholderInSource` if a payload contains the token
    /// - `DelimiterCollision` if a payload contains the delimiter line
    /// - `PlaceholderNotFound` / `PlaceholderAmbiguous` unless the token
    ///   occurs exactly once in the template
    /// - `PlaceholderInOutput` if the token overlaps the wrapper text, e.g.
    ///   a placeholder equal to the delimiter
    pub fn assemble_str(
        &self,
        template: &str,
        sources: &[SourceFile],
    ) -> Result<AssembledScript, AssemblyError> {
        if self.placeholder.is_empty() {
            return Err(AssemblyError::EmptyPlaceholder);
        }
        validate_delimiter(&self.delimiter)?;

        let mut units = Vec::with_capacity(sources.len());
        for source in sources {
            if source.content().contains(&self.placeholder) {
                return Err(AssemblyError::PlaceholderInSource {
                    file: source.name().to_string(),
                    token: self.placeholder.clone(),
                });
            }
            units.push(wrap(source, &self.delimiter)?);
            tracing::debug!(file = source.name(), bytes = source.content().len(), "wrapped source file");
        }
        let joined = units.join(UNIT_SEPARATOR);

        let text = substitute(template, &self.placeholder, &joined)?;
        if text.contains(&self.placeholder) {
            return Err(AssemblyError::PlaceholderInOutput {
                token: self.placeholder.clone(),
                delimiter: self.delimiter.clone(),
            });
        }

        Ok(AssembledScript {
            text,
            files: sources.iter().map(|s| s.name().to_string()).collect(),
        })
    }
}

impl Default for ScriptAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace the single occurrence of `token` in `template`
fn substitute(template: &str, token: &str, replacement: &str) -> Result<String, AssemblyError> {
    match template.matches(token).count() {
        0 => Err(AssemblyError::PlaceholderNotFound {
            token: token.to_string(),
        }),
        1 => Ok(template.replacen(token, replacement, 1)),
        count => Err(AssemblyError::PlaceholderAmbiguous {
            token: token.to_string(),
            count,
        }),
    }
}

/// Assemble with the default placeholder and delimiter
///
/// # Errors
/// See [`ScriptAssembler::assemble`]
pub fn assemble(
    template_path: impl AsRef<Path>,
    source_dir: impl AsRef<Path>,
    filter: SourceFilter,
) -> Result<String, AssemblyError> {
    ScriptAssembler::new()
        .with_filter(filter)
        .assemble(template_path, source_dir)
        .map(AssembledScript::into_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sources(items: &[(&str, &str)]) -> Vec<SourceFile> {
        items
            .iter()
            .map(|(n, c)| SourceFile::new(*n, *c).unwrap())
            .collect()
    }

    #[test]
    fn substitutes_joined_units() {
        let assembler = ScriptAssembler::new().with_placeholder("%FILES%");
        let script = assembler
            .assemble_str(
                "echo start\n%FILES%\necho done",
                &sources(&[("a.py", "print(1)"), ("b.py", "print(2)")]),
            )
            .unwrap();

        assert_eq!(
            script.text(),
            "echo start\n\
             head -c -1 > 'a.py' << 'EOF'\nprint(1)\nEOF\n\
             \n\
             head -c -1 > 'b.py' << 'EOF'\nprint(2)\nEOF\n\
             echo done"
        );
        assert_eq!(script.files(), ["a.py", "b.py"]);
    }

    #[test]
    fn empty_source_set_removes_placeholder() {
        let script = ScriptAssembler::new()
            .assemble_str("before\n%SOURCE_FILES%\nafter", &[])
            .unwrap();
        assert_eq!(script.text(), "before\n\nafter");
        assert!(script.files().is_empty());
    }

    #[test]
    fn missing_placeholder() {
        let err = ScriptAssembler::new()
            .assemble_str("echo nothing", &[])
            .unwrap_err();
        assert!(matches!(err, AssemblyError::PlaceholderNotFound { .. }));
    }

    #[test]
    fn repeated_placeholder() {
        let err = ScriptAssembler::new()
            .assemble_str("%SOURCE_FILES%\n%SOURCE_FILES%", &[])
            .unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::PlaceholderAmbiguous { count: 2, .. }
        ));
    }

    #[test]
    fn payload_with_placeholder_is_rejected() {
        let err = ScriptAssembler::new()
            .assemble_str(
                "%SOURCE_FILES%",
                &sources(&[("gen.py", "TOKEN = '%SOURCE_FILES%'")]),
            )
            .unwrap_err();
        assert!(matches!(err, AssemblyError::PlaceholderInSource { .. }));
    }

    #[test]
    fn placeholder_overlapping_wrapper_is_rejected() {
        let files = sources(&[("a.py", "print(1)")]);

        let err = ScriptAssembler::new()
            .with_placeholder("EOF")
            .assemble_str("x\nEOF\ny", &files)
            .unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::PlaceholderInOutput { ref token, .. } if token == "EOF"
        ));

        let err = ScriptAssembler::new()
            .with_placeholder("head -c")
            .assemble_str("head -c", &files)
            .unwrap_err();
        assert!(matches!(err, AssemblyError::PlaceholderInOutput { .. }));

        // No units means no wrapper text to collide with
        let script = ScriptAssembler::new()
            .with_placeholder("EOF")
            .assemble_str("x\nEOF\ny", &[])
            .unwrap();
        assert_eq!(script.text(), "x\n\ny");
    }

    #[test]
    fn digest_is_stable() {
        let assembler = ScriptAssembler::new();
        let a = assembler.assemble_str("x %SOURCE_FILES%", &[]).unwrap();
        let b = assembler.assemble_str("x %SOURCE_FILES%", &[]).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
