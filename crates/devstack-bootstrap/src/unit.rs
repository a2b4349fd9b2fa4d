//! Wrapped units
//!
//! A wrapped unit is a quoted shell heredoc that recreates one file in the
//! working directory of the script:
//!
//! ```text
//! head -c -1 > 'app.py' << 'EOF'
//! <raw content>
//! EOF
//! ```
//!
//! The quoted delimiter turns off parameter, command and backslash expansion,
//! so the body is written verbatim. The heredoc always ends the body with a
//! newline of its own; `head -c -1` drops exactly that byte, which makes the
//! reconstruction byte-exact whether or not the file ends with a newline.
//!
//! [`extract_units`] is the inverse: it reads units back out of a script.

use crate::error::AssemblyError;
use crate::source::{validate_file_name, SourceFile};

/// Delimiter used when none is configured
pub const DEFAULT_DELIMITER: &str = "EOF";

const BEGIN_PREFIX: &str = "head -c -1 > '";

/// Check that a delimiter can terminate a quoted heredoc
///
/// # Errors
/// Returns `InvalidDelimiter` for empty delimiters or ones containing
/// whitespace or quote characters
pub fn validate_delimiter(delimiter: &str) -> Result<(), AssemblyError> {
    let bad = delimiter.is_empty()
        || delimiter
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '\'' | '"' | '\\'));
    if bad {
        return Err(AssemblyError::InvalidDelimiter(delimiter.to_string()));
    }
    Ok(())
}

/// Fail if any line of the payload would close the heredoc early
///
/// # Errors
/// Returns `DelimiterCollision` with the 1-based line number
pub fn check_collision(file: &SourceFile, delimiter: &str) -> Result<(), AssemblyError> {
    if let Some(idx) = file.content().split('\n').position(|line| line == delimiter) {
        return Err(AssemblyError::DelimiterCollision {
            file: file.name().to_string(),
            delimiter: delimiter.to_string(),
            line: idx + 1,
        });
    }
    Ok(())
}

fn begin_line(name: &str, delimiter: &str) -> String {
    format!("{BEGIN_PREFIX}{name}' << '{delimiter}'")
}

/// Wrap one payload as a self-reconstructing heredoc
///
/// # Errors
/// Returns `DelimiterCollision` if the payload contains the delimiter line
pub fn wrap(file: &SourceFile, delimiter: &str) -> Result<String, AssemblyError> {
    check_collision(file, delimiter)?;
    Ok(format!(
        "{}\n{}\n{delimiter}",
        begin_line(file.name(), delimiter),
        file.content()
    ))
}

/// A file recovered from an assembled script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// File name as written by the unit
    pub name: String,
    /// Exact bytes the unit writes
    pub content: Vec<u8>,
}

/// Parse every wrapped unit out of `script`, in script order
///
/// Lines that are not the start of a unit are skipped, so the surrounding
/// template commands do not matter.
///
/// # Errors
/// - `UnterminatedUnit` if a unit has no closing delimiter line
/// - `UnsafeFileName` if a unit names a file that could not have been produced
pub fn extract_units(script: &str, delimiter: &str) -> Result<Vec<ExtractedFile>, AssemblyError> {
    validate_delimiter(delimiter)?;
    let suffix = format!("' << '{delimiter}'");
    let mut lines = script.split('\n');
    let mut files = Vec::new();

    while let Some(line) = lines.next() {
        let Some(name) = line
            .strip_prefix(BEGIN_PREFIX)
            .and_then(|rest| rest.strip_suffix(suffix.as_str()))
        else {
            continue;
        };
        validate_file_name(name)?;

        let mut body: Vec<&str> = Vec::new();
        let mut terminated = false;
        for body_line in lines.by_ref() {
            if body_line == delimiter {
                terminated = true;
                break;
            }
            body.push(body_line);
        }

        if !terminated {
            return Err(AssemblyError::UnterminatedUnit {
                file: name.to_string(),
                delimiter: delimiter.to_string(),
            });
        }

        files.push(ExtractedFile {
            name: name.to_string(),
            content: body.join("\n").into_bytes(),
        });
    }

    Ok(files)
}
