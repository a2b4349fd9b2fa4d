//! devstack Bootstrap - first-boot script assembly
//!
//! Produces the single script a host runs once at first boot. The script is a
//! template with one placeholder token; the placeholder is replaced by the
//! host's application source files, each embedded as a self-reconstructing
//! wrapped unit.
//!
//! # Pipeline
//!
//! ```text
//! template file ─┐
//!                ├─→ substitute(%SOURCE_FILES%) ─→ AssembledScript
//! source dir ─→ filter ─→ sort ─→ wrap ─→ join ─┘
//! ```
//!
//! Assembly is a pure, synchronous transform over the file system. Any error
//! aborts the run; a partial script is never returned.
//!
//! # Example
//!
//! ```rust,no_run
//! use devstack_bootstrap::{ScriptAssembler, SourceFilter};
//!
//! # fn example() -> Result<(), devstack_bootstrap::AssemblyError> {
//! let script = ScriptAssembler::new()
//!     .with_filter(SourceFilter::extension("py"))
//!     .assemble("scripts/setup-chainlit.sh.template", "src")?;
//!
//! println!("{}", script.text());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod assembler;
pub mod error;
pub mod source;
pub mod unit;

pub use assembler::{assemble, AssembledScript, ScriptAssembler, DEFAULT_PLACEHOLDER};
pub use error::AssemblyError;
pub use source::{collect_sources, SourceFile, SourceFilter, DEFAULT_EXTENSION};
pub use unit::{extract_units, ExtractedFile, DEFAULT_DELIMITER};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
