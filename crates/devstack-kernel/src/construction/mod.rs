//! Construction phase
//!
//! Declarations accumulate in a [`StackBuilder`]. Every reference is checked
//! the moment it is made, so definition-order mistakes surface at the line
//! that caused them. `build()` seals the result into an immutable
//! [`StackDefinition`](crate::definition::StackDefinition).
//!
//! # Two phases
//!
//! 1. **Construction** (this module): declare, reference, validate
//! 2. **Deployment** ([`engine`](crate::engine)): hand the sealed definition
//!    to a provisioning engine; no validation happens there

pub mod builder;

pub use builder::StackBuilder;
