//! # Folio Testkit
//!
//! Test utilities for Folio.
//!
//! This crate provides:
//! - Manifest fixtures and a file-backed test library
//! - Property-based test generators using proptest
//! - Recording storage doubles for ordering assertions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use folio_testkit::prelude::*;
//!
//! #[test]
//! fn restores_from_disk() {
//!     let library = TestLibrary::new();
//!     let mut state = library.open_state();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod doubles;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::doubles::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use doubles::*;
pub use fixtures::*;
pub use generators::*;
