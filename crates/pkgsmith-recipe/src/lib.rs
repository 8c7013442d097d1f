//! PKGBUILD field extraction and package descriptor construction.
//!
//! A PKGBUILD is treated as an opaque text file with a handful of known
//! fields pulled out by narrow regex helpers, plus a constrained bash
//! evaluation for the architecture-conditional dependency arrays. This is
//! deliberately not a PKGBUILD interpreter.

pub mod descriptor;
pub mod error;
pub mod filename;
pub mod pkgbuild;

pub use descriptor::{build_descriptors, Overwrite, PackageDescriptor};
pub use error::RecipeError;
pub use pkgbuild::DepSpec;
