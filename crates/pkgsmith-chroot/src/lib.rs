//! Per-architecture isolated build roots and the external chroot tools
//! (`mkarchroot`, `makechrootpkg`, `pacman`, `rsync`) that operate on them.

pub mod env;
pub mod error;
pub mod invoke;

pub use env::BuildRoot;
pub use error::ChrootError;
