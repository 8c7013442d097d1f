//! Architecture tags and build ordering for pkgsmith.

use std::fmt;
use std::str::FromStr;

/// A CPU architecture a package can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Arch {
    X86_64,
    I686,
}

/// The fixed architecture iteration order for a build run.
///
/// Descriptor collections are architecture-major in this order; the
/// orchestrator uses "currently processing `BUILD_ORDER[0]`" as the trigger
/// for once-per-package actions such as the source-package build.
pub const BUILD_ORDER: [Arch; 2] = [Arch::X86_64, Arch::I686];

impl Arch {
    /// The tag used in artifact filenames and as the `setarch` argument.
    pub fn tag(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::I686 => "i686",
        }
    }

    /// The suffix appended to the chroot copy name ("64" or "32").
    pub fn copy_suffix(self) -> &'static str {
        match self {
            Arch::X86_64 => "64",
            Arch::I686 => "32",
        }
    }

    /// Whether an artifact filename tag satisfies a dependency for this
    /// architecture. The literal `any` marks an architecture-independent
    /// artifact and matches every architecture.
    pub fn accepts_tag(self, tag: &str) -> bool {
        tag == "any" || tag == self.tag()
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Arch {
    type Err = ArchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" => Ok(Arch::X86_64),
            "i686" => Ok(Arch::I686),
            other => Err(ArchError::Unknown {
                tag: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchError {
    #[error("unknown architecture tag `{tag}`, expected x86_64 or i686")]
    Unknown { tag: String },
}
