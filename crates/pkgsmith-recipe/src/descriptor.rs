//! Package descriptors: one structured record per (package, architecture)
//! build unit.

use std::path::{Path, PathBuf};

use pkgsmith_arch::{Arch, BUILD_ORDER};

use crate::error::RecipeError;
use crate::filename::artifact_filename;
use crate::pkgbuild::{query_deps, read_version, DepSpec};

/// The overwrite decision recorded by the existence precheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overwrite {
    /// Not yet decided (destination may or may not exist).
    #[default]
    Undecided,
    /// Build, overwriting any existing destination artifact.
    Build,
    /// Keep the existing artifact; skip all build steps.
    Keep,
}

/// One (package, architecture) unit moving through the pipeline.
///
/// `version` and `deps` are computed once at construction time and never
/// recomputed; a recipe edited mid-run is picked up only by the next run.
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    pub name: String,
    pub arch: Arch,
    /// Directory holding the PKGBUILD, `devsrc/<name>`.
    pub source_path: PathBuf,
    /// `<pkgver>-<pkgrel>` from the recipe.
    pub version: String,
    /// `<name>-<version>-<arch>.pkg.tar.xz`.
    pub artifact_filename: String,
    /// Staging destination, `stage/<name>-<version>/<filename>`.
    pub dest: PathBuf,
    /// Flattened hard + build-time + optional dependencies, recipe order.
    pub deps: Vec<DepSpec>,
    /// Mutated only by the orchestrator's precheck stage.
    pub overwrite: Overwrite,
    /// Set only after a successful compile step.
    pub built: bool,
    /// Whether the checksum-refresh step applies to this descriptor.
    pub refresh_sums: bool,
}

impl PackageDescriptor {
    /// The stage directory holding this descriptor's artifacts,
    /// `stage/<name>-<version>`.
    pub fn stage_dir(&self) -> PathBuf {
        self.dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.dest.clone())
    }
}

/// Build the ordered descriptor collection for the requested packages.
///
/// The collection is architecture-major (all of `BUILD_ORDER[0]`, then all
/// of `BUILD_ORDER[1]`) and package-minor in caller-supplied order. Each
/// recipe is read and dependency-queried exactly once; the query evaluates
/// both architectures in one pass because dependency lists can be
/// architecture-conditional.
///
/// # Errors
/// Returns an error if any PKGBUILD is unreadable, lacks a version field,
/// or fails the dependency query; a malformed recipe aborts the whole
/// construction.
pub fn build_descriptors(
    root: &Path,
    names: &[String],
) -> Result<Vec<PackageDescriptor>, RecipeError> {
    // One pass over the recipes first, so each PKGBUILD is evaluated once.
    let mut recipes = Vec::with_capacity(names.len());
    for name in names {
        let source_path = root.join("devsrc").join(name);
        let version = read_version(&source_path)?;
        let deps_by_arch = query_deps(&source_path)?;
        recipes.push((name, source_path, version, deps_by_arch));
    }

    let mut descriptors = Vec::with_capacity(names.len() * BUILD_ORDER.len());
    for arch in BUILD_ORDER {
        for (name, source_path, version, deps_by_arch) in &recipes {
            let fname = artifact_filename(name, version, arch.tag());
            let dest = root
                .join("stage")
                .join(format!("{name}-{version}"))
                .join(&fname);
            descriptors.push(PackageDescriptor {
                name: (*name).clone(),
                arch,
                source_path: source_path.clone(),
                version: version.clone(),
                artifact_filename: fname,
                dest,
                deps: deps_by_arch.get(&arch).cloned().unwrap_or_default(),
                overwrite: Overwrite::Undecided,
                built: false,
                refresh_sums: false,
            });
        }
    }
    Ok(descriptors)
}
