//! The per-package build pipeline: precheck, environment reset, dependency
//! installation, compile, and staging, driven architecture-major across the
//! whole batch.

use std::path::Path;

use tracing::{debug, info, warn};

use pkgsmith_arch::{Arch, BUILD_ORDER};
use pkgsmith_chroot::BuildRoot;
use pkgsmith_config::Config;
use pkgsmith_recipe::{build_descriptors, Overwrite, PackageDescriptor};
use pkgsmith_util::error::UtilError;
use pkgsmith_util::fs::{ensure_dir, glob_paths, move_into, remove_matching};
use pkgsmith_util::privilege::{path_owner, running_as_root};
use pkgsmith_util::process::run_status;
use pkgsmith_util::prompt::{ask_overwrite, OverwriteAnswer};

use crate::checksums::{refresh_checksums, ChecksumOutcome};
use crate::error::EngineError;
use crate::locate::locate;
use crate::sign::verify_signature;
use crate::srcpkg::build_source;

/// Flags for one batch run. Immutable once the run starts.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Skip the chroot reset and build in the copy as it stands. The
    /// copy's `build/` directory is still cleared.
    pub sloppy: bool,
    /// Verify the detached signature of depends-store artifacts before
    /// installing them. Stage-store artifacts were built by this run's
    /// operator and are never checked.
    pub check_sig: bool,
    /// Regenerate source checksums in each PKGBUILD before building.
    pub refresh_sums: bool,
    /// Restrict the run to these packages. Empty means the configured
    /// build order.
    pub only: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            sloppy: false,
            check_sig: true,
            refresh_sums: false,
            only: Vec::new(),
        }
    }
}

/// Batch-mutable state, separate from the immutable `Config`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunState {
    /// A session-wide overwrite answer ("Y"/"N"), once one was given.
    pub overwrite_all: Option<bool>,
}

/// What happened to one (package, architecture) unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Compiled and staged.
    Built,
    /// Compiled and staged, but with logged problems along the way.
    Degraded,
    /// An up-to-date artifact already existed and was kept.
    Kept,
}

/// Per-unit entry on the run report.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub name: String,
    pub arch: Arch,
    pub outcome: Outcome,
    /// Non-fatal problems hit while processing this unit.
    pub degradations: Vec<String>,
}

/// Summary of a whole batch run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub entries: Vec<ReportEntry>,
}

impl RunReport {
    /// Units that were compiled and staged, degraded or not.
    pub fn built(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome != Outcome::Kept)
            .count()
    }

    pub fn kept(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == Outcome::Kept)
            .count()
    }

    pub fn is_degraded(&self) -> bool {
        self.entries.iter().any(|e| e.outcome == Outcome::Degraded)
    }
}

/// Decide the overwrite fate of every descriptor before any environment
/// work starts.
///
/// For each destination that already exists the prompt is consulted; a
/// capitalized answer is recorded in `state` and applied to the rest of the
/// batch without asking again. Missing destinations are always built.
pub fn precheck<F>(
    descriptors: &mut [PackageDescriptor],
    state: &mut RunState,
    mut ask: F,
) -> Result<(), EngineError>
where
    F: FnMut(&str) -> Result<OverwriteAnswer, UtilError>,
{
    for descriptor in descriptors.iter_mut() {
        if !descriptor.dest.exists() {
            descriptor.overwrite = Overwrite::Build;
            continue;
        }
        let build = match state.overwrite_all {
            Some(answer) => answer,
            None => match ask(&descriptor.artifact_filename)? {
                OverwriteAnswer::Yes => true,
                OverwriteAnswer::No => false,
                OverwriteAnswer::YesAll => {
                    state.overwrite_all = Some(true);
                    true
                }
                OverwriteAnswer::NoAll => {
                    state.overwrite_all = Some(false);
                    false
                }
            },
        };
        descriptor.overwrite = if build { Overwrite::Build } else { Overwrite::Keep };
    }
    Ok(())
}

/// Run the build pipeline for the configured batch.
///
/// Prompts on stdin when staged artifacts would be overwritten; see
/// [`run_with_prompt`] for the injectable variant.
///
/// # Errors
/// Fatal conditions only: a malformed recipe, a failed environment reset,
/// or a compile failure. Everything else degrades the report.
pub fn run(config: &Config, root: &Path, options: &BuildOptions) -> Result<RunReport, EngineError> {
    run_with_prompt(config, root, options, ask_overwrite)
}

/// [`run`] with the overwrite prompt supplied by the caller.
pub fn run_with_prompt<F>(
    config: &Config,
    root: &Path,
    options: &BuildOptions,
    ask: F,
) -> Result<RunReport, EngineError>
where
    F: FnMut(&str) -> Result<OverwriteAnswer, UtilError>,
{
    let mut names = config.build_order(root)?;
    if !options.only.is_empty() {
        names.retain(|name| options.only.contains(name));
    }
    if names.is_empty() {
        info!("nothing to build");
        return Ok(RunReport::default());
    }

    let mut descriptors = build_descriptors(root, &names)?;
    if options.refresh_sums {
        for descriptor in &mut descriptors {
            descriptor.refresh_sums = true;
        }
    }

    let mut state = RunState::default();
    precheck(&mut descriptors, &mut state, ask)?;

    let result = run_pipeline(config, root, &mut descriptors, options);
    post_build_cleanup(root, &names);
    result
}

fn run_pipeline(
    config: &Config,
    root: &Path,
    descriptors: &mut [PackageDescriptor],
    options: &BuildOptions,
) -> Result<RunReport, EngineError> {
    let stage_store = root.join("stage");
    let depends_store = root.join("depends");
    let mut report = RunReport::default();

    for descriptor in descriptors.iter_mut() {
        if descriptor.overwrite == Overwrite::Keep {
            info!(
                package = %descriptor.name,
                arch = %descriptor.arch,
                "keeping the existing artifact"
            );
            report.entries.push(ReportEntry {
                name: descriptor.name.clone(),
                arch: descriptor.arch,
                outcome: Outcome::Kept,
                degradations: Vec::new(),
            });
            continue;
        }

        eprintln!(
            "==> {} {} for {}",
            descriptor.name, descriptor.version, descriptor.arch
        );
        let mut degradations = Vec::new();
        let env = BuildRoot::new(&config.chroot_path, descriptor.arch, &config.chroot_copy);

        if options.sloppy {
            env.clear_build_dir();
        } else {
            env.reset()?;
        }

        ensure_dir(&descriptor.stage_dir())?;

        // Once-per-package steps ride along with the first architecture.
        if descriptor.arch == BUILD_ORDER[0] {
            if !build_source(&descriptor.source_path, &descriptor.stage_dir())? {
                degradations.push("no source package staged".to_owned());
            }
            if descriptor.refresh_sums {
                match refresh_checksums(&descriptor.source_path) {
                    ChecksumOutcome::Updated => {
                        info!(package = %descriptor.name, "checksums updated");
                    }
                    ChecksumOutcome::UpToDate => {}
                    ChecksumOutcome::Failed(reason) => {
                        warn!(package = %descriptor.name, %reason, "checksum refresh failed");
                        degradations.push(format!("checksum refresh failed: {reason}"));
                    }
                }
            }
        }

        install_deps(
            &env,
            descriptor,
            &stage_store,
            &depends_store,
            options.check_sig,
            &mut degradations,
        );

        let compiled = env.build(&descriptor.source_path)?;
        if !compiled {
            return Err(EngineError::CompileFailed {
                package: descriptor.name.clone(),
                arch: descriptor.arch,
            });
        }
        descriptor.built = true;

        stage_artifacts(descriptor, &mut degradations);

        report.entries.push(ReportEntry {
            name: descriptor.name.clone(),
            arch: descriptor.arch,
            outcome: if degradations.is_empty() {
                Outcome::Built
            } else {
                Outcome::Degraded
            },
            degradations,
        });
    }
    Ok(report)
}

/// Install each located dependency artifact into the build root.
///
/// A dependency with no locatable artifact is assumed to come from the
/// environment's base template; only a pinned dependency that cannot be
/// found or installed degrades the unit. When a located artifact's version
/// is already installed in the copy the install is skipped.
fn install_deps(
    env: &BuildRoot,
    descriptor: &PackageDescriptor,
    stage_store: &Path,
    depends_store: &Path,
    check_sig: bool,
    degradations: &mut Vec<String>,
) {
    for dep in &descriptor.deps {
        let pin = dep.version.as_deref();
        let Some(artifact) = locate(stage_store, depends_store, &dep.name, pin, env.arch()) else {
            match pin {
                Some(pin) => {
                    warn!(dependency = %dep.name, pin, "no artifact satisfies the pin");
                    degradations.push(format!("missing pinned dependency {}={pin}", dep.name));
                }
                None => {
                    debug!(dependency = %dep.name, "no local artifact, relying on the template");
                }
            }
            continue;
        };

        let located_version = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(pkgsmith_recipe::filename::version_from_filename);
        if let (Some(installed), Some(located)) =
            (env.installed_version(&dep.name), located_version)
        {
            if installed == located {
                debug!(dependency = %dep.name, %installed, "already present in the build root");
                continue;
            }
        }

        // Freshly staged artifacts are this operator's own output and are
        // trusted without a signature check.
        if check_sig && !artifact.starts_with(stage_store) && !verify_signature(&artifact) {
            warn!(dependency = %dep.name, artifact = %artifact.display(), "signature check failed");
            degradations.push(format!("unverifiable artifact for {}", dep.name));
            continue;
        }

        if let Err(e) = env.install_artifact(&artifact) {
            warn!(dependency = %dep.name, error = %e, "dependency install failed");
            degradations.push(format!("could not install {}", dep.name));
        }
    }
}

/// Move the artifacts the builder left in the recipe directory into the
/// descriptor's stage directory, signature sidecars included. A failed
/// move degrades the entry and leaves the artifact in place; the run
/// continues.
fn stage_artifacts(descriptor: &PackageDescriptor, degradations: &mut Vec<String>) {
    let recipe = descriptor.source_path.display();
    let mut moved = 0;
    for pattern in [
        format!("{recipe}/*-*.pkg.tar.xz"),
        format!("{recipe}/*-*.pkg.tar.xz.sig"),
    ] {
        let artifacts = match glob_paths(&pattern) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                warn!(package = %descriptor.name, error = %e, "cannot list build output");
                degradations.push("could not list build output".to_owned());
                continue;
            }
        };
        for artifact in artifacts {
            match move_into(&artifact, &descriptor.stage_dir()) {
                Ok(staged) => {
                    eprintln!("    Staged {}", staged.display());
                    moved += 1;
                }
                Err(e) => {
                    warn!(
                        package = %descriptor.name,
                        artifact = %artifact.display(),
                        error = %e,
                        "could not stage artifact"
                    );
                    degradations.push(format!(
                        "could not stage {}",
                        artifact.file_name().and_then(|n| n.to_str()).unwrap_or("artifact")
                    ));
                }
            }
        }
    }
    if moved == 0 {
        warn!(
            package = %descriptor.name,
            arch = %descriptor.arch,
            "build succeeded but left no artifacts to stage"
        );
        degradations.push("no artifacts staged".to_owned());
    }
}

/// Remove build logs from the recipe directories and hand ownership back
/// to the recipe owner after a root-driven batch. Failures only warn.
fn post_build_cleanup(root: &Path, names: &[String]) {
    for name in names {
        let recipe = root.join("devsrc").join(name);
        let logs = format!("{}/*.log", recipe.display());
        match remove_matching(&logs) {
            Ok(0) => {}
            Ok(count) => debug!(package = %name, count, "removed build logs"),
            Err(e) => warn!(package = %name, error = %e, "could not remove build logs"),
        }
    }

    if !running_as_root() {
        return;
    }
    let devsrc = root.join("devsrc");
    // Root builds leave root-owned files behind; hand them back to the
    // invoking user (under sudo) or the tree's recorded owner.
    let owner_spec = match std::env::var("SUDO_USER") {
        Ok(user) if !user.is_empty() => user,
        _ => match path_owner(&devsrc) {
            Ok(owner) => format!("{}:{}", owner.uid.as_raw(), owner.gid.as_raw()),
            Err(e) => {
                warn!(error = %e, "cannot resolve the recipe tree owner");
                return;
            }
        },
    };
    for dir in [devsrc, root.join("stage")] {
        if !dir.is_dir() {
            continue;
        }
        let chowned = run_status(
            std::process::Command::new("chown")
                .arg("-R")
                .arg(&owner_spec)
                .arg(&dir),
        );
        match chowned {
            Ok(true) => {}
            Ok(false) => warn!(path = %dir.display(), "chown exited non-zero"),
            Err(e) => warn!(path = %dir.display(), error = %e, "could not run chown"),
        }
    }
}
