#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pkgsmith_config::Config;
use pkgsmith_engine::publish::{delete_stage, publish};
use pkgsmith_engine::sign::sign_staged;
use pkgsmith_engine::srcpkg::build_source;
use pkgsmith_engine::{BuildOptions, Outcome, RunReport};
use pkgsmith_util::privilege::running_as_root;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "pkgsmith", about = "A chroot-isolated package build orchestrator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build packages in clean chroots, then sign and stage the artifacts
    Build {
        /// Build only this package (repeatable; defaults to the configured
        /// build order)
        #[arg(short = 'p', long = "package")]
        packages: Vec<String>,
        /// Reuse the chroot copies without resetting them
        #[arg(long)]
        sloppy: bool,
        /// Regenerate source checksums in each PKGBUILD before building
        #[arg(long)]
        refresh_sums: bool,
        /// Skip signature verification of archived dependency artifacts
        #[arg(long)]
        no_check_sig: bool,
    },
    /// Build source tarballs only, without touching the chroots
    Source {
        /// Package up only this package (repeatable)
        #[arg(short = 'p', long = "package")]
        packages: Vec<String>,
    },
    /// Sign the stage and publish it to the package repository
    Repo {
        /// Publish into this directory instead of the configured repository
        #[arg(long)]
        target: Option<PathBuf>,
        /// Keep the stage store after publishing
        #[arg(long)]
        no_stage_delete: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let root = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("error: cannot determine the working directory: {e}");
            process::exit(1);
        }
    };
    let config = match Config::from_path(&root.join("pkgsmith.toml")) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };
    init_tracing(&config);

    let result = match cli.command {
        Command::Build {
            packages,
            sloppy,
            refresh_sums,
            no_check_sig,
        } => cmd_build(&config, &root, packages, sloppy, refresh_sums, no_check_sig),
        Command::Source { packages } => cmd_source(&config, &root, packages),
        Command::Repo {
            target,
            no_stage_delete,
        } => cmd_repo(&config, &root, target, no_stage_delete),
    };

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_build(
    config: &Config,
    root: &Path,
    packages: Vec<String>,
    sloppy: bool,
    refresh_sums: bool,
    no_check_sig: bool,
) -> CliResult {
    if !running_as_root() {
        return Err("pkgsmith build must run as root; chroot management requires it".into());
    }

    let options = BuildOptions {
        sloppy,
        check_sig: !no_check_sig,
        refresh_sums,
        only: packages,
    };
    let report = pkgsmith_engine::run(config, root, &options)?;

    if report.built() > 0 {
        let signed = sign_staged(&root.join("stage"), &config.signing_key, &config.key_owner)?;
        eprintln!("    Signed {signed} artifacts");
    }
    print_report(&report);
    Ok(())
}

fn cmd_source(config: &Config, root: &Path, packages: Vec<String>) -> CliResult {
    let names = if packages.is_empty() {
        config.build_order(root)?
    } else {
        packages
    };
    let mut staged = 0usize;
    for name in &names {
        let recipe = root.join("devsrc").join(name);
        let version = pkgsmith_recipe::pkgbuild::read_version(&recipe)?;
        let stage_dir = root.join("stage").join(format!("{name}-{version}"));
        pkgsmith_util::fs::ensure_dir(&stage_dir)?;
        if build_source(&recipe, &stage_dir)? {
            staged += 1;
        }
    }
    eprintln!("    Staged {staged} of {} source packages", names.len());
    Ok(())
}

fn cmd_repo(
    config: &Config,
    root: &Path,
    target: Option<PathBuf>,
    no_stage_delete: bool,
) -> CliResult {
    let stage = root.join("stage");
    let target = target.unwrap_or_else(|| config.repo_path.clone());

    sign_staged(&stage, &config.signing_key, &config.key_owner)?;
    publish(&stage, &target, &config.signing_key)?;
    eprintln!("    Published the stage to {}", target.display());

    if !no_stage_delete {
        delete_stage(&stage)?;
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    eprintln!(
        "    Finished: {} built, {} kept",
        report.built(),
        report.kept()
    );
    for entry in &report.entries {
        if entry.outcome == Outcome::Degraded {
            for problem in &entry.degradations {
                eprintln!("    {} ({}): {problem}", entry.name, entry.arch);
            }
        }
    }
}
