//! Argument-vector builders for the chroot tools.
//!
//! Every builder exposes `build_args()` so the exact invocation can be
//! asserted in tests without running the tool. All tools run under
//! `setarch <arch>` so a 32-bit build sees an i686 personality even on an
//! x86_64 host.

use std::path::{Path, PathBuf};

use pkgsmith_arch::Arch;

/// A `mkarchroot` invocation: either refresh a pristine template in place
/// or run one command inside an existing root.
#[derive(Debug)]
pub struct MkarchrootCommand {
    arch: Arch,
    mode: Mode,
}

#[derive(Debug)]
enum Mode {
    /// `mkarchroot -u <root>`: update the template via the bootstrap tool.
    Update { root: PathBuf },
    /// `mkarchroot -r "<command>" <root>`: run a command scoped to the root.
    ///
    /// The inner command is passed as a single argument; `mkarchroot` is the
    /// one place where a command string (rather than a vector) is genuinely
    /// required by the tool's interface.
    Run { command: String, root: PathBuf },
}

impl MkarchrootCommand {
    pub fn update(arch: Arch, template_root: &Path) -> Self {
        Self {
            arch,
            mode: Mode::Update {
                root: template_root.to_path_buf(),
            },
        }
    }

    pub fn run(arch: Arch, command: &str, root: &Path) -> Self {
        Self {
            arch,
            mode: Mode::Run {
                command: command.to_owned(),
                root: root.to_path_buf(),
            },
        }
    }

    /// The full argument vector, `setarch` first.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "setarch".to_owned(),
            self.arch.tag().to_owned(),
            "mkarchroot".to_owned(),
        ];
        match &self.mode {
            Mode::Update { root } => {
                args.push("-u".to_owned());
                args.push(root.display().to_string());
            }
            Mode::Run { command, root } => {
                args.push("-r".to_owned());
                args.push(command.clone());
                args.push(root.display().to_string());
            }
        }
        args
    }

    /// Turn the argument vector into a spawnable `Command`.
    pub fn command(&self) -> std::process::Command {
        to_command(self.build_args())
    }
}

/// A `makechrootpkg` invocation: compile the recipe in the current
/// directory inside the named chroot copy.
#[derive(Debug)]
pub struct MakechrootpkgCommand {
    arch: Arch,
    chroot_dir: PathBuf,
    copy_name: String,
}

impl MakechrootpkgCommand {
    pub fn new(arch: Arch, chroot_dir: &Path, copy_name: &str) -> Self {
        Self {
            arch,
            chroot_dir: chroot_dir.to_path_buf(),
            copy_name: copy_name.to_owned(),
        }
    }

    /// `setarch <arch> makechrootpkg -r <dir> -l <copy> -- -i`.
    ///
    /// The trailing `-i` makes makepkg install the finished package into the
    /// copy, so later packages in the same run can link against it.
    pub fn build_args(&self) -> Vec<String> {
        vec![
            "setarch".to_owned(),
            self.arch.tag().to_owned(),
            "makechrootpkg".to_owned(),
            "-r".to_owned(),
            self.chroot_dir.display().to_string(),
            "-l".to_owned(),
            self.copy_name.clone(),
            "--".to_owned(),
            "-i".to_owned(),
        ]
    }

    pub fn command(&self) -> std::process::Command {
        to_command(self.build_args())
    }
}

/// The pacman install command string run inside a root via `mkarchroot -r`.
/// The artifact has already been copied to the root's top level, so the
/// path is `/<filename>`.
pub fn pacman_install_command(artifact_filename: &str) -> String {
    format!("pacman --needed -U /{artifact_filename} --noconfirm")
}

/// The pacman query command string for an installed package's metadata.
pub fn pacman_query_command(package: &str) -> String {
    format!("pacman -Qi {package}")
}

fn to_command(args: Vec<String>) -> std::process::Command {
    let mut iter = args.into_iter();
    // build_args always emits "setarch" first.
    let program = iter.next().unwrap_or_else(|| "setarch".to_owned());
    let mut cmd = std::process::Command::new(program);
    cmd.args(iter);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_args() {
        let cmd = MkarchrootCommand::update(Arch::X86_64, Path::new("/var/chroot/x86_64/root"));
        assert_eq!(
            cmd.build_args(),
            [
                "setarch",
                "x86_64",
                "mkarchroot",
                "-u",
                "/var/chroot/x86_64/root"
            ]
        );
    }

    #[test]
    fn run_args_keep_inner_command_as_one_argument() {
        let cmd = MkarchrootCommand::run(
            Arch::I686,
            "pacman --needed -U /zlib-1.2-1-i686.pkg.tar.xz --noconfirm",
            Path::new("/var/chroot/i686/build32"),
        );
        let args = cmd.build_args();
        assert_eq!(args.len(), 6);
        assert_eq!(args.get(1).map(String::as_str), Some("i686"));
        assert_eq!(
            args.get(4).map(String::as_str),
            Some("pacman --needed -U /zlib-1.2-1-i686.pkg.tar.xz --noconfirm")
        );
    }

    #[test]
    fn makechrootpkg_args() {
        let cmd = MakechrootpkgCommand::new(Arch::I686, Path::new("/var/chroot/i686"), "build32");
        assert_eq!(
            cmd.build_args(),
            [
                "setarch",
                "i686",
                "makechrootpkg",
                "-r",
                "/var/chroot/i686",
                "-l",
                "build32",
                "--",
                "-i"
            ]
        );
    }

    #[test]
    fn pacman_command_strings() {
        assert_eq!(
            pacman_install_command("zfs-0.6.2-1-x86_64.pkg.tar.xz"),
            "pacman --needed -U /zfs-0.6.2-1-x86_64.pkg.tar.xz --noconfirm"
        );
        assert_eq!(pacman_query_command("zfs"), "pacman -Qi zfs");
    }
}
