// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Bind-mount + `chroot` execution primitives.
//!
//! This is deliberately NOT a full namespace-unsharing container: the
//! pipeline that owns this crate runs build scripts either directly on the
//! host, or inside an existing root filesystem that it bind-mounts `/dev`,
//! `/proc`, `/sys` and a scripts directory into before shelling out to the
//! system `chroot` binary. Mounts are torn down in reverse order on every
//! exit path via an RAII guard.

use std::path::{Path, PathBuf};
use std::process::Command;

use fs_err as fs;
use nix::mount::{MntFlags, MsFlags, mount, umount2};
use snafu::{ResultExt, Snafu};
use tracing::warn;

/// A single bind mount from a host path into a path relative to a root.
#[derive(Debug, Clone)]
pub struct Bind {
    pub host: PathBuf,
    /// Absolute path inside the root this bind is mounted at.
    pub guest: PathBuf,
}

impl Bind {
    pub fn new(host: impl Into<PathBuf>, guest: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            guest: guest.into(),
        }
    }
}

/// Owns a set of live bind mounts and unmounts them (in reverse order) when
/// dropped, regardless of whether the caller exits via success, a script
/// failure, or a panic unwind.
#[derive(Debug, Default)]
pub struct Mounts {
    targets: Vec<PathBuf>,
}

impl Mounts {
    /// Bind-mount every entry of `binds` under `root`, in order. If any
    /// mount fails partway through, everything mounted so far is unwound
    /// before the error is returned.
    pub fn new(root: &Path, binds: &[Bind]) -> Result<Self, Error> {
        let mut mounts = Mounts::default();

        for bind in binds {
            let relative = bind.guest.strip_prefix("/").unwrap_or(&bind.guest);
            let target = root.join(relative);

            if let Err(error) = mounts.bind(&bind.host, &target) {
                drop(mounts);
                return Err(error);
            }
        }

        Ok(mounts)
    }

    fn bind(&mut self, host: &Path, target: &Path) -> Result<(), Error> {
        ensure_dir(target)?;

        mount(Some(host), target, None::<&str>, MsFlags::MS_BIND, None::<&str>)
            .with_context(|_| MountSnafu {
                host: host.to_owned(),
                target: target.to_owned(),
            })?;

        self.targets.push(target.to_owned());

        Ok(())
    }
}

impl Drop for Mounts {
    fn drop(&mut self) {
        for target in self.targets.iter().rev() {
            if let Err(error) = umount2(target, MntFlags::MNT_DETACH) {
                warn!(%error, target = %target.display(), "failed to unmount");
            }
        }
    }
}

fn ensure_dir(path: &Path) -> Result<(), Error> {
    if !path.exists() {
        fs::create_dir_all(path).context(EnsureDirSnafu { path: path.to_owned() })?;
    }
    Ok(())
}

/// Build the `chroot <root> /bin/bash /scripts/<name> [destdir]` command
/// for isolated-root execution. `script_name` is the file name of the
/// script as it appears under the bind-mounted scripts directory (mounted
/// at `/scripts` inside `root`).
pub fn chroot_command(root: &Path, script_name: &str, destdir: Option<&str>) -> Command {
    let mut command = Command::new("chroot");
    command
        .arg(root)
        .arg("/bin/bash")
        .arg(format!("/scripts/{script_name}"));

    if let Some(destdir) = destdir {
        command.arg(destdir);
    }

    command
}

/// Build the `/bin/bash <script> [destdir]` command for host execution.
pub fn host_command(script: &Path, destdir: Option<&str>) -> Command {
    let mut command = Command::new("/bin/bash");
    command.arg(script);

    if let Some(destdir) = destdir {
        command.arg(destdir);
    }

    command
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("create mount point directory {}", path.display()))]
    EnsureDir { path: PathBuf, source: std::io::Error },
    #[snafu(display("bind mount {} -> {}", host.display(), target.display()))]
    Mount {
        host: PathBuf,
        target: PathBuf,
        source: nix::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroot_command_shape() {
        let cmd = chroot_command(Path::new("/chroot"), "0001_c_s.sh", Some("/destdir/foo"));
        assert_eq!(cmd.get_program(), "chroot");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["/chroot", "/bin/bash", "/scripts/0001_c_s.sh", "/destdir/foo"]
        );
    }

    #[test]
    fn host_command_without_destdir() {
        let cmd = host_command(Path::new("/tmp/s.sh"), None);
        assert_eq!(cmd.get_program(), "/bin/bash");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["/tmp/s.sh"]);
    }
}
