//! Mount and chroot building blocks the strategies compose.

use std::fmt::Display;
use std::fs::{self, File};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::process::Command;

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use tracing::{debug, trace};

use crate::errors::{ChastError, ChastResult, IoContext};

const UNIONFS_BINARY: &str = "/usr/bin/unionfs-fuse";
const MERGERFS_BINARY: &str = "/usr/bin/mergerfs";

fn failed(action: &str, path: &Path, err: impl Display) -> ChastError {
    ChastError::Isolation(format!("{action} {}: {err}", path.display()))
}

/// Run a helper binary, turning a non-zero exit into an isolation error with its output.
fn run_tool(program: &str, args: &[String]) -> ChastResult<()> {
    trace!(program, ?args, "running mount helper");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| failed("failed to start", Path::new(program), e))?;
    if output.status.success() {
        return Ok(());
    }
    Err(ChastError::Isolation(format!(
        "{program} exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    )))
}

/// Recursive private bind mount of `<root>/<folder>` onto `<new root>/<folder>`.
pub(crate) struct BindMounter {
    source: PathBuf,
    target: PathBuf,
}

impl BindMounter {
    pub(crate) fn new(folder: &str, root: &Path, new_root: &Path) -> Self {
        Self {
            source: root.join(folder),
            target: new_root.join(folder),
        }
    }

    pub(crate) fn mount(&self) -> ChastResult<()> {
        fs::create_dir_all(&self.target).at(&self.target)?;
        mount(
            Some(self.source.as_path()),
            self.target.as_path(),
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REC | MsFlags::MS_PRIVATE,
            None::<&str>,
        )
        .map_err(|e| failed("failed to bind mount", &self.target, e))?;
        trace!(source = %self.source.display(), target = %self.target.display(), "bind mounted");
        Ok(())
    }

    pub(crate) fn unmount(&self) -> ChastResult<()> {
        umount2(self.target.as_path(), MntFlags::MNT_DETACH)
            .map_err(|e| failed("failed to unmount", &self.target, e))
    }
}

/// Empty `/tmp` for the commands, backed by `<operation dir>/tmp`.
pub(crate) struct TmpMounter {
    backing: PathBuf,
    target: PathBuf,
}

impl TmpMounter {
    pub(crate) fn new(operation_directory: &Path, new_root: &Path) -> Self {
        Self {
            backing: operation_directory.join("tmp"),
            target: new_root.join("tmp"),
        }
    }

    pub(crate) fn mount(&self) -> ChastResult<()> {
        fs::create_dir_all(&self.backing).at(&self.backing)?;
        mount(
            Some(self.backing.as_path()),
            self.target.as_path(),
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_PRIVATE,
            None::<&str>,
        )
        .map_err(|e| failed("failed to mount tmp at", &self.target, e))
    }

    pub(crate) fn unmount(&self) -> ChastResult<()> {
        umount2(self.target.as_path(), MntFlags::MNT_DETACH)
            .map_err(|e| failed("failed to unmount", &self.target, e))?;
        fs::remove_dir_all(&self.backing).at(&self.backing)
    }
}

/// unionfs-fuse branch list: writable upper first, then read-only layers, root last.
pub(crate) fn unionfs_branches(upper: &Path, layers: &[PathBuf], root: &Path) -> String {
    let mut branches = vec![format!("{}=RW", upper.display())];
    branches.extend(layers.iter().map(|l| format!("{}=RO", l.display())));
    branches.push(format!("{}=RO", root.display()));
    branches.join(":")
}

pub(crate) struct UnionFs {
    source: PathBuf,
    layers: Vec<PathBuf>,
    upper: PathBuf,
    target: PathBuf,
}

impl UnionFs {
    pub(crate) fn new(source: &Path, layers: &[PathBuf], upper: &Path, target: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            layers: layers.to_vec(),
            upper: upper.to_path_buf(),
            target: target.to_path_buf(),
        }
    }

    pub(crate) fn mount(&self) -> ChastResult<()> {
        fs::create_dir_all(&self.target).at(&self.target)?;
        let args = vec![
            "-o".to_string(),
            "cow,relaxed_permissions".to_string(),
            unionfs_branches(&self.upper, &self.layers, &self.source),
            self.target.to_string_lossy().into_owned(),
        ];
        run_tool(UNIONFS_BINARY, &args)?;
        debug!(target = %self.target.display(), "mounted unionfs");
        Ok(())
    }

    /// A plain umount(2) of a FUSE mount is not permitted for the user, `umount` is.
    pub(crate) fn unmount(&self) -> ChastResult<()> {
        run_tool("umount", &[self.target.to_string_lossy().into_owned()])?;
        debug!(target = %self.target.display(), "unmounted unionfs");
        Ok(())
    }

    pub(crate) fn cleanup(&self) -> ChastResult<()> {
        fs::remove_dir(&self.target).at(&self.target)
    }
}

pub(crate) struct MergerFs {
    source: PathBuf,
    target: PathBuf,
}

impl MergerFs {
    pub(crate) fn new(source: &Path, target: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
        }
    }

    pub(crate) fn target(&self) -> &Path {
        &self.target
    }

    pub(crate) fn mount(&self) -> ChastResult<()> {
        fs::create_dir_all(&self.target).at(&self.target)?;
        run_tool(
            MERGERFS_BINARY,
            &[
                self.source.to_string_lossy().into_owned(),
                self.target.to_string_lossy().into_owned(),
            ],
        )?;
        debug!(source = %self.source.display(), target = %self.target.display(), "mounted mergerfs");
        Ok(())
    }

    pub(crate) fn unmount(&self) -> ChastResult<()> {
        umount2(self.target.as_path(), MntFlags::empty())
            .map_err(|e| failed("failed to unmount mergerfs at", &self.target, e))
    }

    pub(crate) fn cleanup(&self) -> ChastResult<()> {
        fs::remove_dir(&self.target).at(&self.target)
    }
}

/// `lowerdir=a:b,upperdir=u,workdir=w`, first lower layer on top.
pub(crate) fn overlay_options(lower: &[PathBuf], upper: &Path, work: &Path) -> String {
    let lower = lower
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(":");
    format!(
        "lowerdir={lower},upperdir={},workdir={}",
        upper.display(),
        work.display()
    )
}

pub(crate) struct OverlayFs {
    lower: Vec<PathBuf>,
    upper: PathBuf,
    work: PathBuf,
    target: PathBuf,
}

impl OverlayFs {
    pub(crate) fn new(lower: Vec<PathBuf>, upper: &Path, work: &Path, target: &Path) -> Self {
        Self {
            lower,
            upper: upper.to_path_buf(),
            work: work.to_path_buf(),
            target: target.to_path_buf(),
        }
    }

    pub(crate) fn mount(&self) -> ChastResult<()> {
        for dir in self.lower.iter().chain(std::iter::once(&self.upper)) {
            if !dir.is_dir() {
                return Err(failed("overlay layer missing:", dir, "not a directory"));
            }
        }
        fs::create_dir_all(&self.target).at(&self.target)?;
        fs::create_dir_all(&self.work).at(&self.work)?;

        let options = overlay_options(&self.lower, &self.upper, &self.work);
        trace!(%options, "mounting overlayfs");
        mount(
            Some("none"),
            self.target.as_path(),
            Some("overlay"),
            MsFlags::MS_NOSUID,
            Some(options.as_str()),
        )
        .map_err(|e| failed("failed to mount overlayfs at", &self.target, e))?;
        debug!(target = %self.target.display(), "mounted overlayfs");
        Ok(())
    }

    pub(crate) fn unmount(&self) -> ChastResult<()> {
        umount2(self.target.as_path(), MntFlags::empty())
            .map_err(|e| failed("failed to unmount overlayfs at", &self.target, e))
    }

    pub(crate) fn cleanup(&self) -> ChastResult<()> {
        fs::remove_dir(&self.target).at(&self.target)?;
        fs::remove_dir_all(&self.work).at(&self.work)
    }
}

/// chroot into the new root and restore the original one afterwards.
pub(crate) struct ChangeRoot {
    new_root: PathBuf,
    working_directory: PathBuf,
    original_root: Option<File>,
}

impl ChangeRoot {
    pub(crate) fn new(new_root: &Path, working_directory: &Path) -> Self {
        Self {
            new_root: new_root.to_path_buf(),
            working_directory: working_directory.to_path_buf(),
            original_root: None,
        }
    }

    pub(crate) fn enter(&mut self) -> ChastResult<()> {
        self.original_root = Some(File::open("/").at("/")?);
        nix::unistd::chroot(self.new_root.as_path())
            .map_err(|e| failed("failed to chroot into", &self.new_root, e))?;
        trace!(root = %self.new_root.display(), "changed root");
        nix::unistd::chdir(self.working_directory.as_path())
            .map_err(|e| failed("failed to change directory to", &self.working_directory, e))
    }

    pub(crate) fn leave(&mut self) -> ChastResult<()> {
        let Some(original) = self.original_root.take() else {
            return Ok(());
        };
        nix::unistd::fchdir(original.as_raw_fd())
            .map_err(|e| failed("failed to return to", Path::new("/"), e))?;
        nix::unistd::chroot(".").map_err(|e| failed("failed to restore root", Path::new("/"), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unionfs_layers_are_ordered_upper_first() {
        let branches = unionfs_branches(
            Path::new("/c/step"),
            &[PathBuf::from("/c/prev1"), PathBuf::from("/c/prev0")],
            Path::new("/"),
        );
        assert_eq!(branches, "/c/step=RW:/c/prev1=RO:/c/prev0=RO:/=RO");
    }

    #[test]
    fn overlay_options_list_lower_layers() {
        let options = overlay_options(
            &[PathBuf::from("/c/prev"), PathBuf::from("/op/mergerfs")],
            Path::new("/c/step"),
            Path::new("/op/work"),
        );
        assert_eq!(
            options,
            "lowerdir=/c/prev:/op/mergerfs,upperdir=/c/step,workdir=/op/work"
        );
    }
}
