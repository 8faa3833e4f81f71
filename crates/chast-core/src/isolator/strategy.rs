//! The two ways of assembling the isolated root, split into the phases that run
//! outside and inside the namespace.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, trace};

use super::handlers::{BindMounter, ChangeRoot, MergerFs, OverlayFs, TmpMounter, UnionFs};
use super::{IsolationContext, IsolationStrategy};
use crate::errors::{ChastResult, IoContext};
use crate::fs_util::is_folder_empty;

pub(crate) trait Isolator {
    fn strategy(&self) -> IsolationStrategy;
    fn prepare_outside(&mut self) -> ChastResult<()>;
    fn prepare_inside(&mut self) -> ChastResult<()>;
    fn cleanup_inside(&mut self) -> ChastResult<()>;
    fn cleanup_outside(&mut self) -> ChastResult<()>;
}

/// Build the isolator for `context` and create the folders it works in.
pub(crate) fn build_isolator(context: &IsolationContext) -> ChastResult<Box<dyn Isolator>> {
    let folders = Folders::from(context);
    folders.initialize()?;

    let isolator: Box<dyn Isolator> = match context.strategy {
        IsolationStrategy::UnionFs => Box::new(UnionFsStrategy::new(context, folders)),
        IsolationStrategy::OverlayFs => Box::new(OverlayFsStrategy::new(context, folders)),
    };
    trace!(strategy = %isolator.strategy(), "isolator ready");
    Ok(isolator)
}

struct Folders {
    change_capture: PathBuf,
    operation: PathBuf,
}

impl Folders {
    fn from(context: &IsolationContext) -> Self {
        Self {
            change_capture: context.change_capture_folder.clone(),
            operation: context.operation_directory.clone(),
        }
    }

    fn new_root(&self) -> PathBuf {
        self.operation.join("rootfs")
    }

    fn initialize(&self) -> ChastResult<()> {
        info!(
            capture = %self.change_capture.display(),
            operation = %self.operation.display(),
            "setting up isolation folders"
        );
        fs::create_dir_all(&self.change_capture).at(&self.change_capture)?;
        fs::create_dir_all(&self.operation).at(&self.operation)
    }

    fn cleanup(&self) -> ChastResult<()> {
        if self.operation.is_dir() && is_folder_empty(&self.operation)? {
            fs::remove_dir(&self.operation).at(&self.operation)?;
        }
        Ok(())
    }
}

/// Mounts shared by both strategies once the new root exists.
struct SystemMounts {
    dev: BindMounter,
    proc: BindMounter,
    tmp: TmpMounter,
    change_root: ChangeRoot,
}

impl SystemMounts {
    fn new(root: &Path, new_root: &Path, operation: &Path, working_directory: &Path) -> Self {
        Self {
            dev: BindMounter::new("dev", root, new_root),
            proc: BindMounter::new("proc", root, new_root),
            tmp: TmpMounter::new(operation, new_root),
            change_root: ChangeRoot::new(new_root, working_directory),
        }
    }

    fn enter(&mut self) -> ChastResult<()> {
        self.dev.mount()?;
        self.proc.mount()?;
        self.tmp.mount()?;
        self.change_root.enter()
    }

    fn leave(&mut self) -> ChastResult<()> {
        self.change_root.leave()?;
        self.tmp.unmount()?;
        self.proc.unmount()?;
        self.dev.unmount()
    }
}

/// unionfs-fuse is mounted by the caller; the namespace only adds system mounts.
pub(crate) struct UnionFsStrategy {
    folders: Folders,
    union: UnionFs,
    mounts: SystemMounts,
}

impl UnionFsStrategy {
    fn new(context: &IsolationContext, folders: Folders) -> Self {
        let new_root = folders.new_root();
        Self {
            union: UnionFs::new(
                &context.root_folder,
                &context.merge_folders,
                &folders.change_capture,
                &new_root,
            ),
            mounts: SystemMounts::new(
                &context.root_folder,
                &new_root,
                &folders.operation,
                &context.working_directory,
            ),
            folders,
        }
    }
}

impl Isolator for UnionFsStrategy {
    fn strategy(&self) -> IsolationStrategy {
        IsolationStrategy::UnionFs
    }

    fn prepare_outside(&mut self) -> ChastResult<()> {
        self.union.mount()
    }

    fn prepare_inside(&mut self) -> ChastResult<()> {
        self.mounts.enter()
    }

    fn cleanup_inside(&mut self) -> ChastResult<()> {
        self.mounts.leave()
    }

    fn cleanup_outside(&mut self) -> ChastResult<()> {
        self.union.unmount()?;
        self.union.cleanup()?;
        self.folders.cleanup()
    }
}

/// Everything is mounted inside the namespace: mergerfs exposes the root, overlayfs
/// stacks previous captures and the step's capture on top of it.
pub(crate) struct OverlayFsStrategy {
    folders: Folders,
    mergerfs: MergerFs,
    overlay: OverlayFs,
    mounts: SystemMounts,
}

impl OverlayFsStrategy {
    fn new(context: &IsolationContext, folders: Folders) -> Self {
        let new_root = folders.new_root();
        let mergerfs = MergerFs::new(&context.root_folder, &folders.operation.join("mergerfs"));

        let mut lower = context.merge_folders.clone();
        lower.push(mergerfs.target().to_path_buf());
        let overlay = OverlayFs::new(
            lower,
            &folders.change_capture,
            &folders.operation.join("overlayFsWorkingDir"),
            &new_root,
        );

        Self {
            mounts: SystemMounts::new(
                &context.root_folder,
                &new_root,
                &folders.operation,
                &context.working_directory,
            ),
            mergerfs,
            overlay,
            folders,
        }
    }
}

impl Isolator for OverlayFsStrategy {
    fn strategy(&self) -> IsolationStrategy {
        IsolationStrategy::OverlayFs
    }

    fn prepare_outside(&mut self) -> ChastResult<()> {
        Ok(())
    }

    fn prepare_inside(&mut self) -> ChastResult<()> {
        self.mergerfs.mount()?;
        self.overlay.mount()?;
        self.mounts.enter()
    }

    fn cleanup_inside(&mut self) -> ChastResult<()> {
        self.mounts.leave()?;
        self.overlay.unmount()?;
        self.overlay.cleanup()?;
        self.mergerfs.unmount()?;
        self.mergerfs.cleanup()
    }

    fn cleanup_outside(&mut self) -> ChastResult<()> {
        self.folders.cleanup()
    }
}
