//! Re-executing the current binary inside fresh user, mount and network namespaces.
//!
//! The parent serializes the [`IsolationContext`] to JSON and streams it through a
//! pipe the child finds on fd 3. The child maps the caller's uid/gid to root before
//! exec, so it may mount and chroot without real privileges.

#![allow(unsafe_code)]

use std::ffi::CStr;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, Stdio};

use nix::sched::CloneFlags;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};

use super::strategy::build_isolator;
use super::{IsolationContext, ISOLATED_EXEC_COMMAND};
use crate::errors::{ChastError, ChastResult};

const CONTEXT_FD: RawFd = 3;
const SHELL: &str = "/bin/bash";
const SHELL_PROMPT: &str = "-[chast-ns-process]- # ";

/// Parent side: mount outside, run the child, always clean up outside.
pub(crate) fn run(context: &IsolationContext) -> ChastResult<()> {
    if !context.root_folder.is_dir() {
        return Err(ChastError::IllegalArgument(format!(
            "root folder {} does not exist",
            context.root_folder.display()
        )));
    }

    let mut isolator = build_isolator(context)?;
    isolator.prepare_outside()?;
    let launched = launch(context);
    let cleaned = isolator.cleanup_outside();
    launched?;
    cleaned
}

fn launch(context: &IsolationContext) -> ChastResult<()> {
    let payload = serde_json::to_vec(context)?;
    let (reader, writer) = pipe()?;

    let uid_map = format!("0 {} 1\n", nix::unistd::getuid());
    let gid_map = format!("0 {} 1\n", nix::unistd::getgid());
    let reader_fd = reader.as_raw_fd();

    let mut command = Command::new("/proc/self/exe");
    command
        .arg(ISOLATED_EXEC_COMMAND)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if std::env::var_os("RUST_LOG").is_none() {
        command.env("RUST_LOG", LevelFilter::current().to_string().to_lowercase());
    }

    // SAFETY: pre_exec runs in the forked child before exec. The closure only issues
    // raw syscalls (unshare, open, write, close, dup2, fcntl) on data prepared above;
    // it does not allocate or take locks.
    unsafe {
        command.pre_exec(move || {
            nix::sched::unshare(
                CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWNET,
            )?;
            write_proc_file(c"/proc/self/setgroups", b"deny")?;
            write_proc_file(c"/proc/self/uid_map", uid_map.as_bytes())?;
            write_proc_file(c"/proc/self/gid_map", gid_map.as_bytes())?;
            expose_at_context_fd(reader_fd)
        });
    }

    let mut child = command
        .spawn()
        .map_err(|e| ChastError::Isolation(format!("failed to start isolated process: {e}")))?;
    drop(reader);

    let mut writer = File::from(writer);
    let written = writer.write_all(&payload);
    drop(writer);
    if let Err(e) = written {
        let _ = child.kill();
        let _ = child.wait();
        return Err(ChastError::Isolation(format!(
            "failed to send context to isolated process: {e}"
        )));
    }

    let status = child
        .wait()
        .map_err(|e| ChastError::Isolation(format!("failed to wait for isolated process: {e}")))?;
    if status.success() {
        return Ok(());
    }
    Err(ChastError::CommandFailed {
        command: summarize(&context.commands),
        status: status
            .code()
            .or_else(|| status.signal().map(|s| 128 + s))
            .unwrap_or(-1),
    })
}

fn summarize(commands: &[Vec<String>]) -> String {
    commands
        .iter()
        .map(|c| c.join(" "))
        .collect::<Vec<_>>()
        .join("; ")
}

fn pipe() -> ChastResult<(OwnedFd, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [0; 2];
    // SAFETY: `fds` is a valid two-element buffer for pipe2 to fill.
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc != 0 {
        return Err(ChastError::Isolation(format!(
            "failed to create context pipe: {}",
            std::io::Error::last_os_error()
        )));
    }
    // SAFETY: pipe2 succeeded, both descriptors are open and owned by nobody else.
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// open/write/close without allocating; safe to call between fork and exec.
fn write_proc_file(path: &CStr, content: &[u8]) -> std::io::Result<()> {
    // SAFETY: `path` is NUL-terminated and `content` is a valid buffer of its length.
    unsafe {
        let fd = libc::open(path.as_ptr(), libc::O_WRONLY | libc::O_CLOEXEC);
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        let written = libc::write(fd, content.as_ptr().cast(), content.len());
        let err = std::io::Error::last_os_error();
        libc::close(fd);
        if written < 0 {
            return Err(err);
        }
    }
    Ok(())
}

/// Make the pipe's read end available as fd 3 across exec.
fn expose_at_context_fd(fd: RawFd) -> std::io::Result<()> {
    // SAFETY: plain descriptor syscalls on descriptors owned by this process.
    let rc = unsafe {
        if fd == CONTEXT_FD {
            libc::fcntl(fd, libc::F_SETFD, 0)
        } else {
            libc::dup2(fd, CONTEXT_FD)
        }
    };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Child side, invoked through the hidden `isolated-exec` subcommand.
pub(crate) fn run_child() -> ChastResult<()> {
    let context = read_context()?;
    info!(
        strategy = %context.strategy,
        working_directory = %context.working_directory.display(),
        "running in isolated environment"
    );

    let mut isolator = build_isolator(&context)?;
    isolator.prepare_inside()?;
    let ran = run_commands(&context.commands);
    let cleaned = isolator.cleanup_inside();
    ran?;
    cleaned
}

fn read_context() -> ChastResult<IsolationContext> {
    // SAFETY: the parent placed the context pipe on fd 3; nothing else in this
    // process owns it.
    let mut pipe = unsafe { File::from_raw_fd(CONTEXT_FD) };
    let mut data = Vec::new();
    pipe.read_to_end(&mut data).map_err(|e| {
        ChastError::Isolation(format!("failed to read isolation context from fd {CONTEXT_FD}: {e}"))
    })?;
    Ok(serde_json::from_slice(&data)?)
}

fn run_commands(commands: &[Vec<String>]) -> ChastResult<()> {
    for command in commands {
        let line = command.join(" ");
        debug!(command = %line, "running command in isolated environment");
        let status = Command::new(SHELL)
            .arg("-c")
            .arg(&line)
            .env_clear()
            .env("PS1", SHELL_PROMPT)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| ChastError::Isolation(format!("failed to start {SHELL}: {e}")))?;
        if !status.success() {
            return Err(ChastError::CommandFailed {
                command: line,
                status: status.code().unwrap_or(-1),
            });
        }
    }
    Ok(())
}
