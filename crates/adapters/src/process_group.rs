// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-group helpers for subprocess supervision
//!
//! Children run in their own process group so that a kill reaches the whole
//! tree (shells, test runners, their children) and not just the immediate
//! child. On non-unix platforms these helpers are no-ops.

// The only unsafe code in the workspace: raw libc calls around fork/exec.
#![allow(unsafe_code)]

use std::io;

#[cfg(unix)]
/// Put the calling process into its own process group.
///
/// Intended for use in `pre_exec` so the child becomes the group leader.
pub fn set_process_group() -> io::Result<()> {
    let result = unsafe { libc::setpgid(0, 0) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(unix))]
/// No-op on non-unix platforms.
pub fn set_process_group() -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
/// Send SIGTERM to the process group led by `pid` (best-effort).
pub fn term_process_group(pid: u32) -> io::Result<()> {
    signal_group(pid, libc::SIGTERM)
}

#[cfg(not(unix))]
/// No-op on non-unix platforms.
pub fn term_process_group(_pid: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
/// Send SIGKILL to the process group led by `pid` (best-effort).
pub fn kill_process_group(pid: u32) -> io::Result<()> {
    signal_group(pid, libc::SIGKILL)
}

#[cfg(not(unix))]
/// No-op on non-unix platforms.
pub fn kill_process_group(_pid: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) -> io::Result<()> {
    use std::io::ErrorKind;

    let pid = pid as libc::pid_t;
    let pgid = unsafe { libc::getpgid(pid) };
    if pgid == -1 {
        let err = io::Error::last_os_error();
        if err.kind() != ErrorKind::NotFound {
            return Err(err);
        }
        return Ok(());
    }

    let result = unsafe { libc::killpg(pgid, signal) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.kind() != ErrorKind::NotFound {
            return Err(err);
        }
    }

    Ok(())
}
