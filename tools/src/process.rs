//! Shared subprocess management utilities.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::EnvSanitizer;

/// RAII guard that kills a child process (and its process group on Unix) on drop.
///
/// Wrap a spawned `tokio::process::Child` immediately after `spawn()` to ensure
/// cleanup if the owning future is cancelled or times out. Call `disarm()` after
/// the process exits normally to prevent the kill.
pub struct ChildGuard {
    child: Option<tokio::process::Child>,
}

impl ChildGuard {
    #[must_use]
    pub fn new(child: tokio::process::Child) -> Self {
        Self { child: Some(child) }
    }

    pub fn child_mut(&mut self) -> Option<&mut tokio::process::Child> {
        self.child.as_mut()
    }

    pub fn disarm(&mut self) {
        self.child = None;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                unsafe {
                    if libc::killpg(pid as i32, libc::SIGKILL) == -1 {
                        let _ = child.start_kill();
                    }
                }
            }
            let _ = child.try_wait();
        }
        #[cfg(windows)]
        {
            let _ = child.start_kill();
            let _ = child.try_wait();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    NotRunning,
    Signalled,
}

/// Ask a process group to terminate (SIGTERM on Unix, `TerminateProcess` on Windows).
///
/// Children spawned through [`set_new_session`] lead their own group, so
/// `pid` doubles as the group id.
pub fn terminate_process_group(pid: u32) -> std::io::Result<KillOutcome> {
    #[cfg(unix)]
    unsafe {
        if libc::killpg(pid as i32, libc::SIGTERM) == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(KillOutcome::NotRunning);
            }
            return Err(err);
        }
        Ok(KillOutcome::Signalled)
    }

    #[cfg(windows)]
    {
        windows_terminate_process(pid)
    }
}

#[cfg(windows)]
fn windows_terminate_process(pid: u32) -> std::io::Result<KillOutcome> {
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
    use windows_sys::Win32::System::Threading::{
        OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE, TerminateProcess,
    };

    // SAFETY: Win32 API call.
    let handle = unsafe {
        OpenProcess(
            PROCESS_QUERY_LIMITED_INFORMATION | PROCESS_TERMINATE,
            0,
            pid,
        )
    } as HANDLE;
    if handle.is_null() {
        // Exited already, or not ours to touch.
        return Ok(KillOutcome::NotRunning);
    }
    // SAFETY: handle is valid.
    let ok = unsafe { TerminateProcess(handle, 1) };
    let err = std::io::Error::last_os_error();
    // SAFETY: always close handle.
    unsafe {
        CloseHandle(handle);
    }
    if ok == 0 {
        return Err(err);
    }
    Ok(KillOutcome::Signalled)
}

/// What happens to a session leader when the thread that spawned it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentDeath {
    /// Linux-only: SIGKILL the child instead of leaving an orphan.
    Kill,
    /// The child outlives us; the OS owns its lifetime.
    Survive,
}

/// Put the child process in its own session (Unix only) so the entire process
/// group can be signalled via `killpg`.
#[cfg(unix)]
pub fn set_new_session(cmd: &mut Command, on_parent_death: ParentDeath) {
    use std::os::unix::process::CommandExt;
    let tie_to_parent = on_parent_death == ParentDeath::Kill;
    unsafe {
        cmd.as_std_mut().pre_exec(move || {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            #[cfg(target_os = "linux")]
            if tie_to_parent && libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            #[cfg(not(target_os = "linux"))]
            let _ = tie_to_parent;
            Ok(())
        });
    }
}

/// Replace the child's environment with the sanitized current environment.
pub fn apply_sanitized_env(cmd: &mut Command, sanitizer: &EnvSanitizer) {
    let current: Vec<(String, String)> = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();
    cmd.env_clear();
    cmd.envs(sanitizer.sanitize_env(&current));
}

/// Exit code as a shell would report it: negative signal number when killed.
#[must_use]
pub fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Read a stream to EOF, keeping at most `max_collect` bytes.
///
/// Keeps reading past the cap so the child never blocks on a full pipe.
pub async fn read_stream<R: AsyncRead + Unpin + Send + 'static>(
    mut reader: R,
    max_collect: usize,
) -> String {
    let mut buf = [0u8; 4096];
    let mut collected: Vec<u8> = Vec::new();
    let mut truncated = false;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if collected.len() < max_collect {
            let take = (max_collect - collected.len()).min(n);
            collected.extend_from_slice(&buf[..take]);
            truncated |= take < n;
        } else {
            truncated = true;
        }
    }
    let mut text = String::from_utf8_lossy(&collected).into_owned();
    if truncated {
        text.push_str("\n... [output truncated]");
    }
    text
}
