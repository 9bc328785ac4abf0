//! Single-instance PID lock and signal cleanup

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

use crate::error::SanitiseError;

/// Advisory lock file holding the owner's process id
///
/// Removed when dropped.
#[derive(Debug)]
pub struct PidLock {
	path: PathBuf,
}

impl PidLock {
	/// Take the lock, replacing it if its owner is gone
	pub fn acquire(path: &Path) -> Result<Self, SanitiseError> {
		if let Some(pid) = read_pid(path) {
			if is_process_alive(pid) && pid != std::process::id() {
				return Err(SanitiseError::LockFailed {
					message: format!("{} is held by running process {}", path.display(), pid),
				});
			}
			debug!("Removing stale lock {} of process {}", path.display(), pid);
			fs::remove_file(path)?;
		} else if path.exists() {
			warn!("Replacing unreadable lock {}", path.display());
			fs::remove_file(path)?;
		}

		let mut file = OpenOptions::new().write(true).create_new(true).open(path).map_err(|e| {
			if e.kind() == io::ErrorKind::AlreadyExists {
				SanitiseError::LockFailed { message: format!("{} was taken concurrently", path.display()) }
			} else {
				SanitiseError::Io(e)
			}
		})?;
		write!(file, "{}", std::process::id())?;
		Ok(Self { path: path.to_path_buf() })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl Drop for PidLock {
	fn drop(&mut self) {
		if let Err(e) = fs::remove_file(&self.path) {
			warn!("Cannot remove lock {}: {}", self.path.display(), e);
		}
	}
}

fn read_pid(path: &Path) -> Option<u32> {
	fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Check whether a process is running
pub fn is_process_alive(pid: u32) -> bool {
	let pid = Pid::from_u32(pid);
	let mut system = System::new();
	system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
	system.process(pid).is_some()
}

/// Run `cleanup` and exit on SIGTERM or SIGINT
///
/// Must be called from within a tokio runtime.
pub fn setup_signal_handlers<F>(cleanup: F)
where
	F: Fn() + Send + 'static,
{
	tokio::spawn(async move {
		use tokio::signal;

		let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGTERM handler: {}. Process will not handle SIGTERM gracefully.", e);
				return;
			}
		};

		let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGINT handler: {}. Process will not handle SIGINT gracefully.", e);
				return;
			}
		};

		tokio::select! {
			_ = sigterm.recv() => {
				debug!("Received SIGTERM, cleaning up...");
				cleanup();
				std::process::exit(143); // 128 + SIGTERM(15)
			}
			_ = sigint.recv() => {
				debug!("Received SIGINT, cleaning up...");
				cleanup();
				std::process::exit(130); // 128 + SIGINT(2)
			}
		}
	});
}


// vim: ts=4
