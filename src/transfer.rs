//! Moving cleared files into the archive
//!
//! Each file gets a bounded number of attempts. The first file to exhaust
//! its attempts stops the whole transfer; files after it are not tried.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::callbacks::BatchObserver;
use crate::error::TransferError;
use crate::fs_ops::{move_and_create, prune_empty_dirs, Mover};
use crate::journal::{Category, Journal};
use crate::logging::*;
use crate::tree::DirTree;

/// How a single move ended
///
/// A move that never succeeds is reported as a `TransferError` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
	Succeeded,
	RetriedThenSucceeded { attempts: u32 },
	/// Source disappeared between reconciliation and the move
	Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
	pub relative: PathBuf,
	pub outcome: TransferOutcome,
}

impl TransferRecord {
	pub fn moved(&self) -> bool {
		self.outcome != TransferOutcome::Skipped
	}
}

pub struct TransferExecutor<'a> {
	mover: &'a dyn Mover,
	retries: u32,
	delay: Duration,
	observer: &'a dyn BatchObserver,
	journal: &'a Journal,
}

impl<'a> TransferExecutor<'a> {
	pub fn new(
		mover: &'a dyn Mover,
		retries: u32,
		delay: Duration,
		observer: &'a dyn BatchObserver,
		journal: &'a Journal,
	) -> Self {
		Self { mover, retries: retries.max(1), delay, observer, journal }
	}

	/// Move one path, retrying up to the configured bound
	///
	/// Returns the number of attempts used, or the last error.
	fn attempt(&self, relative: &Path, from: &Path, to: &Path) -> Result<u32, (u32, io::Error)> {
		let mut attempt = 1;
		loop {
			match self.mover.move_path(from, to) {
				Ok(()) => {
					self.observer.on_transfer_attempt(relative, attempt, true);
					return Ok(attempt);
				}
				Err(e) => {
					self.observer.on_transfer_attempt(relative, attempt, false);
					warn!("Move attempt {} of {} failed: {}", attempt, from.display(), e);
					self.journal.project.line(&format!(
						"RETRY {}: {} could not be moved to {}: {}",
						attempt,
						from.display(),
						to.display(),
						e
					));
					if attempt >= self.retries {
						return Err((attempt, e));
					}
				}
			}
			attempt += 1;
			if !self.delay.is_zero() {
				thread::sleep(self.delay);
			}
		}
	}

	fn fail(&self, relative: &Path, from: &Path, attempts: u32, source: io::Error, moved: Vec<PathBuf>) -> TransferError {
		self.journal.project.line(&format!(
			"FAILURE: {} failed to transfer after {} attempts",
			from.display(),
			attempts
		));
		self.journal
			.events
			.append(Category::Failed, &[format!("{} failed after {} attempts", from.display(), attempts)]);
		TransferError { relative: relative.to_path_buf(), attempts, moved, source }
	}

	fn moved(&self, relative: &Path, to: &Path) {
		self.observer.on_file_moved(relative);
		self.journal.events.append(Category::Transferred, &[to.display().to_string()]);
	}

	/// Move each relative path from `source_root` to `dest_root`, in order
	pub fn move_files(
		&self,
		source_root: &Path,
		dest_root: &Path,
		relative_paths: &[PathBuf],
	) -> Result<Vec<TransferRecord>, TransferError> {
		let mut records = Vec::with_capacity(relative_paths.len());
		let mut moved = Vec::new();

		for relative in relative_paths {
			let from = source_root.join(relative);
			let to = dest_root.join(relative);

			if fs::symlink_metadata(&from).is_err() {
				// Resource forks can vanish together with their data file
				self.journal.project.line(&format!("{} no longer exists, skipped", from.display()));
				records.push(TransferRecord { relative: relative.clone(), outcome: TransferOutcome::Skipped });
				continue;
			}

			match self.attempt(relative, &from, &to) {
				Ok(attempts) => {
					self.moved(relative, &to);
					moved.push(relative.clone());
					let outcome = if attempts == 1 {
						TransferOutcome::Succeeded
					} else {
						TransferOutcome::RetriedThenSucceeded { attempts }
					};
					records.push(TransferRecord { relative: relative.clone(), outcome });
				}
				Err((attempts, e)) => return Err(self.fail(relative, &from, attempts, e, moved)),
			}
		}
		Ok(records)
	}

	/// Move a whole tree in one rename; `files` are the files it contains
	pub fn move_tree(&self, source: &Path, dest: &Path, files: &[PathBuf]) -> Result<Vec<TransferRecord>, TransferError> {
		let top = PathBuf::new();
		if let Some(parent) = dest.parent() {
			if let Err(e) = fs::create_dir_all(parent) {
				return Err(self.fail(&top, source, 0, e, Vec::new()));
			}
		}

		let attempts = match self.attempt(&top, source, dest) {
			Ok(attempts) => attempts,
			Err((attempts, e)) => return Err(self.fail(&top, source, attempts, e, Vec::new())),
		};

		let outcome = if attempts == 1 {
			TransferOutcome::Succeeded
		} else {
			TransferOutcome::RetriedThenSucceeded { attempts }
		};
		Ok(files
			.iter()
			.map(|relative| {
				self.moved(relative, &dest.join(relative));
				TransferRecord { relative: relative.clone(), outcome }
			})
			.collect())
	}

	/// Move every file still under `source_root` to `quarantine`, keeping
	/// relative paths, then drop the emptied directories
	///
	/// Individual failures are logged and skipped. Returns the files moved.
	pub fn relocate_remaining(&self, source_root: &Path, quarantine: &Path) -> io::Result<Vec<PathBuf>> {
		let mut relocated = Vec::new();
		if !source_root.exists() {
			return Ok(relocated);
		}

		let tree = DirTree::scan(source_root)?;
		for idx in tree.files_under(0) {
			let relative = tree.relative_path(idx);
			let from = tree.path(idx);
			let to = quarantine.join(&relative);
			match move_and_create(self.mover, &from, &to) {
				Ok(()) => {
					self.journal.events.append(
						Category::TransferError,
						&[format!("{{MovedTo:}}{}", to.display())],
					);
					relocated.push(relative);
				}
				Err(e) => {
					error!("Cannot quarantine {}: {}", from.display(), e);
					self.journal
						.project
						.line(&format!("Error: unable to move {} to {}: {}", from.display(), to.display(), e));
				}
			}
		}

		prune_empty_dirs(source_root)?;
		Ok(relocated)
	}
}


// vim: ts=4
