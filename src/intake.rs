//! Hot-folder layout and project pick

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

use crate::logging::*;

pub const TO_ARCHIVE: &str = "To Archive";
pub const LOGS: &str = "Logs";
pub const PROBLEM_FILES: &str = "Problem Files";
pub const STAGING: &str = ".Hidden";
pub const TRANSFER_ERRORS: &str = "_Transfer_Errors";

/// Directory layout under the hot-folder root
#[derive(Debug, Clone)]
pub struct HotFolder {
	pub root: PathBuf,
	pub to_archive: PathBuf,
	pub logs: PathBuf,
	pub problem: PathBuf,
	pub staging: PathBuf,
	pub transfer_errors: PathBuf,
}

impl HotFolder {
	pub fn new(root: &Path) -> Self {
		let problem = root.join(PROBLEM_FILES);
		Self {
			root: root.to_path_buf(),
			to_archive: root.join(TO_ARCHIVE),
			logs: root.join(LOGS),
			transfer_errors: problem.join(TRANSFER_ERRORS),
			problem,
			staging: root.join(STAGING),
		}
	}

	/// Create any missing layout directory
	pub fn ensure(&self) -> io::Result<()> {
		for dir in [&self.to_archive, &self.logs, &self.problem, &self.staging, &self.transfer_errors] {
			if !dir.is_dir() {
				info!("Creating {}", dir.display());
				fs::create_dir_all(dir)?;
			}
		}
		Ok(())
	}

	/// First project folder waiting in the intake, by name
	///
	/// Plain files in the intake are ignored.
	pub fn next_project(&self) -> io::Result<Option<String>> {
		Ok(immediate_subdirs(&self.to_archive)?.into_iter().next())
	}

	/// Folders left in the staging area
	pub fn staged(&self) -> io::Result<Vec<String>> {
		immediate_subdirs(&self.staging)
	}
}

/// Names of the directories directly inside `dir`, sorted
///
/// Names that are not valid UTF-8 are skipped with a warning.
pub fn immediate_subdirs(dir: &Path) -> io::Result<Vec<String>> {
	let mut names = Vec::new();
	for entry in fs::read_dir(dir)? {
		let entry = entry?;
		if !entry.file_type()?.is_dir() {
			continue;
		}
		match entry.file_name().into_string() {
			Ok(name) => names.push(name),
			Err(raw) => warn!("Skipping folder with unreadable name {:?}", raw),
		}
	}
	names.sort();
	Ok(names)
}

/// Whether anything under `dir` was modified within `window` of now
pub fn is_being_written_to(dir: &Path, window: Duration) -> io::Result<bool> {
	let now = SystemTime::now();
	for entry in WalkDir::new(dir).follow_links(false) {
		let entry = entry?;
		let modified = entry.metadata().map_err(io::Error::from)?.modified()?;
		// Future timestamps count as fresh
		let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
		if age < window {
			return Ok(true);
		}
	}
	Ok(false)
}


// vim: ts=4
