//! Filesystem move primitives
//!
//! All moves go through the `Mover` trait so transfer failures can be
//! injected in tests. `FsMover` renames, falling back to copy + delete when
//! source and destination live on different filesystems.

use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::journal::time_stamp;
use crate::logging::*;

/// Moves one file or directory tree
pub trait Mover: Send + Sync {
	fn move_path(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Real filesystem mover
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMover;

impl Mover for FsMover {
	fn move_path(&self, from: &Path, to: &Path) -> io::Result<()> {
		match fs::rename(from, to) {
			Ok(()) => Ok(()),
			Err(e) if is_cross_device(&e) => {
				debug!("Cross-device move {} -> {}", from.display(), to.display());
				copy_then_remove(from, to)
			}
			Err(e) => Err(e),
		}
	}
}

#[cfg(unix)]
fn is_cross_device(e: &io::Error) -> bool {
	e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(e: &io::Error) -> bool {
	e.kind() == io::ErrorKind::CrossesDevices
}

fn copy_file_keep_mtime(from: &Path, to: &Path) -> io::Result<()> {
	let meta = fs::metadata(from)?;
	fs::copy(from, to)?;
	filetime::set_file_mtime(to, FileTime::from_last_modification_time(&meta))
}

fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
	let meta = fs::symlink_metadata(from)?;
	if !meta.is_dir() {
		copy_file_keep_mtime(from, to)?;
		return fs::remove_file(from);
	}

	for entry in WalkDir::new(from).follow_links(false) {
		let entry = entry?;
		let relative = entry.path().strip_prefix(from).map_err(io::Error::other)?;
		let target = to.join(relative);
		if entry.file_type().is_dir() {
			fs::create_dir_all(&target)?;
		} else {
			copy_file_keep_mtime(entry.path(), &target)?;
		}
	}
	fs::remove_dir_all(from)
}

/// Move, creating the destination's parent directories if the first try
/// fails and they are missing
pub fn move_and_create(mover: &dyn Mover, from: &Path, to: &Path) -> io::Result<()> {
	match mover.move_path(from, to) {
		Ok(()) => Ok(()),
		Err(e) => match to.parent() {
			Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
				fs::create_dir_all(parent)?;
				mover.move_path(from, to)
			}
			_ => Err(e),
		},
	}
}

/// Remove every empty directory under `root`, deepest first, `root` included
///
/// Returns the removed directories.
pub fn prune_empty_dirs(root: &Path) -> io::Result<Vec<PathBuf>> {
	let mut removed = Vec::new();
	if !root.is_dir() {
		return Ok(removed);
	}

	for entry in WalkDir::new(root).follow_links(false).contents_first(true) {
		let entry = entry?;
		if !entry.file_type().is_dir() {
			continue;
		}
		let is_empty = fs::read_dir(entry.path())?.next().is_none();
		if is_empty {
			fs::remove_dir(entry.path())?;
			removed.push(entry.into_path());
		}
	}
	Ok(removed)
}

/// Destination in the problem area for `name`
///
/// Falls back to a fresh `Duplicates_<timestamp>` folder when `name` is
/// already quarantined there.
pub fn problem_destination(problem_dir: &Path, name: &str) -> io::Result<PathBuf> {
	let direct = problem_dir.join(name);
	if !direct.exists() {
		return Ok(direct);
	}

	let stamp = time_stamp();
	let mut duplicates = problem_dir.join(format!("Duplicates_{}", stamp));
	let mut n = 1;
	while duplicates.join(name).exists() {
		duplicates = problem_dir.join(format!("Duplicates_{}_{}", stamp, n));
		n += 1;
	}
	fs::create_dir_all(&duplicates)?;
	Ok(duplicates.join(name))
}


// vim: ts=4
