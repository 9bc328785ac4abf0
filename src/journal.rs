//! Operator-facing log sinks
//!
//! `ProjectLog` is the human-readable log of one project, echoed to stdout
//! unless quiet. `EventLog` holds the machine-readable category files picked
//! up by log aggregation; their names are a compatibility surface.

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::logging::*;

/// Timestamp used in log and duplicate-folder names
pub fn time_stamp() -> String {
	Local::now().format("%Y-%m-%d_%H%M%S").to_string()
}

fn long_time_stamp() -> String {
	Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn append(path: &Path, text: &str) -> io::Result<()> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() && !parent.exists() {
			fs::create_dir_all(parent)?;
		}
	}
	let mut file = OpenOptions::new().create(true).append(true).open(path)?;
	file.write_all(text.as_bytes())
}

/// Human-readable log written to a set of files
#[derive(Debug, Clone, Default)]
pub struct ProjectLog {
	files: Vec<PathBuf>,
	quiet: bool,
}

impl ProjectLog {
	pub fn new(files: Vec<PathBuf>, quiet: bool) -> Self {
		Self { files, quiet }
	}

	/// A log that only echoes (or, when quiet, discards)
	pub fn console(quiet: bool) -> Self {
		Self { files: Vec::new(), quiet }
	}

	/// Open `<logs_dir>/<project>/<timestamp>.log`
	pub fn open(logs_dir: &Path, project: &str, quiet: bool) -> io::Result<Self> {
		let folder: String = project.chars().take(246).collect();
		let log_folder = logs_dir.join(folder);
		fs::create_dir_all(&log_folder)?;
		let path = log_folder.join(format!("{}.log", time_stamp()));
		Ok(Self::new(vec![path], quiet))
	}

	/// Same log, additionally copied to `extra`
	pub fn also_to(&self, extra: Option<&Path>) -> Self {
		let mut files = self.files.clone();
		if let Some(path) = extra {
			files.push(path.to_path_buf());
		}
		Self { files, quiet: self.quiet }
	}

	pub fn files(&self) -> &[PathBuf] {
		&self.files
	}

	/// Write text as-is
	pub fn raw(&self, text: &str) {
		debug!("{}", text.trim_end());
		if !self.quiet {
			print!("{}", text);
		}
		for path in &self.files {
			if let Err(e) = append(path, text) {
				warn!("Cannot write log {}: {}", path.display(), e);
			}
		}
	}

	/// Write one timestamped line
	pub fn line(&self, message: &str) {
		let mut text = format!("[{}] {}", long_time_stamp(), message);
		if !text.ends_with('\n') {
			text.push('\n');
		}
		self.raw(&text);
	}

	/// Header followed by one tab-indented item per line; nothing if empty
	pub fn list<S: AsRef<str>>(&self, header: &str, items: &[S]) {
		if items.is_empty() {
			return;
		}
		let mut text = String::from(header);
		for item in items {
			text.push_str("\n\t");
			text.push_str(item.as_ref());
		}
		text.push('\n');
		self.raw(&text);
	}
}

/// Machine-readable event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
	Renamed,
	Transferred,
	ThereAndDifferent,
	ThereButSame,
	Failed,
	Removed,
	TransferError,
	Errors,
}

impl Category {
	pub fn file_name(self) -> &'static str {
		match self {
			Category::Renamed => "renamed.txt",
			Category::Transferred => "transferred.txt",
			Category::ThereAndDifferent => "there_and_different.txt",
			Category::ThereButSame => "there_but_same.txt",
			Category::Failed => "failed.txt",
			Category::Removed => "removed.txt",
			Category::TransferError => "transfer_errors.txt",
			Category::Errors => "errors.txt",
		}
	}
}

/// Category files under one directory
#[derive(Debug, Clone, Default)]
pub struct EventLog {
	dir: Option<PathBuf>,
}

impl EventLog {
	pub fn new(dir: Option<PathBuf>) -> Self {
		Self { dir }
	}

	pub fn path(&self, category: Category) -> Option<PathBuf> {
		self.dir.as_ref().map(|d| d.join(category.file_name()))
	}

	/// Append one line per entry
	pub fn append<S: AsRef<str>>(&self, category: Category, lines: &[S]) {
		if lines.is_empty() {
			return;
		}
		let path = match self.path(category) {
			Some(path) => path,
			None => return,
		};
		let mut text = String::new();
		for line in lines {
			text.push_str(line.as_ref());
			text.push('\n');
		}
		if let Err(e) = append(&path, &text) {
			warn!("Cannot write event log {}: {}", path.display(), e);
		}
	}

	/// Renamed entries, in the `{Changed from: }old{to: }new` format
	pub fn renamed(&self, from: &Path, to: &Path) {
		self.append(
			Category::Renamed,
			&[format!("{{Changed from: }}{}{{to: }}{}", from.display(), to.display())],
		);
	}
}

/// All sinks for one project
#[derive(Debug, Clone, Default)]
pub struct Journal {
	pub project: ProjectLog,
	pub events: EventLog,
	/// Per-project rename log, only set when renaming
	pub rename_log: Option<PathBuf>,
	pub oversize_log: Option<PathBuf>,
}

impl Journal {
	/// Journal that writes nowhere, for tests and dry wiring
	pub fn silent() -> Self {
		Self { project: ProjectLog::console(true), ..Self::default() }
	}

	/// Record a path exceeding the length limit
	pub fn oversize(&self, path: &Path, len: usize) {
		let Some(log) = &self.oversize_log else {
			return;
		};
		let message = format!("Overlong directory found: {} is {} characters long.", path.display(), len);
		self.project.also_to(Some(log)).line(&message);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_project_log_writes_all_files() {
		let dir = TempDir::new().unwrap();
		let a = dir.path().join("a.log");
		let b = dir.path().join("nested/b.log");
		let log = ProjectLog::new(vec![a.clone()], true).also_to(Some(&b));

		log.raw("hello\n");
		log.list("Files transferred:", &["one", "two"]);

		let contents = fs::read_to_string(&a).unwrap();
		assert_eq!(contents, "hello\nFiles transferred:\n\tone\n\ttwo\n");
		assert_eq!(fs::read_to_string(&b).unwrap(), contents);
	}

	#[test]
	fn test_empty_list_not_logged() {
		let dir = TempDir::new().unwrap();
		let a = dir.path().join("a.log");
		let log = ProjectLog::new(vec![a.clone()], true);
		log.list::<&str>("Nothing:", &[]);
		assert!(!a.exists());
	}

	#[test]
	fn test_open_creates_project_folder() {
		let dir = TempDir::new().unwrap();
		let log = ProjectLog::open(dir.path(), "207042", true).unwrap();
		log.line("Processing 207042");

		let file = &log.files()[0];
		assert!(file.starts_with(dir.path().join("207042")));
		assert!(fs::read_to_string(file).unwrap().contains("Processing 207042"));
	}

	#[test]
	fn test_event_log_category_files() {
		let dir = TempDir::new().unwrap();
		let events = EventLog::new(Some(dir.path().to_path_buf()));

		events.append(Category::Transferred, &["proj/a.txt"]);
		events.renamed(Path::new("/h/proj/a?"), Path::new("/h/proj/a_"));

		assert_eq!(
			fs::read_to_string(dir.path().join("transferred.txt")).unwrap(),
			"proj/a.txt\n"
		);
		assert_eq!(
			fs::read_to_string(dir.path().join("renamed.txt")).unwrap(),
			"{Changed from: }/h/proj/a?{to: }/h/proj/a_\n"
		);
	}

	#[test]
	fn test_event_log_without_dir_is_noop() {
		let events = EventLog::new(None);
		assert_eq!(events.path(Category::Failed), None);
		events.append(Category::Failed, &["x"]);
	}
}

// vim: ts=4
