//! Staging and recursive sanitising of a project folder
//!
//! Moving the project into the staging area claims it: a later run finding
//! the same name already staged diverts its copy to the problem area
//! instead of touching the staged one.

use std::fs;
use std::path::{Path, PathBuf};

use crate::callbacks::BatchObserver;
use crate::config::Config;
use crate::error::{BatchFailure, NamingError, SanitiseError};
use crate::fs_ops::{move_and_create, problem_destination, Mover};
use crate::intake::HotFolder;
use crate::journal::{Category, Journal};
use crate::logging::*;
use crate::patterns::DeletionMatcher;
use crate::sanitise::{canonicalise, is_oversize, marker_line, sanitise, EntityKind, NameRegistry, PathEntity};
use crate::tree::DirTree;

/// A rename that was applied, paths relative to the staging area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRecord {
	pub from: PathBuf,
	pub to: PathBuf,
}

/// A project sitting in the staging area after sanitising
#[derive(Debug)]
pub struct StagedProject {
	/// Name it arrived with
	pub original_name: String,
	/// Name it has on disk now
	pub name: String,
	pub path: PathBuf,
	/// Some name contained illegal characters or whitespace
	pub errors_found: bool,
	pub illegal_count: usize,
	pub renamed: Vec<RenameRecord>,
	/// Sidecar files removed, relative to the staging area
	pub deleted: Vec<PathBuf>,
	pub naming_errors: Vec<NamingError>,
	pub oversize: Vec<PathBuf>,
}

pub struct TreeRelocator<'a> {
	config: &'a Config,
	hot: &'a HotFolder,
	matcher: &'a DeletionMatcher,
	mover: &'a dyn Mover,
	observer: &'a dyn BatchObserver,
	journal: &'a Journal,
}

impl<'a> TreeRelocator<'a> {
	pub fn new(
		config: &'a Config,
		hot: &'a HotFolder,
		matcher: &'a DeletionMatcher,
		mover: &'a dyn Mover,
		observer: &'a dyn BatchObserver,
		journal: &'a Journal,
	) -> Self {
		Self { config, hot, matcher, mover, observer, journal }
	}

	/// Claim `project` from the intake and sanitise every name in it
	pub fn stage(&self, project: &str) -> Result<StagedProject, SanitiseError> {
		let incoming = self.hot.to_archive.join(project);
		let slot = self.hot.staging.join(project);
		// A staged project may already carry the sanitised form of this name
		let canonical = sanitise(project).canonical;
		let claimed = slot.exists() || (!canonical.is_empty() && self.hot.staging.join(&canonical).exists());

		if claimed {
			let moved_to = problem_destination(&self.hot.problem, project)?;
			move_and_create(self.mover, &incoming, &moved_to)?;
			let failure = BatchFailure::AlreadyProcessing { project: project.to_string(), moved_to };
			self.journal.project.line(&failure.to_string());
			return Err(failure.into());
		}

		self.mover.move_path(&incoming, &slot)?;
		debug!("Staged {} at {}", project, slot.display());

		let mut staged = StagedProject {
			original_name: project.to_string(),
			name: project.to_string(),
			path: slot,
			errors_found: false,
			illegal_count: 0,
			renamed: Vec::new(),
			deleted: Vec::new(),
			naming_errors: Vec::new(),
			oversize: Vec::new(),
		};

		self.sanitise_top_level(&mut staged);
		self.sanitise_tree(&mut staged)?;
		Ok(staged)
	}

	fn sanitise_top_level(&self, staged: &mut StagedProject) {
		let mut registry = NameRegistry::new(false);
		let entity = canonicalise(&self.hot.staging, &staged.name, EntityKind::Directory, &mut registry);
		if entity.has_illegal() {
			staged.errors_found = true;
			staged.illegal_count += 1;
		}
		if !entity.needs_rename() {
			return;
		}

		let from = PathBuf::from(&entity.raw);
		let to = PathBuf::from(&entity.canonical);
		if self.apply(&self.hot.staging, &entity, &from, &to, staged) {
			staged.name = entity.canonical.clone();
			staged.path = self.hot.staging.join(&entity.canonical);
		}
	}

	fn sanitise_tree(&self, staged: &mut StagedProject) -> Result<(), SanitiseError> {
		let mut tree = DirTree::scan(&staged.path)?;
		let mut registry = NameRegistry::new(self.config.case_sensitive);
		let project = PathBuf::from(&staged.name);

		for idx in tree.post_order() {
			let node = tree.node(idx);
			let kind = node.kind;
			let parent_idx = node.parent.unwrap_or(0);
			let Some(raw) = node.name.to_str().map(str::to_string) else {
				warn!("Skipping unreadable name {:?}", node.name);
				continue;
			};
			let parent = tree.path(parent_idx);
			let relative = project.join(tree.relative_path(idx));

			if kind == EntityKind::File && self.matcher.matches(Path::new(&raw)) {
				match fs::remove_file(parent.join(&raw)) {
					Ok(()) => {
						self.journal.events.append(Category::Removed, &[relative.display().to_string()]);
						staged.deleted.push(relative);
					}
					Err(e) => warn!("Cannot remove {}: {}", relative.display(), e),
				}
				continue;
			}

			let entity = canonicalise(&parent, &raw, kind, &mut registry);
			if entity.has_illegal() {
				staged.errors_found = true;
				staged.illegal_count += 1;
			}

			let mut current = relative.clone();
			if entity.needs_rename() {
				let to = relative.with_file_name(&entity.canonical);
				if self.apply(&parent, &entity, &relative, &to, staged) {
					tree.set_name(idx, entity.canonical.as_str());
					current = to;
				}
			}

			if is_oversize(&current, self.config.max_path_len) {
				self.journal.oversize(&current, current.to_string_lossy().chars().count());
				staged.oversize.push(current);
			}
		}

		if !staged.deleted.is_empty() {
			self.journal.project.list(
				"Removed these files:",
				&staged.deleted.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
			);
		}
		Ok(())
	}

	/// Rename or, in log-only mode, report the suggested change
	///
	/// Returns true when the entry was renamed on disk.
	fn apply(&self, parent: &Path, entity: &PathEntity, from: &Path, to: &Path, staged: &mut StagedProject) -> bool {
		if !self.config.rename {
			self.journal.project.raw(&suggestion(entity, from, to));
			self.observer.on_renamed(from, to, false);
			return false;
		}

		let old = parent.join(&entity.raw);
		let new = parent.join(&entity.canonical);
		match self.mover.move_path(&old, &new) {
			Ok(()) => {
				let text = format!("Changed from: {}\nChanged to:   {}\n", from.display(), to.display());
				self.journal.project.also_to(self.journal.rename_log.as_deref()).raw(&text);
				self.journal.events.renamed(&old, &new);
				self.observer.on_renamed(from, to, true);
				staged.renamed.push(RenameRecord { from: from.to_path_buf(), to: to.to_path_buf() });
				true
			}
			Err(source) => {
				let error = NamingError { path: old, target: new, source };
				error!("{}", error);
				self.journal.project.line(&error.to_string());
				staged.naming_errors.push(error);
				false
			}
		}
	}
}

/// Log-only report for a name that needs changing
fn suggestion(entity: &PathEntity, from: &Path, to: &Path) -> String {
	let shown = from.display().to_string();
	let offset = shown.chars().count() - entity.raw.chars().count();
	let positions: Vec<usize> = entity.positions().into_iter().map(|p| p + offset).collect();
	let markers = marker_line(shown.chars().count(), &positions);
	let found = if entity.case_collision {
		"Case collision".to_string()
	} else {
		entity.characters_found().join(",")
	};

	format!(
		"Illegal characters found in file   : {}\n\
		 At these positions                 : {}\n\
		 Characters found (comma separated) : {}\n\
		 Suggested change                   : {}\n",
		shown,
		markers.trim_end(),
		found,
		to.display()
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::callbacks::NoObserver;
	use crate::fs_ops::FsMover;
	use crate::journal::{EventLog, ProjectLog};
	use std::io;
	use tempfile::TempDir;

	struct Fixture {
		_dir: TempDir,
		hot: HotFolder,
		log_file: PathBuf,
		events_dir: PathBuf,
		oversize_file: PathBuf,
	}

	/// Refuses to rename anything whose name ends in `bad`
	struct StubbornMover {
		bad: &'static str,
	}

	impl Mover for StubbornMover {
		fn move_path(&self, from: &Path, to: &Path) -> io::Result<()> {
			if from.ends_with(self.bad) {
				return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only share"));
			}
			FsMover.move_path(from, to)
		}
	}

	fn fixture() -> Fixture {
		let dir = TempDir::new().unwrap();
		let hot = HotFolder::new(&dir.path().join("hot"));
		hot.ensure().unwrap();
		let log_file = dir.path().join("project.log");
		let events_dir = dir.path().join("events");
		let oversize_file = dir.path().join("oversize.log");
		Fixture { _dir: dir, hot, log_file, events_dir, oversize_file }
	}

	impl Fixture {
		fn journal(&self) -> Journal {
			Journal {
				project: ProjectLog::new(vec![self.log_file.clone()], true),
				events: EventLog::new(Some(self.events_dir.clone())),
				oversize_log: Some(self.oversize_file.clone()),
				..Journal::default()
			}
		}

		fn stage(&self, config: &Config, project: &str) -> Result<StagedProject, SanitiseError> {
			self.stage_with(config, project, &FsMover)
		}

		fn stage_with(&self, config: &Config, project: &str, mover: &dyn Mover) -> Result<StagedProject, SanitiseError> {
			let matcher = DeletionMatcher::new(&config.delete_patterns).unwrap();
			let journal = self.journal();
			TreeRelocator::new(config, &self.hot, &matcher, mover, &NoObserver, &journal).stage(project)
		}

		fn log(&self) -> String {
			fs::read_to_string(&self.log_file).unwrap_or_default()
		}
	}

	fn renaming() -> Config {
		Config { rename: true, rename_log_dir: Some(PathBuf::from("/unused")), ..Config::default() }
	}

	#[test]
	fn test_stage_clean_project() {
		let fx = fixture();
		let project = fx.hot.to_archive.join("207042");
		fs::create_dir_all(project.join("Links")).unwrap();
		fs::write(project.join("Links/photo.jpg"), "jpg").unwrap();

		let staged = fx.stage(&Config::default(), "207042").unwrap();
		assert_eq!(staged.path, fx.hot.staging.join("207042"));
		assert!(!staged.errors_found);
		assert!(staged.path.join("Links/photo.jpg").exists());
		assert!(!project.exists());
	}

	#[test]
	fn test_log_only_reports_suggestion() {
		let fx = fixture();
		let project = fx.hot.to_archive.join("proj");
		fs::create_dir_all(&project).unwrap();
		fs::write(project.join("bad?name.txt"), "x").unwrap();

		let staged = fx.stage(&Config::default(), "proj").unwrap();
		assert!(staged.errors_found);
		assert_eq!(staged.illegal_count, 1);
		assert!(staged.path.join("bad?name.txt").exists());

		let log = fx.log();
		assert!(log.contains("Illegal characters found in file   : proj/bad?name.txt"));
		assert!(log.contains("At these positions                 :         ^"));
		assert!(log.contains("Characters found (comma separated) : ?"));
		assert!(log.contains("Suggested change                   : proj/bad_name.txt"));
	}

	#[test]
	fn test_rename_deepest_first() {
		let fx = fixture();
		let project = fx.hot.to_archive.join("proj");
		fs::create_dir_all(project.join("dir:one/sub*")).unwrap();
		fs::write(project.join("dir:one/sub*/file\t.txt"), "x").unwrap();

		let staged = fx.stage(&renaming(), "proj").unwrap();
		assert!(staged.errors_found);
		assert_eq!(staged.renamed.len(), 3);
		assert!(staged.path.join("dir-one/sub_/file .txt").exists());
		assert!(fx.log().contains("Changed from: proj/dir:one\nChanged to:   proj/dir-one\n"));

		let renamed = fs::read_to_string(fx.events_dir.join("renamed.txt")).unwrap();
		assert_eq!(renamed.lines().count(), 3);
	}

	#[test]
	fn test_rename_collision_index() {
		let fx = fixture();
		let project = fx.hot.to_archive.join("proj");
		for name in ["multi", "multi*", "multi?"] {
			fs::create_dir_all(project.join(name)).unwrap();
		}

		let staged = fx.stage(&renaming(), "proj").unwrap();
		assert!(staged.path.join("multi").is_dir());
		assert!(staged.path.join("multi_").is_dir());
		assert!(staged.path.join("multi_(1)").is_dir());
	}

	#[test]
	fn test_top_level_name_sanitised() {
		let fx = fixture();
		fs::create_dir_all(fx.hot.to_archive.join("job:12 ")).unwrap();

		let staged = fx.stage(&renaming(), "job:12 ").unwrap();
		assert_eq!(staged.original_name, "job:12 ");
		assert_eq!(staged.name, "job-12");
		assert!(fx.hot.staging.join("job-12").is_dir());
	}

	#[test]
	fn test_sidecar_files_deleted() {
		let fx = fixture();
		let project = fx.hot.to_archive.join("proj");
		fs::create_dir_all(project.join("sub")).unwrap();
		fs::write(project.join(".DS_Store"), "x").unwrap();
		fs::write(project.join("sub/._photo.jpg"), "x").unwrap();
		fs::write(project.join("sub/photo.jpg"), "x").unwrap();

		let staged = fx.stage(&Config::default(), "proj").unwrap();
		assert_eq!(staged.deleted.len(), 2);
		assert!(!staged.path.join(".DS_Store").exists());
		assert!(staged.path.join("sub/photo.jpg").exists());
		assert!(!staged.errors_found);

		let removed = fs::read_to_string(fx.events_dir.join("removed.txt")).unwrap();
		assert!(removed.contains("proj/sub/._photo.jpg"));
	}

	#[test]
	fn test_already_staged_goes_to_problem() {
		let fx = fixture();
		fs::create_dir_all(fx.hot.staging.join("proj")).unwrap();
		fs::write(fx.hot.staging.join("proj/marker"), "first").unwrap();
		fs::create_dir_all(fx.hot.to_archive.join("proj")).unwrap();
		fs::write(fx.hot.to_archive.join("proj/marker"), "second").unwrap();

		match fx.stage(&Config::default(), "proj") {
			Err(SanitiseError::Batch(BatchFailure::AlreadyProcessing { project, moved_to })) => {
				assert_eq!(project, "proj");
				assert_eq!(moved_to, fx.hot.problem.join("proj"));
			}
			other => panic!("expected already processing, got {:?}", other),
		}
		assert_eq!(fs::read_to_string(fx.hot.staging.join("proj/marker")).unwrap(), "first");
		assert_eq!(fs::read_to_string(fx.hot.problem.join("proj/marker")).unwrap(), "second");
		assert!(fx.log().contains("is already being processed"));
	}

	#[test]
	fn test_oversize_paths_flagged() {
		let fx = fixture();
		let project = fx.hot.to_archive.join("proj");
		fs::create_dir_all(&project).unwrap();
		fs::write(project.join("x".repeat(30)), "x").unwrap();

		let config = Config { max_path_len: 20, ..Config::default() };
		let staged = fx.stage(&config, "proj").unwrap();
		assert_eq!(staged.oversize, vec![PathBuf::from("proj").join("x".repeat(30))]);

		let oversize = fs::read_to_string(&fx.oversize_file).unwrap();
		assert_eq!(oversize.lines().count(), 1);
		assert!(oversize.contains(&format!("Overlong directory found: proj/{} is 35 characters long.", "x".repeat(30))));
		assert!(fx.log().contains("Overlong directory found"));
	}

	#[test]
	fn test_failed_rename_keeps_old_name_and_continues() {
		let fx = fixture();
		let project = fx.hot.to_archive.join("proj");
		fs::create_dir_all(project.join("dir:one")).unwrap();
		fs::write(project.join("dir:one/locked?.txt"), "x").unwrap();
		fs::write(project.join("dir:one/free?.txt"), "x").unwrap();

		let mover = StubbornMover { bad: "locked?.txt" };
		let staged = fx.stage_with(&renaming(), "proj", &mover).unwrap();

		assert!(staged.path.join("dir-one/locked?.txt").exists());
		assert!(!staged.path.join("dir-one/locked_.txt").exists());
		assert!(staged.path.join("dir-one/free_.txt").exists());
		assert_eq!(staged.renamed.len(), 2);
		assert_eq!(staged.naming_errors.len(), 1);
		assert!(staged.naming_errors[0].path.ends_with("locked?.txt"));
		assert!(staged.errors_found);
		assert!(fx.log().contains("Error: unable to rename"));
	}

	#[test]
	fn test_staged_canonical_name_counts_as_claimed() {
		let fx = fixture();
		fs::create_dir_all(fx.hot.staging.join("job-12")).unwrap();
		fs::create_dir_all(fx.hot.to_archive.join("job:12")).unwrap();

		match fx.stage(&renaming(), "job:12") {
			Err(SanitiseError::Batch(BatchFailure::AlreadyProcessing { moved_to, .. })) => {
				assert_eq!(moved_to, fx.hot.problem.join("job:12"));
			}
			other => panic!("expected already processing, got {:?}", other),
		}
		assert!(!fx.hot.staging.join("job-12(1)").exists());
		assert!(fx.hot.problem.join("job:12").is_dir());
	}
}

// vim: ts=4
