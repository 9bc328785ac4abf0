//! Orchestrator: one project per invocation
//!
//! `Idle -> Staging -> Reconciling -> Transferring -> Finalizing -> Idle`.
//! Batch failures coming back from a stage are turned into a quarantine
//! outcome here; only unexpected errors leave `run_once`.

use chrono::{DateTime, Local};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::callbacks::{BatchObserver, NoObserver};
use crate::config::Config;
use crate::error::{BatchFailure, ConfigError, SanitiseError};
use crate::fs_ops::{move_and_create, problem_destination, prune_empty_dirs, FsMover, Mover};
use crate::hash::{Blake3Hasher, ContentHasher};
use crate::intake::{is_being_written_to, HotFolder};
use crate::journal::{Category, EventLog, Journal, ProjectLog};
use crate::logging::*;
use crate::patterns::DeletionMatcher;
use crate::reconcile::{ConflictReport, FileRecord, Reconciliation, ReconciliationWalker};
use crate::relocate::{StagedProject, TreeRelocator};
use crate::transfer::{TransferExecutor, TransferRecord};

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Idle,
	Staging,
	Reconciling,
	Transferring,
	Finalizing,
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Phase::Idle => "idle",
			Phase::Staging => "staging",
			Phase::Reconciling => "reconciling",
			Phase::Transferring => "transferring",
			Phase::Finalizing => "finalizing",
		};
		write!(f, "{}", name)
	}
}

/// A project that reached the archive
#[derive(Debug, Clone, Default)]
pub struct ProjectBatch {
	pub original_name: String,
	pub name: String,
	pub staged_path: PathBuf,
	pub destination: PathBuf,
	pub errors_found: bool,
	pub renamed: usize,
	/// Moved into the archive, relative to the project
	pub transferred: Vec<PathBuf>,
	/// Already archived with the same content; dropped from the source
	pub identical: Vec<PathBuf>,
	/// Overwrote a differing archive file under trust policy
	pub trusted: Vec<PathBuf>,
	/// Sidecar files deleted during staging
	pub deleted: Vec<PathBuf>,
}

/// What one invocation did
#[derive(Debug)]
pub enum BatchOutcome {
	/// Nothing waiting in the intake
	Idle,
	/// The picked project is still being written to
	Busy { project: String },
	Archived(ProjectBatch),
	/// Diverted away from the archive
	Quarantined { project: String, location: PathBuf, reason: BatchFailure },
}

/// Sequences staging, reconciliation and transfer for one project
pub struct Orchestrator {
	config: Config,
	hot: HotFolder,
	matcher: DeletionMatcher,
	events: EventLog,
	mover: Arc<dyn Mover>,
	hasher: Arc<dyn ContentHasher>,
	observer: Arc<dyn BatchObserver>,
}

impl Orchestrator {
	pub fn new(config: Config) -> Result<Self, SanitiseError> {
		let matcher = DeletionMatcher::new(&config.delete_patterns).map_err(|e| ConfigError::InvalidValue {
			option: "deletePatterns",
			message: e.to_string(),
		})?;
		Ok(Self {
			hot: HotFolder::new(&config.target),
			events: EventLog::new(Some(config.logstash_dir.clone())),
			matcher,
			config,
			mover: Arc::new(FsMover),
			hasher: Arc::new(Blake3Hasher),
			observer: Arc::new(NoObserver),
		})
	}

	pub fn with_mover(mut self, mover: Arc<dyn Mover>) -> Self {
		self.mover = mover;
		self
	}

	pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
		self.hasher = hasher;
		self
	}

	pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
		self.observer = observer;
		self
	}

	pub fn hot_folder(&self) -> &HotFolder {
		&self.hot
	}

	fn temp_log(&self) -> ProjectLog {
		ProjectLog::new(vec![self.config.temp_log_file.clone()], self.config.quiet)
	}

	fn enter(&self, phase: Phase, project: &str) {
		debug!("{}: {}", project, phase);
		self.observer.on_phase(phase, project);
	}

	/// Process at most one project from the intake
	pub fn run_once(&self) -> Result<BatchOutcome, SanitiseError> {
		self.hot.ensure()?;

		let project = match self.hot.next_project()? {
			Some(project) => project,
			None => {
				debug!("Nothing to process in {}", self.hot.to_archive.display());
				return Ok(BatchOutcome::Idle);
			}
		};

		let incoming = self.hot.to_archive.join(&project);
		if is_being_written_to(&incoming, self.config.settle_window())? {
			self.temp_log().line(&format!("{} is being written to. Skipping this time.", project));
			return Ok(BatchOutcome::Busy { project });
		}

		let journal = Journal {
			project: ProjectLog::open(&self.hot.logs, &project, self.config.quiet)?,
			events: self.events.clone(),
			rename_log: self.config.rename_log_file(&project),
			oversize_log: self.config.oversize_log.clone(),
		};
		journal.project.line(&format!("Processing {}", project));

		let outcome = self.process(&project, &journal);
		self.enter(Phase::Idle, &project);
		outcome
	}

	fn process(&self, project: &str, journal: &Journal) -> Result<BatchOutcome, SanitiseError> {
		self.enter(Phase::Staging, project);
		let relocator = TreeRelocator::new(
			&self.config,
			&self.hot,
			&self.matcher,
			self.mover.as_ref(),
			self.observer.as_ref(),
			journal,
		);
		let staged = match relocator.stage(project) {
			Ok(staged) => staged,
			Err(SanitiseError::Batch(BatchFailure::AlreadyProcessing { project, moved_to })) => {
				return Ok(BatchOutcome::Quarantined {
					location: moved_to.clone(),
					reason: BatchFailure::AlreadyProcessing { project: project.clone(), moved_to },
					project,
				});
			}
			Err(e) => return Err(e),
		};

		if staged.errors_found && !self.config.rename {
			self.enter(Phase::Finalizing, project);
			let reason = BatchFailure::IllegalNames { project: staged.name.clone(), count: staged.illegal_count };
			let location = self.quarantine(&staged, journal)?;
			journal.project.line(&format!(
				"{} contains illegal names and renaming is off. It has been moved to {}",
				staged.name,
				location.display()
			));
			return Ok(BatchOutcome::Quarantined { project: staged.name, location, reason });
		}

		self.enter(Phase::Reconciling, project);
		let destination = self.config.pass_dir.join(&staged.name);
		let walker = ReconciliationWalker::new(self.config.trust_source, self.hasher.as_ref(), self.observer.as_ref());
		let reconciliation = match walker.reconcile(&staged.path, &destination) {
			Ok(reconciliation) => reconciliation,
			Err(SanitiseError::Batch(BatchFailure::Conflict(report))) => {
				self.enter(Phase::Finalizing, project);
				self.report_conflicts(&report, journal);
				let location = self.quarantine(&staged, journal)?;
				journal.project.line(&format!("{} has been moved to {}", staged.name, location.display()));
				return Ok(BatchOutcome::Quarantined {
					project: staged.name,
					location,
					reason: BatchFailure::Conflict(report),
				});
			}
			Err(e) => return Err(e),
		};

		self.enter(Phase::Transferring, project);
		let executor = TransferExecutor::new(
			self.mover.as_ref(),
			self.config.retries,
			self.config.retry_delay(),
			self.observer.as_ref(),
			journal,
		);

		let mut batch = ProjectBatch {
			original_name: staged.original_name.clone(),
			name: staged.name.clone(),
			staged_path: staged.path.clone(),
			destination: destination.clone(),
			errors_found: staged.errors_found,
			renamed: staged.renamed.len(),
			deleted: staged.deleted.clone(),
			..ProjectBatch::default()
		};

		let moved = match reconciliation {
			Reconciliation::Fresh { files } => executor.move_tree(&staged.path, &destination, &files),
			Reconciliation::Merge(plan) => {
				batch.trusted = plan.trusted().iter().map(|e| e.relative.clone()).collect();
				batch.identical = plan.identical().iter().map(|e| e.relative.clone()).collect();
				if !batch.trusted.is_empty() {
					let pairs: Vec<(&Path, &FileRecord, &FileRecord)> = plan
						.trusted()
						.into_iter()
						.filter_map(|e| match (&e.source, &e.destination) {
							(Some(s), Some(d)) => Some((e.relative.as_path(), s, d)),
							_ => None,
						})
						.collect();
					journal.project.raw(&render_pairs(
						&format!(
							"These files differ from {} and will be transferred since trust source is set:",
							destination.display()
						),
						&pairs,
					));
				}
				executor.move_files(&staged.path, &destination, &plan.to_transfer())
			}
		};

		let records: Vec<TransferRecord> = match moved {
			Ok(records) => records,
			Err(e) => {
				self.enter(Phase::Finalizing, project);
				let quarantine = self.hot.transfer_errors.join(&staged.name);
				let relocated = executor.relocate_remaining(&staged.path, &quarantine)?;
				journal.project.list(
					&format!("Transferred before the failure to {}:", destination.display()),
					&display_all(&e.moved),
				);
				journal.project.line(&format!(
					"{} files could not be transferred and have been moved to {}",
					relocated.len(),
					quarantine.display()
				));
				return Ok(BatchOutcome::Quarantined {
					project: staged.name,
					location: quarantine,
					reason: BatchFailure::Transfer(e),
				});
			}
		};

		self.enter(Phase::Finalizing, project);
		batch.transferred = records.into_iter().filter(|r| r.moved()).map(|r| r.relative).collect();
		self.drop_identical(&staged, &batch.identical, journal);
		prune_empty_dirs(&staged.path)?;

		journal.project.list(
			&format!("Files transferred to {}:", destination.display()),
			&display_all(&batch.transferred),
		);
		if staged.path.exists() {
			warn!("{} still has content after transfer", staged.path.display());
		}
		info!("{} archived to {}", staged.name, destination.display());
		Ok(BatchOutcome::Archived(batch))
	}

	/// Move the staged project to the problem area
	fn quarantine(&self, staged: &StagedProject, journal: &Journal) -> Result<PathBuf, SanitiseError> {
		let location = problem_destination(&self.hot.problem, &staged.name)?;
		move_and_create(self.mover.as_ref(), &staged.path, &location)?;
		journal.project.line(&format!("Moved {} to {}", staged.path.display(), location.display()));
		Ok(location)
	}

	fn report_conflicts(&self, report: &ConflictReport, journal: &Journal) {
		let pairs: Vec<(&Path, &FileRecord, &FileRecord)> =
			report.pairs.iter().map(|p| (p.relative.as_path(), &p.source, &p.destination)).collect();
		let mut text = render_pairs(
			&format!("These files already exist in {} and are different:", report.destination.display()),
			&pairs,
		);
		text.push_str("Please version these files and attempt the upload again.\n");
		journal.project.raw(&text);

		let sources: Vec<String> = report.pairs.iter().map(|p| p.source.path.display().to_string()).collect();
		journal.events.append(Category::ThereAndDifferent, &sources);
	}

	fn drop_identical(&self, staged: &StagedProject, identical: &[PathBuf], journal: &Journal) {
		let mut dropped = Vec::new();
		for relative in identical {
			let path = staged.path.join(relative);
			match fs::remove_file(&path) {
				Ok(()) => dropped.push(path.display().to_string()),
				Err(e) => warn!("Cannot remove identical file {}: {}", path.display(), e),
			}
		}
		journal.project.list("These files already exist in the archive and are identical:", &display_all(identical));
		journal.events.append(Category::ThereButSame, &dropped);
	}

	/// Move everything left in the staging area to the problem area
	pub fn clean_up(&self) -> io::Result<Vec<PathBuf>> {
		purge_staging(&self.hot, self.mover.as_ref(), &self.temp_log())
	}
}

/// Move every folder left in staging to the problem area
///
/// Used after each run and from the signal handler.
pub fn purge_staging(hot: &HotFolder, mover: &dyn Mover, log: &ProjectLog) -> io::Result<Vec<PathBuf>> {
	let mut moved = Vec::new();
	if !hot.staging.is_dir() {
		return Ok(moved);
	}
	for name in hot.staged()? {
		let location = problem_destination(&hot.problem, &name)?;
		match move_and_create(mover, &hot.staging.join(&name), &location) {
			Ok(()) => {
				log.line(&format!("{} was left in staging. It has been moved to {}", name, location.display()));
				moved.push(location);
			}
			Err(e) => error!("Cannot move {} out of staging: {}", name, e),
		}
	}
	Ok(moved)
}

fn display_all(paths: &[PathBuf]) -> Vec<String> {
	paths.iter().map(|p| p.display().to_string()).collect()
}

fn describe(record: &FileRecord) -> String {
	let modified: DateTime<Local> = record.modified.into();
	let mut text = format!("{} bytes, modified {}", record.size, modified.format("%Y-%m-%d %H:%M:%S%.3f"));
	if let Some(hash) = record.known_hash() {
		text.push_str(&format!(", hash {}", hash.to_hex()));
	}
	text
}

fn render_pairs(header: &str, pairs: &[(&Path, &FileRecord, &FileRecord)]) -> String {
	let mut text = format!("{}\n", header);
	for (relative, source, destination) in pairs {
		text.push_str(&format!(
			"\t{}\n\t\tincoming: {}\n\t\tarchived: {}\n",
			relative.display(),
			describe(source),
			describe(destination)
		));
	}
	text
}


// vim: ts=4
