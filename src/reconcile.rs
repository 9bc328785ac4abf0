//! Reconciliation of a staged project against the archive
//!
//! Every staged file is compared with its counterpart under the destination
//! using size and modification time, with a content hash as the tie-breaker
//! for same-size files. A single `Conflicting` file aborts the whole batch.

use std::cell::OnceCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::callbacks::BatchObserver;
use crate::error::{BatchFailure, SanitiseError};
use crate::hash::{ContentHash, ContentHasher};
use crate::logging::*;
use crate::sanitise::EntityKind;
use crate::tree::DirTree;

/// Modification times closer than this count as equal
pub const MTIME_TOLERANCE: Duration = Duration::from_millis(10);

/// Size, mtime and lazily computed hash of one file
#[derive(Debug, Clone)]
pub struct FileRecord {
	pub path: PathBuf,
	pub kind: EntityKind,
	pub size: u64,
	pub modified: SystemTime,
	hash: OnceCell<ContentHash>,
}

impl FileRecord {
	pub fn read(path: &Path) -> io::Result<Self> {
		let meta = fs::symlink_metadata(path)?;
		let kind = if meta.is_dir() { EntityKind::Directory } else { EntityKind::File };
		Ok(Self {
			path: path.to_path_buf(),
			kind,
			size: meta.len(),
			modified: meta.modified()?,
			hash: OnceCell::new(),
		})
	}

	/// Content hash, computed on first use only
	pub fn content_hash(&self, hasher: &dyn ContentHasher) -> io::Result<ContentHash> {
		if let Some(hash) = self.hash.get() {
			return Ok(*hash);
		}
		let hash = hasher.hash_file(&self.path)?;
		Ok(*self.hash.get_or_init(|| hash))
	}

	/// Hash if it was already needed
	pub fn known_hash(&self) -> Option<ContentHash> {
		self.hash.get().copied()
	}

	pub fn same_mtime(&self, other: &FileRecord) -> bool {
		let diff = match self.modified.duration_since(other.modified) {
			Ok(d) => d,
			Err(e) => e.duration(),
		};
		diff < MTIME_TOLERANCE
	}
}

/// Outcome of comparing one source entry with the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
	/// No counterpart in the archive
	Cleared,
	/// Same content already archived; source is dropped
	Identical,
	/// Counterpart differs and trust policy does not cover it
	Conflicting,
	/// Counterpart differs, source is not smaller and trusted
	TrustedOverwrite,
}

impl Classification {
	pub fn transfers(self) -> bool {
		matches!(self, Classification::Cleared | Classification::TrustedOverwrite)
	}
}

/// Compare a source file with its existing counterpart
pub fn classify(
	source: &FileRecord,
	destination: &FileRecord,
	trust_source: bool,
	hasher: &dyn ContentHasher,
) -> io::Result<Classification> {
	if source.kind != destination.kind {
		return Ok(Classification::Conflicting);
	}
	if source.size == destination.size && source.same_mtime(destination) {
		return Ok(Classification::Identical);
	}
	if source.size < destination.size {
		return Ok(Classification::Conflicting);
	}
	if trust_source {
		return Ok(Classification::TrustedOverwrite);
	}
	if source.size == destination.size
		&& source.content_hash(hasher)? == destination.content_hash(hasher)?
	{
		return Ok(Classification::Identical);
	}
	Ok(Classification::Conflicting)
}

/// One classified source entry
#[derive(Debug, Clone)]
pub struct Reconciled {
	pub relative: PathBuf,
	pub kind: EntityKind,
	pub classification: Classification,
	pub source: Option<FileRecord>,
	pub destination: Option<FileRecord>,
}

/// A source file and the differing archive file it would replace
#[derive(Debug, Clone)]
pub struct ConflictPair {
	pub relative: PathBuf,
	pub source: FileRecord,
	pub destination: FileRecord,
}

/// Every conflict found in one project
#[derive(Debug, Clone)]
pub struct ConflictReport {
	pub source_root: PathBuf,
	pub destination: PathBuf,
	pub pairs: Vec<ConflictPair>,
}

/// Result of a conflict-free reconciliation
#[derive(Debug)]
pub enum Reconciliation {
	/// Destination absent; the whole tree moves in one step
	Fresh { files: Vec<PathBuf> },
	/// Destination present; entries classified one by one
	Merge(ReconcilePlan),
}

/// Classified entries in walk order
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
	pub destination: PathBuf,
	pub entries: Vec<Reconciled>,
}

impl ReconcilePlan {
	fn select(&self, wanted: impl Fn(Classification) -> bool) -> Vec<&Reconciled> {
		self.entries.iter().filter(|e| wanted(e.classification)).collect()
	}

	/// Relative paths to move, in walk order
	pub fn to_transfer(&self) -> Vec<PathBuf> {
		self.select(Classification::transfers).into_iter().map(|e| e.relative.clone()).collect()
	}

	pub fn identical(&self) -> Vec<&Reconciled> {
		self.select(|c| c == Classification::Identical)
	}

	pub fn trusted(&self) -> Vec<&Reconciled> {
		self.select(|c| c == Classification::TrustedOverwrite)
	}
}

/// Walks a staged tree against the archive
pub struct ReconciliationWalker<'a> {
	trust_source: bool,
	hasher: &'a dyn ContentHasher,
	observer: &'a dyn BatchObserver,
}

impl<'a> ReconciliationWalker<'a> {
	pub fn new(trust_source: bool, hasher: &'a dyn ContentHasher, observer: &'a dyn BatchObserver) -> Self {
		Self { trust_source, hasher, observer }
	}

	/// Classify everything under `source` against `destination`
	///
	/// Any conflict is returned as `BatchFailure::Conflict` listing every
	/// differing pair; nothing is moved or deleted here.
	pub fn reconcile(&self, source: &Path, destination: &Path) -> Result<Reconciliation, SanitiseError> {
		let tree = DirTree::scan(source)?;

		if !destination.exists() {
			let files: Vec<PathBuf> = tree.files_under(0).into_iter().map(|i| tree.relative_path(i)).collect();
			for file in &files {
				self.observer.on_classified(file, Classification::Cleared);
			}
			debug!("{} not archived yet, {} files cleared", destination.display(), files.len());
			return Ok(Reconciliation::Fresh { files });
		}

		let mut entries = Vec::new();
		let mut stack: Vec<usize> = tree.node(0).children.iter().rev().copied().collect();
		while let Some(idx) = stack.pop() {
			let node = tree.node(idx);
			let relative = tree.relative_path(idx);
			let dest_path = destination.join(&relative);

			let dest_record = match FileRecord::read(&dest_path) {
				Ok(record) => Some(record),
				Err(e) if e.kind() == io::ErrorKind::NotFound => None,
				Err(e) => return Err(e.into()),
			};

			let classification = match (&dest_record, node.kind) {
				(None, _) => Classification::Cleared,
				(Some(dest), EntityKind::Directory) if dest.kind == EntityKind::Directory => {
					stack.extend(node.children.iter().rev());
					continue;
				}
				(Some(_), EntityKind::Directory) => Classification::Conflicting,
				(Some(dest), EntityKind::File) => {
					let src = FileRecord::read(&tree.path(idx))?;
					let class = classify(&src, dest, self.trust_source, self.hasher)?;
					self.observer.on_classified(&relative, class);
					entries.push(Reconciled {
						relative,
						kind: node.kind,
						classification: class,
						source: Some(src),
						destination: Some(dest.clone()),
					});
					continue;
				}
			};

			let source_record = match classification {
				Classification::Conflicting => Some(FileRecord::read(&tree.path(idx))?),
				_ => None,
			};
			self.observer.on_classified(&relative, classification);
			entries.push(Reconciled {
				relative,
				kind: node.kind,
				classification,
				source: source_record,
				destination: dest_record,
			});
		}

		let pairs: Vec<ConflictPair> = entries
			.iter()
			.filter(|e| e.classification == Classification::Conflicting)
			.filter_map(|e| match (&e.source, &e.destination) {
				(Some(s), Some(d)) => Some(ConflictPair {
					relative: e.relative.clone(),
					source: s.clone(),
					destination: d.clone(),
				}),
				_ => None,
			})
			.collect();

		if !pairs.is_empty() {
			info!("{} conflicting files against {}", pairs.len(), destination.display());
			return Err(BatchFailure::Conflict(ConflictReport {
				source_root: source.to_path_buf(),
				destination: destination.to_path_buf(),
				pairs,
			})
			.into());
		}

		Ok(Reconciliation::Merge(ReconcilePlan { destination: destination.to_path_buf(), entries }))
	}
}


// vim: ts=4
