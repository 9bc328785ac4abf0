//! Observer hooks for watching a batch from the outside
//!
//! The engine reports what it does through `BatchObserver`; nothing it
//! returns feeds back into control flow. Production runs use `NoObserver`.

use std::path::Path;

use crate::engine::Phase;
use crate::reconcile::Classification;

/// Callback handler for batch events
pub trait BatchObserver: Send + Sync {
	/// Called when the orchestrator enters a phase
	fn on_phase(&self, _phase: Phase, _project: &str) {}

	/// Called after an entity was renamed (or would have been, in log-only mode)
	///
	/// Paths are relative to the staging area.
	fn on_renamed(&self, _from: &Path, _to: &Path, _applied: bool) {}

	/// Called once per classified entry during reconciliation
	fn on_classified(&self, _relative: &Path, _classification: Classification) {}

	/// Called after every move attempt, successful or not
	fn on_transfer_attempt(&self, _relative: &Path, _attempt: u32, _succeeded: bool) {}

	/// Called when a file or directory reached the archive
	fn on_file_moved(&self, _relative: &Path) {}
}

/// Default observer that does nothing
pub struct NoObserver;

impl BatchObserver for NoObserver {}

// vim: ts=4
