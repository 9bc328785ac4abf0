//! Error types for sanitise-and-move operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::reconcile::ConflictReport;

/// Main error type for one invocation
///
/// Anything reaching `main` as a `SanitiseError` is unexpected: batch-level
/// failures are reported as `BatchFailure` values and quarantine the project
/// without failing the process.
#[derive(Debug)]
pub enum SanitiseError {
	/// I/O error outside any per-file recovery path
	Io(io::Error),

	/// Invalid configuration
	InvalidConfig(ConfigError),

	/// Another live instance owns the intake directory
	LockFailed { message: String },

	/// A batch failure that could not be routed to quarantine
	Batch(BatchFailure),

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for SanitiseError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SanitiseError::Io(e) => write!(f, "I/O error: {}", e),
			SanitiseError::InvalidConfig(e) => write!(f, "Invalid configuration: {}", e),
			SanitiseError::LockFailed { message } => {
				write!(f, "Lock acquisition failed: {}", message)
			}
			SanitiseError::Batch(e) => write!(f, "Batch failed: {}", e),
			SanitiseError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SanitiseError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SanitiseError::Io(e) => Some(e),
			SanitiseError::InvalidConfig(e) => Some(e),
			SanitiseError::Batch(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for SanitiseError {
	fn from(e: io::Error) -> Self {
		SanitiseError::Io(e)
	}
}

impl From<ConfigError> for SanitiseError {
	fn from(e: ConfigError) -> Self {
		SanitiseError::InvalidConfig(e)
	}
}

impl From<BatchFailure> for SanitiseError {
	fn from(e: BatchFailure) -> Self {
		SanitiseError::Batch(e)
	}
}

/// Configuration errors, fatal at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
	/// Renaming was requested but nowhere to log the renames
	MissingRenameLogDir,

	/// A required path option is absent
	MissingPath { option: &'static str },

	/// Option has an unusable value
	InvalidValue { option: &'static str, message: String },

	/// Config file could not be read or parsed
	FileError { path: PathBuf, message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::MissingRenameLogDir => write!(
				f,
				"Please specify a directory to log renamed files to (usually on dest.)"
			),
			ConfigError::MissingPath { option } => write!(f, "Missing required path: {}", option),
			ConfigError::InvalidValue { option, message } => {
				write!(f, "Invalid value for {}: {}", option, message)
			}
			ConfigError::FileError { path, message } => {
				write!(f, "Cannot load config file {}: {}", path.display(), message)
			}
		}
	}
}

impl Error for ConfigError {}

/// Reasons a whole project is diverted away from the archive
#[derive(Debug)]
pub enum BatchFailure {
	/// A folder of the same name is already staged by another run
	AlreadyProcessing { project: String, moved_to: PathBuf },

	/// Illegal names were found and renaming is disabled
	IllegalNames { project: String, count: usize },

	/// Destination files differ and are not covered by trust policy
	Conflict(ConflictReport),

	/// One file exhausted its retry budget
	Transfer(TransferError),
}

impl fmt::Display for BatchFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BatchFailure::AlreadyProcessing { project, moved_to } => write!(
				f,
				"{} is already being processed. It has been moved to {}",
				project,
				moved_to.display()
			),
			BatchFailure::IllegalNames { project, count } => {
				write!(f, "{} contains {} illegal names", project, count)
			}
			BatchFailure::Conflict(report) => write!(
				f,
				"{} files already exist in {} and differ",
				report.pairs.len(),
				report.destination.display()
			),
			BatchFailure::Transfer(e) => write!(f, "{}", e),
		}
	}
}

impl Error for BatchFailure {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			BatchFailure::Transfer(e) => Some(e),
			_ => None,
		}
	}
}

impl From<TransferError> for BatchFailure {
	fn from(e: TransferError) -> Self {
		BatchFailure::Transfer(e)
	}
}

impl From<ConflictReport> for BatchFailure {
	fn from(r: ConflictReport) -> Self {
		BatchFailure::Conflict(r)
	}
}

/// A single file failed to move after every attempt
#[derive(Debug)]
pub struct TransferError {
	/// Path relative to the transfer root
	pub relative: PathBuf,

	/// Attempts made, including the last one
	pub attempts: u32,

	/// Files moved before the failure, in order
	pub moved: Vec<PathBuf>,

	/// Error from the final attempt
	pub source: io::Error,
}

impl fmt::Display for TransferError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} failed to transfer after {} attempts: {}",
			self.relative.display(),
			self.attempts,
			self.source
		)
	}
}

impl Error for TransferError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		Some(&self.source)
	}
}

/// A rename failed at the filesystem level; the entry keeps its old name
#[derive(Debug)]
pub struct NamingError {
	pub path: PathBuf,
	pub target: PathBuf,
	pub source: io::Error,
}

impl fmt::Display for NamingError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"Error: unable to rename {} to {}: {}",
			self.path.display(),
			self.target.display(),
			self.source
		)
	}
}

impl Error for NamingError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		Some(&self.source)
	}
}


// vim: ts=4
