//! Unified configuration for sanimove
//!
//! One immutable `Config` is built per invocation and handed by reference to
//! every component. The priority chain is:
//! 1. Built-in defaults (Config::default())
//! 2. Optional config file (TOML or JSON5, chosen by extension)
//! 3. CLI flags (highest priority, applied by `main`)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::patterns::DeletionMatcher;

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

/// Configuration for one sanitise-and-move invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// LOCATIONS
	// ========================================================================
	/// Root of the hot folder (contains "To Archive", "Logs", ...)
	pub target: PathBuf,

	/// Archive destination root
	pub pass_dir: PathBuf,

	/// Directory for per-project rename logs, usually on the destination
	pub rename_log_dir: Option<PathBuf>,

	/// Directory holding the machine-readable category logs
	pub logstash_dir: PathBuf,

	/// File to record overlong paths in (no logging if unset)
	pub oversize_log: Option<PathBuf>,

	/// Log for messages written before a project is chosen
	pub temp_log_file: PathBuf,

	// ========================================================================
	// BEHAVIOUR SWITCHES
	// ========================================================================
	/// Suppress console echo of the project log
	pub quiet: bool,

	/// Apply renames instead of only logging suggested changes
	pub rename: bool,

	/// Detect names which differ only by case
	pub case_sensitive: bool,

	/// Let same-or-larger source files overwrite differing archive files
	pub trust_source: bool,

	/// Glob patterns (matched on file name) for files deleted during staging
	pub delete_patterns: Vec<String>,

	// ========================================================================
	// LIMITS
	// ========================================================================
	/// Move attempts per file before the transfer is abandoned
	pub retries: u32,

	/// Pause between move attempts in milliseconds
	pub retry_delay_ms: u64,

	/// Paths longer than this are written to the oversize log
	pub max_path_len: usize,

	/// A project modified within this many seconds is left for the next run
	pub settle_secs: u64,

	// ========================================================================
	// LOCKING
	// ========================================================================
	/// Write a PID file guarding the intake directory
	pub create_pid: bool,

	/// Directory for the PID file (system temp dir if unset)
	pub pid_dir: Option<PathBuf>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			// Locations
			target: PathBuf::from("."),
			pass_dir: PathBuf::new(),
			rename_log_dir: None,
			logstash_dir: PathBuf::from("/var/log/sanitisePathsSysLogs"),
			oversize_log: None,
			temp_log_file: PathBuf::from("/tmp/saniTempLog.log"),

			// Switches
			quiet: false,
			rename: false,
			case_sensitive: false,
			trust_source: false,
			delete_patterns: vec![".DS_Store".to_string(), "._*".to_string()],

			// Limits
			retries: 3,
			retry_delay_ms: 0,
			max_path_len: 254,
			settle_secs: 10,

			// Locking
			create_pid: true,
			pid_dir: None,
		}
	}
}

impl Config {
	/// Load a config file, picking the format from the extension
	///
	/// `.toml` is parsed with `toml`, anything else as JSON5 (plain JSON is
	/// a subset). Missing keys fall back to defaults.
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let contents = fs::read_to_string(path).map_err(|e| ConfigError::FileError {
			path: path.to_path_buf(),
			message: e.to_string(),
		})?;

		let parsed = match path.extension().and_then(|e| e.to_str()) {
			Some("toml") => toml::from_str(&contents).map_err(|e| e.to_string()),
			_ => json5::from_str(&contents).map_err(|e| e.to_string()),
		};

		parsed.map_err(|message| ConfigError::FileError { path: path.to_path_buf(), message })
	}

	/// Check the configuration before anything touches the filesystem
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.target.as_os_str().is_empty() {
			return Err(ConfigError::MissingPath { option: "target" });
		}
		if self.pass_dir.as_os_str().is_empty() {
			return Err(ConfigError::MissingPath { option: "passdir" });
		}
		if self.rename && self.rename_log_dir.is_none() {
			return Err(ConfigError::MissingRenameLogDir);
		}
		if self.retries == 0 {
			return Err(ConfigError::InvalidValue {
				option: "retries",
				message: "at least one attempt is required".to_string(),
			});
		}
		DeletionMatcher::new(&self.delete_patterns).map_err(|e| ConfigError::InvalidValue {
			option: "deletePatterns",
			message: e.to_string(),
		})?;
		Ok(())
	}

	/// Pause between move attempts
	pub fn retry_delay(&self) -> Duration {
		Duration::from_millis(self.retry_delay_ms)
	}

	/// Quiescence window for intake folders
	pub fn settle_window(&self) -> Duration {
		Duration::from_secs(self.settle_secs)
	}

	/// Per-project rename log, when renaming is enabled
	pub fn rename_log_file(&self, project: &str) -> Option<PathBuf> {
		if !self.rename {
			return None;
		}
		self.rename_log_dir.as_ref().map(|dir| dir.join(format!("{}.txt", project)))
	}

	/// PID file path, derived from the target so each hot folder has its own
	pub fn pid_file(&self) -> PathBuf {
		let dir_id: String = self
			.target
			.to_string_lossy()
			.chars()
			.take(256)
			.filter(|c| !matches!(c, '/' | '\\' | ' '))
			.collect();
		let dir = self.pid_dir.clone().unwrap_or_else(std::env::temp_dir);
		dir.join(format!("SanitisePaths{}.pid", dir_id))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn valid_config() -> Config {
		Config {
			target: PathBuf::from("/srv/hot"),
			pass_dir: PathBuf::from("/srv/archive"),
			..Config::default()
		}
	}

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert_eq!(config.retries, 3);
		assert_eq!(config.max_path_len, 254);
		assert!(!config.rename);
		assert!(!config.trust_source);
		assert_eq!(config.delete_patterns, vec![".DS_Store", "._*"]);
	}

	#[test]
	fn test_rename_requires_log_dir() {
		let config = Config { rename: true, ..valid_config() };
		assert_eq!(config.validate(), Err(ConfigError::MissingRenameLogDir));

		let config = Config { rename_log_dir: Some(PathBuf::from("/srv/renamed")), ..config };
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_missing_pass_dir() {
		let config = Config { target: PathBuf::from("/srv/hot"), ..Config::default() };
		assert_eq!(config.validate(), Err(ConfigError::MissingPath { option: "passdir" }));
	}

	#[test]
	fn test_zero_retries_rejected() {
		let config = Config { retries: 0, ..valid_config() };
		assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
	}

	#[test]
	fn test_pid_file_strips_separators() {
		let config = Config {
			target: PathBuf::from("/srv/hot folder"),
			pid_dir: Some(PathBuf::from("/run")),
			..valid_config()
		};
		assert_eq!(config.pid_file(), PathBuf::from("/run/SanitisePathssrvhotfolder.pid"));
	}

	#[test]
	fn test_rename_log_file_only_when_renaming() {
		let config = Config { rename_log_dir: Some(PathBuf::from("/logs")), ..valid_config() };
		assert_eq!(config.rename_log_file("207042"), None);

		let config = Config { rename: true, ..config };
		assert_eq!(config.rename_log_file("207042"), Some(PathBuf::from("/logs/207042.txt")));
	}

	#[test]
	fn test_load_toml_file() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("sanimove.toml");
		fs::write(
			&path,
			"target = \"/srv/hot\"\npassDir = \"/srv/archive\"\ntrustSource = true\nretries = 5\n",
		)
		.unwrap();

		let config = Config::from_file(&path).unwrap();
		assert_eq!(config.target, PathBuf::from("/srv/hot"));
		assert!(config.trust_source);
		assert_eq!(config.retries, 5);
		assert_eq!(config.max_path_len, 254);
	}

	#[test]
	fn test_load_json5_file() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("sanimove.json");
		fs::write(&path, "{ passDir: '/srv/archive', caseSensitive: true, // comment\n }").unwrap();

		let config = Config::from_file(&path).unwrap();
		assert_eq!(config.pass_dir, PathBuf::from("/srv/archive"));
		assert!(config.case_sensitive);
	}

	#[test]
	fn test_load_bad_file() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("broken.toml");
		fs::write(&path, "retries = [").unwrap();
		assert!(matches!(Config::from_file(&path), Err(ConfigError::FileError { .. })));
	}

	#[test]
	fn test_config_serialization() {
		let config = valid_config();
		let json = serde_json::to_string(&config).expect("Failed to serialize");
		let deserialized: Config = serde_json::from_str(&json).expect("Failed to deserialize");
		assert_eq!(config.target, deserialized.target);
		assert_eq!(config.retries, deserialized.retries);
	}
}

// vim: ts=4
