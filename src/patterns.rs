//! File-name patterns for sidecar files deleted during staging

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fmt;
use std::path::Path;

/// Failure to compile a deletion pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternError(pub String);

impl fmt::Display for PatternError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Invalid deletion pattern: {}", self.0)
	}
}

impl std::error::Error for PatternError {}

/// Matches file names (not paths) against configured globs
///
/// Typical patterns are `.DS_Store` and `._*` (AppleDouble resource forks).
#[derive(Debug, Clone)]
pub struct DeletionMatcher {
	set: GlobSet,
}

impl DeletionMatcher {
	pub fn new(patterns: &[String]) -> Result<Self, PatternError> {
		let mut builder = GlobSetBuilder::new();

		for pattern in patterns {
			// Names never contain separators, but keep `*` from crossing one anyway
			let glob = GlobBuilder::new(pattern)
				.literal_separator(true)
				.build()
				.map_err(|e| PatternError(format!("{}: {}", pattern, e)))?;
			builder.add(glob);
		}

		let set = builder
			.build()
			.map_err(|e| PatternError(format!("Failed to build pattern set: {}", e)))?;

		Ok(Self { set })
	}

	/// True when the file's name matches any pattern
	pub fn matches(&self, path: &Path) -> bool {
		match path.file_name() {
			Some(name) => self.set.is_match(Path::new(name)),
			None => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn defaults() -> DeletionMatcher {
		DeletionMatcher::new(&[".DS_Store".to_string(), "._*".to_string()]).unwrap()
	}

	#[test]
	fn test_default_sidecars() {
		let matcher = defaults();

		assert!(matcher.matches(Path::new(".DS_Store")));
		assert!(matcher.matches(Path::new("project/sub/.DS_Store")));
		assert!(matcher.matches(Path::new("project/._render.mov")));
		assert!(!matcher.matches(Path::new("project/render.mov")));
	}

	#[test]
	fn test_ordinary_dotfiles_kept() {
		let matcher = defaults();

		assert!(!matcher.matches(Path::new(".hidden")));
		assert!(!matcher.matches(Path::new("dir/.gitignore")));
	}

	#[test]
	fn test_directory_components_ignored() {
		let matcher = defaults();

		// Only the final component is considered
		assert!(!matcher.matches(Path::new("._folder/file.txt")));
	}

	#[test]
	fn test_invalid_pattern() {
		let result = DeletionMatcher::new(&["[".to_string()]);
		assert!(result.is_err());
	}

	#[test]
	fn test_empty_matcher() {
		let matcher = DeletionMatcher::new(&[]).unwrap();
		assert!(!matcher.matches(Path::new(".DS_Store")));
	}
}

// vim: ts=4
