//! Filename sanitising
//!
//! Names are rewritten so they are legal on Windows-style filesystems:
//! illegal characters are substituted, irregular whitespace becomes a plain
//! space and trailing spaces are stripped. `sanitise` is the pure character
//! pass; `canonicalise` turns its result into a unique, non-empty sibling
//! name using a `NameRegistry` that lives for one tree walk.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Placeholder stem for files whose name sanitises to nothing
pub const PLACEHOLDER_FILE: &str = "Renamed File";

/// Placeholder for directories whose name sanitises to nothing
pub const PLACEHOLDER_DIR: &str = "Renamed Folder";

/// File or directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
	File,
	Directory,
}

impl fmt::Display for EntityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EntityKind::File => write!(f, "file"),
			EntityKind::Directory => write!(f, "dir"),
		}
	}
}

/// Why a character was changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionReason {
	/// Character from the illegal set
	Illegal,
	/// Whitespace other than a plain space
	Whitespace,
	/// Stripped from the end of the name
	Trailing,
}

/// One changed input character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Substitution {
	/// 0-based character position in the input name
	pub position: usize,
	pub original: char,
	pub reason: SubstitutionReason,
}

impl Substitution {
	/// Human-readable description used in the illegal-character report
	pub fn describe(&self) -> String {
		match self.reason {
			SubstitutionReason::Illegal => self.original.to_string(),
			SubstitutionReason::Whitespace => format!("Whitespace({:?})", self.original),
			SubstitutionReason::Trailing if self.original == ' ' => "Trailing space".to_string(),
			SubstitutionReason::Trailing => format!("Whitespace({:?})", self.original),
		}
	}
}

/// Output of the character pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitised {
	pub canonical: String,
	/// Sorted by position, at most one record per position
	pub substitutions: Vec<Substitution>,
}

impl Sanitised {
	pub fn is_changed(&self) -> bool {
		!self.substitutions.is_empty()
	}

	pub fn positions(&self) -> Vec<usize> {
		self.substitutions.iter().map(|s| s.position).collect()
	}

	/// Distinct descriptions in order of first appearance
	pub fn characters_found(&self) -> Vec<String> {
		let mut seen = Vec::new();
		for sub in &self.substitutions {
			let desc = sub.describe();
			if !seen.contains(&desc) {
				seen.push(desc);
			}
		}
		seen
	}
}

/// Replacement for an illegal character, `None` for legal ones
///
/// `:` and `>` become the visually similar `-`, everything else `_`.
pub fn replacement(c: char) -> Option<char> {
	match c {
		':' | '>' => Some('-'),
		'`' | '\\' | '/' | '?' | '"' | '<' | '|' | '*' => Some('_'),
		_ => None,
	}
}

/// Substitute illegal characters and whitespace, strip trailing spaces
pub fn sanitise(name: &str) -> Sanitised {
	let chars: Vec<char> = name.chars().collect();
	let mut canonical = String::with_capacity(name.len());
	let mut substitutions = Vec::new();
	let mut trailing = 0usize;

	for (position, &original) in chars.iter().enumerate() {
		let out = if let Some(r) = replacement(original) {
			substitutions.push(Substitution {
				position,
				original,
				reason: SubstitutionReason::Illegal,
			});
			r
		} else if original.is_whitespace() && original != ' ' {
			substitutions.push(Substitution {
				position,
				original,
				reason: SubstitutionReason::Whitespace,
			});
			' '
		} else {
			original
		};

		if out == ' ' {
			trailing += 1;
		} else {
			trailing = 0;
		}
		canonical.push(out);
	}

	if trailing > 0 {
		// Every trailing output char is a single-byte space
		canonical.truncate(canonical.len() - trailing);
		for position in chars.len() - trailing..chars.len() {
			if !substitutions.iter().any(|s| s.position == position) {
				substitutions.push(Substitution {
					position,
					original: chars[position],
					reason: SubstitutionReason::Trailing,
				});
			}
		}
	}

	substitutions.sort_by_key(|s| s.position);
	Sanitised { canonical, substitutions }
}

/// A name undergoing sanitisation during a tree walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntity {
	pub raw: String,
	pub canonical: String,
	pub substitutions: Vec<Substitution>,
	pub kind: EntityKind,
	/// Renamed only because it clashed case-insensitively with a sibling
	pub case_collision: bool,
}

impl PathEntity {
	/// Illegal characters or whitespace were present
	pub fn has_illegal(&self) -> bool {
		!self.substitutions.is_empty()
	}

	pub fn needs_rename(&self) -> bool {
		self.raw != self.canonical
	}

	pub fn positions(&self) -> Vec<usize> {
		self.substitutions.iter().map(|s| s.position).collect()
	}

	pub fn characters_found(&self) -> Vec<String> {
		Sanitised { canonical: self.canonical.clone(), substitutions: self.substitutions.clone() }
			.characters_found()
	}
}

/// Canonical paths already handed out during one walk
#[derive(Debug, Default)]
pub struct NameRegistry {
	case_sensitive: bool,
	assigned: HashSet<PathBuf>,
	lowered: HashSet<String>,
}

impl NameRegistry {
	pub fn new(case_sensitive: bool) -> Self {
		Self { case_sensitive, ..Self::default() }
	}

	fn lower(path: &Path) -> String {
		path.to_string_lossy().to_lowercase()
	}

	/// Whether `path` exists on disk or was assigned earlier in this walk
	pub fn is_taken(&self, path: &Path) -> bool {
		path.exists()
			|| self.assigned.contains(path)
			|| (self.case_sensitive && self.lowered.contains(&Self::lower(path)))
	}

	/// Lower-cased form of `path` seen before (case-sensitive mode only)
	pub fn collides_ignoring_case(&self, path: &Path) -> bool {
		self.case_sensitive && self.lowered.contains(&Self::lower(path))
	}

	pub fn record(&mut self, path: &Path) {
		if self.case_sensitive {
			self.lowered.insert(Self::lower(path));
		}
		self.assigned.insert(path.to_path_buf());
	}
}

/// Split off the final `.ext` segment of a file name
fn split_extension(name: &str) -> (&str, &str) {
	match name.rfind('.') {
		Some(i) => (&name[..i], &name[i..]),
		None => (name, ""),
	}
}

/// Smallest `stem(n)ext` not yet taken in `parent`, or `stem ext` if free
pub fn unique_name(parent: &Path, stem: &str, ext: &str, registry: &NameRegistry) -> String {
	let base = format!("{}{}", stem, ext);
	if !registry.is_taken(&parent.join(&base)) {
		return base;
	}

	let mut n = 1u32;
	loop {
		let candidate = format!("{}({}){}", stem, n, ext);
		if !registry.is_taken(&parent.join(&candidate)) {
			return candidate;
		}
		n += 1;
	}
}

/// Decide the canonical name of `raw` inside `parent` and record it
pub fn canonicalise(
	parent: &Path,
	raw: &str,
	kind: EntityKind,
	registry: &mut NameRegistry,
) -> PathEntity {
	let sanitised = sanitise(raw);
	let mut canonical = raw.to_string();
	let mut case_collision = false;

	if sanitised.is_changed() {
		// Keep a leading dot out of the emptiness check
		let (prefix, rest) = match sanitised.canonical.strip_prefix('.') {
			Some(rest) => (".", rest),
			None => ("", sanitised.canonical.as_str()),
		};
		let (stem, ext) = match kind {
			EntityKind::File => split_extension(rest),
			EntityKind::Directory => (rest, ""),
		};
		let stem = if stem.trim().is_empty() {
			match kind {
				EntityKind::File => PLACEHOLDER_FILE,
				EntityKind::Directory => PLACEHOLDER_DIR,
			}
		} else {
			stem
		};
		canonical = unique_name(parent, &format!("{}{}", prefix, stem), ext, registry);
	} else if registry.collides_ignoring_case(&parent.join(raw)) {
		let (stem, ext) = match kind {
			EntityKind::File => split_extension(raw),
			EntityKind::Directory => (raw, ""),
		};
		canonical = unique_name(parent, stem, ext, registry);
		case_collision = true;
	}

	registry.record(&parent.join(&canonical));

	PathEntity {
		raw: raw.to_string(),
		canonical,
		substitutions: sanitised.substitutions,
		kind,
		case_collision,
	}
}

/// Marker line with `^` under each changed position
pub fn marker_line(len: usize, positions: &[usize]) -> String {
	(0..len).map(|i| if positions.contains(&i) { '^' } else { ' ' }).collect()
}

/// True when a path is long enough to upset foreign filesystems
pub fn is_oversize(path: &Path, max_len: usize) -> bool {
	path.to_string_lossy().chars().count() > max_len
}


// vim: ts=4
