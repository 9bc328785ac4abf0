//! Content hashing, the expensive tie-breaker for same-size files

use std::fs::File;
use std::io;
use std::path::Path;

pub use blake3::Hash as ContentHash;

/// Source of file digests
pub trait ContentHasher: Send + Sync {
	fn hash_file(&self, path: &Path) -> io::Result<ContentHash>;
}

/// BLAKE3 over the whole file, streamed
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

impl ContentHasher for Blake3Hasher {
	fn hash_file(&self, path: &Path) -> io::Result<ContentHash> {
		let file = File::open(path)?;
		let mut hasher = blake3::Hasher::new();
		hasher.update_reader(file)?;
		Ok(hasher.finalize())
	}
}


// vim: ts=4
