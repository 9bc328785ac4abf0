//! Directory tree snapshot
//!
//! Walks are done in two phases: the tree is first collected into an arena
//! of nodes with parent/child indices, then callers decide per node what to
//! do. Nothing is removed from a list while it is being iterated.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::sanitise::EntityKind;

/// One file or directory in the arena
#[derive(Debug, Clone)]
pub struct Node {
	pub name: OsString,
	pub kind: EntityKind,
	pub parent: Option<usize>,
	pub children: Vec<usize>,
}

/// Arena of a directory tree; index 0 is the root
#[derive(Debug, Clone)]
pub struct DirTree {
	root: PathBuf,
	nodes: Vec<Node>,
}

impl DirTree {
	/// Snapshot the tree under `root`, children sorted by name
	pub fn scan(root: &Path) -> io::Result<Self> {
		let mut nodes: Vec<Node> = Vec::new();
		let mut stack: Vec<usize> = Vec::new();

		for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
			let entry = entry?;
			let depth = entry.depth();
			let kind = if entry.file_type().is_dir() {
				EntityKind::Directory
			} else {
				EntityKind::File
			};

			if depth == 0 {
				nodes.push(Node {
					name: entry.file_name().to_os_string(),
					kind,
					parent: None,
					children: Vec::new(),
				});
				stack.push(0);
				continue;
			}

			stack.truncate(depth);
			let parent = stack[depth - 1];
			let idx = nodes.len();
			nodes.push(Node {
				name: entry.file_name().to_os_string(),
				kind,
				parent: Some(parent),
				children: Vec::new(),
			});
			nodes[parent].children.push(idx);
			if kind == EntityKind::Directory {
				stack.push(idx);
			}
		}

		Ok(Self { root: root.to_path_buf(), nodes })
	}

	pub fn node(&self, idx: usize) -> &Node {
		&self.nodes[idx]
	}

	/// Record a rename so later path lookups use the new name
	pub fn set_name(&mut self, idx: usize, name: impl Into<OsString>) {
		self.nodes[idx].name = name.into();
	}

	/// Path below the root, using current names
	pub fn relative_path(&self, idx: usize) -> PathBuf {
		let mut parts = Vec::new();
		let mut current = idx;
		while let Some(parent) = self.nodes[current].parent {
			parts.push(self.nodes[current].name.as_os_str());
			current = parent;
		}
		parts.iter().rev().collect()
	}

	/// Absolute path of a node, using current names for every ancestor
	/// except the root
	pub fn path(&self, idx: usize) -> PathBuf {
		if idx == 0 {
			return self.root.clone();
		}
		self.root.join(self.relative_path(idx))
	}

	/// Children before parents, siblings in name order; excludes the root
	pub fn post_order(&self) -> Vec<usize> {
		let mut order = Vec::with_capacity(self.nodes.len());
		if self.nodes.is_empty() {
			return order;
		}

		let mut stack: Vec<(usize, bool)> = vec![(0, false)];
		while let Some((idx, expanded)) = stack.pop() {
			if expanded {
				if idx != 0 {
					order.push(idx);
				}
				continue;
			}
			stack.push((idx, true));
			for &child in self.nodes[idx].children.iter().rev() {
				stack.push((child, false));
			}
		}
		order
	}

	/// Every file below `idx`, in pre-order
	pub fn files_under(&self, idx: usize) -> Vec<usize> {
		let mut files = Vec::new();
		let mut stack = vec![idx];
		while let Some(current) = stack.pop() {
			let node = &self.nodes[current];
			match node.kind {
				EntityKind::File => files.push(current),
				EntityKind::Directory => stack.extend(node.children.iter().rev()),
			}
		}
		files
	}
}


// vim: ts=4
