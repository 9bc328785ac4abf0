//! # sanimove - Hot-folder sanitiser and archiver
//!
//! Takes one project folder per run from a hot folder's `To Archive`
//! directory, claims it by moving it into a hidden staging area, rewrites
//! every file and directory name that would be illegal on Windows-style
//! filesystems, and moves it into the archive. Files already archived with
//! the same content are dropped; differing ones block the whole project,
//! which then lands in `Problem Files` for an operator.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sanimove::{BatchOutcome, Config, Orchestrator};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         target: "/srv/hot".into(),
//!         pass_dir: "/srv/archive".into(),
//!         ..Config::default()
//!     };
//!     config.validate()?;
//!
//!     let orchestrator = Orchestrator::new(config)?;
//!     if let BatchOutcome::Archived(batch) = orchestrator.run_once()? {
//!         println!("Archived {} files", batch.transferred.len());
//!     }
//!     orchestrator.clean_up()?;
//!     Ok(())
//! }
//! ```

pub mod callbacks;
pub mod config;
pub mod engine;
pub mod error;
pub mod fs_ops;
pub mod hash;
pub mod intake;
pub mod journal;
pub mod logging;
pub mod patterns;
pub mod reconcile;
pub mod relocate;
pub mod sanitise;
pub mod transfer;
pub mod tree;
pub mod utils;

// Re-export commonly used types and functions
pub use config::Config;
pub use engine::{BatchOutcome, Orchestrator, Phase, ProjectBatch};
pub use error::{BatchFailure, ConfigError, NamingError, SanitiseError, TransferError};
pub use reconcile::Classification;
pub use sanitise::{sanitise, Sanitised};

// vim: ts=4
