/// Pipeline tests - run whole invocations against a real hot folder
///
/// Each test builds a hot folder and an archive in a temp dir, drops a
/// project into "To Archive" and checks where every file ended up and what
/// the logs say.
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use sanimove::callbacks::BatchObserver;
use sanimove::fs_ops::{FsMover, Mover};
use sanimove::{BatchFailure, BatchOutcome, Classification, Config, Orchestrator};

/// Helper to build a config rooted in a temp dir
fn setup() -> (TempDir, Config) {
	let root = TempDir::new().unwrap();
	let config = Config {
		target: root.path().join("hot"),
		pass_dir: root.path().join("archive"),
		logstash_dir: root.path().join("logstash"),
		temp_log_file: root.path().join("temp.log"),
		quiet: true,
		settle_secs: 0,
		create_pid: false,
		..Config::default()
	};
	(root, config)
}

/// Helper to write a file with a fixed modification time
fn write_file(path: &Path, content: &str, mtime: i64) {
	fs::create_dir_all(path.parent().unwrap()).unwrap();
	fs::write(path, content).unwrap();
	set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
}

/// Helper to drop a project into the intake
fn add_project(config: &Config, name: &str, files: &[(&str, &str)]) -> PathBuf {
	let project = config.target.join("To Archive").join(name);
	fs::create_dir_all(&project).unwrap();
	for (file, content) in files {
		write_file(&project.join(file), content, 1_600_000_000);
	}
	project
}

/// Helper to read the project log written by the last run
fn project_log(config: &Config, name: &str) -> String {
	let dir = config.target.join("Logs").join(name);
	let mut text = String::new();
	for entry in fs::read_dir(dir).unwrap() {
		text.push_str(&fs::read_to_string(entry.unwrap().path()).unwrap());
	}
	text
}

fn logstash(config: &Config, file: &str) -> String {
	fs::read_to_string(config.logstash_dir.join(file)).unwrap_or_default()
}

/// Fails every move of one file name
struct BrokenMover {
	bad: &'static str,
	attempts: Mutex<u32>,
}

impl Mover for BrokenMover {
	fn move_path(&self, from: &Path, to: &Path) -> io::Result<()> {
		if from.ends_with(self.bad) {
			*self.attempts.lock().unwrap() += 1;
			return Err(io::Error::new(io::ErrorKind::PermissionDenied, "share went away"));
		}
		FsMover.move_path(from, to)
	}
}

#[derive(Default)]
struct ClassificationRecorder(Mutex<Vec<(PathBuf, Classification)>>);

impl BatchObserver for ClassificationRecorder {
	fn on_classified(&self, relative: &Path, classification: Classification) {
		self.0.lock().unwrap().push((relative.to_path_buf(), classification));
	}
}

// ===================================================================
// INTAKE
// ===================================================================

#[test]
fn test_orphan_files_are_ignored() {
	let (_root, config) = setup();
	let orchestrator = Orchestrator::new(config.clone()).unwrap();
	orchestrator.hot_folder().ensure().unwrap();
	fs::write(config.target.join("To Archive/loose.pdf"), "x").unwrap();

	assert!(matches!(orchestrator.run_once().unwrap(), BatchOutcome::Idle));
	assert!(config.target.join("To Archive/loose.pdf").exists());
}

#[test]
fn test_one_project_per_run() {
	let (_root, config) = setup();
	add_project(&config, "aaa", &[("one.txt", "1")]);
	add_project(&config, "bbb", &[("two.txt", "2")]);
	let orchestrator = Orchestrator::new(config.clone()).unwrap();

	assert!(matches!(orchestrator.run_once().unwrap(), BatchOutcome::Archived(_)));
	assert!(config.pass_dir.join("aaa/one.txt").exists());
	assert!(config.target.join("To Archive/bbb").exists());

	assert!(matches!(orchestrator.run_once().unwrap(), BatchOutcome::Archived(_)));
	assert!(config.pass_dir.join("bbb/two.txt").exists());
}

// ===================================================================
// NAMING
// ===================================================================

#[test]
fn test_illegal_name_without_rename_goes_to_problem() {
	let (_root, config) = setup();
	add_project(&config, "proj", &[("bad?.txt", "x")]);
	let orchestrator = Orchestrator::new(config.clone()).unwrap();

	match orchestrator.run_once().unwrap() {
		BatchOutcome::Quarantined { location, reason, .. } => {
			assert!(matches!(reason, BatchFailure::IllegalNames { count: 1, .. }));
			assert_eq!(location, config.target.join("Problem Files/proj"));
		}
		other => panic!("expected quarantine, got {:?}", other),
	}

	assert!(config.target.join("Problem Files/proj/bad?.txt").exists());
	assert!(!config.pass_dir.join("proj").exists());

	let log = project_log(&config, "proj");
	assert!(log.contains("Illegal characters found in file   : proj/bad?.txt"));
	assert!(log.contains("Suggested change                   : proj/bad_.txt"));
}

#[test]
fn test_rename_then_archive() {
	let (root, config) = setup();
	let config = Config { rename: true, rename_log_dir: Some(root.path().join("renames")), ..config };
	add_project(&config, "proj", &[("dir|x/file:1.txt", "x"), ("ok.txt", "ok")]);
	let orchestrator = Orchestrator::new(config.clone()).unwrap();

	match orchestrator.run_once().unwrap() {
		BatchOutcome::Archived(batch) => {
			assert!(batch.errors_found);
			assert_eq!(batch.renamed, 2);
		}
		other => panic!("expected archive, got {:?}", other),
	}

	assert!(config.pass_dir.join("proj/dir_x/file-1.txt").exists());
	assert!(config.pass_dir.join("proj/ok.txt").exists());

	let renames = fs::read_to_string(root.path().join("renames/proj.txt")).unwrap();
	assert!(renames.contains("Changed from: proj/dir|x\nChanged to:   proj/dir_x"));
	assert_eq!(logstash(&config, "renamed.txt").lines().count(), 2);
}

// ===================================================================
// RECONCILIATION
// ===================================================================

#[test]
fn test_identical_files_skipped_and_deleted() {
	let (_root, config) = setup();
	add_project(&config, "proj", &[("same.txt", "same"), ("new.txt", "new")]);
	write_file(&config.pass_dir.join("proj/same.txt"), "same", 1_600_000_000);
	let orchestrator = Orchestrator::new(config.clone()).unwrap();

	match orchestrator.run_once().unwrap() {
		BatchOutcome::Archived(batch) => {
			assert_eq!(batch.identical, vec![PathBuf::from("same.txt")]);
			assert_eq!(batch.transferred, vec![PathBuf::from("new.txt")]);
		}
		other => panic!("expected archive, got {:?}", other),
	}

	assert!(config.pass_dir.join("proj/new.txt").exists());
	assert!(!config.target.join(".Hidden/proj").exists());
	assert!(logstash(&config, "there_but_same.txt").contains("same.txt"));
	assert!(!logstash(&config, "transferred.txt").contains("same.txt"));
}

#[test]
fn test_conflict_quarantines_whole_batch() {
	let (_root, config) = setup();
	add_project(&config, "proj", &[("a.txt", "incoming"), ("b.txt", "fresh")]);
	write_file(&config.pass_dir.join("proj/a.txt"), "archived", 1_500_000_000);
	let orchestrator = Orchestrator::new(config.clone()).unwrap();

	match orchestrator.run_once().unwrap() {
		BatchOutcome::Quarantined { reason: BatchFailure::Conflict(report), location, .. } => {
			assert_eq!(report.pairs.len(), 1);
			assert_eq!(location, config.target.join("Problem Files/proj"));
		}
		other => panic!("expected conflict, got {:?}", other),
	}

	// Archive untouched, nothing partially copied
	assert_eq!(fs::read_to_string(config.pass_dir.join("proj/a.txt")).unwrap(), "archived");
	assert!(!config.pass_dir.join("proj/b.txt").exists());
	assert!(config.target.join("Problem Files/proj/b.txt").exists());

	assert!(project_log(&config, "proj").contains("Please version these files and attempt the upload again."));
	assert!(logstash(&config, "there_and_different.txt").contains("a.txt"));
}

#[test]
fn test_trusted_larger_source_overwrites() {
	let (_root, config) = setup();
	let config = Config { trust_source: true, ..config };
	add_project(&config, "proj", &[("a.txt", "0123456789")]);
	write_file(&config.pass_dir.join("proj/a.txt"), "01234", 1_500_000_000);
	let orchestrator = Orchestrator::new(config.clone()).unwrap();

	match orchestrator.run_once().unwrap() {
		BatchOutcome::Archived(batch) => assert_eq!(batch.trusted, vec![PathBuf::from("a.txt")]),
		other => panic!("expected archive, got {:?}", other),
	}
	assert_eq!(fs::read_to_string(config.pass_dir.join("proj/a.txt")).unwrap(), "0123456789");
	assert!(project_log(&config, "proj").contains("will be transferred since trust source is set"));
}

#[test]
fn test_trusted_smaller_source_still_conflicts() {
	let (_root, config) = setup();
	let config = Config { trust_source: true, ..config };
	add_project(&config, "proj", &[("a.txt", "01234")]);
	write_file(&config.pass_dir.join("proj/a.txt"), "0123456789", 1_500_000_000);
	let orchestrator = Orchestrator::new(config.clone()).unwrap();

	assert!(matches!(
		orchestrator.run_once().unwrap(),
		BatchOutcome::Quarantined { reason: BatchFailure::Conflict(_), .. }
	));
	assert_eq!(fs::read_to_string(config.pass_dir.join("proj/a.txt")).unwrap(), "0123456789");
}

#[test]
fn test_observer_sees_classifications() {
	let (_root, config) = setup();
	add_project(&config, "proj", &[("same.txt", "same"), ("sub/new.txt", "new")]);
	write_file(&config.pass_dir.join("proj/same.txt"), "same", 1_600_000_000);
	let recorder = Arc::new(ClassificationRecorder::default());
	let orchestrator = Orchestrator::new(config).unwrap().with_observer(recorder.clone());

	orchestrator.run_once().unwrap();
	assert_eq!(
		*recorder.0.lock().unwrap(),
		vec![
			(PathBuf::from("same.txt"), Classification::Identical),
			(PathBuf::from("sub"), Classification::Cleared),
		]
	);
}

// ===================================================================
// TRANSFER FAILURES
// ===================================================================

#[test]
fn test_exhausted_retries_route_rest_to_transfer_errors() {
	let (_root, config) = setup();
	add_project(&config, "proj", &[("a.txt", "a"), ("b.txt", "b"), ("c.txt", "c")]);
	fs::create_dir_all(config.pass_dir.join("proj")).unwrap();
	let mover = Arc::new(BrokenMover { bad: "b.txt", attempts: Mutex::new(0) });
	let orchestrator = Orchestrator::new(config.clone()).unwrap().with_mover(mover.clone());

	match orchestrator.run_once().unwrap() {
		BatchOutcome::Quarantined { reason: BatchFailure::Transfer(e), location, .. } => {
			assert_eq!(e.attempts, 3);
			assert_eq!(e.moved, vec![PathBuf::from("a.txt")]);
			assert_eq!(location, config.target.join("Problem Files/_Transfer_Errors/proj"));
		}
		other => panic!("expected transfer failure, got {:?}", other),
	}

	// Three archive attempts, then the quarantine move before and after
	// creating the quarantine folder
	assert_eq!(*mover.attempts.lock().unwrap(), 5);
	assert!(config.target.join(".Hidden/proj/b.txt").exists());
	assert!(config.pass_dir.join("proj/a.txt").exists());
	assert!(!config.pass_dir.join("proj/c.txt").exists());
	let quarantine = config.target.join("Problem Files/_Transfer_Errors/proj");
	assert!(quarantine.join("c.txt").exists());
	let moved_to = logstash(&config, "transfer_errors.txt");
	assert_eq!(moved_to.trim_end(), format!("{{MovedTo:}}{}", quarantine.join("c.txt").display()));

	assert!(logstash(&config, "failed.txt").contains("b.txt failed after 3 attempts"));
	let transferred = logstash(&config, "transferred.txt");
	assert!(transferred.contains("a.txt"));
	assert!(!transferred.contains("b.txt"));
}

// ===================================================================
// CONCURRENT CLAIMS
// ===================================================================

#[test]
fn test_already_staged_project_is_diverted() {
	let (_root, config) = setup();
	let orchestrator = Orchestrator::new(config.clone()).unwrap();
	orchestrator.hot_folder().ensure().unwrap();
	write_file(&config.target.join(".Hidden/proj/first.txt"), "first", 1_600_000_000);
	add_project(&config, "proj", &[("second.txt", "second")]);

	match orchestrator.run_once().unwrap() {
		BatchOutcome::Quarantined { reason: BatchFailure::AlreadyProcessing { moved_to, .. }, .. } => {
			assert_eq!(moved_to, config.target.join("Problem Files/proj"));
		}
		other => panic!("expected already processing, got {:?}", other),
	}
	assert!(config.target.join(".Hidden/proj/first.txt").exists());
	assert!(config.target.join("Problem Files/proj/second.txt").exists());

	// Leftover staged copy goes to a duplicates folder on clean up
	let moved = orchestrator.clean_up().unwrap();
	assert_eq!(moved.len(), 1);
	assert!(moved[0].join("first.txt").exists());
	assert!(moved[0].parent().unwrap().file_name().unwrap().to_string_lossy().starts_with("Duplicates_"));
}

// vim: ts=4
