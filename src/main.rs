use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;

use sanimove::engine::purge_staging;
use sanimove::fs_ops::FsMover;
use sanimove::intake::HotFolder;
use sanimove::journal::{Category, EventLog, ProjectLog};
use sanimove::logging::*;
use sanimove::utils::{setup_signal_handlers, PidLock};
use sanimove::{BatchOutcome, Config, Orchestrator, SanitiseError};

///////////////////////
// Utility functions //
///////////////////////

fn cli() -> Command {
	Command::new("sanimove")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Sanitise illegal filenames and move hot-folder projects into the archive")
		.arg(Arg::new("config").long("config").value_name("FILE").help("TOML or JSON5 config file"))
		.arg(
			Arg::new("target")
				.short('t')
				.long("target")
				.value_name("DIR")
				.help("Hot folder root containing \"To Archive\""),
		)
		.arg(Arg::new("passdir").short('p').long("passdir").value_name("DIR").help("Archive destination root"))
		.arg(
			Arg::new("rename-log-dir")
				.short('r')
				.long("rename-log-dir")
				.value_name("DIR")
				.help("Directory for per-project rename logs (usually on the destination)"),
		)
		.arg(
			Arg::new("logstash-dir")
				.short('l')
				.long("logstash-dir")
				.value_name("DIR")
				.help("Directory for machine-readable category logs"),
		)
		.arg(
			Arg::new("oversizelog")
				.short('o')
				.long("oversizelog")
				.value_name("FILE")
				.help("File to record overlong paths in"),
		)
		.arg(Arg::new("temp-log-file").long("temp-log-file").value_name("FILE").help("Log for pre-project messages"))
		.arg(
			Arg::new("quiet")
				.short('q')
				.long("quiet")
				.action(ArgAction::SetTrue)
				.help("Do not echo the project log to stdout"),
		)
		.arg(
			Arg::new("dorename")
				.short('d')
				.long("dorename")
				.action(ArgAction::SetTrue)
				.help("Rename illegal names instead of only reporting them"),
		)
		.arg(
			Arg::new("casesensitive")
				.short('c')
				.long("casesensitive")
				.action(ArgAction::SetTrue)
				.help("Rename names that differ from a sibling only by case"),
		)
		.arg(
			Arg::new("trust-source")
				.long("trust-source")
				.action(ArgAction::SetTrue)
				.help("Let same-or-larger incoming files overwrite differing archive files"),
		)
		.arg(
			Arg::new("no-pid")
				.long("no-pid")
				.action(ArgAction::SetTrue)
				.help("Do not take the single-instance lock"),
		)
}

/// Defaults, then config file, then flags
fn load_config(matches: &ArgMatches) -> Result<Config, SanitiseError> {
	let mut config = match matches.get_one::<String>("config") {
		Some(path) => Config::from_file(&PathBuf::from(path))?,
		None => Config::default(),
	};

	let path = |name: &str| matches.get_one::<String>(name).map(PathBuf::from);
	if let Some(target) = path("target") {
		config.target = target;
	}
	if let Some(pass_dir) = path("passdir") {
		config.pass_dir = pass_dir;
	}
	if let Some(dir) = path("rename-log-dir") {
		config.rename_log_dir = Some(dir);
	}
	if let Some(dir) = path("logstash-dir") {
		config.logstash_dir = dir;
	}
	if let Some(file) = path("oversizelog") {
		config.oversize_log = Some(file);
	}
	if let Some(file) = path("temp-log-file") {
		config.temp_log_file = file;
	}

	config.quiet |= matches.get_flag("quiet");
	config.rename |= matches.get_flag("dorename");
	config.case_sensitive |= matches.get_flag("casesensitive");
	config.trust_source |= matches.get_flag("trust-source");
	if matches.get_flag("no-pid") {
		config.create_pid = false;
	}

	config.validate()?;
	Ok(config)
}

fn run(config: Config) -> Result<BatchOutcome, SanitiseError> {
	let orchestrator = Orchestrator::new(config)?;
	let outcome = orchestrator.run_once();
	if let Err(e) = orchestrator.clean_up() {
		error!("Cannot clean up staging area: {}", e);
	}
	outcome
}

#[tokio::main]
async fn main() -> ExitCode {
	init_tracing();

	let config = match load_config(&cli().get_matches()) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("{}", e);
			return ExitCode::FAILURE;
		}
	};

	let temp_log = ProjectLog::new(vec![config.temp_log_file.clone()], config.quiet);
	let _lock = if config.create_pid {
		match PidLock::acquire(&config.pid_file()) {
			Ok(lock) => Some(lock),
			Err(SanitiseError::LockFailed { message }) => {
				temp_log.line(&format!("Already running: {}", message));
				return ExitCode::SUCCESS;
			}
			Err(e) => {
				error!("{}", e);
				return ExitCode::FAILURE;
			}
		}
	} else {
		None
	};

	{
		let hot = HotFolder::new(&config.target);
		let pid_file = config.create_pid.then(|| config.pid_file());
		let log = temp_log.clone();
		setup_signal_handlers(move || {
			if let Err(e) = purge_staging(&hot, &FsMover, &log) {
				error!("Cannot clean up staging area: {}", e);
			}
			if let Some(pid_file) = &pid_file {
				let _ = std::fs::remove_file(pid_file);
			}
		});
	}

	let events = EventLog::new(Some(config.logstash_dir.clone()));
	let result = match tokio::task::spawn_blocking(move || run(config)).await {
		Ok(result) => result,
		Err(e) => Err(SanitiseError::Other { message: format!("Worker failed: {}", e) }),
	};

	match result {
		Ok(BatchOutcome::Idle) => debug!("Nothing to do"),
		Ok(BatchOutcome::Busy { project }) => info!("{} is still being written to", project),
		Ok(BatchOutcome::Archived(batch)) => {
			info!("{} archived, {} files transferred", batch.name, batch.transferred.len())
		}
		Ok(BatchOutcome::Quarantined { project, location, reason }) => {
			warn!("{} quarantined at {}: {}", project, location.display(), reason)
		}
		Err(e) => {
			error!("{}", e);
			events.append(Category::Errors, &[format!("[{}] {}", sanimove::journal::time_stamp(), e)]);
			return ExitCode::FAILURE;
		}
	}

	ExitCode::SUCCESS
}


// vim: ts=4
