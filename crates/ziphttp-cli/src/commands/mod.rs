use std::collections::HashMap;
use std::path::PathBuf;

use clap::ArgMatches;

use crate::keys::key_names;

pub mod testlink;
pub mod version;
pub mod webserver;
pub mod zip;
pub mod zip2gzip;
pub mod ziplist;
pub mod zipsort;

pub const PROGRESS_BAR_STYLE: &str = "{spinner} [{elapsed_precise}] {pos} entries: {msg}";

/// Options shared by every subcommand, with environment fallbacks.
pub struct GlobalOptions {
	pub verbose: bool,
	pub quiet: bool,
	pub json_log: bool,
	pub archive: Option<PathBuf>,
	pub self_exec: bool,
}

fn env_truthy(name: &str) -> bool {
	std::env::var(name)
		.map(|v| !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"))
		.unwrap_or(false)
}

impl GlobalOptions {
	pub fn from_matches(matches: &ArgMatches) -> GlobalOptions {
		let archive = matches
			.value_of(key_names::ARCHIVE)
			.map(PathBuf::from)
			.or_else(|| std::env::var(ziphttp::ENV_ARCHIVE).ok().filter(|v| !v.is_empty()).map(PathBuf::from));
		GlobalOptions {
			verbose: matches.is_present(key_names::VERBOSE),
			quiet: matches.is_present(key_names::QUIET),
			json_log: matches.is_present(key_names::JSON_LOG),
			archive,
			self_exec: matches.is_present(key_names::SELF) || env_truthy(ziphttp::ENV_SELF),
		}
	}

	/// The archive this invocation works on: the running executable with
	/// `--self`, otherwise the `--archive` flag or its environment fallback.
	pub fn archive_filename(&self) -> anyhow::Result<PathBuf> {
		if self.self_exec {
			return Ok(std::env::current_exe()?);
		}
		match &self.archive {
			Some(path) => Ok(path.clone()),
			None => anyhow::bail!("no archive given, use --archive or ZIPHTTP_ARCHIVE"),
		}
	}
}

pub trait CommandTrait {
	fn evaluate(&self, global: &GlobalOptions, args: &ArgMatches) -> anyhow::Result<()>;
}

pub fn build_commands() -> HashMap<&'static str, Box<dyn CommandTrait>> {
	let mut map: HashMap<&'static str, Box<dyn CommandTrait>> = HashMap::with_capacity(7);
	map.insert("webserver", Box::new(webserver::Evaluator));
	map.insert("zip", Box::new(zip::Evaluator));
	map.insert("ziplist", Box::new(ziplist::Evaluator));
	map.insert("zip2gzip", Box::new(zip2gzip::Evaluator));
	map.insert("zipsort", Box::new(zipsort::Evaluator));
	map.insert("testlink", Box::new(testlink::Evaluator));
	map.insert("version", Box::new(version::Evaluator));
	map
}
