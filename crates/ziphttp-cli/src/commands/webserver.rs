use std::path::PathBuf;

use log::info;
use ziphttp::pathutil::parse_duration;
use ziphttp::server::{run, ServeOptions, Timeouts};

use super::{CommandTrait, GlobalOptions};
use crate::keys::key_names;

pub const VERSION: &str = "0.4.0";

/// Boots the long-running server over the configured archive.
pub struct Evaluator;

impl CommandTrait for Evaluator {
	fn evaluate(&self, global: &GlobalOptions, args: &clap::ArgMatches) -> anyhow::Result<()> {
		let archive = global.archive_filename()?;
		let timeouts = Timeouts {
			read: parse_duration(args.value_of(key_names::READ_TIMEOUT).unwrap_or("10s"))?,
			read_header: parse_duration(args.value_of(key_names::READ_HEADER_TIMEOUT).unwrap_or("10s"))?,
			write: parse_duration(args.value_of(key_names::WRITE_TIMEOUT).unwrap_or("30s"))?,
			idle: parse_duration(args.value_of(key_names::IDLE_TIMEOUT).unwrap_or("10s"))?,
		};
		let options = ServeOptions {
			listen: args.value_of(key_names::LISTEN).unwrap_or(":3000").to_string(),
			additional: args
				.values_of(key_names::ADD_ARCHIVE)
				.map(|values| values.map(PathBuf::from).collect())
				.unwrap_or_default(),
			index_name: args
				.value_of(key_names::INDEX_NAME)
				.unwrap_or("index.html")
				.to_string(),
			dir_redirect: args.is_present(key_names::DIR_REDIRECT),
			strip_prefix: args.value_of(key_names::STRIP_PREFIX).unwrap_or("").to_string(),
			add_prefix: args.value_of(key_names::ADD_PREFIX).unwrap_or("").to_string(),
			timeouts,
			in_memory: args.is_present(key_names::IN_MEMORY),
			headers: args
				.values_of(key_names::HEADER)
				.map(|values| values.map(String::from).collect())
				.unwrap_or_default(),
			auto_reload: args.is_present(key_names::AUTO_RELOAD),
			support_gz: args.is_present(key_names::SUPPORT_GZ),
		};
		info!("serving archive: name={}", archive.display());
		run(archive, options)?;
		Ok(())
	}
}
