use std::collections::HashMap;

use clap::{Arg, Command};

use crate::commands;
use crate::keys::key_names;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn build_app<'a>(key_map: HashMap<&'static str, Arg<'a>>) -> Command<'a> {
	Command::new("ziphttp")
		.about("Serve a site out of a single ZIP archive, or build that archive")
		.version(self::VERSION)
		.arg(key_map.get(key_names::VERBOSE).unwrap())
		.arg(key_map.get(key_names::QUIET).unwrap())
		.arg(key_map.get(key_names::JSON_LOG).unwrap())
		.arg(key_map.get(key_names::ARCHIVE).unwrap())
		.arg(key_map.get(key_names::SELF).unwrap())
		.subcommand(
			Command::new("webserver")
				.version(commands::webserver::VERSION)
				.about("boot webserver")
				.arg(key_map.get(key_names::LISTEN).unwrap())
				.arg(key_map.get(key_names::ADD_ARCHIVE).unwrap())
				.arg(key_map.get(key_names::INDEX_NAME).unwrap())
				.arg(key_map.get(key_names::DIR_REDIRECT).unwrap())
				.arg(key_map.get(key_names::STRIP_PREFIX).unwrap())
				.arg(key_map.get(key_names::ADD_PREFIX).unwrap())
				.arg(key_map.get(key_names::READ_TIMEOUT).unwrap())
				.arg(key_map.get(key_names::READ_HEADER_TIMEOUT).unwrap())
				.arg(key_map.get(key_names::WRITE_TIMEOUT).unwrap())
				.arg(key_map.get(key_names::IDLE_TIMEOUT).unwrap())
				.arg(key_map.get(key_names::IN_MEMORY).unwrap())
				.arg(key_map.get(key_names::HEADER).unwrap())
				.arg(key_map.get(key_names::AUTO_RELOAD).unwrap())
				.arg(key_map.get(key_names::SUPPORT_GZ).unwrap()),
		)
		.subcommand(
			Command::new("zip")
				.version(commands::zip::VERSION)
				.about("create new archive from dir/file/zip")
				.arg(key_map.get(key_names::SOURCES).unwrap())
				.arg(key_map.get(key_names::STRIP_ROOT).unwrap())
				.arg(key_map.get(key_names::EXCLUDE).unwrap())
				.arg(key_map.get(key_names::STORED).unwrap())
				.arg(key_map.get(key_names::MIN_SIZE).unwrap())
				.arg(key_map.get(key_names::NO_ZOPFLI).unwrap())
				.arg(key_map.get(key_names::ASIS).unwrap())
				.arg(key_map.get(key_names::BASE_URL).unwrap())
				.arg(key_map.get(key_names::SITEMAP).unwrap())
				.arg(key_map.get(key_names::PARALLEL).unwrap())
				.arg(key_map.get(key_names::DELETE).unwrap())
				.arg(key_map.get(key_names::NO_CRC).unwrap())
				.arg(key_map.get(key_names::CHOOSE_LAST).unwrap())
				.arg(key_map.get(key_names::SORT_BY).unwrap())
				.arg(key_map.get(key_names::REVERSE).unwrap())
				.arg(key_map.get(key_names::IN_MEMORY).unwrap())
				.arg(key_map.get(key_names::PROGRESS).unwrap()),
		)
		.subcommand(
			Command::new("ziplist")
				.version(commands::ziplist::VERSION)
				.about("list zip names"),
		)
		.subcommand(
			Command::new("zip2gzip")
				.version(commands::zip2gzip::VERSION)
				.about("extract files from zip without decompress")
				.arg(key_map.get(key_names::PATTERNS).unwrap())
				.arg(key_map.get(key_names::ALL).unwrap())
				.arg(key_map.get(key_names::TAR).unwrap())
				.arg(key_map.get(key_names::TAR_FORMAT).unwrap()),
		)
		.subcommand(
			Command::new("zipsort")
				.version(commands::zipsort::VERSION)
				.about("merge and sort existing archives")
				.arg(key_map.get(key_names::SOURCES).unwrap())
				.arg(key_map.get(key_names::STRIP_PREFIXES).unwrap())
				.arg(key_map.get(key_names::EXCLUDE).unwrap())
				.arg(key_map.get(key_names::SORT_BY).unwrap())
				.arg(key_map.get(key_names::REVERSE).unwrap()),
		)
		.subcommand(
			Command::new("testlink")
				.version(commands::testlink::VERSION)
				.about("test rewrite link to relative")
				.arg(key_map.get(key_names::URL).unwrap())
				.arg(key_map.get(key_names::FILES).unwrap()),
		)
		.subcommand(
			Command::new("version")
				.version(commands::version::VERSION)
				.about("show version and exit")
				.arg(key_map.get(key_names::FULL_VERSION).unwrap()),
		)
}
