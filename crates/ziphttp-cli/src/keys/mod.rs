use std::collections::HashMap;

use clap::Arg;

pub mod key_names {
	// global
	pub(crate) const VERBOSE: &str = "VERBOSE";
	pub(crate) const QUIET: &str = "QUIET";
	pub(crate) const JSON_LOG: &str = "JSON_LOG";
	pub(crate) const ARCHIVE: &str = "ARCHIVE";
	pub(crate) const SELF: &str = "SELF";

	// builder
	pub(crate) const SOURCES: &str = "SOURCES";
	pub(crate) const STRIP_ROOT: &str = "STRIP_ROOT";
	pub(crate) const EXCLUDE: &str = "EXCLUDE";
	pub(crate) const STORED: &str = "STORED";
	pub(crate) const MIN_SIZE: &str = "MIN_SIZE";
	pub(crate) const NO_ZOPFLI: &str = "NO_ZOPFLI";
	pub(crate) const ASIS: &str = "ASIS";
	pub(crate) const BASE_URL: &str = "BASE_URL";
	pub(crate) const SITEMAP: &str = "SITEMAP";
	pub(crate) const PARALLEL: &str = "PARALLEL";
	pub(crate) const DELETE: &str = "DELETE";
	pub(crate) const NO_CRC: &str = "NO_CRC";
	pub(crate) const CHOOSE_LAST: &str = "CHOOSE_LAST";
	pub(crate) const SORT_BY: &str = "SORT_BY";
	pub(crate) const REVERSE: &str = "REVERSE";
	pub(crate) const IN_MEMORY: &str = "IN_MEMORY";
	pub(crate) const PROGRESS: &str = "PROGRESS";

	// webserver
	pub(crate) const LISTEN: &str = "LISTEN";
	pub(crate) const ADD_ARCHIVE: &str = "ADD_ARCHIVE";
	pub(crate) const INDEX_NAME: &str = "INDEX_NAME";
	pub(crate) const DIR_REDIRECT: &str = "DIR_REDIRECT";
	pub(crate) const STRIP_PREFIX: &str = "STRIP_PREFIX";
	pub(crate) const ADD_PREFIX: &str = "ADD_PREFIX";
	pub(crate) const READ_TIMEOUT: &str = "READ_TIMEOUT";
	pub(crate) const READ_HEADER_TIMEOUT: &str = "READ_HEADER_TIMEOUT";
	pub(crate) const WRITE_TIMEOUT: &str = "WRITE_TIMEOUT";
	pub(crate) const IDLE_TIMEOUT: &str = "IDLE_TIMEOUT";
	pub(crate) const HEADER: &str = "HEADER";
	pub(crate) const AUTO_RELOAD: &str = "AUTO_RELOAD";
	pub(crate) const SUPPORT_GZ: &str = "SUPPORT_GZ";

	// zip2gzip
	pub(crate) const ALL: &str = "ALL";
	pub(crate) const TAR: &str = "TAR";
	pub(crate) const TAR_FORMAT: &str = "TAR_FORMAT";
	pub(crate) const PATTERNS: &str = "PATTERNS";

	// zipsort
	pub(crate) const STRIP_PREFIXES: &str = "STRIP_PREFIXES";

	// testlink
	pub(crate) const URL: &str = "URL";
	pub(crate) const FILES: &str = "FILES";

	// version
	pub(crate) const FULL_VERSION: &str = "FULL_VERSION";
}

pub fn build_keys<'a>() -> HashMap<&'static str, Arg<'a>> {
	/* please only use this function once during the lifecycle of the program */
	let mut map = HashMap::with_capacity(40);

	map.insert(
		key_names::VERBOSE,
		Arg::new(key_names::VERBOSE)
			.short('v')
			.long("verbose")
			.global(true)
			.help("show verbose logs"),
	);
	map.insert(
		key_names::QUIET,
		Arg::new(key_names::QUIET)
			.short('q')
			.long("quiet")
			.global(true)
			.help("suppress logs"),
	);
	map.insert(
		key_names::JSON_LOG,
		Arg::new(key_names::JSON_LOG)
			.long("json-log")
			.global(true)
			.help("use json format for logging"),
	);
	map.insert(
		key_names::ARCHIVE,
		Arg::new(key_names::ARCHIVE)
			.short('f')
			.long("archive")
			.global(true)
			.takes_value(true)
			.value_name("FILE")
			.help("archive file (env: ZIPHTTP_ARCHIVE)"),
	);
	map.insert(
		key_names::SELF,
		Arg::new(key_names::SELF)
			.long("self")
			.global(true)
			.help("use executable zip (env: ZIPHTTP_SELF)"),
	);

	map.insert(
		key_names::SOURCES,
		Arg::new(key_names::SOURCES)
			.takes_value(true)
			.multiple_values(true)
			.value_name("SOURCE")
			.help("directories, files and .zip archives to ingest"),
	);
	map.insert(
		key_names::STRIP_ROOT,
		Arg::new(key_names::STRIP_ROOT)
			.short('s')
			.long("strip-root")
			.help("strip root path"),
	);
	map.insert(
		key_names::EXCLUDE,
		Arg::new(key_names::EXCLUDE)
			.short('x')
			.long("exclude")
			.takes_value(true)
			.multiple_occurrences(true)
			.value_name("GLOB")
			.help("exclude files"),
	);
	map.insert(
		key_names::STORED,
		Arg::new(key_names::STORED)
			.short('n')
			.long("stored")
			.takes_value(true)
			.multiple_occurrences(true)
			.value_name("GLOB")
			.help("non compress patterns"),
	);
	map.insert(
		key_names::MIN_SIZE,
		Arg::new(key_names::MIN_SIZE)
			.short('m')
			.long("min-size")
			.takes_value(true)
			.default_value("512")
			.help("compress minimum size"),
	);
	map.insert(
		key_names::NO_ZOPFLI,
		Arg::new(key_names::NO_ZOPFLI)
			.long("no-zopfli")
			.help("do not use zopfli compress"),
	);
	map.insert(
		key_names::ASIS,
		Arg::new(key_names::ASIS)
			.long("asis")
			.help("copy as-is from zipfile"),
	);
	map.insert(
		key_names::BASE_URL,
		Arg::new(key_names::BASE_URL)
			.long("baseurl")
			.takes_value(true)
			.value_name("URL")
			.help("rewrite html link to relative"),
	);
	map.insert(
		key_names::SITEMAP,
		Arg::new(key_names::SITEMAP)
			.long("sitemap")
			.takes_value(true)
			.value_name("URL")
			.help("generate sitemap.xml"),
	);
	map.insert(
		key_names::PARALLEL,
		Arg::new(key_names::PARALLEL)
			.short('p')
			.long("parallel")
			.takes_value(true)
			.help("parallel compression, defaults to number of CPUs"),
	);
	map.insert(
		key_names::DELETE,
		Arg::new(key_names::DELETE)
			.long("delete")
			.help("skip removed files"),
	);
	map.insert(
		key_names::NO_CRC,
		Arg::new(key_names::NO_CRC)
			.long("no-crc")
			.help("do not use CRC32 to detect change"),
	);
	map.insert(
		key_names::CHOOSE_LAST,
		Arg::new(key_names::CHOOSE_LAST)
			.long("choose-last")
			.help("choose first of same as last"),
	);
	map.insert(
		key_names::SORT_BY,
		Arg::new(key_names::SORT_BY)
			.long("sort-by")
			.takes_value(true)
			.possible_values(["none", "name", "time", "usize", "csize"])
			.help("sort order of the merged archive"),
	);
	map.insert(
		key_names::REVERSE,
		Arg::new(key_names::REVERSE)
			.short('r')
			.long("reverse")
			.help("reversed order"),
	);
	map.insert(
		key_names::IN_MEMORY,
		Arg::new(key_names::IN_MEMORY)
			.long("in-memory")
			.help("zip: do not use /tmp, webserver: load zip to memory"),
	);
	map.insert(
		key_names::PROGRESS,
		Arg::new(key_names::PROGRESS)
			.long("progress")
			.help("show progress bar"),
	);

	map.insert(
		key_names::LISTEN,
		Arg::new(key_names::LISTEN)
			.short('l')
			.long("listen")
			.takes_value(true)
			.default_value(":3000")
			.help("listen address:port"),
	);
	map.insert(
		key_names::ADD_ARCHIVE,
		Arg::new(key_names::ADD_ARCHIVE)
			.long("add")
			.takes_value(true)
			.multiple_occurrences(true)
			.value_name("FILE")
			.help("add zip name"),
	);
	map.insert(
		key_names::INDEX_NAME,
		Arg::new(key_names::INDEX_NAME)
			.long("index")
			.takes_value(true)
			.default_value("index.html")
			.help("index filename"),
	);
	map.insert(
		key_names::DIR_REDIRECT,
		Arg::new(key_names::DIR_REDIRECT)
			.long("directory-redirect")
			.help("auto redirect when missing '/'"),
	);
	map.insert(
		key_names::STRIP_PREFIX,
		Arg::new(key_names::STRIP_PREFIX)
			.long("stripprefix")
			.takes_value(true)
			.help("strip prefix from archive"),
	);
	map.insert(
		key_names::ADD_PREFIX,
		Arg::new(key_names::ADD_PREFIX)
			.long("addprefix")
			.takes_value(true)
			.help("add prefix to URL path"),
	);
	map.insert(
		key_names::READ_TIMEOUT,
		Arg::new(key_names::READ_TIMEOUT)
			.long("read-timeout")
			.takes_value(true)
			.default_value("10s"),
	);
	map.insert(
		key_names::READ_HEADER_TIMEOUT,
		Arg::new(key_names::READ_HEADER_TIMEOUT)
			.long("read-header-timeout")
			.takes_value(true)
			.default_value("10s"),
	);
	map.insert(
		key_names::WRITE_TIMEOUT,
		Arg::new(key_names::WRITE_TIMEOUT)
			.long("write-timeout")
			.takes_value(true)
			.default_value("30s"),
	);
	map.insert(
		key_names::IDLE_TIMEOUT,
		Arg::new(key_names::IDLE_TIMEOUT)
			.long("idle-timeout")
			.takes_value(true)
			.default_value("10s"),
	);
	map.insert(
		key_names::HEADER,
		Arg::new(key_names::HEADER)
			.short('H')
			.long("header")
			.takes_value(true)
			.multiple_occurrences(true)
			.value_name("K:V")
			.help("custom response headers"),
	);
	map.insert(
		key_names::AUTO_RELOAD,
		Arg::new(key_names::AUTO_RELOAD)
			.long("autoreload")
			.help("detect zip file change and reload"),
	);
	map.insert(
		key_names::SUPPORT_GZ,
		Arg::new(key_names::SUPPORT_GZ)
			.long("support-gz")
			.help("support *.gz URL"),
	);

	map.insert(
		key_names::ALL,
		Arg::new(key_names::ALL)
			.short('a')
			.long("all")
			.help("extract non-deflate file too"),
	);
	map.insert(
		key_names::TAR,
		Arg::new(key_names::TAR)
			.short('t')
			.long("tar")
			.takes_value(true)
			.value_name("FILE")
			.help("create single .gz.tar, '-' for stdout"),
	);
	map.insert(
		key_names::TAR_FORMAT,
		Arg::new(key_names::TAR_FORMAT)
			.long("tar-format")
			.takes_value(true)
			.possible_values(["GNU", "USTAR"])
			.default_value("GNU")
			.help("format of tar file"),
	);
	map.insert(
		key_names::PATTERNS,
		Arg::new(key_names::PATTERNS)
			.takes_value(true)
			.multiple_values(true)
			.value_name("GLOB")
			.help("only extract matching names"),
	);

	map.insert(
		key_names::STRIP_PREFIXES,
		Arg::new(key_names::STRIP_PREFIXES)
			.long("strip-prefix")
			.takes_value(true)
			.multiple_occurrences(true)
			.help("strip prefixes"),
	);

	map.insert(
		key_names::URL,
		Arg::new(key_names::URL)
			.long("url")
			.takes_value(true)
			.help("document url the files live at"),
	);
	map.insert(
		key_names::FILES,
		Arg::new(key_names::FILES)
			.takes_value(true)
			.multiple_values(true)
			.value_name("FILE")
			.help("files to process"),
	);

	map.insert(
		key_names::FULL_VERSION,
		Arg::new(key_names::FULL_VERSION)
			.long("full-version")
			.help("show build metadata too"),
	);

	map
}
