use std::str::FromStr;

use indicatif::{ProgressBar, ProgressStyle};
use ziphttp::archive::DeflateProfile;
use ziphttp::builder::{build, BuildOptions, SortBy};

use super::{CommandTrait, GlobalOptions};
use crate::keys::key_names;

pub const VERSION: &str = "0.4.0";

/// Builds a fresh archive from directories, files and sibling archives.
pub struct Evaluator;

impl CommandTrait for Evaluator {
	fn evaluate(&self, global: &GlobalOptions, args: &clap::ArgMatches) -> anyhow::Result<()> {
		let output = global.archive_filename()?;
		let sources: Vec<String> = args
			.values_of(key_names::SOURCES)
			.map(|values| values.map(String::from).collect())
			.unwrap_or_default();
		if sources.is_empty() {
			anyhow::bail!("no sources given");
		}

		let options = BuildOptions {
			strip_root: args.is_present(key_names::STRIP_ROOT),
			exclude: args
				.values_of(key_names::EXCLUDE)
				.map(|values| values.map(String::from).collect())
				.unwrap_or_default(),
			stored: args
				.values_of(key_names::STORED)
				.map(|values| values.map(String::from).collect())
				.unwrap_or_default(),
			min_size: args.value_of(key_names::MIN_SIZE).unwrap_or("512").parse()?,
			profile: if args.is_present(key_names::NO_ZOPFLI) {
				DeflateProfile::Normal
			} else {
				DeflateProfile::Zopfli
			},
			use_asis: args.is_present(key_names::ASIS),
			base_url: args.value_of(key_names::BASE_URL).map(String::from),
			sitemap_url: args.value_of(key_names::SITEMAP).map(String::from),
			parallel: args
				.value_of(key_names::PARALLEL)
				.map(|v| v.parse())
				.transpose()?
				.unwrap_or(0),
			delete: args.is_present(key_names::DELETE),
			no_crc: args.is_present(key_names::NO_CRC),
			choose_last: args.is_present(key_names::CHOOSE_LAST),
			sort_by: SortBy::from_str(args.value_of(key_names::SORT_BY).unwrap_or("none"))?,
			reverse: args.is_present(key_names::REVERSE),
			in_memory: args.is_present(key_names::IN_MEMORY),
			..Default::default()
		};

		if args.is_present(key_names::PROGRESS) {
			let progress = ProgressBar::new_spinner();
			progress.set_style(ProgressStyle::default_spinner().template(super::PROGRESS_BAR_STYLE)?);
			let mut callback = |name: &str| {
				progress.set_message(name.to_string());
				progress.inc(1);
			};
			build(&output, &sources, global.self_exec, &options, Some(&mut callback))?;
			progress.finish_with_message(format!("written to {}", output.display()));
		} else {
			build(&output, &sources, global.self_exec, &options, None)?;
		}
		Ok(())
	}
}
