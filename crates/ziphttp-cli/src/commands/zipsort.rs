use std::collections::HashMap;
use std::str::FromStr;

use log::{debug, info};
use ziphttp::archive::{ZipArchive, ZipEntry, ZipWriter};
use ziphttp::builder::{prepare_output, SortBy};
use ziphttp::pathutil::ismatch;

use super::{CommandTrait, GlobalOptions};
use crate::keys::key_names;

pub const VERSION: &str = "0.4.0";

/// Whether a later entry should displace the one already kept for a name.
/// Identical content keeps the smaller then older copy; differing content
/// keeps the newer then larger one.
fn replace_with(prev: &ZipEntry, next: &ZipEntry) -> bool {
	if prev.crc32 == next.crc32 {
		if prev.compressed_size < next.compressed_size {
			return false;
		}
		if prev.compressed_size > next.compressed_size {
			return true;
		}
		return prev.modified > next.modified;
	}
	if prev.modified > next.modified {
		return false;
	}
	if prev.modified == next.modified && prev.uncompressed_size > next.uncompressed_size {
		return false;
	}
	true
}

/// Merges existing archives by pass-through copy, one entry per name.
pub struct Evaluator;

impl CommandTrait for Evaluator {
	fn evaluate(&self, global: &GlobalOptions, args: &clap::ArgMatches) -> anyhow::Result<()> {
		let output = global.archive_filename()?;
		let inputs: Vec<String> = args
			.values_of(key_names::SOURCES)
			.map(|values| values.map(String::from).collect())
			.unwrap_or_default();
		if inputs.is_empty() {
			anyhow::bail!("no input archives given");
		}
		let strip: Vec<String> = args
			.values_of(key_names::STRIP_PREFIXES)
			.map(|values| values.map(String::from).collect())
			.unwrap_or_default();
		let exclude: Vec<String> = args
			.values_of(key_names::EXCLUDE)
			.map(|values| values.map(String::from).collect())
			.unwrap_or_default();
		let sort_by = SortBy::from_str(args.value_of(key_names::SORT_BY).unwrap_or("none"))?;
		let reverse = args.is_present(key_names::REVERSE);

		let mut archives = Vec::with_capacity(inputs.len());
		for name in &inputs {
			archives.push(ZipArchive::open(name)?);
		}

		let mut files: HashMap<String, (usize, usize)> = HashMap::new();
		for (archive_index, archive) in archives.iter().enumerate() {
			for (entry_index, entry) in archive.entries().iter().enumerate() {
				if ismatch(&entry.name, &exclude) || entry.is_dir() {
					continue;
				}
				let mut name = entry.name.as_str();
				for prefix in &strip {
					name = name.strip_prefix(prefix.as_str()).unwrap_or(name);
				}
				match files.get(name) {
					None => {
						debug!("new: zip={} name={} archname={}", inputs[archive_index], entry.name, name);
						files.insert(name.to_string(), (archive_index, entry_index));
					},
					Some(&(prev_archive, prev_entry)) => {
						let prev = archives[prev_archive].entry(prev_entry);
						if replace_with(prev, entry) {
							info!("update: zip={} name={} arcname={}", inputs[archive_index], entry.name, name);
							files.insert(name.to_string(), (archive_index, entry_index));
						} else {
							info!("ignore: zip={} name={} arcname={}", inputs[archive_index], entry.name, name);
						}
					},
				}
			}
		}
		info!("read files: num={}", files.len());

		let mut names: Vec<String> = files.keys().cloned().collect();
		let entry_of = |name: &String| {
			let (archive_index, entry_index) = files[name];
			archives[archive_index].entry(entry_index)
		};
		match sort_by {
			SortBy::None => info!("no sort"),
			SortBy::Name => {
				names.sort();
				if reverse {
					names.reverse();
				}
			},
			SortBy::Time => {
				// newest first by default, like the chooser's freshness rule
				names.sort_by(|a, b| entry_of(b).modified.cmp(&entry_of(a).modified));
				if reverse {
					names.reverse();
				}
			},
			SortBy::UncompressedSize => {
				names.sort_by(|a, b| entry_of(a).uncompressed_size.cmp(&entry_of(b).uncompressed_size));
				if reverse {
					names.reverse();
				}
			},
			SortBy::CompressedSize => {
				names.sort_by(|a, b| entry_of(a).compressed_size.cmp(&entry_of(b).compressed_size));
				if reverse {
					names.reverse();
				}
			},
		}

		let (ofp, written) = prepare_output(&output, global.self_exec)?;
		let mut writer = ZipWriter::with_offset(ofp, written);
		for name in names {
			let (archive_index, entry_index) = files[&name];
			let copied = writer.copy_from(&archives[archive_index], entry_index, Some(name.clone()))?;
			debug!("copied: arcname={} written={}", name, copied);
		}
		let ofp = writer.finish()?;
		ofp.sync_all()?;
		Ok(())
	}
}
