use ziphttp::archive::{method, ZipArchive};

use super::{CommandTrait, GlobalOptions};

pub const VERSION: &str = "0.4.0";

/// Enumerates the central directory of the archive.
pub struct Evaluator;

impl CommandTrait for Evaluator {
	fn evaluate(&self, global: &GlobalOptions, _args: &clap::ArgMatches) -> anyhow::Result<()> {
		let archive = ZipArchive::open(global.archive_filename()?)?;
		for entry in archive.entries() {
			if entry.is_dir() {
				println!("/ {}", entry.name);
			} else if entry.method != method::DEFLATE {
				println!("! {} {} {}", entry.name, entry.compressed_size, entry.uncompressed_size);
			} else {
				println!("D {} {} {}", entry.name, entry.compressed_size, entry.uncompressed_size);
			}
		}
		Ok(())
	}
}
