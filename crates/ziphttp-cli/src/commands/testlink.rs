use std::fs::File;
use std::io;

use log::error;
use ziphttp::builder::link_relative;

use super::{CommandTrait, GlobalOptions};
use crate::keys::key_names;

pub const VERSION: &str = "0.4.0";

/// Runs the link rewriter over plain files, printing the result.
pub struct Evaluator;

impl CommandTrait for Evaluator {
	fn evaluate(&self, _global: &GlobalOptions, args: &clap::ArgMatches) -> anyhow::Result<()> {
		let url = args.value_of(key_names::URL).unwrap_or("");
		let files = args
			.values_of(key_names::FILES)
			.map(|values| values.collect::<Vec<_>>())
			.unwrap_or_default();
		let stdout = io::stdout();
		for name in files {
			let mut reader = match File::open(name) {
				Ok(fp) => fp,
				Err(err) => {
					error!("open: name={} error={}", name, err);
					return Err(err.into());
				},
			};
			let mut writer = stdout.lock();
			if let Err(err) = link_relative(url, &mut reader, &mut writer) {
				error!("convert: name={} error={}", name, err);
				return Err(err.into());
			}
		}
		Ok(())
	}
}
