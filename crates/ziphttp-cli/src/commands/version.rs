use super::{CommandTrait, GlobalOptions};
use crate::keys::key_names;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prints the version, optionally with build metadata.
pub struct Evaluator;

impl CommandTrait for Evaluator {
	fn evaluate(&self, _global: &GlobalOptions, args: &clap::ArgMatches) -> anyhow::Result<()> {
		if args.is_present(key_names::FULL_VERSION) {
			let commit = option_env!("ZIPHTTP_COMMIT").unwrap_or("unknown");
			let date = option_env!("ZIPHTTP_BUILD_DATE").unwrap_or("unknown");
			println!("ziphttp {} hash {} build {}", VERSION, commit, date);
		} else {
			println!("ziphttp {}", VERSION);
		}
		Ok(())
	}
}
