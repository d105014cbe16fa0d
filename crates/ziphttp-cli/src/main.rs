// Fundamental modules
mod app;
mod commands;
mod keys;

use std::io::Write;

use log::LevelFilter;

use commands::GlobalOptions;

fn json_escape(input: &str) -> String {
	let mut out = String::with_capacity(input.len() + 2);
	for ch in input.chars() {
		match ch {
			'"' => out.push_str("\\\""),
			'\\' => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			'\r' => out.push_str("\\r"),
			'\t' => out.push_str("\\t"),
			c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
			c => out.push(c),
		}
	}
	out
}

fn init_log(global: &GlobalOptions) {
	let level = if global.verbose {
		LevelFilter::Debug
	} else if global.quiet {
		LevelFilter::Warn
	} else {
		LevelFilter::Info
	};
	let mut builder = env_logger::Builder::new();
	builder.filter_level(level);
	if global.json_log {
		builder.format(|buf, record| {
			writeln!(
				buf,
				"{{\"time\":\"{}\",\"level\":\"{}\",\"target\":\"{}\",\"msg\":\"{}\"}}",
				chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
				record.level(),
				record.target(),
				json_escape(&record.args().to_string()),
			)
		});
	}
	let _ = builder.try_init();
}

// NOTE: Unwrapping in a CLI is a no-no. Throwing Rust developer errors at average users is mental overload
fn real_main() -> i32 {
	let keys = keys::build_keys();
	let app = app::build_app(keys);
	let commands = commands::build_commands();

	let matches = match app.try_get_matches() {
		Ok(matches) => matches,
		Err(err) => {
			let exit = match err.kind() {
				clap::ErrorKind::DisplayHelp | clap::ErrorKind::DisplayVersion => 0,
				_ => 1,
			};
			let _ = err.print();
			return exit;
		},
	};

	match matches.subcommand() {
		Some((name, sub_matches)) => {
			let global = GlobalOptions::from_matches(sub_matches);
			init_log(&global);
			match commands.get(name) {
				Some(command) => match command.evaluate(&global, sub_matches) {
					Ok(()) => 0,
					Err(err) => {
						log::error!("error exit: error={:#}", err);
						1
					},
				},
				None => 1,
			}
		},
		None => {
			eprintln!("Please specify a subcommand: webserver ziplist zip2gzip testlink zipsort zip version");
			eprintln!("Run `ziphttp --help` for the manual");
			0
		},
	}
}

fn main() {
	std::process::exit(real_main());
}
