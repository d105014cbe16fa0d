use std::time::Duration;

use glob::Pattern;

use crate::global::error::*;

/// Returns true when the basename of `name` matches any of the glob `patterns`.
/// Invalid patterns never match.
pub fn ismatch(name: &str, patterns: &[String]) -> bool {
	let base = basename(name);
	if base.is_empty() {
		return false;
	}
	patterns.iter().any(|pat| match Pattern::new(pat) {
		Ok(p) => p.matches(base),
		Err(_) => false,
	})
}

/// Final path segment of a `/`-separated name.
pub fn basename(name: &str) -> &str {
	name.rsplit('/').next().unwrap_or(name)
}

/// Lexically cleans a POSIX path: collapses `//`, resolves `.` and `..` segments.
/// Keeps a leading `/` when the input had one.
fn clean(path: &str) -> Vec<&str> {
	let mut out: Vec<&str> = Vec::new();
	for seg in path.split('/') {
		match seg {
			"" | "." => {},
			".." => {
				if out.last().map(|s| *s != "..").unwrap_or(false) {
					out.pop();
				} else if !path.starts_with('/') {
					out.push("..");
				}
			},
			other => out.push(other),
		}
	}
	out
}

/// Computes the path that reaches `target` relative to the directory `base`.
/// Both inputs must agree on being absolute or relative, otherwise `None`.
pub fn relative_path(base: &str, target: &str) -> Option<String> {
	if base.starts_with('/') != target.starts_with('/') {
		return None;
	}
	let b = clean(base);
	let t = clean(target);

	let common = b.iter().zip(t.iter()).take_while(|(x, y)| x == y).count();

	let mut segs: Vec<&str> = Vec::with_capacity(b.len() - common + t.len() - common);
	for _ in common..b.len() {
		segs.push("..");
	}
	segs.extend(&t[common..]);

	if segs.is_empty() {
		return Some(".".into());
	}
	Some(segs.join("/"))
}

/// Collapses every run of consecutive `/` in `path` down to a single one.
pub fn collapse_slashes(path: &str) -> String {
	let mut out = String::with_capacity(path.len());
	let mut prev_slash = false;
	for ch in path.chars() {
		if ch == '/' {
			if !prev_slash {
				out.push(ch);
			}
			prev_slash = true;
		} else {
			out.push(ch);
			prev_slash = false;
		}
	}
	out
}

/// Parses duration specs like `10s`, `500ms`, `3m` or `1h`. A bare number means seconds.
pub fn parse_duration(spec: &str) -> InternalResult<Duration> {
	let spec = spec.trim();
	let split = spec
		.char_indices()
		.find(|(_, c)| !c.is_ascii_digit())
		.map(|(i, _)| i)
		.unwrap_or(spec.len());
	let (num, unit) = spec.split_at(split);
	let value: u64 = num
		.parse()
		.map_err(|_| InternalError::InvalidConfig(format!("invalid duration: {}", spec)))?;
	match unit {
		"ms" => Ok(Duration::from_millis(value)),
		"" | "s" => Ok(Duration::from_secs(value)),
		"m" => Ok(Duration::from_secs(value * 60)),
		"h" => Ok(Duration::from_secs(value * 3600)),
		_ => Err(InternalError::InvalidConfig(format!("invalid duration: {}", spec))),
	}
}
