//! Collects the URL set for a generated `sitemap.xml`. Which names go in
//! (and how index documents collapse to their directory) is decided here;
//! the XML itself is a plain urlset with `loc` and `lastmod` per entry.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use log::debug;

use crate::global::error::*;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

struct SiteUrl {
	location: String,
	updated_at: DateTime<Utc>,
}

/// Accumulates one `<url>` per archived file.
pub struct SiteMap {
	urls: Vec<SiteUrl>,
	last_mod: DateTime<Utc>,
}

fn join_url(base: &str, name: &str) -> String {
	format!("{}/{}", base.trim_end_matches('/'), name.trim_start_matches('/'))
}

fn escape_xml(input: &str) -> String {
	let mut out = String::with_capacity(input.len());
	for ch in input.chars() {
		match ch {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'\'' => out.push_str("&apos;"),
			'"' => out.push_str("&quot;"),
			other => out.push(other),
		}
	}
	out
}

impl SiteMap {
	pub fn new() -> SiteMap {
		SiteMap {
			urls: Vec::new(),
			last_mod: Utc.timestamp_opt(0, 0).unwrap(),
		}
	}

	/// Registers `name` under `base_url`. A name ending in `/<index_name>`
	/// is listed as its directory.
	pub fn add_file(&mut self, base_url: &str, index_name: &str, name: &str, updated: DateTime<Utc>) -> InternalResult {
		let mut location = join_url(base_url, name);
		let index_suffix = format!("/{}", index_name);
		if location.ends_with(&index_suffix) {
			location.truncate(location.len() - index_name.len());
		}
		debug!("sitemap add: {}", location);
		self.urls.push(SiteUrl {
			location,
			updated_at: updated,
		});
		if updated > self.last_mod {
			self.last_mod = updated;
		}
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.urls.len()
	}

	pub fn is_empty(&self) -> bool {
		self.urls.is_empty()
	}

	/// Newest modification time across all registered files.
	pub fn last_mod(&self) -> DateTime<Utc> {
		self.last_mod
	}

	/// Serializes the urlset.
	pub fn to_xml(&self) -> String {
		let mut out = String::new();
		out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
		out.push_str(&format!("<urlset xmlns=\"{}\">\n", SITEMAP_NS));
		for url in &self.urls {
			out.push_str("  <url>\n");
			out.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&url.location)));
			out.push_str(&format!(
				"    <lastmod>{}</lastmod>\n",
				url.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
			));
			out.push_str("  </url>\n");
		}
		out.push_str("</urlset>\n");
		out
	}
}

impl Default for SiteMap {
	fn default() -> SiteMap {
		SiteMap::new()
	}
}
