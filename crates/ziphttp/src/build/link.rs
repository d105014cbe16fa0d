//! Rewrites same-origin absolute links inside HTML documents to
//! document-relative paths, so an archived site works from any mount point.

use std::io::{self, Read, Write};

use lol_html::{element, HtmlRewriter, Settings};
use log::{debug, warn};
use url::Url;

use crate::global::error::*;
use crate::util::{basename, ismatch, relative_path};

/// Directory part of a URL path, keeping the root.
fn path_dir(path: &str) -> &str {
	match path.rfind('/') {
		Some(0) | None => "/",
		Some(index) => &path[..index],
	}
}

/// The URL transformer: resolves `link` against `base` and, when scheme and
/// host agree, replaces it with a relative path. `None` means leave the
/// attribute untouched.
pub fn fix_link(base: &Url, link: &str) -> Option<String> {
	// credentials embedded in the link are never rewritten
	if let Ok(parsed) = Url::parse(link) {
		if !parsed.username().is_empty() || parsed.password().is_some() {
			debug!("url has userinfo, kept: {}", link);
			return None;
		}
	}
	let resolved = base.join(link).ok()?;
	if resolved.scheme() != base.scheme() || resolved.host_str() != base.host_str() {
		return None;
	}
	let mut rel = relative_path(path_dir(base.path()), resolved.path())?;
	if resolved.path().ends_with('/') && !rel.ends_with('/') {
		rel.push('/');
	}
	if let Some(query) = resolved.query() {
		rel.push('?');
		rel.push_str(query);
	}
	if let Some(fragment) = resolved.fragment() {
		rel.push('#');
		rel.push_str(fragment);
	}
	debug!("link change: base={} link={} new={}", base, link, rel);
	Some(rel)
}

fn rewrite_html(document: &Url, input: &[u8], output: &mut Vec<u8>) -> InternalResult {
	let handler = |attr: &'static str| {
		let document = document.clone();
		move |el: &mut lol_html::html_content::Element| {
			if let Some(value) = el.get_attribute(attr) {
				if let Some(fixed) = fix_link(&document, &value) {
					el.set_attribute(attr, &fixed)?;
				}
			}
			Ok(())
		}
	};
	let mut rewriter = HtmlRewriter::new(
		Settings {
			element_content_handlers: vec![
				element!("*[href]", handler("href")),
				element!("*[src]", handler("src")),
			],
			..Settings::default()
		},
		|chunk: &[u8]| output.extend_from_slice(chunk),
	);
	rewriter
		.write(input)
		.and_then(|_| rewriter.end())
		.map_err(|e| InternalError::RewriteError(e.to_string()))
}

/// Streams `input` to `output`, rewriting `href`/`src` attributes when the
/// document basename is `*.html` or `*.htm`. Everything else, including
/// `*.xml`, is copied byte-for-byte; a rewriter failure falls back to the
/// original bytes.
pub fn link_relative(document_url: &str, input: &mut dyn Read, output: &mut dyn Write) -> InternalResult {
	let html_patterns = ["*.html".to_string(), "*.htm".to_string()];
	let name = basename(document_url).to_lowercase();
	if !ismatch(&name, &html_patterns) {
		io::copy(input, output)?;
		return Ok(());
	}
	let document = match Url::parse(document_url) {
		Ok(u) => u,
		Err(err) => {
			warn!("invalid document url {}: {}", document_url, err);
			io::copy(input, output)?;
			return Ok(());
		},
	};
	debug!("link relative: here={}", document_url);

	let mut buffer = Vec::new();
	input.read_to_end(&mut buffer)?;
	let mut rewritten = Vec::with_capacity(buffer.len());
	match rewrite_html(&document, &buffer, &mut rewritten) {
		Ok(()) => output.write_all(&rewritten)?,
		Err(err) => {
			warn!("rewrite failed for {}, copying as-is: {}", document_url, err);
			output.write_all(&buffer)?;
		},
	}
	Ok(())
}
