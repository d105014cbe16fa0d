//! The content-negotiated request handler. Every request resolves to an
//! archive name, then the fast paths stream pre-compressed bytes straight
//! out of the ZIP; only the fallback ever decompresses.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use log::{debug, error, info, warn};
use parking_lot::RwLock;

use crate::global::codec::method;
use crate::global::error::*;
use crate::global::gzip::{copy_gzip, GZIP_FOOTER_SIZE, GZIP_HEADER_SIZE};
use crate::serve::http::{http_date, parse_http_date, Request, ResponseWriter};
use crate::serve::index::{build_index, ArchiveSet, MethodIndex};
use crate::util::collapse_slashes;
use crate::zip::offset::archive_offset;
use crate::zip::reader::ZipArchive;
use crate::zip::record::ZipEntry;

/// Accepted content codings, parsed from `Accept-Encoding` as a bit set.
/// Quality values are ignored: listed means acceptable.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
struct AcceptEncoding(u32);

impl AcceptEncoding {
	const GZIP: u32 = 1 << 0;
	const COMPRESS: u32 = 1 << 1;
	const DEFLATE: u32 = 1 << 2;
	const BROTLI: u32 = 1 << 3;
	const IDENTITY: u32 = 1 << 4;
	const ZSTD: u32 = 1 << 5;
	const ANY: u32 = 1 << 6;

	fn contains(&self, bit: u32) -> bool {
		self.0 & bit != 0
	}
}

fn accept_encoding(request: &Request) -> AcceptEncoding {
	let mut bits = 0u32;
	let header = request.header("Accept-Encoding").unwrap_or("");
	for token in header.split(',') {
		let name = token.split(';').next().unwrap_or("").trim();
		match name {
			"" => {},
			"gzip" | "x-gzip" => bits |= AcceptEncoding::GZIP,
			"compress" | "x-compress" => bits |= AcceptEncoding::COMPRESS,
			"deflate" => bits |= AcceptEncoding::DEFLATE,
			"br" => bits |= AcceptEncoding::BROTLI,
			"identity" => bits |= AcceptEncoding::IDENTITY,
			"zstd" => bits |= AcceptEncoding::ZSTD,
			"*" => bits |= AcceptEncoding::ANY,
			other => info!("unknown encoding: encoding={} header={}", other, header),
		}
	}
	AcceptEncoding(bits)
}

/// Entry comment parsed as a media type, or empty.
fn make_contenttype(comment: &str) -> String {
	match comment.trim().parse::<mime::Mime>() {
		Ok(parsed) => parsed.to_string(),
		Err(_) => String::new(),
	}
}

/// Extension-derived media type, or empty.
fn make_contentbyext(name: &str) -> String {
	mime_guess::from_path(name)
		.first_raw()
		.unwrap_or("")
		.to_string()
}

/// True when the request's validators say the client copy is current.
/// An `If-None-Match` header, even a mismatching one, suppresses the
/// `If-Modified-Since` fallback.
pub(crate) fn conditional(request: &Request, etag: &str, entry: &ZipEntry) -> bool {
	match request.header("If-None-Match") {
		Some(candidate) if !candidate.is_empty() => candidate == etag,
		_ => match request.header("If-Modified-Since").and_then(parse_http_date) {
			Some(since) => entry.modified <= since,
			None => false,
		},
	}
}

/// Where the archives to serve come from, and how they reside.
#[derive(Clone)]
pub struct HandlerSources {
	pub archive: PathBuf,
	pub additional: Vec<PathBuf>,
	pub in_memory: bool,
}

/// Static handler configuration.
pub struct HandlerConfig {
	pub strip_prefix: String,
	pub add_prefix: String,
	pub index_name: String,
	pub dir_redirect: bool,
	pub support_gz: bool,
	/// custom response headers, already split on `:`
	pub headers: Vec<(String, String)>,
}

impl Default for HandlerConfig {
	fn default() -> HandlerConfig {
		HandlerConfig {
			strip_prefix: String::new(),
			add_prefix: String::new(),
			index_name: "index.html".into(),
			dir_redirect: false,
			support_gz: false,
			headers: Vec::new(),
		}
	}
}

struct HandlerState {
	set: ArchiveSet,
	index: MethodIndex,
}

/// Serves entries out of one or more ZIP archives. Requests take the read
/// side of the state lock for their whole lifetime; reloads swap the state
/// under the write side.
pub struct ZipHandler {
	config: HandlerConfig,
	state: RwLock<HandlerState>,
}

fn load_archive(path: &PathBuf, in_memory: bool) -> InternalResult<ZipArchive> {
	if in_memory {
		let offset = archive_offset(path)?;
		let mut fp = std::fs::File::open(path)?;
		use std::io::{Read, Seek, SeekFrom};
		fp.seek(SeekFrom::Start(offset))?;
		let mut buffer = Vec::new();
		fp.read_to_end(&mut buffer)?;
		debug!("memory size: file={} size={}", path.display(), buffer.len());
		ZipArchive::from_bytes(buffer)
	} else {
		ZipArchive::open(path)
	}
}

fn load_state(sources: &HandlerSources) -> InternalResult<HandlerState> {
	let mut archives = Vec::with_capacity(1 + sources.additional.len());
	archives.push(load_archive(&sources.archive, sources.in_memory)?);
	for path in &sources.additional {
		archives.push(load_archive(path, sources.in_memory)?);
	}
	let set = ArchiveSet::new(archives);
	let index = build_index(&set);
	Ok(HandlerState { set, index })
}

impl ZipHandler {
	/// Opens the archives and builds the first index.
	pub fn new(config: HandlerConfig, sources: &HandlerSources) -> InternalResult<ZipHandler> {
		let state = load_state(sources)?;
		info!(
			"open success: files={} names={}",
			state.set.files(),
			state.index.len()
		);
		Ok(ZipHandler {
			config,
			state: RwLock::new(state),
		})
	}

	/// Rebuilds the index from the given sources and swaps it in atomically.
	/// Readers observe either the old or the new state, never a mix; the old
	/// archives close after the swap completes.
	pub fn reload(&self, sources: &HandlerSources) -> InternalResult {
		let fresh = load_state(sources)?;
		let old = {
			let mut guard = self.state.write();
			std::mem::replace(&mut *guard, fresh)
		};
		drop(old);
		Ok(())
	}

	fn filename(&self, path: &str) -> String {
		let mut fname = path
			.strip_prefix(&self.config.add_prefix)
			.unwrap_or(path)
			.to_string();
		fname = format!("{}{}", self.config.strip_prefix, fname);
		if fname.ends_with('/') {
			fname.push_str(&self.config.index_name);
		} else if fname.is_empty() {
			fname = format!("/{}", self.config.index_name);
		}
		let fname = collapse_slashes(&fname);
		fname.trim_start_matches('/').to_string()
	}

	/// Serves one request and then emits the access log with the final
	/// status code.
	pub fn serve(&self, request: &Request, response: &mut ResponseWriter<'_>) {
		let start = Instant::now();
		self.serve_inner(request, response);
		self.access_log(start, request, response);
	}

	fn serve_inner(&self, request: &Request, response: &mut ResponseWriter<'_>) {
		let state = self.state.read();
		let fname = self.filename(&request.path);
		debug!("name: uri={} name={}", request.path, fname);

		let exists = |name: &str| state.index.contains_key(name);
		if self.config.dir_redirect && !exists(&fname) {
			let indexed = format!("{}/{}", fname, self.config.index_name);
			if exists(&indexed) {
				info!("directory redirect: url={} fname={}", request.path, fname);
				response.set_header("Location", format!("{}/", request.path));
				let _ = response.write_head(301);
				return;
			}
		}

		if self.config.support_gz && fname.ends_with(".gz") {
			let stem = fname.strip_suffix(".gz").unwrap_or(&fname);
			if let Some(&id) = state.index.get(stem).and_then(|m| m.get(&method::DEFLATE)) {
				debug!("gzip file: name={}", fname);
				let entry = state.set.entry(id);
				let etag = format!("W/{:x}", entry.crc32);
				response.set_header("Content-Type", "application/gzip");
				response.set_header("Etag", format!("{}_gz", etag));
				response.set_header(
					"Content-Length",
					(entry.compressed_size + GZIP_HEADER_SIZE + GZIP_FOOTER_SIZE).to_string(),
				);
				let _ = response.write_head(200);
				let (archive, local) = state.set.archive_of(id);
				match copy_gzip(response, archive, local) {
					Ok(written) => debug!("copygzip: written={}", written),
					Err(err) => error!("copygzip: error={}", err),
				}
				return;
			}
		}

		let encodings = accept_encoding(request);
		if encodings.contains(AcceptEncoding::BROTLI)
			&& self.handle_raw(&state, request, response, method::BROTLI, "br", &fname)
		{
			return;
		}
		if encodings.contains(AcceptEncoding::GZIP) && self.handle_gzip(&state, request, response, &fname) {
			return;
		}
		if encodings.contains(AcceptEncoding::DEFLATE)
			&& self.handle_raw(&state, request, response, method::DEFLATE, "deflate", &fname)
		{
			return;
		}

		// fallback: any method, decompressed
		let id = state.index.get(&fname).and_then(|m| m.values().next().copied());
		if let Some(id) = id {
			self.handle_fallback(&state, request, response, id, &fname);
			return;
		}

		let _ = response.write_head(404);
		let _ = response.write_all(b"not found");
	}

	/// Writes the headers common to every hit. Returns the entry's weak etag.
	fn common_headers(&self, response: &mut ResponseWriter<'_>, entry: &ZipEntry, fname: &str) -> String {
		if entry.is_encrypted() {
			warn!("encrypted: name={} flag={}", fname, entry.flags);
		}
		let mut ctype = make_contenttype(&entry.comment);
		if ctype.is_empty() {
			ctype = make_contentbyext(fname);
		}
		if !ctype.is_empty() {
			response.set_header("Content-Type", ctype);
		}
		for (name, value) in &self.config.headers {
			response.set_header(name, value.clone());
		}
		format!("W/{:x}", entry.crc32)
	}

	fn not_modified(&self, response: &mut ResponseWriter<'_>, entry: &ZipEntry, etag: &str) {
		response.set_header("Etag", etag);
		response.set_header("Last-Modified", http_date(entry.modified));
		let _ = response.write_head(304);
	}

	/// Fast path: the entry's raw bytes go out as `Content-Encoding: <name>`.
	fn handle_raw(
		&self, state: &HandlerState, request: &Request, response: &mut ResponseWriter<'_>, m: u16,
		encoding: &str, fname: &str,
	) -> bool {
		let Some(&id) = state.index.get(fname).and_then(|methods| methods.get(&m)) else {
			return false;
		};
		let entry = state.set.entry(id);
		let etag = self.common_headers(response, entry, fname);
		if conditional(request, &etag, entry) {
			self.not_modified(response, entry, &etag);
			return true;
		}
		debug!(
			"compressed response: length={} original={}",
			entry.compressed_size, entry.uncompressed_size
		);
		response.set_header("Content-Encoding", encoding);
		response.set_header("Last-Modified", http_date(entry.modified));
		response.set_header("Content-Length", entry.compressed_size.to_string());
		response.set_header("Etag", etag);
		let _ = response.write_head(200);
		match state.set.open_raw(id) {
			Ok(mut raw) => match io::copy(&mut raw, response) {
				Ok(written) => debug!("written: written={}", written),
				Err(err) => error!("copy: error={}", err),
			},
			Err(err) => error!("openraw: name={} error={}", fname, err),
		}
		true
	}

	/// Fast path: a deflated entry framed as gzip by the bridge, 18 bytes of
	/// framing around the untouched payload.
	fn handle_gzip(&self, state: &HandlerState, request: &Request, response: &mut ResponseWriter<'_>, fname: &str) -> bool {
		let Some(&id) = state
			.index
			.get(fname)
			.and_then(|methods| methods.get(&method::DEFLATE))
		else {
			return false;
		};
		let entry = state.set.entry(id);
		let etag = self.common_headers(response, entry, fname);
		if conditional(request, &etag, entry) {
			self.not_modified(response, entry, &etag);
			return true;
		}
		debug!(
			"compressed response: length={} original={}",
			entry.compressed_size, entry.uncompressed_size
		);
		response.set_header("Content-Encoding", "gzip");
		response.set_header("Last-Modified", http_date(entry.modified));
		response.set_header(
			"Content-Length",
			(entry.compressed_size + GZIP_HEADER_SIZE + GZIP_FOOTER_SIZE).to_string(),
		);
		response.set_header("Etag", etag);
		let _ = response.write_head(200);
		let (archive, local) = state.set.archive_of(id);
		match copy_gzip(response, archive, local) {
			Ok(written) => debug!("written: written={}", written),
			Err(err) => error!("copygzip: error={}", err),
		}
		true
	}

	/// Slow path: decompress into the response, no `Content-Encoding`.
	fn handle_fallback(
		&self, state: &HandlerState, request: &Request, response: &mut ResponseWriter<'_>, id: usize,
		fname: &str,
	) {
		let entry = state.set.entry(id);
		let etag = self.common_headers(response, entry, fname);
		if conditional(request, &etag, entry) {
			self.not_modified(response, entry, &etag);
			return;
		}
		let reader = match state.set.open(id) {
			Ok(reader) => reader,
			Err(err) => {
				info!("open failed: path={} error={}", request.path, err);
				let _ = response.write_head(404);
				let _ = response.write_all(b"not found");
				return;
			},
		};
		debug!("normal response: length={}", entry.uncompressed_size);
		response.set_header("Last-Modified", http_date(entry.modified));
		response.set_header("Content-Length", entry.uncompressed_size.to_string());
		response.set_header("Etag", etag);
		let _ = response.write_head(200);
		let mut reader = reader;
		match io::copy(&mut reader, response) {
			Ok(written) => debug!("copy success: written={}", written),
			Err(err) => error!("copy error: error={}", err),
		}
	}

	fn access_log(&self, start: Instant, request: &Request, response: &ResponseWriter<'_>) {
		let mut fields = format!(
			"remote={} elapsed={:?} method={} path={} status={} protocol={}",
			request.remote,
			start.elapsed(),
			request.method,
			request.path,
			response.status,
			request.protocol,
		);
		if let Some(user) = &request.user {
			fields.push_str(&format!(" user={}", user));
		}
		for name in [
			"Etag",
			"Content-Type",
			"Content-Encoding",
			"Location",
			"Content-Length",
			"Last-Modified",
		] {
			if let Some(value) = response.header(name) {
				fields.push_str(&format!(" {}={:?}", name.to_lowercase(), value));
			}
		}
		for name in [
			"Forwarded",
			"X-Forwarded-For",
			"X-Forwarded-Host",
			"X-Forwarded-Proto",
			"User-Agent",
			"If-None-Match",
			"If-Modified-Since",
			"Referer",
			"Accept-Encoding",
			"Range",
		] {
			if let Some(value) = request.header(name) {
				let key = name.to_lowercase();
				let key = key.strip_prefix("x-").unwrap_or(&key);
				fields.push_str(&format!(" {}={:?}", key, value));
			}
		}
		info!(target: "accesslog", "{}", fields);
	}
}
