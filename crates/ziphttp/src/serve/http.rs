//! Minimal threaded HTTP/1.1 plumbing: request parsing with `httparse`,
//! a response writer that remembers what it sent for the access log, and
//! the per-connection loop with the four socket deadlines.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::debug;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::global::error::*;

const MAX_HEADERS: usize = 64;
const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// A parsed request. Only what the handler and the access log need.
pub struct Request {
	pub method: String,
	/// decoded path, query and fragment stripped
	pub path: String,
	pub protocol: String,
	pub remote: String,
	/// userinfo when the request target arrived in absolute form
	pub user: Option<String>,
	headers: Vec<(String, String)>,
	keep_alive: bool,
	has_body: bool,
}

impl Request {
	/// First value of a header, case-insensitive.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(k, _)| k.eq_ignore_ascii_case(name))
			.map(|(_, v)| v.as_str())
	}

	#[cfg(test)]
	pub fn get(path: &str, headers: &[(&str, &str)]) -> Request {
		Request {
			method: "GET".into(),
			path: path.into(),
			protocol: "HTTP/1.1".into(),
			remote: "127.0.0.1:12345".into(),
			user: None,
			headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
			keep_alive: false,
			has_body: false,
		}
	}
}

/// Splits a request target into the decoded path and optional userinfo.
fn parse_target(target: &str) -> (String, Option<String>) {
	if target.starts_with('/') {
		let end = target.find(['?', '#']).unwrap_or(target.len());
		let path = percent_decode_str(&target[..end]).decode_utf8_lossy().into_owned();
		return (path, None);
	}
	// absolute form
	match Url::parse(target) {
		Ok(url) => {
			let user = if url.username().is_empty() {
				None
			} else {
				Some(url.username().to_string())
			};
			(url.path().to_string(), user)
		},
		Err(_) => (target.to_string(), None),
	}
}

/// Reads and parses one request off the stream. `Ok(None)` means the peer
/// closed the connection cleanly between requests.
pub fn read_request(stream: &mut dyn Read, remote: &str) -> InternalResult<Option<Request>> {
	let mut buffer: Vec<u8> = Vec::with_capacity(1024);
	let mut chunk = [0u8; 4096];
	loop {
		let mut header_store = [httparse::EMPTY_HEADER; MAX_HEADERS];
		let mut parser = httparse::Request::new(&mut header_store);
		match parser.parse(&buffer) {
			Ok(httparse::Status::Complete(_)) => {
				let method = parser.method.unwrap_or("GET").to_string();
				let target = parser.path.unwrap_or("/");
				let minor = parser.version.unwrap_or(1);
				let headers: Vec<(String, String)> = parser
					.headers
					.iter()
					.map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
					.collect();
				let connection = headers
					.iter()
					.find(|(k, _)| k.eq_ignore_ascii_case("connection"))
					.map(|(_, v)| v.to_lowercase())
					.unwrap_or_default();
				let keep_alive = match minor {
					0 => connection.contains("keep-alive"),
					_ => !connection.contains("close"),
				};
				let has_body = headers.iter().any(|(k, v)| {
					(k.eq_ignore_ascii_case("content-length") && v.trim() != "0")
						|| k.eq_ignore_ascii_case("transfer-encoding")
				});
				let (path, user) = parse_target(target);
				return Ok(Some(Request {
					method,
					path,
					protocol: format!("HTTP/1.{}", minor),
					remote: remote.to_string(),
					user,
					headers,
					keep_alive,
					has_body,
				}));
			},
			Ok(httparse::Status::Partial) => {},
			Err(err) => {
				return Err(InternalError::InvalidConfig(format!("bad request: {}", err)));
			},
		}
		if buffer.len() > MAX_REQUEST_BYTES {
			return Err(InternalError::InvalidConfig("request header too large".into()));
		}
		let n = stream.read(&mut chunk)?;
		if n == 0 {
			if buffer.is_empty() {
				return Ok(None);
			}
			return Err(InternalError::IOError(io::Error::new(
				io::ErrorKind::UnexpectedEof,
				"connection closed mid-request",
			)));
		}
		buffer.extend_from_slice(&chunk[..n]);
	}
}

fn status_text(code: u16) -> &'static str {
	match code {
		200 => "OK",
		301 => "Moved Permanently",
		304 => "Not Modified",
		400 => "Bad Request",
		404 => "Not Found",
		500 => "Internal Server Error",
		_ => "",
	}
}

/// Serializes one response while recording status and headers so the
/// deferred access log always sees the final values.
pub struct ResponseWriter<'a> {
	out: &'a mut dyn Write,
	pub status: u16,
	headers: Vec<(String, String)>,
	head_sent: bool,
	keep_alive: bool,
	pub body_written: u64,
}

impl<'a> ResponseWriter<'a> {
	pub fn new(out: &'a mut dyn Write, keep_alive: bool) -> ResponseWriter<'a> {
		ResponseWriter {
			out,
			status: 200,
			headers: Vec::new(),
			head_sent: false,
			keep_alive,
			body_written: 0,
		}
	}

	/// Sets a header, replacing earlier values.
	pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
		self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
		self.headers.push((name.to_string(), value.into()));
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(k, _)| k.eq_ignore_ascii_case(name))
			.map(|(_, v)| v.as_str())
	}

	/// Whether this response allows the connection to carry another request.
	pub fn reusable(&self) -> bool {
		self.keep_alive && (self.header("Content-Length").is_some() || self.status == 301 || self.status == 304)
	}

	/// Writes the status line and headers once.
	pub fn write_head(&mut self, status: u16) -> io::Result<()> {
		if self.head_sent {
			return Ok(());
		}
		self.status = status;
		self.head_sent = true;
		// a response with no known length cannot be followed on this socket
		if self.header("Content-Length").is_none() && status != 304 && status != 301 {
			self.keep_alive = false;
		}
		write!(self.out, "HTTP/1.1 {} {}\r\n", status, status_text(status))?;
		for (name, value) in &self.headers {
			write!(self.out, "{}: {}\r\n", name, value)?;
		}
		// a 304 carries no body by definition; a redirect gets an explicit
		// empty one so keep-alive framing stays unambiguous
		if status == 301 {
			write!(self.out, "Content-Length: 0\r\n")?;
		}
		write!(
			self.out,
			"Connection: {}\r\n\r\n",
			if self.keep_alive { "keep-alive" } else { "close" }
		)?;
		Ok(())
	}
}

impl Write for ResponseWriter<'_> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if !self.head_sent {
			self.write_head(200)?;
		}
		let n = self.out.write(buf)?;
		self.body_written += n as u64;
		Ok(n)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.out.flush()
	}
}

/// Formats a time the way HTTP headers want it.
pub fn http_date(t: chrono::DateTime<chrono::Utc>) -> String {
	t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parses an IMF-fixdate header value.
pub fn parse_http_date(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
	use chrono::{NaiveDateTime, TimeZone, Utc};
	NaiveDateTime::parse_from_str(s, "%a, %d %b %Y %H:%M:%S GMT")
		.ok()
		.map(|dt| Utc.from_utc_datetime(&dt))
}

/// Per-connection socket deadlines, straight from the CLI flags.
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
	pub read: Duration,
	pub read_header: Duration,
	pub write: Duration,
	pub idle: Duration,
}

impl Default for Timeouts {
	fn default() -> Timeouts {
		Timeouts {
			read: Duration::from_secs(10),
			read_header: Duration::from_secs(10),
			write: Duration::from_secs(30),
			idle: Duration::from_secs(10),
		}
	}
}

/// Drives one connection: parse, hand to `serve`, repeat while keep-alive
/// holds. `serve` gets the request and a response writer.
pub fn serve_connection<S, F>(stream: &mut S, remote: &str, timeouts: Timeouts, mut serve: F)
where
	S: Read + Write + SetTimeouts,
	F: FnMut(&Request, &mut ResponseWriter<'_>),
{
	let _ = stream.set_write_deadline(Some(timeouts.write));
	let mut first = true;
	loop {
		let deadline = if first { timeouts.read_header } else { timeouts.idle };
		let _ = stream.set_read_deadline(Some(deadline));
		let request = match read_request(stream, remote) {
			Ok(Some(request)) => request,
			Ok(None) => return,
			Err(err) => {
				debug!("connection closed: remote={} error={}", remote, err);
				return;
			},
		};
		let _ = stream.set_read_deadline(Some(timeouts.read));
		first = false;

		// requests with bodies are answered then the socket dropped, the
		// handler never reads them
		let reuse = request.keep_alive && !request.has_body;
		let mut sink = io::BufWriter::new(&mut *stream);
		let mut response = ResponseWriter::new(&mut sink, reuse);
		serve(&request, &mut response);
		let _ = response.write_head(200);
		let reusable = response.reusable();
		drop(response);
		if sink.flush().is_err() {
			return;
		}
		drop(sink);
		if !reusable {
			return;
		}
	}
}

/// Socket deadline knob shared by TCP and Unix streams.
pub trait SetTimeouts {
	fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()>;
	fn set_write_deadline(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl SetTimeouts for std::net::TcpStream {
	fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
		self.set_read_timeout(timeout)
	}

	fn set_write_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
		self.set_write_timeout(timeout)
	}
}

impl SetTimeouts for std::os::unix::net::UnixStream {
	fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
		self.set_read_timeout(timeout)
	}

	fn set_write_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
		self.set_write_timeout(timeout)
	}
}
