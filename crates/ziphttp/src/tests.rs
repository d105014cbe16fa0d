#![cfg(test)]
// End-to-end coverage: archives are really built and re-opened, the
// handler is driven through an in-memory response sink.

use std::io::{Read, Write};
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::NamedTempFile;

use crate::build::chooser::{choose_from, choose_from_last, choose_from_nocrc, ChooseFile, ChooseSource};
use crate::build::link::link_relative;
use crate::build::sitemap::SiteMap;
use crate::build::{build, BuildOptions};
use crate::global::codec::{compress_entry, method, DeflateProfile};
use crate::global::gzip::copy_gzip;
use crate::serve::handler::{conditional, HandlerConfig, HandlerSources, ZipHandler};
use crate::serve::http::{parse_http_date, Request, ResponseWriter};
use crate::util;
use crate::zip::offset::archive_offset;
use crate::zip::reader::ZipArchive;
use crate::zip::record::ZipEntry;
use crate::zip::writer::{EntryHeader, ZipWriter};

fn modified_at(spec: &str) -> DateTime<Utc> {
	DateTime::parse_from_rfc3339(spec).unwrap().with_timezone(&Utc)
}

// archive with a stored 512 byte entry and a deflated 4096 byte entry
fn testzip() -> Vec<u8> {
	let when = modified_at("2025-01-01T00:00:00Z");
	let mut writer = ZipWriter::new(Vec::new());

	let stored = vec![b'a'; 512];
	writer
		.add_entry(
			EntryHeader::new("512b.txt", method::STORE, when),
			&stored,
			crc32fast::hash(&stored),
			512,
		)
		.unwrap();

	let text = b"lorem ipsum dolor sit amet ".repeat(200);
	let text = &text[..4096];
	let (data, crc, size) = compress_entry(text, method::DEFLATE, DeflateProfile::Normal).unwrap();
	assert_eq!(size, 4096);
	writer
		.add_entry(EntryHeader::new("4kb.txt", method::DEFLATE, when), &data, crc, size)
		.unwrap();

	writer.finish().unwrap()
}

fn write_tempfile(data: &[u8]) -> NamedTempFile {
	let mut fp = NamedTempFile::new().unwrap();
	fp.as_file_mut().write_all(data).unwrap();
	fp.as_file_mut().sync_all().unwrap();
	fp
}

fn test_handler(archive: &[u8], index_name: &str, in_memory: bool) -> (ZipHandler, NamedTempFile) {
	let fp = write_tempfile(archive);
	let sources = HandlerSources {
		archive: fp.path().to_path_buf(),
		additional: Vec::new(),
		in_memory,
	};
	let config = HandlerConfig {
		index_name: index_name.into(),
		..Default::default()
	};
	(ZipHandler::new(config, &sources).unwrap(), fp)
}

struct TestResponse {
	status: u16,
	etag: Option<String>,
	content_type: Option<String>,
	content_encoding: Option<String>,
	content_length: Option<u64>,
	body: Vec<u8>,
}

fn do_request(handler: &ZipHandler, path: &str, headers: &[(&str, &str)]) -> TestResponse {
	let request = Request::get(path, headers);
	let mut wire = Vec::new();
	let mut response = ResponseWriter::new(&mut wire, false);
	handler.serve(&request, &mut response);
	let _ = response.write_head(200);
	let collected = TestResponse {
		status: response.status,
		etag: response.header("Etag").map(String::from),
		content_type: response.header("Content-Type").map(String::from),
		content_encoding: response.header("Content-Encoding").map(String::from),
		content_length: response.header("Content-Length").and_then(|v| v.parse().ok()),
		body: Vec::new(),
	};
	drop(response);
	let split = wire
		.windows(4)
		.position(|w| w == b"\r\n\r\n")
		.map(|p| p + 4)
		.unwrap_or(wire.len());
	TestResponse {
		body: wire[split..].to_vec(),
		..collected
	}
}

#[test]
fn stored_entry_ignores_compressed_negotiation() {
	let (handler, _keep) = test_handler(&testzip(), "index.html", true);
	let got = do_request(&handler, "/512b.txt", &[("Accept-Encoding", "br, deflate,gzip ")]);
	assert_eq!(got.status, 200);
	assert_eq!(got.content_length, Some(512));
	assert!(got.etag.unwrap().starts_with("W/"));
	assert_ne!(got.content_encoding.as_deref(), Some("gzip"));
	assert_eq!(got.body.len(), 512);
}

#[test]
fn deflated_entry_served_through_gzip_bridge() {
	let (handler, _keep) = test_handler(&testzip(), "index.html", true);
	let got = do_request(&handler, "/4kb.txt", &[("Accept-Encoding", "br, gzip")]);
	assert_eq!(got.status, 200);
	assert_eq!(got.content_encoding.as_deref(), Some("gzip"));
	assert!(got.etag.unwrap().starts_with("W/"));
	let length = got.content_length.unwrap();
	assert_ne!(length, 4096);
	assert_eq!(got.body.len() as u64, length);

	// the body is a valid gzip stream holding the original bytes
	let mut decoder = flate2::read::GzDecoder::new(got.body.as_slice());
	let mut plain = Vec::new();
	decoder.read_to_end(&mut plain).unwrap();
	assert_eq!(plain.len(), 4096);
}

#[test]
fn no_accept_encoding_means_identity() {
	let (handler, _keep) = test_handler(&testzip(), "index.html", true);
	let got = do_request(&handler, "/4kb.txt", &[]);
	assert_eq!(got.status, 200);
	assert_eq!(got.content_length, Some(4096));
	assert!(got.etag.unwrap().starts_with("W/"));
	assert!(got.content_encoding.is_none());
	assert_eq!(got.content_type.as_deref(), Some("text/plain"));
	assert_eq!(got.body.len(), 4096);
}

#[test]
fn index_name_resolves_directory_requests() {
	let (handler, _keep) = test_handler(&testzip(), "512b.txt", true);
	let got = do_request(&handler, "/", &[("Accept-Encoding", "br, gzip")]);
	assert_eq!(got.status, 200);
	assert_eq!(got.content_length, Some(512));
}

#[test]
fn missing_index_is_not_found() {
	let (handler, _keep) = test_handler(&testzip(), "index.html", true);
	let got = do_request(&handler, "/", &[("Accept-Encoding", "br, gzip")]);
	assert_eq!(got.status, 404);
	assert!(String::from_utf8_lossy(&got.body).contains("not found"));
}

#[test]
fn file_residency_behaves_like_memory() {
	let (handler, _keep) = test_handler(&testzip(), "index.html", false);
	let got = do_request(&handler, "/4kb.txt", &[("Accept-Encoding", "gzip")]);
	assert_eq!(got.status, 200);
	assert_eq!(got.content_encoding.as_deref(), Some("gzip"));
}

#[test]
fn brotli_preferred_over_gzip() {
	let when = modified_at("2025-01-01T00:00:00Z");
	let text = b"abcdefgh".repeat(512);
	let mut writer = ZipWriter::new(Vec::new());
	let (deflated, crc, size) = compress_entry(&text[..], method::DEFLATE, DeflateProfile::Normal).unwrap();
	writer
		.add_entry(EntryHeader::new("page.txt", method::DEFLATE, when), &deflated, crc, size)
		.unwrap();
	let (brotlied, crc, size) = compress_entry(&text[..], method::BROTLI, DeflateProfile::Normal).unwrap();
	writer
		.add_entry(EntryHeader::new("page.txt", method::BROTLI, when), &brotlied, crc, size)
		.unwrap();
	let (handler, _keep) = test_handler(&writer.finish().unwrap(), "index.html", true);

	let got = do_request(&handler, "/page.txt", &[("Accept-Encoding", "gzip, br")]);
	assert_eq!(got.status, 200);
	assert_eq!(got.content_encoding.as_deref(), Some("br"));

	let got = do_request(&handler, "/page.txt", &[("Accept-Encoding", "gzip")]);
	assert_eq!(got.content_encoding.as_deref(), Some("gzip"));
}

#[test]
fn mismatched_if_none_match_suppresses_date_fallback() {
	let (handler, _keep) = test_handler(&testzip(), "index.html", true);
	// the date alone would say "not modified", the mismatching etag wins
	let got = do_request(
		&handler,
		"/4kb.txt",
		&[
			("If-None-Match", "W/00000000"),
			("If-Modified-Since", "Wed, 01 Jan 2025 00:00:00 GMT"),
		],
	);
	assert_eq!(got.status, 200);
}

#[test]
fn matching_validators_yield_not_modified() {
	let (handler, _keep) = test_handler(&testzip(), "index.html", true);
	let first = do_request(&handler, "/4kb.txt", &[("Accept-Encoding", "gzip")]);
	let etag = first.etag.unwrap();
	let got = do_request(&handler, "/4kb.txt", &[("Accept-Encoding", "gzip"), ("If-None-Match", &etag)]);
	assert_eq!(got.status, 304);
	assert!(got.body.is_empty());

	let got = do_request(&handler, "/4kb.txt", &[("If-Modified-Since", "Thu, 02 Jan 2025 00:00:00 GMT")]);
	assert_eq!(got.status, 304);
}

#[test]
fn conditional_truth_table() {
	let etag_true = "W/12345678";
	let etag_false = "W/00000000";
	let date = "Wed, 01 Jan 2025 00:00:00 GMT";
	assert!(parse_http_date(date).is_some());

	let entry_at = |spec: &str| ZipEntry {
		name: "entry".into(),
		method: 0,
		flags: 0,
		crc32: 0,
		compressed_size: 0,
		uncompressed_size: 0,
		modified: modified_at(spec),
		comment: String::new(),
		header_offset: 0,
	};
	let older = entry_at("2024-12-31T23:59:59Z");
	let equal = entry_at("2025-01-01T00:00:00Z");
	let newer = entry_at("2025-01-01T00:00:01Z");

	let both = |inm: &str| Request::get("/", &[("If-None-Match", inm), ("If-Modified-Since", date)]);
	let etag_only = |inm: &str| Request::get("/", &[("If-None-Match", inm)]);
	let date_only = Request::get("/", &[("If-Modified-Since", date)]);
	let bare = Request::get("/", &[]);
	let bad_date = Request::get("/", &[("If-Modified-Since", "invalid-date")]);

	for entry in [&older, &equal, &newer] {
		// a present If-None-Match decides alone, even when it mismatches
		assert!(conditional(&both(etag_true), etag_true, entry));
		assert!(!conditional(&both(etag_false), etag_true, entry));
		assert!(conditional(&etag_only(etag_true), etag_true, entry));
		assert!(!conditional(&etag_only(etag_false), etag_true, entry));
		// nothing to validate against
		assert!(!conditional(&bare, etag_true, entry));
		assert!(!conditional(&bad_date, etag_true, entry));
	}
	// the date fallback triggers for mtimes at or before the header
	assert!(conditional(&date_only, etag_true, &older));
	assert!(conditional(&date_only, etag_true, &equal));
	assert!(!conditional(&date_only, etag_true, &newer));
}

#[test]
fn gzip_bridge_framing() {
	let archive = ZipArchive::from_bytes(testzip()).unwrap();
	let index = archive.find("4kb.txt").unwrap();
	let entry = archive.entry(index).clone();

	let mut framed = Vec::new();
	let written = copy_gzip(&mut framed, &archive, index).unwrap();
	assert_eq!(written, entry.compressed_size + 18);
	assert_eq!(framed.len() as u64, written);
	assert_eq!(&framed[..4], &[0x1f, 0x8b, 0x08, 0x01]);

	// decoding verifies the trailer CRC and length
	let mut decoder = flate2::read::GzDecoder::new(framed.as_slice());
	let mut plain = Vec::new();
	decoder.read_to_end(&mut plain).unwrap();
	assert_eq!(plain.len() as u64, entry.uncompressed_size);
	assert_eq!(crc32fast::hash(&plain), entry.crc32);
}

#[test]
fn gzip_bridge_reencodes_stored_entries() {
	let archive = ZipArchive::from_bytes(testzip()).unwrap();
	let index = archive.find("512b.txt").unwrap();
	let mut framed = Vec::new();
	copy_gzip(&mut framed, &archive, index).unwrap();
	let mut decoder = flate2::read::GzDecoder::new(framed.as_slice());
	let mut plain = Vec::new();
	decoder.read_to_end(&mut plain).unwrap();
	assert_eq!(plain, vec![b'a'; 512]);
}

#[test]
fn archive_offset_plain_zip() {
	let keep = write_tempfile(&testzip());
	assert_eq!(archive_offset(keep.path()).unwrap(), 0);
}

#[test]
fn archive_offset_with_prefix() {
	let padding = 1024 * 1024u64;
	let mut fp = NamedTempFile::new().unwrap();
	fp.as_file_mut().write_all(&vec![0u8; padding as usize]).unwrap();
	let mut writer = ZipWriter::with_offset(fp.as_file_mut(), padding);
	let body = b"123456789";
	writer
		.add_entry(
			EntryHeader::new("hello.txt", method::STORE, modified_at("2025-01-01T00:00:00Z")),
			body,
			crc32fast::hash(body),
			body.len() as u64,
		)
		.unwrap();
	writer.finish().unwrap();
	fp.as_file_mut().sync_all().unwrap();

	assert_eq!(archive_offset(fp.path()).unwrap(), padding);

	// the file-backed reader sees through the prefix
	let archive = ZipArchive::open(fp.path()).unwrap();
	assert_eq!(archive.read_content("hello.txt").unwrap(), body);

	// so does a memory slice taken from the archive offset
	let mut raw = Vec::new();
	let mut reopen = std::fs::File::open(fp.path()).unwrap();
	std::io::Seek::seek(&mut reopen, std::io::SeekFrom::Start(padding)).unwrap();
	reopen.read_to_end(&mut raw).unwrap();
	let sliced = ZipArchive::from_bytes(raw).unwrap();
	assert_eq!(sliced.read_content("hello.txt").unwrap(), body);
}

fn dir_candidate(origin: &str, name: &str, crc: u32, csize: u64, usize_: u64, mtime: i64) -> ChooseFile {
	ChooseFile {
		source: ChooseSource::Dir {
			root: PathBuf::from(origin),
			rel: name.to_string(),
		},
		origin: origin.to_string(),
		name: name.to_string(),
		crc32: crc,
		modified: Utc.timestamp_opt(mtime, 0).unwrap(),
		uncompressed_size: usize_,
		compressed_size: csize,
	}
}

#[test]
fn choose_empty_and_single() {
	let mut empty: [ChooseFile; 0] = [];
	assert!(choose_from(&mut empty, None).is_none());
	let mut one = [dir_candidate("root", "name", 1, 0, 0, 0)];
	assert_eq!(choose_from(&mut one, None), Some(0));
}

#[test]
fn choose_same_crc_smaller_compressed_wins() {
	let mut input = [
		dir_candidate("root100", "name", 123, 10, 0, 0),
		dir_candidate("root101", "name", 123, 20, 0, 0),
	];
	assert_eq!(choose_from(&mut input, None), Some(0));
}

#[test]
fn choose_same_crc_compressed_beats_uncompressed() {
	let mut input = [
		dir_candidate("root100", "name", 123, 0, 20, 0),
		dir_candidate("root101", "name", 123, 20, 20, 0),
		dir_candidate("root102", "name", 123, 30, 20, 0),
	];
	assert_eq!(choose_from(&mut input, None), Some(1));
}

#[test]
fn choose_same_crc_older_wins() {
	let mut input = [
		dir_candidate("root100", "name", 123, 0, 20, 0),
		dir_candidate("root101", "name", 123, 20, 20, 10),
		dir_candidate("root102", "name", 123, 20, 20, 20),
	];
	assert_eq!(choose_from(&mut input, None), Some(1));
}

#[test]
fn choose_same_crc_bigger_wins_on_tie() {
	let mut input = [
		dir_candidate("root100", "name", 123, 0, 20, 0),
		dir_candidate("root101", "name", 123, 20, 20, 20),
		dir_candidate("root102", "name", 123, 20, 30, 20),
	];
	assert_eq!(choose_from(&mut input, None), Some(2));
}

#[test]
fn choose_diff_crc_newer_wins() {
	let mut input = [
		dir_candidate("root100", "name", 100, 0, 20, 30),
		dir_candidate("root101", "name", 101, 20, 20, 20),
		dir_candidate("root102", "name", 102, 20, 30, 20),
	];
	assert_eq!(choose_from(&mut input, None), Some(0));
}

#[test]
fn choose_is_deterministic_under_input_order() {
	let make = || {
		[
			dir_candidate("a", "name", 100, 5, 20, 30),
			dir_candidate("b", "name", 101, 7, 25, 10),
			dir_candidate("c", "name", 102, 9, 30, 20),
		]
	};
	let mut forward = make();
	let winner = choose_from(&mut forward, None).map(|i| forward[i].origin.clone());
	let mut swapped = make();
	swapped.swap(0, 2);
	let winner_swapped = choose_from(&mut swapped, None).map(|i| swapped[i].origin.clone());
	assert_eq!(winner, winner_swapped);
}

#[test]
fn choose_nocrc_skips_hashing() {
	let input = [
		dir_candidate("root100", "name", 0, 0, 20, 10),
		dir_candidate("root101", "name", 0, 15, 20, 10),
	];
	assert_eq!(choose_from_nocrc(&input), Some(1));
}

#[test]
fn choose_last_prefers_earliest_equal() {
	let mut input = [
		dir_candidate("root100", "name", 77, 10, 20, 10),
		dir_candidate("root101", "name", 88, 10, 20, 10),
		dir_candidate("root102", "name", 77, 10, 20, 10),
	];
	assert_eq!(choose_from_last(&mut input, None), Some(0));
}

#[test]
fn fix_crc_streams_the_file() {
	let dir = tempfile::tempdir().unwrap();
	let payload = "hello world";
	std::fs::write(dir.path().join("test.data"), payload).unwrap();
	let mut candidate = ChooseFile::from_dir("root", dir.path(), "test.data").unwrap();
	assert_eq!(candidate.crc32, 0);
	candidate.fix_crc(None).unwrap();
	assert_eq!(candidate.crc32, crc32fast::hash(payload.as_bytes()));
}

#[test]
fn link_rewrite_same_origin_to_relative() {
	let input = br#"
<html><head>
<link rel="something1" src="../path/relative.html" />
<link rel="something2" src="/path/from/root.html" />
</head>
<body>
<ul>
<li><a href="http://example.com/absolute/link/1.html">1</a></li>
<li><a href="http://other-site.example.com/absolute/link/2.html">2</a></li>
</ul>
</body></html>
"#;
	let mut output = Vec::new();
	link_relative(
		"http://example.com/base/path/index.html",
		&mut input.as_slice(),
		&mut output,
	)
	.unwrap();
	let text = String::from_utf8(output).unwrap();
	assert!(!text.contains("http://example.com"), "{}", text);
	assert!(text.contains("\"../../path/from/root"), "{}", text);
	assert!(text.contains("\"../../absolute/link"), "{}", text);
	assert!(text.contains("http://other-site.example.com"), "{}", text);
}

#[test]
fn link_rewrite_ignores_non_html() {
	let input = br#"hello world src=http://example.com/blabla href="http://example.com""#;
	let mut output = Vec::new();
	link_relative(
		"http://example.com/base/path/plaintext.txt",
		&mut input.as_slice(),
		&mut output,
	)
	.unwrap();
	assert_eq!(output.as_slice(), &input[..]);
}

#[test]
fn link_rewrite_keeps_userinfo_links() {
	let input = br#"<html><body><a href="http://user:pw@example.com/x.html">x</a></body></html>"#;
	let mut output = Vec::new();
	link_relative("http://example.com/base/index.html", &mut input.as_slice(), &mut output).unwrap();
	let text = String::from_utf8(output).unwrap();
	assert!(text.contains("http://user:pw@example.com/x.html"), "{}", text);
}

#[test]
fn pattern_match_uses_basename() {
	let patterns = |specs: &[&str]| specs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
	assert!(util::ismatch("hello.txt", &patterns(&["*.html", "hello.*"])));
	assert!(!util::ismatch("hello.txt", &patterns(&["*.html", "abcde.*", "image.jpg"])));
	assert!(!util::ismatch("hello.txt", &patterns(&[""])));
	assert!(!util::ismatch("", &patterns(&["abcde"])));
	assert!(util::ismatch("deep/path/hello.txt", &patterns(&["hello.*"])));
}

#[test]
fn relative_paths() {
	assert_eq!(
		util::relative_path("/base/path", "/path/from/root.html").as_deref(),
		Some("../../path/from/root.html")
	);
	assert_eq!(util::relative_path("/a/b", "/a/b/c.txt").as_deref(), Some("c.txt"));
	assert_eq!(util::relative_path("/a/b", "/a/b").as_deref(), Some("."));
	assert!(util::relative_path("/abs", "rel").is_none());
}

#[test]
fn slash_collapse() {
	assert_eq!(util::collapse_slashes("//a///b/c"), "/a/b/c");
	assert_eq!(util::collapse_slashes("a/b"), "a/b");
}

#[test]
fn duration_specs() {
	use std::time::Duration;
	assert_eq!(util::parse_duration("10s").unwrap(), Duration::from_secs(10));
	assert_eq!(util::parse_duration("500ms").unwrap(), Duration::from_millis(500));
	assert_eq!(util::parse_duration("3m").unwrap(), Duration::from_secs(180));
	assert_eq!(util::parse_duration("7").unwrap(), Duration::from_secs(7));
	assert!(util::parse_duration("abc").is_err());
}

#[test]
fn sitemap_decisions() {
	let mut sitemap = SiteMap::new();
	sitemap
		.add_file("https://example.com/", "index.html", "docs/index.html", modified_at("2025-02-01T00:00:00Z"))
		.unwrap();
	sitemap
		.add_file("https://example.com/", "index.html", "docs/about.html", modified_at("2025-03-01T00:00:00Z"))
		.unwrap();
	assert_eq!(sitemap.len(), 2);
	assert_eq!(sitemap.last_mod(), modified_at("2025-03-01T00:00:00Z"));
	let xml = sitemap.to_xml();
	assert!(xml.contains("<loc>https://example.com/docs/</loc>"), "{}", xml);
	assert!(xml.contains("<loc>https://example.com/docs/about.html</loc>"), "{}", xml);
	assert!(xml.contains("urlset"), "{}", xml);
}

fn populate_site(dir: &std::path::Path) {
	std::fs::create_dir_all(dir.join("sub")).unwrap();
	std::fs::write(dir.join("index.html"), b"<html><body><a href=\"/sub/page.html\">p</a></body></html>").unwrap();
	std::fs::write(dir.join("big.txt"), b"0123456789abcdef".repeat(256)).unwrap();
	std::fs::write(dir.join("tiny.txt"), b"tiny").unwrap();
	std::fs::write(dir.join("sub/page.html"), b"<html><body>page</body></html>").unwrap();
}

#[test]
fn build_pipeline_roundtrip() {
	let site = tempfile::tempdir().unwrap();
	populate_site(site.path());
	let out = tempfile::tempdir().unwrap();
	let target = out.path().join("site.zip");

	let options = BuildOptions {
		strip_root: true,
		min_size: 512,
		profile: DeflateProfile::Normal,
		parallel: 2,
		..Default::default()
	};
	let sources = vec![site.path().to_string_lossy().into_owned()];
	build(&target, &sources, false, &options, None).unwrap();

	let archive = ZipArchive::open(&target).unwrap();
	assert_eq!(archive.len(), 4);

	// every entry decodes to bytes matching its recorded CRC and size
	for index in 0..archive.len() {
		let entry = archive.entry(index).clone();
		let mut plain = Vec::new();
		archive.open_entry(index).unwrap().read_to_end(&mut plain).unwrap();
		assert_eq!(plain.len() as u64, entry.uncompressed_size, "{}", entry.name);
		assert_eq!(crc32fast::hash(&plain), entry.crc32, "{}", entry.name);
	}

	let tiny = archive.entry(archive.find("tiny.txt").unwrap());
	assert_eq!(tiny.method, method::STORE);
	let big = archive.entry(archive.find("big.txt").unwrap());
	assert_eq!(big.method, method::DEFLATE);
	assert!(big.compressed_size < big.uncompressed_size);
}

#[test]
fn build_asis_is_idempotent_on_bodies() {
	let site = tempfile::tempdir().unwrap();
	populate_site(site.path());
	let out = tempfile::tempdir().unwrap();
	let first = out.path().join("first.zip");
	let second = out.path().join("second.zip");

	let options = BuildOptions {
		strip_root: true,
		profile: DeflateProfile::Normal,
		parallel: 1,
		..Default::default()
	};
	build(&first, &[site.path().to_string_lossy().into_owned()], false, &options, None).unwrap();

	let merge_options = BuildOptions {
		use_asis: true,
		profile: DeflateProfile::Normal,
		parallel: 1,
		..Default::default()
	};
	build(
		&second,
		&[first.to_string_lossy().into_owned()],
		false,
		&merge_options,
		None,
	)
	.unwrap();

	let a = ZipArchive::open(&first).unwrap();
	let b = ZipArchive::open(&second).unwrap();
	assert_eq!(a.len(), b.len());
	for entry in a.entries() {
		let other = b.entry(b.find(&entry.name).unwrap());
		assert_eq!(entry.crc32, other.crc32, "{}", entry.name);
		assert_eq!(entry.compressed_size, other.compressed_size, "{}", entry.name);
		assert_eq!(entry.method, other.method, "{}", entry.name);
	}
}

#[test]
fn build_rewrites_links_when_base_url_set() {
	let site = tempfile::tempdir().unwrap();
	populate_site(site.path());
	let out = tempfile::tempdir().unwrap();
	let target = out.path().join("site.zip");

	let options = BuildOptions {
		strip_root: true,
		profile: DeflateProfile::Normal,
		parallel: 1,
		base_url: Some("http://example.com".into()),
		..Default::default()
	};
	build(&target, &[site.path().to_string_lossy().into_owned()], false, &options, None).unwrap();

	let archive = ZipArchive::open(&target).unwrap();
	let html = String::from_utf8(archive.read_content("index.html").unwrap()).unwrap();
	assert!(html.contains("\"sub/page.html\""), "{}", html);
}

#[test]
fn build_generates_sitemap() {
	let site = tempfile::tempdir().unwrap();
	populate_site(site.path());
	let out = tempfile::tempdir().unwrap();
	let target = out.path().join("site.zip");

	let options = BuildOptions {
		strip_root: true,
		profile: DeflateProfile::Normal,
		parallel: 1,
		sitemap_url: Some("http://example.com".into()),
		..Default::default()
	};
	build(&target, &[site.path().to_string_lossy().into_owned()], false, &options, None).unwrap();

	let archive = ZipArchive::open(&target).unwrap();
	let xml = String::from_utf8(archive.read_content("sitemap.xml").unwrap()).unwrap();
	// index.html collapses to its directory
	assert!(xml.contains("<loc>http://example.com/</loc>"), "{}", xml);
	assert!(xml.contains("big.txt"), "{}", xml);
}

#[test]
fn handler_reload_swaps_archives() {
	let fp = write_tempfile(&testzip());
	let sources = HandlerSources {
		archive: fp.path().to_path_buf(),
		additional: Vec::new(),
		in_memory: true,
	};
	let handler = ZipHandler::new(HandlerConfig::default(), &sources).unwrap();
	assert_eq!(do_request(&handler, "/512b.txt", &[]).status, 200);

	// replace the archive with one that only has a different member
	let when = modified_at("2025-06-01T00:00:00Z");
	let mut writer = ZipWriter::new(Vec::new());
	let body = b"fresh";
	writer
		.add_entry(EntryHeader::new("new.txt", method::STORE, when), body, crc32fast::hash(body), 5)
		.unwrap();
	std::fs::write(fp.path(), writer.finish().unwrap()).unwrap();
	handler.reload(&sources).unwrap();

	assert_eq!(do_request(&handler, "/512b.txt", &[]).status, 404);
	let got = do_request(&handler, "/new.txt", &[]);
	assert_eq!(got.status, 200);
	assert_eq!(got.body, b"fresh");
}
