use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use log::{debug, error, warn};
use ziphttp::archive::{copy_gzip, method, ZipArchive, ZipEntry, GZIP_FOOTER_SIZE, GZIP_HEADER_SIZE};
use ziphttp::pathutil::ismatch;

use super::{CommandTrait, GlobalOptions};
use crate::keys::key_names;

pub const VERSION: &str = "0.4.0";

/// Extracts entries without decompressing: deflated ones come out framed as
/// `.gz`, other compressed methods keep their raw payload, optionally all
/// bundled into one tar.
pub struct Evaluator;

/// Output name and exact byte size for one entry.
fn namesize(entry: &ZipEntry) -> (String, u64) {
	let suffix = match entry.method {
		method::DEFLATE => ".gz",
		method::BROTLI => ".br",
		method::ZSTD => ".zstd",
		method::LZMA => ".lzma",
		method::BZIP2 => ".bz2",
		method::XZ => ".xz",
		method::JPEG => ".jpeg",
		method::MP3 => ".mp3",
		method::WAVPACK => ".wv",
		_ => return (entry.name.clone(), entry.uncompressed_size),
	};
	let size = match entry.method {
		method::DEFLATE => entry.compressed_size + GZIP_HEADER_SIZE + GZIP_FOOTER_SIZE,
		_ => entry.compressed_size,
	};
	(format!("{}{}", entry.name, suffix), size)
}

fn emit(archive: &ZipArchive, index: usize, out: &mut dyn Write) -> anyhow::Result<u64> {
	let entry = archive.entry(index);
	match entry.method {
		method::DEFLATE => Ok(copy_gzip(out, archive, index)?),
		method::BROTLI
		| method::ZSTD
		| method::LZMA
		| method::BZIP2
		| method::XZ
		| method::JPEG
		| method::MP3
		| method::WAVPACK => {
			let mut raw = archive.open_raw(index)?;
			Ok(io::copy(&mut raw, out)?)
		},
		_ => {
			let mut reader = archive.open_entry(index)?;
			Ok(io::copy(&mut reader, out)?)
		},
	}
}

impl CommandTrait for Evaluator {
	fn evaluate(&self, global: &GlobalOptions, args: &clap::ArgMatches) -> anyhow::Result<()> {
		let archive = ZipArchive::open(global.archive_filename()?)?;
		let all = args.is_present(key_names::ALL);
		let patterns: Vec<String> = args
			.values_of(key_names::PATTERNS)
			.map(|values| values.map(String::from).collect())
			.unwrap_or_default();

		let mut tarball: Option<tar::Builder<Box<dyn Write>>> = match args.value_of(key_names::TAR) {
			Some("-") => {
				debug!("tar: output to stdout");
				Some(tar::Builder::new(Box::new(io::stdout())))
			},
			Some(name) => {
				debug!("tar: output to file: name={}", name);
				Some(tar::Builder::new(Box::new(File::create(name)?)))
			},
			None => None,
		};
		let tar_gnu = args.value_of(key_names::TAR_FORMAT).unwrap_or("GNU") == "GNU";

		for index in 0..archive.len() {
			let entry = archive.entry(index).clone();
			if !patterns.is_empty() && !ismatch(&entry.name, &patterns) {
				debug!("skip: name={} method={}", entry.name, entry.method);
				continue;
			}
			if entry.name.contains("..") {
				warn!("skip suspicious file: name={}", entry.name);
				continue;
			}
			if entry.is_dir() {
				continue;
			}
			let (fname, size) = namesize(&entry);
			if fname == entry.name && !all {
				continue;
			}
			if let Some(builder) = tarball.as_mut() {
				debug!("tar write: name={}", fname);
				let mut data = Vec::with_capacity(size as usize);
				let written = emit(&archive, index, &mut data)?;
				let mut header = if tar_gnu {
					tar::Header::new_gnu()
				} else {
					tar::Header::new_ustar()
				};
				header.set_mode(0o644);
				header.set_mtime(entry.modified.timestamp().max(0) as u64);
				header.set_size(data.len() as u64);
				builder.append_data(&mut header, &fname, data.as_slice())?;
				debug!("written: name={} written={}", fname, written);
			} else {
				if let Some(parent) = Path::new(&fname).parent() {
					if !parent.as_os_str().is_empty() {
						fs::create_dir_all(parent)?;
					}
				}
				let mut out = match File::create(&fname) {
					Ok(fp) => fp,
					Err(err) => {
						error!("open file: name={} error={}", fname, err);
						return Err(err.into());
					},
				};
				let written = emit(&archive, index, &mut out)?;
				debug!("written: name={} written={}", fname, written);
			}
		}
		if let Some(builder) = tarball {
			let mut inner = builder.into_inner()?;
			inner.flush()?;
		}
		Ok(())
	}
}
