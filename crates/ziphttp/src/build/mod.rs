//! The archive build pipeline: enumerate sources into a name table, pick a
//! winner per name, compress on a worker pool with private sinks, then
//! merge everything into the final container, optionally behind a copy of
//! the running executable.

pub mod chooser;
pub mod link;
pub mod sink;
pub mod sitemap;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::{channel, sync_channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, error, info};
use walkdir::WalkDir;

use crate::build::chooser::{ChooseFile, ChooseSource};
use crate::build::sink::{Sink, SinkIo};
use crate::build::sitemap::SiteMap;
use crate::global::codec::{compress_entry, method, DeflateProfile};
use crate::global::error::*;
use crate::util::ismatch;
use crate::zip::reader::ZipArchive;
use crate::zip::writer::{EntryHeader, ZipWriter};

/// Total order applied to the merged entry list before the final write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
	#[default]
	None,
	Name,
	Time,
	UncompressedSize,
	CompressedSize,
}

impl FromStr for SortBy {
	type Err = InternalError;

	fn from_str(s: &str) -> InternalResult<SortBy> {
		match s {
			"" | "none" => Ok(SortBy::None),
			"name" => Ok(SortBy::Name),
			"time" => Ok(SortBy::Time),
			"usize" => Ok(SortBy::UncompressedSize),
			"csize" => Ok(SortBy::CompressedSize),
			other => Err(InternalError::InvalidConfig(format!("invalid sort key: {}", other))),
		}
	}
}

/// Everything the build pipeline can be told.
pub struct BuildOptions {
	/// archive names are relative to each source root
	pub strip_root: bool,
	/// basename globs to skip entirely
	pub exclude: Vec<String>,
	/// basename globs stored without compression
	pub stored: Vec<String>,
	/// entries smaller than this are stored
	pub min_size: u64,
	/// DEFLATE encoder profile for compress jobs
	pub profile: DeflateProfile,
	/// target method for compress jobs
	pub method: u16,
	/// prefer raw pass-through copies from ZIP sources
	pub use_asis: bool,
	/// enables HTML link rewriting against this site root
	pub base_url: Option<String>,
	/// generate sitemap.xml against this base
	pub sitemap_url: Option<String>,
	/// compressor workers, 0 means one per CPU
	pub parallel: usize,
	/// drop names that exist only in the first source
	pub delete: bool,
	/// chooser: skip hashing
	pub no_crc: bool,
	/// chooser: last candidate wins
	pub choose_last: bool,
	pub sort_by: SortBy,
	pub reverse: bool,
	/// memory sinks instead of a temp directory
	pub in_memory: bool,
}

impl Default for BuildOptions {
	fn default() -> BuildOptions {
		BuildOptions {
			strip_root: false,
			exclude: Vec::new(),
			stored: Vec::new(),
			min_size: 512,
			profile: DeflateProfile::default(),
			method: method::DEFLATE,
			use_asis: false,
			base_url: None,
			sitemap_url: None,
			parallel: 0,
			delete: false,
			no_crc: false,
			choose_last: false,
			sort_by: SortBy::None,
			reverse: false,
			in_memory: false,
		}
	}
}

/// One unit of work for a compressor thread.
struct CompressJob {
	header: EntryHeader,
	source: JobSource,
	rewrite_url: Option<String>,
}

enum JobSource {
	Path(PathBuf),
	Zip(Arc<ZipArchive>, usize),
}

fn normalize_name(path: &str) -> String {
	let cleaned = path.trim_start_matches("./").trim_start_matches('/');
	cleaned.to_string()
}

fn walk_dir(source: &str, options: &BuildOptions, names: Sender<(String, ChooseFile)>) {
	let root = Path::new(source);
	for entry in WalkDir::new(root) {
		let entry = match entry {
			Ok(entry) => entry,
			Err(err) => {
				error!("walk: root={} error={}", source, err);
				continue;
			},
		};
		if entry.file_type().is_dir() {
			continue;
		}
		let path = entry.path();
		let full = path.to_string_lossy();
		if ismatch(&full, &options.exclude) {
			debug!("exclude-match: path={}", full);
			continue;
		}
		let rel = match path.strip_prefix(root) {
			Ok(rel) => rel.to_string_lossy().into_owned(),
			Err(_) => continue,
		};
		let name = if options.strip_root {
			rel.clone()
		} else {
			normalize_name(&full)
		};
		if let Some(file) = ChooseFile::from_dir(source, root, &rel) {
			let _ = names.send((name, file));
		}
	}
}

/// Phase 1: walk every source concurrently; a single consumer owns the
/// resulting name table.
fn enumerate(sources: &[String], options: &BuildOptions) -> InternalResult<HashMap<String, Vec<ChooseFile>>> {
	let mut table: HashMap<String, Vec<ChooseFile>> = HashMap::new();
	let mut file_count = 0usize;
	thread::scope(|scope| {
		let (names_tx, names_rx) = channel::<(String, ChooseFile)>();
		for source in sources {
			let meta = match std::fs::metadata(source) {
				Ok(meta) => meta,
				Err(err) => {
					error!("stat: path={} error={}", source, err);
					continue;
				},
			};
			if meta.is_dir() {
				let names = names_tx.clone();
				scope.spawn(move || walk_dir(source, options, names));
			} else if source.ends_with(".zip") {
				let archive = match ZipArchive::open(source) {
					Ok(archive) => Arc::new(archive),
					Err(err) => {
						error!("zip open: name={} error={}", source, err);
						continue;
					},
				};
				let names = names_tx.clone();
				scope.spawn(move || {
					for index in 0..archive.len() {
						let entry = archive.entry(index);
						if entry.is_dir() {
							continue;
						}
						if ismatch(&entry.name, &options.exclude) {
							debug!("exclude-match: path={}", entry.name);
							continue;
						}
						let _ = names.send((entry.name.clone(), ChooseFile::from_zip(source, archive.clone(), index)));
					}
				});
			} else if meta.is_file() {
				let path = Path::new(source);
				let name = match path.file_name() {
					Some(name) => name.to_string_lossy().into_owned(),
					None => continue,
				};
				let root = path.parent().unwrap_or_else(|| Path::new("."));
				if let Some(file) = ChooseFile::from_dir(source, root, &name) {
					let _ = names_tx.send((name, file));
				}
			}
		}
		drop(names_tx);
		info!("waiting to generate filelist");
		for (name, file) in names_rx {
			debug!("name add: name={}", name);
			table.entry(name).or_default().push(file);
			file_count += 1;
		}
	});
	info!("done: names={} files={}", table.len(), file_count);
	Ok(table)
}

/// Reads and compresses one job's payload, without touching any sink.
fn prepare_job(source: &JobSource, rewrite_url: Option<&str>, m: u16, profile: DeflateProfile) -> InternalResult<(Vec<u8>, u32, u64)> {
	let mut reader: Box<dyn Read + '_> = match source {
		JobSource::Path(path) => Box::new(File::open(path)?),
		JobSource::Zip(archive, index) => archive.open_entry(*index)?,
	};
	match rewrite_url {
		Some(url) => {
			let mut rewritten = Vec::new();
			link::link_relative(url, &mut reader, &mut rewritten)?;
			compress_entry(rewritten.as_slice(), m, profile)
		},
		None => compress_entry(&mut reader, m, profile),
	}
}

/// A compressor thread: drains the shared job queue FIFO into its private
/// sink. A failing source or codec skips that entry and keeps going; a
/// failing sink write stops this worker, since later offsets would land in
/// a half-written stream. Peers are never affected either way.
fn compress_worker(
	id: usize, sink: &Sink, mut writer: ZipWriter<SinkIo>, jobs: Arc<Mutex<Receiver<CompressJob>>>,
	profile: DeflateProfile,
) -> InternalResult<ZipArchive> {
	let mut first_error = None;
	loop {
		let job = {
			let guard = jobs.lock().unwrap();
			guard.recv()
		};
		let job = match job {
			Ok(job) => job,
			Err(_) => break,
		};
		debug!("worker {}: job name={}", id, job.header.name);
		let (data, crc, size) = match prepare_job(&job.source, job.rewrite_url.as_deref(), job.header.method, profile) {
			Ok(prepared) => prepared,
			Err(err) => {
				error!("compress failed: worker={} name={} error={}", id, job.header.name, err);
				if first_error.is_none() {
					first_error = Some(err);
				}
				continue;
			},
		};
		let name = job.header.name.clone();
		if let Err(err) = writer.add_entry(job.header, &data, crc, size) {
			error!("sink write failed: worker={} name={} error={}", id, name, err);
			if first_error.is_none() {
				first_error = Some(err);
			}
			// keep draining so the dispatcher never blocks on a full queue
			loop {
				let drained = { jobs.lock().unwrap().recv() };
				if drained.is_err() {
					break;
				}
			}
			break;
		}
	}
	let archive = sink.finish(writer)?;
	match first_error {
		Some(err) => Err(err),
		None => Ok(archive),
	}
}

fn sort_entries(items: &mut [(usize, usize)], archives: &[ZipArchive], sort_by: SortBy, reverse: bool) {
	if sort_by == SortBy::None {
		info!("no sort");
		return;
	}
	items.sort_by(|&(aa, ae), &(ba, be)| {
		let a = archives[aa].entry(ae);
		let b = archives[ba].entry(be);
		let order = match sort_by {
			SortBy::Name => a.name.cmp(&b.name),
			SortBy::Time => a.modified.cmp(&b.modified),
			SortBy::UncompressedSize => a.uncompressed_size.cmp(&b.uncompressed_size),
			SortBy::CompressedSize => a.compressed_size.cmp(&b.compressed_size),
			SortBy::None => std::cmp::Ordering::Equal,
		};
		if reverse {
			order.reverse()
		} else {
			order
		}
	});
}

/// Opens the output container and, for a self-executing archive, seeds it
/// with the running binary. Returns the handle and the bytes already
/// written, which become the ZIP base offset.
pub fn prepare_output(output: &Path, self_exec: bool) -> InternalResult<(File, u64)> {
	use std::os::unix::fs::OpenOptionsExt;

	let mode = if self_exec { 0o755 } else { 0o644 };
	let mut ofp = OpenOptions::new()
		.read(true)
		.write(true)
		.create(true)
		.truncate(true)
		.mode(mode)
		.open(output)?;
	let mut written = 0u64;
	if self_exec {
		let exe = std::env::current_exe()?;
		let mut exe_fp = File::open(&exe)?;
		written = io::copy(&mut exe_fp, &mut ofp)?;
		debug!("copy: name={} written={}", exe.display(), written);
		ofp.sync_all()?;
	}
	Ok((ofp, written))
}

/// Runs the whole pipeline and writes the archive to `output`.
pub fn build(
	output: &Path, sources: &[String], self_exec: bool, options: &BuildOptions,
	mut progress: Option<&mut dyn FnMut(&str)>,
) -> InternalResult<()> {
	let mut table = enumerate(sources, options)?;

	if options.delete && sources.len() != 1 {
		let first = &sources[0];
		let doomed: Vec<String> = table
			.iter()
			.filter(|(_, v)| v.len() == 1 && v[0].origin == *first)
			.map(|(k, _)| k.clone())
			.collect();
		for name in doomed {
			info!("remove: name={}", name);
			table.remove(&name);
		}
	}

	let parallel = if options.parallel == 0 {
		num_cpus::get()
	} else {
		options.parallel
	};
	match options.profile {
		DeflateProfile::Zopfli => info!("using zopfli compressor: workers={}", parallel),
		DeflateProfile::Normal => info!("normal compressor: parallel={}", parallel),
	}

	let temp_dir = if options.in_memory {
		None
	} else {
		Some(tempfile::tempdir()?)
	};
	if let Some(td) = &temp_dir {
		info!("tmpdir: name={}", td.path().display());
	}

	// 0th sink takes pass-through and the sitemap, 1..=P get workers
	let mut sinks = Vec::with_capacity(parallel + 1);
	for index in 0..=parallel {
		match &temp_dir {
			Some(td) => sinks.push(Sink::file(td.path().join(format!("{}.zip", index)))),
			None => sinks.push(Sink::memory()),
		}
	}

	let mut sitemap_url = options.sitemap_url.clone();
	if sitemap_url.is_some() && table.contains_key("sitemap.xml") {
		info!("disable sitemap: already exists");
		sitemap_url = None;
	}

	let merged = thread::scope(|scope| -> InternalResult<Vec<ZipArchive>> {
		let (jobs_tx, jobs_rx) = sync_channel::<CompressJob>(10);
		let jobs_rx = Arc::new(Mutex::new(jobs_rx));

		let mut handles = Vec::with_capacity(parallel);
		for (index, sink) in sinks.iter().enumerate().skip(1) {
			let writer = sink.writer()?;
			let jobs = jobs_rx.clone();
			let profile = options.profile;
			handles.push(scope.spawn(move || compress_worker(index, sink, writer, jobs, profile)));
		}
		let mut misc_writer = sinks[0].writer()?;

		let mut sitemap = SiteMap::new();
		let mut selected: HashMap<String, usize> = HashMap::new();
		let mut first_error: Option<InternalError> = None;
		let base_url = options.base_url.as_deref();

		for (name, mut candidates) in std::mem::take(&mut table) {
			if let Some(callback) = progress.as_mut() {
				callback(&name);
			}
			debug!("process: name={} num={}", name, candidates.len());
			let chosen = if options.no_crc {
				chooser::choose_from_nocrc(&candidates)
			} else if options.choose_last {
				chooser::choose_from_last(&mut candidates, base_url)
			} else {
				chooser::choose_from(&mut candidates, base_url)
			};
			let Some(chosen) = chosen else { continue };
			let chosen = candidates.swap_remove(chosen);
			debug!("choose: name={} origin={}", name, chosen.origin);
			*selected.entry(chosen.origin.clone()).or_insert(0) += 1;

			if let Some(base) = &sitemap_url {
				if let Err(err) = sitemap.add_file(base, "index.html", &name, chosen.modified) {
					error!("sitemap error: name={} error={}", name, err);
				}
			}

			if options.use_asis {
				if let ChooseSource::Zip { archive, index } = &chosen.source {
					match misc_writer.copy_from(archive, *index, Some(name.clone())) {
						Ok(_) => continue,
						Err(err) => debug!("asis failed: name={} error={}", name, err),
					}
				}
			}

			let mut header = chosen.header();
			header.name = name.clone();
			header.method = options.method;
			if chosen.uncompressed_size < options.min_size || ismatch(&name, &options.stored) {
				header.method = method::STORE;
			}
			let rewrite_url = options
				.base_url
				.as_ref()
				.map(|base| format!("{}/{}", base.trim_end_matches('/'), name));
			let source = match chosen.source {
				ChooseSource::Dir { root, rel } => JobSource::Path(root.join(rel)),
				ChooseSource::Zip { archive, index } => JobSource::Zip(archive, index),
			};
			if jobs_tx
				.send(CompressJob {
					header,
					source,
					rewrite_url,
				})
				.is_err()
			{
				// every worker is gone, their join below reports why
				error!("job queue closed early: name={}", name);
				break;
			}
		}
		info!("selected: result={:?}", selected);

		if sitemap_url.is_some() && !sitemap.is_empty() {
			info!("generating sitemap: num={}", sitemap.len());
			let xml = sitemap.to_xml();
			let (data, crc, size) = compress_entry(xml.as_bytes(), method::DEFLATE, options.profile)?;
			let header = EntryHeader::new("sitemap.xml", method::DEFLATE, sitemap.last_mod());
			misc_writer.add_entry(header, &data, crc, size)?;
		}

		debug!("close jobs");
		drop(jobs_tx);
		let mut archives = Vec::with_capacity(parallel + 1);
		archives.push(sinks[0].finish(misc_writer)?);
		for handle in handles {
			match handle.join() {
				Ok(Ok(archive)) => archives.push(archive),
				Ok(Err(err)) => {
					error!("worker failed: error={}", err);
					if first_error.is_none() {
						first_error = Some(err);
					}
				},
				Err(_) => {
					if first_error.is_none() {
						first_error = Some(InternalError::CodecError("compressor worker panicked".into()));
					}
				},
			}
		}
		info!("wait done");
		match first_error {
			Some(err) => Err(err),
			None => Ok(archives),
		}
	})?;

	// merge in declared order, then the requested total sort
	let mut items: Vec<(usize, usize)> = Vec::new();
	for (archive_index, archive) in merged.iter().enumerate() {
		for entry_index in 0..archive.len() {
			items.push((archive_index, entry_index));
		}
	}
	sort_entries(&mut items, &merged, options.sort_by, options.reverse);
	info!("all files: num={}", items.len());

	let (ofp, written) = prepare_output(output, self_exec)?;
	let mut writer = ZipWriter::with_offset(ofp, written);
	for (archive_index, entry_index) in items {
		writer.copy_from(&merged[archive_index], entry_index, None)?;
	}
	let ofp = writer.finish()?;
	ofp.sync_all()?;
	Ok(())
}
