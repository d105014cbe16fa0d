//! Picks one winner when several sources provide the same archive name.
//! Candidates with identical CRC-32 collapse to their most compact
//! representative; distinct contents are ranked to prefer fresher and
//! larger bodies.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error};

use crate::build::link;
use crate::global::codec::Crc32Writer;
use crate::global::error::*;
use crate::zip::reader::ZipArchive;
use crate::zip::writer::EntryHeader;

/// Where a candidate's bytes live.
pub enum ChooseSource {
	/// a file under a walked directory root
	Dir { root: PathBuf, rel: String },
	/// a member of a sibling ZIP archive
	Zip { archive: Arc<ZipArchive>, index: usize },
}

/// One candidate for an archive name.
pub struct ChooseFile {
	pub source: ChooseSource,
	/// the source argument this candidate came from, used for reporting and
	/// the delete rule
	pub origin: String,
	pub name: String,
	pub crc32: u32,
	pub modified: DateTime<Utc>,
	pub uncompressed_size: u64,
	/// zero means "not compressed at the source"
	pub compressed_size: u64,
}

impl ChooseFile {
	/// Candidate backed by a plain file. `None` when it cannot be stat'ed.
	pub fn from_dir(origin: &str, root: &std::path::Path, rel: &str) -> Option<ChooseFile> {
		let meta = std::fs::metadata(root.join(rel)).ok()?;
		let modified = meta
			.modified()
			.ok()
			.map(|t| DateTime::<Utc>::from(t))
			.unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
		Some(ChooseFile {
			source: ChooseSource::Dir {
				root: root.to_path_buf(),
				rel: rel.to_string(),
			},
			origin: origin.to_string(),
			name: rel.to_string(),
			crc32: 0,
			modified,
			uncompressed_size: meta.len(),
			compressed_size: 0,
		})
	}

	/// Candidate backed by entry `index` of an open archive.
	pub fn from_zip(origin: &str, archive: Arc<ZipArchive>, index: usize) -> ChooseFile {
		let entry = archive.entry(index);
		ChooseFile {
			name: entry.name.clone(),
			crc32: entry.crc32,
			modified: entry.modified,
			uncompressed_size: entry.uncompressed_size,
			compressed_size: entry.compressed_size,
			origin: origin.to_string(),
			source: ChooseSource::Zip { archive, index },
		}
	}

	/// Opens the decoded content of this candidate.
	pub fn open(&self) -> InternalResult<Box<dyn io::Read + '_>> {
		match &self.source {
			ChooseSource::Dir { root, rel } => Ok(Box::new(File::open(root.join(rel))?)),
			ChooseSource::Zip { archive, index } => archive.open_entry(*index),
		}
	}

	/// Entry header template for re-archiving this candidate.
	pub fn header(&self) -> EntryHeader {
		match &self.source {
			ChooseSource::Dir { .. } => EntryHeader {
				name: self.name.clone(),
				method: 0,
				flags: 0,
				modified: self.modified,
				comment: String::new(),
			},
			ChooseSource::Zip { archive, index } => {
				let entry = archive.entry(*index);
				EntryHeader {
					name: entry.name.clone(),
					method: entry.method,
					flags: entry.flags,
					modified: entry.modified,
					comment: entry.comment.clone(),
				}
			},
		}
	}

	/// Lazily fills `crc32` for disk-backed candidates by streaming the file
	/// through the IEEE polynomial. When a base URL is set the bytes are
	/// first piped through the link rewriter, so the hash reflects what will
	/// actually be stored.
	pub fn fix_crc(&mut self, base_url: Option<&str>) -> InternalResult {
		if self.crc32 != 0 {
			return Ok(());
		}
		let (root, rel) = match &self.source {
			ChooseSource::Dir { root, rel } => (root.clone(), rel.clone()),
			ChooseSource::Zip { .. } => return Ok(()),
		};
		let mut input = File::open(root.join(&rel))?;
		let mut hasher = Crc32Writer::new(io::sink());
		match base_url {
			Some(base) => {
				let document_url = format!("{}/{}", base.trim_end_matches('/'), self.name);
				link::link_relative(&document_url, &mut input, &mut hasher)?;
			},
			None => {
				io::copy(&mut input, &mut hasher)?;
			},
		}
		let (crc, _) = hasher.digest();
		debug!("crc32: name={} value={}", self.name, crc);
		self.crc32 = crc;
		Ok(())
	}
}

/// Ordering among candidates known to hold the same content: compact first,
/// then older, then larger.
fn same_content_cmp(a: &ChooseFile, b: &ChooseFile) -> Ordering {
	if a.compressed_size != 0 && b.compressed_size != 0 && a.compressed_size != b.compressed_size {
		return a.compressed_size.cmp(&b.compressed_size);
	}
	if a.compressed_size != 0 && b.compressed_size == 0 {
		return Ordering::Less;
	}
	if a.compressed_size == 0 && b.compressed_size != 0 {
		return Ordering::Greater;
	}
	if a.modified != b.modified {
		return a.modified.cmp(&b.modified);
	}
	b.uncompressed_size.cmp(&a.uncompressed_size)
}

/// Ordering among candidates with different content: newer first, then
/// larger, then more compact.
fn diff_content_cmp(a: &ChooseFile, b: &ChooseFile) -> Ordering {
	if a.modified != b.modified {
		return b.modified.cmp(&a.modified);
	}
	if a.uncompressed_size != b.uncompressed_size {
		return b.uncompressed_size.cmp(&a.uncompressed_size);
	}
	if a.compressed_size != 0 && b.compressed_size != 0 && a.compressed_size != b.compressed_size {
		return a.compressed_size.cmp(&b.compressed_size);
	}
	if a.compressed_size != 0 && b.compressed_size == 0 {
		return Ordering::Less;
	}
	if a.compressed_size == 0 && b.compressed_size != 0 {
		return Ordering::Greater;
	}
	Ordering::Equal
}

/// CRC mode: group by checksum, reduce each group by the same-content rule,
/// rank the group heads by the different-content rule. Returns the winning
/// index into `input`.
pub fn choose_from(input: &mut [ChooseFile], base_url: Option<&str>) -> Option<usize> {
	match input.len() {
		0 => return None,
		1 => return Some(0),
		_ => {},
	}
	let mut groups: HashMap<u32, Vec<usize>> = HashMap::new();
	for (index, file) in input.iter_mut().enumerate() {
		if file.crc32 == 0 {
			if let Err(err) = file.fix_crc(base_url) {
				error!("cannot calculate CRC: origin={} name={} error={}", file.origin, file.name, err);
				continue;
			}
		}
		groups.entry(file.crc32).or_default().push(index);
	}
	debug!("groups: name={} num={}", input[0].name, groups.len());
	let mut heads: Vec<usize> = groups
		.into_values()
		.filter_map(|mut member| {
			member.sort_by(|&x, &y| same_content_cmp(&input[x], &input[y]));
			member.first().copied()
		})
		.collect();
	heads.sort_by(|&x, &y| diff_content_cmp(&input[x], &input[y]));
	heads.first().copied()
}

/// No-CRC mode: skip hashing, apply only the same-content preference.
pub fn choose_from_nocrc(input: &[ChooseFile]) -> Option<usize> {
	match input.len() {
		0 => None,
		1 => Some(0),
		_ => (0..input.len()).min_by(|&x, &y| same_content_cmp(&input[x], &input[y])),
	}
}

/// Last-wins mode: take the final candidate, but when an earlier one holds
/// identical bytes, keep the earliest of those instead.
pub fn choose_from_last(input: &mut [ChooseFile], base_url: Option<&str>) -> Option<usize> {
	let last = input.len().checked_sub(1)?;
	if last == 0 {
		return Some(0);
	}
	if input[last].crc32 == 0 {
		if let Err(err) = input[last].fix_crc(base_url) {
			error!("cannot calculate CRC: name={} error={}", input[last].name, err);
			return Some(last);
		}
	}
	let wanted = input[last].crc32;
	for index in 0..last {
		if input[index].crc32 == 0 && input[index].fix_crc(base_url).is_err() {
			continue;
		}
		if input[index].crc32 == wanted {
			return Some(index);
		}
	}
	Some(last)
}
