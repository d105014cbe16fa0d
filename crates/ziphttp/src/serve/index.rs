//! The serving index: one pass over the central directories of every
//! backing archive produces a `name -> method -> entry id` lookup with a
//! dense id space across archives.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use log::{debug, info, warn};

use crate::global::error::*;
use crate::zip::reader::{RawReader, ZipArchive};
use crate::zip::record::ZipEntry;

/// One or more archives listed in declaration order. Entry ids count
/// through the archives, so id arithmetic recovers the owner.
pub struct ArchiveSet {
	archives: Vec<ZipArchive>,
}

impl ArchiveSet {
	pub fn new(archives: Vec<ZipArchive>) -> ArchiveSet {
		ArchiveSet { archives }
	}

	/// Total entry count across every archive.
	pub fn files(&self) -> usize {
		self.archives.iter().map(|a| a.len()).sum()
	}

	/// Maps a global id back to its archive and local index.
	fn resolve(&self, id: usize) -> (&ZipArchive, usize) {
		let mut rest = id;
		for archive in &self.archives {
			if rest < archive.len() {
				return (archive, rest);
			}
			rest -= archive.len();
		}
		// ids are produced by this set, an overflow is a programming error
		panic!("entry id {} out of range", id)
	}

	pub fn entry(&self, id: usize) -> &ZipEntry {
		let (archive, local) = self.resolve(id);
		archive.entry(local)
	}

	pub fn open(&self, id: usize) -> InternalResult<Box<dyn Read + '_>> {
		let (archive, local) = self.resolve(id);
		archive.open_entry(local)
	}

	pub fn open_raw(&self, id: usize) -> InternalResult<RawReader<'_>> {
		let (archive, local) = self.resolve(id);
		archive.open_raw(local)
	}

	/// The archive owning `id`, for operations that work on whole archives
	/// such as the gzip bridge.
	pub fn archive_of(&self, id: usize) -> (&ZipArchive, usize) {
		self.resolve(id)
	}
}

/// `name -> method -> global id`. The method map is ordered so "pick any
/// method" stays deterministic.
pub type MethodIndex = HashMap<String, BTreeMap<u16, usize>>;

/// Scans the set once, skipping directory entries. Names reachable through
/// several methods must agree on CRC-32; a mismatch is logged and the index
/// stays usable.
pub fn build_index(set: &ArchiveSet) -> MethodIndex {
	let mut index: MethodIndex = HashMap::new();
	let mut id = 0usize;
	for archive in &set.archives {
		for entry in archive.entries() {
			if entry.is_dir() {
				debug!("isdir: name={}", entry.name);
				id += 1;
				continue;
			}
			debug!("makemap: name={} method={} idx={}", entry.name, entry.method, id);
			index.entry(entry.name.clone()).or_default().insert(entry.method, id);
			id += 1;
		}
	}

	let mut per_method: HashMap<u16, usize> = HashMap::new();
	for methods in index.values() {
		for method in methods.keys() {
			*per_method.entry(*method).or_insert(0) += 1;
		}
	}
	for (method, num) in per_method {
		info!("by method: method={} num={}", method, num);
	}

	for (name, methods) in &index {
		if methods.len() < 2 {
			continue;
		}
		let mut crcs = methods.values().map(|&id| set.entry(id).crc32);
		let first = crcs.next().unwrap_or(0);
		if crcs.any(|crc| crc != first) {
			warn!("crc mismatch across methods: name={}", name);
		}
	}
	index
}
