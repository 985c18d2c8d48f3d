/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! The ext2 superblock: the filesystem header at absolute byte offset 1024.

use crate::device::Device;
use crate::error::Error;
use crate::error::Result;
use std::mem::size_of;
use utils::util::pow2;
use utils::util::reinterpret;

/// Absolute byte offset of the primary superblock.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// The ext2 signature.
pub const EXT2_MAGIC: u16 = 0xef53;
/// Inode number of the root directory.
pub const ROOT_INODE: u32 = 2;

/// RO-compat feature bit: superblock/BGDT backups exist only in sparse groups.
const RO_COMPAT_SPARSE_SUPER: u32 = 0x1;

/// The on-disk layout of the 1024-byte superblock record, as it appears on disk.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct RawSuperblock {
	inodes_count: u32,
	blocks_count: u32,
	r_blocks_count: u32,
	free_blocks_count: u32,
	free_inodes_count: u32,
	first_data_block: u32,
	log_block_size: u32,
	log_frag_size: u32,
	blocks_per_group: u32,
	frags_per_group: u32,
	inodes_per_group: u32,
	mtime: u32,
	wtime: u32,
	mnt_count: u16,
	max_mnt_count: u16,
	magic: u16,
	state: u16,
	errors: u16,
	minor_rev_level: u16,
	lastcheck: u32,
	checkinterval: u32,
	creator_os: u32,
	rev_level: u32,
	def_resuid: u16,
	def_resgid: u16,

	// -- extended fields, valid when rev_level >= 1 --
	first_ino: u32,
	inode_size: u16,
	block_group_nr: u16,
	feature_compat: u32,
	feature_incompat: u32,
	feature_ro_compat: u32,
	uuid: [u8; 16],
	volume_name: [u8; 16],
	last_mounted: [u8; 64],
	algo_bitmap: u32,
	prealloc_blocks: u8,
	prealloc_dir_blocks: u8,
	_padding0: u16,
	journal_uuid: [u8; 16],
	journal_inum: u32,
	journal_dev: u32,
	last_orphan: u32,

	_reserved: [u8; 788],
}

const _: () = assert!(size_of::<RawSuperblock>() == 1024);

/// Operating systems that can be recorded in `creator_os`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatorOs {
	Linux,
	Hurd,
	Other(u32),
}

impl From<u32> for CreatorOs {
	fn from(v: u32) -> Self {
		match v {
			0 => Self::Linux,
			1 => Self::Hurd,
			other => Self::Other(other),
		}
	}
}

/// The parsed, cached superblock.
#[derive(Debug, Clone)]
pub struct Superblock {
	pub num_inodes: u32,
	pub num_blocks: u32,
	pub num_reserved_blocks: u32,
	pub num_free_blocks: u32,
	pub num_free_inodes: u32,
	pub first_data_block: u32,
	pub log_block_size: u32,
	pub block_size: u32,
	pub num_blocks_per_group: u32,
	pub num_fragments_per_group: u32,
	pub num_inodes_per_group: u32,
	pub magic_number: u16,
	pub revision_major: u32,
	pub revision_minor: u16,
	pub creator_os: CreatorOs,
	pub inode_size: u32,
	pub first_inode: u32,
	pub feature_ro_compat: u32,
	pub num_groups: u32,
	pub copy_locations: Vec<u32>,

	/// Absolute byte offset this copy was read from (1024 for the primary).
	offset: u64,
	raw: RawSuperblock,
}

impl Superblock {
	/// Parses and validates the superblock at `offset` on `dev`.
	pub fn read(dev: &mut dyn Device, offset: u64) -> Result<Self> {
		let bytes = dev.read_at(offset, size_of::<RawSuperblock>())?;
		let raw: RawSuperblock = unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const _) };

		if raw.magic == 0 && raw.blocks_count == 0 {
			return Err(Error::InvalidImageFormat);
		}
		if raw.magic != EXT2_MAGIC {
			return Err(Error::InvalidImageFormat);
		}
		if raw.blocks_per_group == 0 || raw.inodes_per_group == 0 {
			return Err(Error::InvalidImageFormat);
		}
		if raw.inodes_per_group % 8 != 0 {
			return Err(Error::InvalidImageFormat);
		}

		let block_size = (1024u64 << raw.log_block_size) as u32;
		if !matches!(block_size, 1024 | 2048 | 4096) {
			return Err(Error::InvalidImageFormat);
		}

		let revision_major = raw.rev_level;
		let (inode_size, first_inode) = if revision_major == 0 {
			(128, 11)
		} else {
			let inode_size = raw.inode_size as u32;
			if inode_size == 0 || inode_size > block_size {
				return Err(Error::InvalidImageFormat);
			}
			(inode_size, raw.first_ino)
		};

		if raw.blocks_count <= raw.first_data_block {
			return Err(Error::InvalidImageFormat);
		}
		let num_groups = (raw.blocks_count - raw.first_data_block).div_ceil(raw.blocks_per_group);

		let feature_ro_compat = if revision_major >= 1 {
			raw.feature_ro_compat
		} else {
			0
		};
		let copy_locations =
			compute_copy_locations(revision_major, feature_ro_compat, num_groups);

		Ok(Self {
			num_inodes: raw.inodes_count,
			num_blocks: raw.blocks_count,
			num_reserved_blocks: raw.r_blocks_count,
			num_free_blocks: raw.free_blocks_count,
			num_free_inodes: raw.free_inodes_count,
			first_data_block: raw.first_data_block,
			log_block_size: raw.log_block_size,
			block_size,
			num_blocks_per_group: raw.blocks_per_group,
			num_fragments_per_group: raw.frags_per_group,
			num_inodes_per_group: raw.inodes_per_group,
			magic_number: raw.magic,
			revision_major,
			revision_minor: raw.minor_rev_level,
			creator_os: raw.creator_os.into(),
			inode_size,
			first_inode,
			feature_ro_compat,
			num_groups,
			copy_locations,
			offset,
			raw,
		})
	}

	/// Re-serializes the cached superblock back to the offset it was read from.
	pub fn write_back(&self, dev: &mut dyn Device) -> Result<()> {
		self.write_to(dev, self.offset)
	}

	/// Re-serializes the cached superblock to an arbitrary offset (used for backup copies).
	pub fn write_to(&self, dev: &mut dyn Device, offset: u64) -> Result<()> {
		let mut raw = self.raw;
		raw.inodes_count = self.num_inodes;
		raw.blocks_count = self.num_blocks;
		raw.r_blocks_count = self.num_reserved_blocks;
		raw.free_blocks_count = self.num_free_blocks;
		raw.free_inodes_count = self.num_free_inodes;
		dev.write_at(offset, reinterpret(&raw))
	}

	/// Builds a fresh rev-1 superblock for a brand-new image of `total_blocks` blocks, laid out
	/// into groups of `blocks_per_group` blocks / `inodes_per_group` inodes each. Used only by
	/// the image formatter; an existing image is always read back with [`Superblock::read`].
	pub fn format_new(
		total_blocks: u32,
		block_size: u32,
		blocks_per_group: u32,
		inodes_per_group: u32,
	) -> Result<Self> {
		let log_block_size = match block_size {
			1024 => 0,
			2048 => 1,
			4096 => 2,
			_ => return Err(Error::Filesystem(format!("unsupported block size {block_size}"))),
		};
		let first_data_block = if block_size == 1024 { 1 } else { 0 };
		if total_blocks <= first_data_block {
			return Err(Error::Filesystem("image too small to hold a single block group".into()));
		}
		let num_groups = (total_blocks - first_data_block).div_ceil(blocks_per_group);
		let num_inodes = inodes_per_group * num_groups;
		let feature_ro_compat = 0;
		let copy_locations = compute_copy_locations(1, feature_ro_compat, num_groups);

		let raw = RawSuperblock {
			inodes_count: num_inodes,
			blocks_count: total_blocks,
			r_blocks_count: 0,
			free_blocks_count: 0,
			free_inodes_count: 0,
			first_data_block,
			log_block_size,
			log_frag_size: log_block_size,
			blocks_per_group,
			frags_per_group: blocks_per_group,
			inodes_per_group,
			mtime: 0,
			wtime: 0,
			mnt_count: 0,
			max_mnt_count: 0xffff,
			magic: EXT2_MAGIC,
			state: 1,
			errors: 1,
			minor_rev_level: 0,
			lastcheck: 0,
			checkinterval: 0,
			creator_os: 0,
			rev_level: 1,
			def_resuid: 0,
			def_resgid: 0,
			first_ino: 11,
			inode_size: 128,
			block_group_nr: 0,
			feature_compat: 0,
			feature_incompat: 0,
			feature_ro_compat,
			uuid: [0; 16],
			volume_name: [0; 16],
			last_mounted: [0; 64],
			algo_bitmap: 0,
			prealloc_blocks: 0,
			prealloc_dir_blocks: 0,
			_padding0: 0,
			journal_uuid: [0; 16],
			journal_inum: 0,
			journal_dev: 0,
			last_orphan: 0,
			_reserved: [0; 788],
		};

		Ok(Self {
			num_inodes,
			num_blocks: total_blocks,
			num_reserved_blocks: 0,
			num_free_blocks: 0,
			num_free_inodes: 0,
			first_data_block,
			log_block_size,
			block_size,
			num_blocks_per_group: blocks_per_group,
			num_fragments_per_group: blocks_per_group,
			num_inodes_per_group: inodes_per_group,
			magic_number: EXT2_MAGIC,
			revision_major: 1,
			revision_minor: 0,
			creator_os: CreatorOs::Linux,
			inode_size: 128,
			first_inode: 11,
			feature_ro_compat,
			num_groups,
			copy_locations,
			offset: SUPERBLOCK_OFFSET,
			raw,
		})
	}

	/// Whether the sparse-super feature (RO-compat bit `0x1`) is enabled.
	pub fn has_sparse_super(&self) -> bool {
		self.revision_major >= 1 && self.feature_ro_compat & RO_COMPAT_SPARSE_SUPER != 0
	}

	/// Formats the revision as `MAJOR.MINOR`.
	pub fn revision_string(&self) -> String {
		format!("{}.{}", self.revision_major, self.revision_minor)
	}

	/// Total filesystem size in bytes.
	pub fn total_space(&self) -> u64 {
		self.block_size as u64 * self.num_blocks as u64
	}

	/// Free space in bytes.
	pub fn free_space(&self) -> u64 {
		self.block_size as u64 * self.num_free_blocks as u64
	}
}

/// Computes the set of group indices that hold superblock/BGDT backups.
fn compute_copy_locations(revision_major: u32, feature_ro_compat: u32, num_groups: u32) -> Vec<u32> {
	let sparse = revision_major >= 1 && feature_ro_compat & RO_COMPAT_SPARSE_SUPER != 0;
	if !sparse {
		return (0..num_groups).collect();
	}
	let mut locations = vec![0u32];
	for base in [3u32, 5, 7] {
		let mut power = base;
		while power < num_groups {
			locations.push(power);
			power *= base;
		}
	}
	locations.sort_unstable();
	locations.dedup();
	locations
}

/// Named accessors used by [`crate::scan`] to compare a backup superblock to the primary
/// field-by-field, without resorting to reflection.
pub const COMPARABLE_FIELDS: &[(&str, fn(&Superblock) -> u64)] = &[
	("inodes_count", |s| s.num_inodes as u64),
	("blocks_count", |s| s.num_blocks as u64),
	("r_blocks_count", |s| s.num_reserved_blocks as u64),
	("first_data_block", |s| s.first_data_block as u64),
	("log_block_size", |s| s.log_block_size as u64),
	("blocks_per_group", |s| s.num_blocks_per_group as u64),
	("frags_per_group", |s| s.num_fragments_per_group as u64),
	("inodes_per_group", |s| s.num_inodes_per_group as u64),
	("magic", |s| s.magic_number as u64),
	("rev_level", |s| s.revision_major as u64),
	("first_ino", |s| s.first_inode as u64),
	("inode_size", |s| s.inode_size as u64),
	("feature_ro_compat", |s| s.feature_ro_compat as u64),
];

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::test_support::MemDevice;

	fn build_raw(block_size_log: u32, num_blocks: u32, inodes_per_group: u32) -> RawSuperblock {
		let blocks_per_group = 1024;
		RawSuperblock {
			inodes_count: inodes_per_group,
			blocks_count: num_blocks,
			r_blocks_count: 0,
			free_blocks_count: 100,
			free_inodes_count: 100,
			first_data_block: if block_size_log == 0 { 1 } else { 0 },
			log_block_size: block_size_log,
			log_frag_size: block_size_log,
			blocks_per_group,
			frags_per_group: blocks_per_group,
			inodes_per_group,
			mtime: 0,
			wtime: 0,
			mnt_count: 0,
			max_mnt_count: 20,
			magic: EXT2_MAGIC,
			state: 1,
			errors: 1,
			minor_rev_level: 0,
			lastcheck: 0,
			checkinterval: 0,
			creator_os: 0,
			rev_level: 1,
			def_resuid: 0,
			def_resgid: 0,
			first_ino: 11,
			inode_size: 128,
			block_group_nr: 0,
			feature_compat: 0,
			feature_incompat: 0,
			feature_ro_compat: 0,
			uuid: [0; 16],
			volume_name: [0; 16],
			last_mounted: [0; 64],
			algo_bitmap: 0,
			prealloc_blocks: 0,
			prealloc_dir_blocks: 0,
			_padding0: 0,
			journal_uuid: [0; 16],
			journal_inum: 0,
			journal_dev: 0,
			last_orphan: 0,
			_reserved: [0; 788],
		}
	}

	#[test]
	fn parses_basic_fields() {
		let mut dev = MemDevice::zeroed(2048 + 1024);
		let raw = build_raw(0, 1024, 128);
		dev.write_at(SUPERBLOCK_OFFSET, reinterpret(&raw)).unwrap();
		let sb = Superblock::read(&mut dev, SUPERBLOCK_OFFSET).unwrap();
		assert_eq!(sb.block_size, 1024);
		assert_eq!(sb.num_blocks, 1024);
		assert_eq!(sb.num_groups, 1);
		assert_eq!(sb.revision_string(), "1.0");
		assert_eq!(sb.total_space(), 1024 * 1024);
	}

	#[test]
	fn rejects_bad_magic() {
		let mut dev = MemDevice::zeroed(2048 + 1024);
		let mut raw = build_raw(0, 1024, 128);
		raw.magic = 0x1234;
		dev.write_at(SUPERBLOCK_OFFSET, reinterpret(&raw)).unwrap();
		assert!(matches!(
			Superblock::read(&mut dev, SUPERBLOCK_OFFSET),
			Err(Error::InvalidImageFormat)
		));
	}

	#[test]
	fn round_trips_bytes() {
		let mut dev = MemDevice::zeroed(2048 + 1024);
		let raw = build_raw(2, 4096, 128);
		dev.write_at(SUPERBLOCK_OFFSET, reinterpret(&raw)).unwrap();
		let before = dev.read_at(SUPERBLOCK_OFFSET, 1024).unwrap();
		let sb = Superblock::read(&mut dev, SUPERBLOCK_OFFSET).unwrap();
		sb.write_back(&mut dev).unwrap();
		let after = dev.read_at(SUPERBLOCK_OFFSET, 1024).unwrap();
		assert_eq!(before, after);
	}

	#[test]
	fn sparse_super_copy_locations() {
		let mut dev = MemDevice::zeroed(2048 + 1024);
		let mut raw = build_raw(0, 1024 * 10, 128);
		raw.feature_ro_compat = RO_COMPAT_SPARSE_SUPER;
		dev.write_at(SUPERBLOCK_OFFSET, reinterpret(&raw)).unwrap();
		let sb = Superblock::read(&mut dev, SUPERBLOCK_OFFSET).unwrap();
		assert!(sb.has_sparse_super());
		assert_eq!(sb.copy_locations, vec![0, 3, 5, 7, 9]);
	}

	#[test]
	fn non_sparse_copy_locations_cover_every_group() {
		let mut dev = MemDevice::zeroed(2048 + 1024);
		let raw = build_raw(0, 1024 * 4, 128);
		dev.write_at(SUPERBLOCK_OFFSET, reinterpret(&raw)).unwrap();
		let sb = Superblock::read(&mut dev, SUPERBLOCK_OFFSET).unwrap();
		assert_eq!(sb.copy_locations, vec![0, 1, 2, 3]);
	}
}
