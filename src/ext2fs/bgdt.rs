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

//! The Block Group Descriptor Table: one 32-byte entry per block group, stored in the block(s)
//! immediately following a superblock copy.

use crate::device::Device;
use crate::error::Result;
use crate::superblock::Superblock;
use std::mem::size_of;
use utils::util::reinterpret;

/// A single 32-byte group descriptor, as it appears on disk.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupDescriptor {
	pub block_bitmap: u32,
	pub inode_bitmap: u32,
	pub inode_table: u32,
	pub num_free_blocks: u16,
	pub num_free_inodes: u16,
	pub num_directories: u16,
	_padding: [u8; 14],
}

const _: () = assert!(size_of::<GroupDescriptor>() == 32);

/// Field-by-field schema used to diff a backup [`GroupDescriptor`] against the primary one
/// without reflection, mirroring [`crate::superblock::COMPARABLE_FIELDS`].
pub const COMPARABLE_FIELDS: &[(&str, fn(&GroupDescriptor) -> u64)] = &[
	("block_bitmap", |e| e.block_bitmap as u64),
	("inode_bitmap", |e| e.inode_bitmap as u64),
	("inode_table", |e| e.inode_table as u64),
	("free_blocks_count", |e| e.num_free_blocks as u64),
	("free_inodes_count", |e| e.num_free_inodes as u64),
	("used_dirs_count", |e| e.num_directories as u64),
];

impl GroupDescriptor {
	/// Builds a fresh descriptor for a newly formatted group — used by the image formatter,
	/// which has no on-disk bytes to parse yet.
	pub fn new(
		block_bitmap: u32,
		inode_bitmap: u32,
		inode_table: u32,
		num_free_blocks: u16,
		num_free_inodes: u16,
		num_directories: u16,
	) -> Self {
		Self {
			block_bitmap,
			inode_bitmap,
			inode_table,
			num_free_blocks,
			num_free_inodes,
			num_directories,
			_padding: [0; 14],
		}
	}
}

/// The Block Group Descriptor Table: one entry per block group, in group order.
#[derive(Debug, Clone)]
pub struct Bgdt {
	pub entries: Vec<GroupDescriptor>,
	/// Absolute byte offset of the first entry (immediately following the superblock copy this
	/// table was read alongside).
	offset: u64,
}

impl Bgdt {
	/// Builds a table from already-constructed entries — used by the image formatter, which
	/// computes group layouts itself rather than reading them back from disk.
	pub fn new(entries: Vec<GroupDescriptor>, offset: u64) -> Self {
		Self { entries, offset }
	}

	/// Returns the absolute byte offset of the BGDT following the superblock copy stored in
	/// block group `group_id`.
	pub fn offset_for_group(superblock: &Superblock, group_id: u32) -> u64 {
		let group_start = if group_id == 0 {
			0
		} else {
			group_id as u64 * superblock.num_blocks_per_group as u64
		};
		let sb_block = if superblock.block_size > 1024 { 0 } else { 1 };
		(group_start + sb_block as u64 + 1) * superblock.block_size as u64
	}

	/// Reads the full table following the superblock copy in block group `group_id`.
	pub fn read(dev: &mut dyn Device, superblock: &Superblock, group_id: u32) -> Result<Self> {
		let offset = Self::offset_for_group(superblock, group_id);
		let mut entries = Vec::with_capacity(superblock.num_groups as usize);
		for i in 0..superblock.num_groups {
			let entry_offset = offset + i as u64 * size_of::<GroupDescriptor>() as u64;
			let bytes = dev.read_at(entry_offset, size_of::<GroupDescriptor>())?;
			let entry: GroupDescriptor =
				unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const _) };
			entries.push(entry);
		}
		Ok(Self { entries, offset })
	}

	/// Writes a single entry back to its slot in the primary table.
	pub fn write_entry(&self, dev: &mut dyn Device, group_id: u32) -> Result<()> {
		let entry = &self.entries[group_id as usize];
		let entry_offset = self.offset + group_id as u64 * size_of::<GroupDescriptor>() as u64;
		dev.write_at(entry_offset, reinterpret(entry))
	}

	/// Writes the whole table back (used when refreshing a full backup copy).
	pub fn write_all(&self, dev: &mut dyn Device) -> Result<()> {
		for i in 0..self.entries.len() as u32 {
			self.write_entry(dev, i)?;
		}
		Ok(())
	}

	/// Writes the whole table to an arbitrary absolute offset, used by [`crate::format`] to lay
	/// down BGDT backup copies alongside each superblock backup.
	pub fn write_to(&self, dev: &mut dyn Device, offset: u64) -> Result<()> {
		for (i, entry) in self.entries.iter().enumerate() {
			let entry_offset = offset + i as u64 * size_of::<GroupDescriptor>() as u64;
			dev.write_at(entry_offset, reinterpret(entry))?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::test_support::MemDevice;

	fn sample_entry(n: u16) -> GroupDescriptor {
		GroupDescriptor {
			block_bitmap: 10,
			inode_bitmap: 11,
			inode_table: 12,
			num_free_blocks: 100 + n,
			num_free_inodes: 50 + n,
			num_directories: n,
			_padding: [0; 14],
		}
	}

	#[test]
	fn round_trips_entry() {
		let mut dev = MemDevice::zeroed(8192);
		let entry = sample_entry(3);
		let bytes = reinterpret(&entry).to_vec();
		dev.write_at(2048, &bytes).unwrap();
		let read_back: GroupDescriptor =
			unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const _) };
		assert_eq!(read_back, entry);
	}

	#[test]
	fn write_entry_preserves_others() {
		let mut dev = MemDevice::zeroed(8192);
		let mut bgdt = Bgdt {
			entries: vec![sample_entry(0), sample_entry(1)],
			offset: 2048,
		};
		bgdt.write_all(&mut dev).unwrap();
		bgdt.entries[0].num_free_blocks = 999;
		bgdt.write_entry(&mut dev, 0).unwrap();

		let bytes = dev.read_at(2048 + size_of::<GroupDescriptor>() as u64, size_of::<GroupDescriptor>()).unwrap();
		let entry1: GroupDescriptor = unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const _) };
		assert_eq!(entry1, sample_entry(1));
	}
}
