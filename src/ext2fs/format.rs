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

//! Formats a brand-new ext2 image: lays out every block group's metadata, writes the superblock
//! and its backups, and creates the root directory plus `lost+found`.
//!
//! Unlike a real `mkfs`, this never touches an existing filesystem's data — it assumes the whole
//! device is available to overwrite and builds every group from scratch.

use crate::bgdt::{Bgdt, GroupDescriptor};
use crate::bitmap;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::fs::Filesystem;
use crate::inode::Inode;
use crate::scan;
use crate::superblock::{Superblock, ROOT_INODE, SUPERBLOCK_OFFSET};
use std::mem::size_of;
use utils::util::get_timestamp;

/// Inode record size written by [`Superblock::format_new`] — every image this formatter produces
/// is a plain rev-1 image with 128-byte inodes, so this mirrors that constant rather than reading
/// it back out of the superblock we're still building.
const INODE_SIZE: u32 = 128;

/// Mode bits for a freshly created directory: type `0x4000` plus `rwxr-xr-x` permissions.
const NEW_DIRECTORY_MODE: u16 = 0x41ED;

/// Static, per-group metadata layout computed before a single byte is written.
struct GroupLayout {
	block_bitmap: u32,
	inode_bitmap: u32,
	inode_table: u32,
	/// Number of blocks in this group actually backed by the device — less than `blocks_per_group`
	/// only for the final group of an image whose size isn't an exact multiple of it.
	present_blocks: u32,
	reserved_blocks: u32,
	free_inodes: u32,
}

/// Formats `device` as a fresh ext2 image of `total_blocks` blocks, and returns it already
/// mounted with a root directory and `lost+found` in place.
///
/// `blocks_per_group` and `inodes_per_group` are taken as given rather than derived from
/// `block_size`, so callers (and the in-memory test fixtures) can force a specific number of
/// groups without needing a multi-megabyte image to do it.
pub fn create_on_device(
	mut device: Box<dyn Device>,
	total_blocks: u32,
	block_size: u32,
	blocks_per_group: u32,
	inodes_per_group: u32,
) -> Result<Filesystem> {
	let mut superblock = Superblock::format_new(total_blocks, block_size, blocks_per_group, inodes_per_group)?;
	let num_groups = superblock.num_groups;
	let first_data_block = superblock.first_data_block;
	let bits_per_block = block_size * 8;
	let bgdt_blocks = (num_groups * size_of::<GroupDescriptor>() as u32).div_ceil(block_size);
	let block_bitmap_blocks = blocks_per_group.div_ceil(bits_per_block);
	let inode_bitmap_blocks = inodes_per_group.div_ceil(bits_per_block);
	let inode_table_blocks = (inodes_per_group * INODE_SIZE).div_ceil(block_size);

	let mut layouts = Vec::with_capacity(num_groups as usize);
	let mut total_free_blocks = 0u32;
	let mut total_free_inodes = 0u32;
	for group in 0..num_groups {
		let group_start = group * blocks_per_group + first_data_block;
		let present_blocks = if group + 1 == num_groups {
			total_blocks - group_start
		} else {
			blocks_per_group
		};
		let meta_blocks = if superblock.copy_locations.contains(&group) {
			1 + bgdt_blocks
		} else {
			0
		};
		let block_bitmap = group_start + meta_blocks;
		let inode_bitmap = block_bitmap + block_bitmap_blocks;
		let inode_table = inode_bitmap + inode_bitmap_blocks;
		let reserved_blocks = meta_blocks + block_bitmap_blocks + inode_bitmap_blocks + inode_table_blocks;
		if reserved_blocks > present_blocks {
			return Err(Error::Filesystem(format!(
				"block group {group} is too small to hold its own metadata"
			)));
		}

		let reserved_inodes = if group == 0 { superblock.first_inode - 1 } else { 0 };
		let free_blocks = present_blocks - reserved_blocks;
		let free_inodes = inodes_per_group - reserved_inodes;
		total_free_blocks += free_blocks;
		total_free_inodes += free_inodes;

		layouts.push(GroupLayout {
			block_bitmap,
			inode_bitmap,
			inode_table,
			present_blocks,
			reserved_blocks,
			free_inodes,
		});
	}

	let entries: Vec<GroupDescriptor> = layouts
		.iter()
		.enumerate()
		.map(|(i, l)| {
			let free_blocks = (l.present_blocks - l.reserved_blocks) as u16;
			GroupDescriptor::new(
				l.block_bitmap,
				l.inode_bitmap,
				l.inode_table,
				free_blocks,
				l.free_inodes as u16,
				if i == 0 { 1 } else { 0 },
			)
		})
		.collect();

	superblock.num_free_blocks = total_free_blocks;
	superblock.num_free_inodes = total_free_inodes;

	for (group, layout) in layouts.iter().enumerate() {
		let block_bitmap_offset = layout.block_bitmap as u64 * block_size as u64;
		let byte_len = (block_bitmap_blocks * block_size) as usize;
		bitmap::fill_prefix(device.as_mut(), block_bitmap_offset, byte_len, layout.reserved_blocks as usize)?;
		for local in layout.present_blocks..blocks_per_group {
			bitmap::set_bit(device.as_mut(), block_bitmap_offset, local, true)?;
		}

		let inode_bitmap_offset = layout.inode_bitmap as u64 * block_size as u64;
		let byte_len = (inode_bitmap_blocks * block_size) as usize;
		let reserved_inodes = if group == 0 { superblock.first_inode - 1 } else { 0 };
		bitmap::fill_prefix(device.as_mut(), inode_bitmap_offset, byte_len, reserved_inodes as usize)?;
	}

	superblock.write_to(device.as_mut(), SUPERBLOCK_OFFSET)?;
	let bgdt = Bgdt::new(entries, Bgdt::offset_for_group(&superblock, 0));
	bgdt.write_all(device.as_mut())?;
	for &group in &superblock.copy_locations {
		if group == 0 {
			continue;
		}
		superblock.write_to(device.as_mut(), scan::backup_superblock_offset(&superblock, group))?;
		bgdt.write_to(device.as_mut(), Bgdt::offset_for_group(&superblock, group))?;
	}

	let mut fs = Filesystem::mount_device(device)?;

	let mut root_inode = Inode::new_empty(NEW_DIRECTORY_MODE);
	let now = get_timestamp().as_secs() as u32;
	root_inode.atime = now;
	root_inode.ctime = now;
	root_inode.mtime = now;
	fs.write_inode(ROOT_INODE, &root_inode)?;
	let root_block = fs.allocate_directory_block(ROOT_INODE, &mut root_inode)?;
	fs.write_directory_dots(root_block, ROOT_INODE, &mut root_inode, ROOT_INODE)?;

	fs.make_directory(ROOT_INODE, &mut root_inode, "lost+found", 0, 0)?;

	Ok(fs)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::test_support::MemDevice;
	use crate::superblock;

	fn format(block_size: u32, num_blocks: u32, blocks_per_group: u32, inodes_per_group: u32) -> Filesystem {
		let device = Box::new(MemDevice::zeroed((block_size as u64 * num_blocks as u64) as usize));
		create_on_device(device, num_blocks, block_size, blocks_per_group, inodes_per_group).unwrap()
	}

	#[test]
	fn single_group_image_mounts_cleanly() {
		let mut fs = format(1024, 512, 512, 32);
		assert_eq!(fs.num_block_groups(), 1);
		let root = fs.root_directory().unwrap();
		let files = root.files(&mut fs).unwrap();
		assert!(files.iter().any(|f| f.name() == "lost+found" && f.is_dir()));
	}

	#[test]
	fn multi_group_image_writes_consistent_backups() {
		let mut fs = format(1024, 1024 * 4, 1024, 128);
		assert_eq!(fs.num_block_groups(), 4);
		let report = fs.check_integrity().unwrap();
		assert!(report.has_magic_number);
		assert!(report.messages.is_empty(), "unexpected messages: {:?}", report.messages);
	}

	#[test]
	fn free_space_accounts_for_reserved_metadata() {
		let fs = format(1024, 512, 512, 32);
		assert!(fs.free_space() < fs.total_space());
		assert_eq!(fs.superblock().num_groups, 1);
		let _ = superblock::ROOT_INODE;
	}

	#[test]
	fn refuses_group_too_small_for_its_own_metadata() {
		let device = Box::new(MemDevice::zeroed(1024 * 16));
		let err = create_on_device(device, 16, 1024, 4, 32).unwrap_err();
		assert!(matches!(err, Error::Filesystem(_)));
	}
}
