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

//! The filesystem facade: owns the device, superblock, and BGDT; drives mount/unmount, inode and
//! block allocation, directory mutation, and path resolution. Every other module in this crate is
//! a dumb view over bytes; this is the only place that understands how they compose.

use crate::bgdt::Bgdt;
use crate::bitmap;
use crate::device::{Device, FileDevice};
use crate::dirent::{self, Entry, FT_DIRECTORY};
use crate::error::{Error, Result};
use crate::file::{self, Directory, File};
use crate::inode::{self, Inode};
use crate::superblock::{CreatorOs, Superblock, ROOT_INODE, SUPERBLOCK_OFFSET};
use std::path::Path;
use utils::util::get_timestamp;

/// Mode bits for a freshly created directory: type `0x4000` plus `rwxr-xr-x` permissions.
const NEW_DIRECTORY_MODE: u16 = 0x41ED;

/// The mounted filesystem. All file, directory, and entry handles obtained from it borrow it for
/// the duration of each call rather than for their own lifetime: using a `File`/`Directory` value
/// against a `Filesystem` that has since been unmounted and remounted is a caller bug the type
/// system does not catch.
pub struct Filesystem {
	device: Box<dyn Device>,
	superblock: Superblock,
	bgdt: Bgdt,
}

impl Filesystem {
	/// Opens `path` as an ext2 image: reads the superblock at offset 1024, then the BGDT that
	/// follows it. Fails with `InvalidImageFormat` if either read fails validation; no
	/// partially-constructed `Filesystem` escapes in that case.
	pub fn mount(path: &Path) -> Result<Self> {
		let device = FileDevice::open(path)?;
		Self::mount_device(Box::new(device))
	}

	/// As [`Self::mount`], over an already-open device — shared by `mount` itself, by
	/// [`crate::format`] right after writing a fresh image, and by in-memory test fixtures.
	pub(crate) fn mount_device(mut device: Box<dyn Device>) -> Result<Self> {
		let superblock = Superblock::read(device.as_mut(), SUPERBLOCK_OFFSET)?;
		let bgdt = Bgdt::read(device.as_mut(), &superblock, 0)?;
		Ok(Self {
			device,
			superblock,
			bgdt,
		})
	}

	/// Flushes and closes the underlying device. Consuming `self` is the primary enforcement of
	/// "no operations after unmount" — the borrow checker rejects further use of this value;
	/// `NotMounted` exists only for values (`File`/`Directory`) obtained before unmount and used
	/// after. Every write already goes straight through the device; this flush only guarantees
	/// the OS-level buffers are pushed out before the handle closes.
	pub fn unmount(mut self) -> Result<()> {
		self.device.flush()
	}

	/// The filesystem root (inode 2).
	pub fn root_directory(&mut self) -> Result<Directory> {
		file::build_directory(self, ROOT_INODE, String::new(), "/".to_string())
	}

	/// Resolves an absolute path by delegating to the root directory's relative resolver — the
	/// resolver already treats a leading slash as just another separator, so this is mostly about
	/// giving absolute and relative lookups their own distinctly named entry points.
	pub fn get_file_at(&mut self, path: &str) -> Result<File> {
		let root = self.root_directory()?;
		root.get_file_at(self, path)
	}

	pub fn total_space(&self) -> u64 {
		self.superblock.total_space()
	}

	pub fn free_space(&self) -> u64 {
		self.superblock.free_space()
	}

	pub fn used_space(&self) -> u64 {
		self.total_space() - self.free_space()
	}

	pub fn block_size(&self) -> u32 {
		self.superblock.block_size
	}

	pub fn num_inodes(&self) -> u32 {
		self.superblock.num_inodes
	}

	pub fn num_block_groups(&self) -> u32 {
		self.superblock.num_groups
	}

	pub fn revision(&self) -> String {
		self.superblock.revision_string()
	}

	pub fn fs_type(&self) -> &'static str {
		"EXT2"
	}

	pub(crate) fn superblock(&self) -> &Superblock {
		&self.superblock
	}

	pub(crate) fn bgdt(&self) -> &Bgdt {
		&self.bgdt
	}

	pub(crate) fn device_mut(&mut self) -> &mut dyn Device {
		self.device.as_mut()
	}

	pub(crate) fn creator_os(&self) -> CreatorOs {
		self.superblock.creator_os
	}

	fn inode_location(&self, num: u32) -> (u32, u32) {
		let per_group = self.superblock.num_inodes_per_group;
		((num - 1) / per_group, (num - 1) % per_group)
	}

	fn block_location(&self, block_id: u32) -> (u32, u32) {
		let relative = block_id - self.superblock.first_data_block;
		(
			relative / self.superblock.num_blocks_per_group,
			relative % self.superblock.num_blocks_per_group,
		)
	}

	/// Reads and parses inode `num`.
	pub(crate) fn read_inode(&mut self, num: u32) -> Result<Inode> {
		let (group, index) = self.inode_location(num);
		let entry = *self
			.bgdt
			.entries
			.get(group as usize)
			.ok_or_else(|| Error::Filesystem(format!("inode {num} belongs to nonexistent group {group}")))?;
		let offset =
			entry.inode_table as u64 * self.superblock.block_size as u64 + index as u64 * self.superblock.inode_size as u64;
		let bytes = self.device.read_at(offset, self.superblock.inode_size as usize)?;
		Inode::from_bytes(&bytes, self.superblock.revision_major >= 1)
	}

	/// Re-serializes `inode` back to its slot in the inode table.
	pub(crate) fn write_inode(&mut self, num: u32, inode: &Inode) -> Result<()> {
		let (group, index) = self.inode_location(num);
		let entry = self.bgdt.entries[group as usize];
		let offset =
			entry.inode_table as u64 * self.superblock.block_size as u64 + index as u64 * self.superblock.inode_size as u64;
		let bytes = inode.to_bytes(self.superblock.revision_major >= 1);
		self.device.write_at(offset, &bytes)
	}

	pub(crate) fn is_inode_used(&mut self, num: u32) -> Result<bool> {
		let (group, index) = self.inode_location(num);
		let entry = self.bgdt.entries[group as usize];
		let offset = entry.inode_bitmap as u64 * self.superblock.block_size as u64;
		bitmap::is_set(self.device.as_mut(), offset, index)
	}

	pub(crate) fn is_block_used(&mut self, block_id: u32) -> Result<bool> {
		let (group, index) = self.block_location(block_id);
		let entry = self.bgdt.entries[group as usize];
		let offset = entry.block_bitmap as u64 * self.superblock.block_size as u64;
		bitmap::is_set(self.device.as_mut(), offset, index)
	}

	/// Reads one whole block. Block id `0` (a hole) reads as all zeros without touching the
	/// device, matching `resolve_block_id`'s "a read of a hole returns a block of zero bytes".
	pub(crate) fn read_block_raw(&mut self, block_id: u32) -> Result<Vec<u8>> {
		if block_id == 0 {
			return Ok(vec![0u8; self.superblock.block_size as usize]);
		}
		let offset = block_id as u64 * self.superblock.block_size as u64;
		self.device.read_at(offset, self.superblock.block_size as usize)
	}

	pub(crate) fn write_block_raw(&mut self, block_id: u32, data: &[u8]) -> Result<()> {
		let offset = block_id as u64 * self.superblock.block_size as u64;
		self.device.write_at(offset, data)
	}

	/// Resolves the `index`-th logical block of `inode` to a physical block id, or `None` for a
	/// hole.
	pub(crate) fn lookup_block_id(&mut self, inode: &Inode, index: u64) -> Result<Option<u32>> {
		inode::resolve_block_id(self.device.as_mut(), &inode.block, self.superblock.block_size, index)
	}

	/// Every block id an inode's block-pointer tree references directly — data blocks and the
	/// indirect blocks themselves alike — for the integrity scanner's allocation cross-check.
	pub(crate) fn referenced_blocks(&mut self, inode: &Inode) -> Result<Vec<u32>> {
		let per_block = (self.superblock.block_size / 4) as u64;
		let mut out = Vec::new();
		for &p in &inode.block[..inode::NUM_DIRECT_BLOCKS] {
			if p != 0 {
				out.push(p);
			}
		}
		for (slot, depth) in [
			(inode::SINGLY_INDIRECT, 1u32),
			(inode::DOUBLY_INDIRECT, 2),
			(inode::TRIPLY_INDIRECT, 3),
		] {
			let p = inode.block[slot];
			if p != 0 {
				out.push(p);
				self.collect_indirect_leaves(p, depth, per_block, &mut out)?;
			}
		}
		Ok(out)
	}

	fn collect_indirect_leaves(
		&mut self,
		block_id: u32,
		depth: u32,
		per_block: u64,
		out: &mut Vec<u32>,
	) -> Result<()> {
		let bytes = self.read_block_raw(block_id)?;
		for i in 0..per_block as usize {
			let p = u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
			if p == 0 {
				continue;
			}
			out.push(p);
			if depth > 1 {
				self.collect_indirect_leaves(p, depth - 1, per_block, out)?;
			}
		}
		Ok(())
	}

	/// Grows `inode`'s block map by one slot, allocating whatever indirect blocks are needed
	/// along the way, and writes `new_id` into the newly assigned slot. Returns the logical index
	/// assigned — always the first hole in the block map, so a file stays dense regardless of
	/// whether `size` has already grown to cover it. The inode is written back with its new block
	/// pointer but *not* its `size` — callers bump `size` themselves afterwards, once the data
	/// block itself is safely on disk.
	pub(crate) fn assign_next_block_id(&mut self, inode_num: u32, inode: &mut Inode, new_id: u32) -> Result<u64> {
		let block_size = self.superblock.block_size;
		let max = inode::max_direct_and_indirect_blocks(block_size);
		let mut index = 0u64;
		while index < max {
			if self.lookup_block_id(inode, index)?.is_none() {
				break;
			}
			index += 1;
		}
		if index >= max {
			return Err(Error::Filesystem("file has reached the maximum addressable size".into()));
		}
		self.set_block_pointer(inode, index, new_id)?;
		inode.num_512_blocks += block_size / 512;
		self.write_inode(inode_num, inode)?;
		Ok(index)
	}

	fn set_block_pointer(&mut self, inode: &mut Inode, index: u64, new_id: u32) -> Result<()> {
		let block_size = self.superblock.block_size;
		let per_block = (block_size / 4) as u64;

		if index < inode::NUM_DIRECT_BLOCKS as u64 {
			inode.block[index as usize] = new_id;
			return Ok(());
		}
		let index = index - inode::NUM_DIRECT_BLOCKS as u64;

		if index < per_block {
			let indirect = self.ensure_indirect_block(&mut inode.block[inode::SINGLY_INDIRECT])?;
			return inode::write_pointer(self.device.as_mut(), indirect, block_size, index, new_id);
		}
		let index = index - per_block;

		if index < per_block * per_block {
			let outer = index / per_block;
			let inner = index % per_block;
			let l1 = self.ensure_indirect_block(&mut inode.block[inode::DOUBLY_INDIRECT])?;
			let l2 = self.ensure_nested_indirect_block(l1, outer)?;
			return inode::write_pointer(self.device.as_mut(), l2, block_size, inner, new_id);
		}
		let index = index - per_block * per_block;

		if index < per_block * per_block * per_block {
			let l1_index = index / (per_block * per_block);
			let rem = index % (per_block * per_block);
			let l2_index = rem / per_block;
			let l3_index = rem % per_block;
			let l1 = self.ensure_indirect_block(&mut inode.block[inode::TRIPLY_INDIRECT])?;
			let l2 = self.ensure_nested_indirect_block(l1, l1_index)?;
			let l3 = self.ensure_nested_indirect_block(l2, l2_index)?;
			return inode::write_pointer(self.device.as_mut(), l3, block_size, l3_index, new_id);
		}

		Err(Error::Filesystem("block index exceeds triple-indirect addressing range".into()))
	}

	/// Ensures the block-pointer slot names an allocated, zero-filled indirect block, allocating
	/// one in place if it is currently a hole.
	fn ensure_indirect_block(&mut self, pointer_slot: &mut u32) -> Result<u32> {
		if *pointer_slot != 0 {
			return Ok(*pointer_slot);
		}
		let block_id = self.allocate_block(true)?;
		*pointer_slot = block_id;
		Ok(block_id)
	}

	/// As [`Self::ensure_indirect_block`], for a pointer slot living inside an already-allocated
	/// indirect block rather than directly in the inode.
	fn ensure_nested_indirect_block(&mut self, containing_block: u32, index: u64) -> Result<u32> {
		let block_size = self.superblock.block_size;
		if let Some(existing) = inode::read_pointer(self.device.as_mut(), containing_block, block_size, index)? {
			return Ok(existing);
		}
		let block_id = self.allocate_block(true)?;
		inode::write_pointer(self.device.as_mut(), containing_block, block_size, index, block_id)?;
		Ok(block_id)
	}

	/// Allocates a fresh inode: first group descriptor with a free inode, first clear bit in its
	/// bitmap (skipping the reserved inodes at the head of group 0). Writes through in the order
	/// bitmap bit → BGDT counter → superblock counter, so a crash mid-allocation leaves the
	/// counters conservatively too low rather than pointing at a bit that was never actually set.
	pub fn allocate_inode(&mut self, mode: u16, uid: u32, gid: u32) -> Result<(u32, Inode)> {
		let inodes_per_group = self.superblock.num_inodes_per_group;
		let first_inode = self.superblock.first_inode;
		let is_directory = mode & 0xF000 == inode::TYPE_DIRECTORY;

		for group in 0..self.bgdt.entries.len() as u32 {
			if self.bgdt.entries[group as usize].num_free_inodes == 0 {
				continue;
			}
			let inode_bitmap_offset = self.bgdt.entries[group as usize].inode_bitmap as u64 * self.superblock.block_size as u64;
			let start = if group == 0 { first_inode - 1 } else { 0 };
			let Some(local_index) =
				bitmap::find_first_zero_from(self.device.as_mut(), inode_bitmap_offset, inodes_per_group, start)?
			else {
				continue;
			};
			bitmap::set_bit(self.device.as_mut(), inode_bitmap_offset, local_index, true)?;

			{
				let entry = &mut self.bgdt.entries[group as usize];
				entry.num_free_inodes -= 1;
				if is_directory {
					entry.num_directories += 1;
				}
			}
			self.bgdt.write_entry(self.device.as_mut(), group)?;

			self.superblock.num_free_inodes -= 1;
			self.superblock.write_back(self.device.as_mut())?;

			let inode_num = group * inodes_per_group + local_index + 1;
			let mut new_inode = Inode::new_empty(mode);
			let now = get_timestamp().as_secs() as u32;
			new_inode.atime = now;
			new_inode.ctime = now;
			new_inode.mtime = now;
			new_inode.set_merged_uid(self.superblock.creator_os, uid);
			new_inode.set_merged_gid(self.superblock.creator_os, gid);
			self.write_inode(inode_num, &new_inode)?;
			return Ok((inode_num, new_inode));
		}
		Err(Error::Filesystem("no free inodes".into()))
	}

	/// Allocates a fresh block, same write-through ordering as [`Self::allocate_inode`].
	pub fn allocate_block(&mut self, zero_fill: bool) -> Result<u32> {
		let blocks_per_group = self.superblock.num_blocks_per_group;
		let first_data_block = self.superblock.first_data_block;

		for group in 0..self.bgdt.entries.len() as u32 {
			if self.bgdt.entries[group as usize].num_free_blocks == 0 {
				continue;
			}
			let block_bitmap_offset = self.bgdt.entries[group as usize].block_bitmap as u64 * self.superblock.block_size as u64;
			let Some(local_index) = bitmap::find_first_zero(self.device.as_mut(), block_bitmap_offset, blocks_per_group)?
			else {
				continue;
			};
			bitmap::set_bit(self.device.as_mut(), block_bitmap_offset, local_index, true)?;

			let block_id = first_data_block + group * blocks_per_group + local_index;
			if zero_fill {
				let zeros = vec![0u8; self.superblock.block_size as usize];
				self.write_block_raw(block_id, &zeros)?;
			}

			{
				let entry = &mut self.bgdt.entries[group as usize];
				entry.num_free_blocks -= 1;
			}
			self.bgdt.write_entry(self.device.as_mut(), group)?;

			self.superblock.num_free_blocks -= 1;
			self.superblock.write_back(self.device.as_mut())?;

			return Ok(block_id);
		}
		Err(Error::Filesystem("no free blocks".into()))
	}

	/// Reads every entry (live and free) across all of `dir_inode`'s data blocks, in on-disk
	/// order.
	pub(crate) fn read_directory_entries(&mut self, dir_inode: &Inode) -> Result<Vec<Entry>> {
		let block_size = self.superblock.block_size;
		let num_blocks = (dir_inode.size).div_ceil(block_size as u64);
		let mut all = Vec::new();
		for logical in 0..num_blocks {
			let Some(block_id) = self.lookup_block_id(dir_inode, logical)? else {
				continue;
			};
			let bytes = self.read_block_raw(block_id)?;
			all.extend(dirent::read_block_entries(&bytes)?);
		}
		Ok(all)
	}

	/// Appends `(name, inode_num)` to a directory: reuses slack in an existing block if any block
	/// has room, otherwise grows the directory by one block. Checks every existing block for a
	/// duplicate name before looking for room, so a name colliding in a later block is never
	/// masked by slack found in an earlier one.
	pub(crate) fn append_dir_entry(
		&mut self,
		dir_inode_num: u32,
		dir_inode: &mut Inode,
		name: &[u8],
		inode_num: u32,
		file_type: u8,
	) -> Result<()> {
		if name.is_empty() || name.len() > 255 {
			return Err(Error::Filesystem("directory entry name must be 1-255 bytes".into()));
		}
		let block_size = self.superblock.block_size;
		let num_blocks = (dir_inode.size).div_ceil(block_size as u64);

		let mut blocks = Vec::with_capacity(num_blocks as usize);
		for logical in 0..num_blocks {
			let Some(block_id) = self.lookup_block_id(dir_inode, logical)? else {
				continue;
			};
			let bytes = self.read_block_raw(block_id)?;
			let entries = dirent::read_block_entries(&bytes)?;
			if dirent::find_in_block(&entries, name).is_some() {
				return Err(Error::FileAlreadyExists);
			}
			blocks.push((block_id, entries));
		}

		for (block_id, entries) in &blocks {
			if let Some(updated) = dirent::try_insert(entries, inode_num, file_type, name) {
				let new_bytes = dirent::write_block_entries(&updated, block_size);
				self.write_block_raw(*block_id, &new_bytes)?;
				return Ok(());
			}
		}

		let block_id = self.allocate_block(true)?;
		let logical = self.assign_next_block_id(dir_inode_num, dir_inode, block_id)?;
		debug_assert_eq!(logical, num_blocks);
		dir_inode.size += block_size as u64;
		self.write_inode(dir_inode_num, dir_inode)?;

		let entries = dirent::empty_block(block_size);
		let updated = dirent::try_insert(&entries, inode_num, file_type, name)
			.expect("a freshly allocated empty block always has room for one entry");
		let new_bytes = dirent::write_block_entries(&updated, block_size);
		self.write_block_raw(block_id, &new_bytes)
	}

	/// Allocates and assigns a directory's first data block, and sets its `size` to one block —
	/// shared by [`Self::make_directory`] and by [`crate::format`]'s root-directory setup.
	pub(crate) fn allocate_directory_block(&mut self, inode_num: u32, inode: &mut Inode) -> Result<u32> {
		let block_size = self.superblock.block_size;
		let block_id = self.allocate_block(true)?;
		self.assign_next_block_id(inode_num, inode, block_id)?;
		inode.size = block_size as u64;
		self.write_inode(inode_num, inode)?;
		Ok(block_id)
	}

	/// Writes `.` and `..` into a directory's already-allocated first block, and bumps link
	/// counts on both the new directory (for `.`) and its parent (for `..`) — including the
	/// root's own self-referential case, where `inode_num == parent_inode_num`.
	pub(crate) fn write_directory_dots(
		&mut self,
		block_id: u32,
		inode_num: u32,
		inode: &mut Inode,
		parent_inode_num: u32,
	) -> Result<()> {
		let block_size = self.superblock.block_size;
		let entries = vec![
			Entry {
				inode: inode_num,
				file_type: FT_DIRECTORY,
				name: b".".to_vec(),
				rec_len: 12,
			},
			Entry {
				inode: parent_inode_num,
				file_type: FT_DIRECTORY,
				name: b"..".to_vec(),
				rec_len: (block_size - 12) as u16,
			},
		];
		let bytes = dirent::write_block_entries(&entries, block_size);
		self.write_block_raw(block_id, &bytes)?;

		inode.links_count += 1;
		if parent_inode_num == inode_num {
			inode.links_count += 1;
		}
		self.write_inode(inode_num, inode)?;

		if parent_inode_num != inode_num {
			let mut parent_inode = self.read_inode(parent_inode_num)?;
			parent_inode.links_count += 1;
			self.write_inode(parent_inode_num, &parent_inode)?;
		}
		Ok(())
	}

	/// Creates a new child directory named `name` under `parent_inode_num`/`parent_inode`:
	/// allocates its inode and first block, links it into the parent, then writes `.`/`..` and
	/// bumps both directories' link counts.
	pub(crate) fn make_directory(
		&mut self,
		parent_inode_num: u32,
		parent_inode: &mut Inode,
		name: &str,
		uid: u32,
		gid: u32,
	) -> Result<(u32, Inode)> {
		let (new_inode_num, mut new_inode) = self.allocate_inode(NEW_DIRECTORY_MODE, uid, gid)?;
		let block_id = self.allocate_directory_block(new_inode_num, &mut new_inode)?;
		self.append_dir_entry(parent_inode_num, parent_inode, name.as_bytes(), new_inode_num, FT_DIRECTORY)?;
		self.write_directory_dots(block_id, new_inode_num, &mut new_inode, parent_inode_num)?;
		Ok((new_inode_num, new_inode))
	}
}

#[cfg(test)]
pub(crate) mod test_support {
	use super::*;
	use crate::device::test_support::MemDevice;

	/// Builds a minimal but fully self-consistent rev-1 image in memory: one block group, a root
	/// directory inode already containing `.`/`..`, and everything else free — used across
	/// `fs.rs`/`file.rs`/`scan.rs` unit tests so each doesn't have to hand-roll its own fixture.
	pub(crate) fn format_in_memory(block_size: u32, num_blocks: u32, inodes_per_group: u32) -> Filesystem {
		let device = Box::new(MemDevice::zeroed((block_size as u64 * num_blocks as u64) as usize));
		crate::format::create_on_device(device, num_blocks, block_size, num_blocks, inodes_per_group)
			.expect("in-memory fixture image must format cleanly")
	}
}

#[cfg(test)]
mod test {
	use super::test_support::format_in_memory;
	use super::*;
	use crate::inode::TYPE_REGULAR;

	#[test]
	fn allocate_block_flips_bit_and_decrements_both_counters() {
		let mut fs = format_in_memory(1024, 512, 32);
		let group_free_before = fs.bgdt().entries[0].num_free_blocks;
		let sb_free_before = fs.superblock().num_free_blocks;

		let block_id = fs.allocate_block(false).unwrap();
		let (group, local) = fs.block_location(block_id);
		assert!(fs.is_block_used(block_id).unwrap());

		assert_eq!(fs.bgdt().entries[group as usize].num_free_blocks, group_free_before - 1);
		assert_eq!(fs.superblock().num_free_blocks, sb_free_before - 1);
		let _ = local;
	}

	#[test]
	fn allocate_inode_decrements_counters_and_tracks_directory_count_only_for_directories() {
		let mut fs = format_in_memory(1024, 512, 32);
		let dirs_before = fs.bgdt().entries[0].num_directories;
		let inodes_free_before = fs.superblock().num_free_inodes;

		let (regular_num, _) = fs.allocate_inode(TYPE_REGULAR | 0o644, 0, 0).unwrap();
		assert!(fs.is_inode_used(regular_num).unwrap());
		assert_eq!(fs.superblock().num_free_inodes, inodes_free_before - 1);
		assert_eq!(fs.bgdt().entries[0].num_directories, dirs_before);

		let (_, dir_inode) = fs.allocate_inode(NEW_DIRECTORY_MODE, 0, 0).unwrap();
		assert!(dir_inode.is_directory());
		assert_eq!(fs.bgdt().entries[0].num_directories, dirs_before + 1);
	}

	#[test]
	fn append_dir_entry_rejects_duplicate_name() {
		let mut fs = format_in_memory(1024, 512, 32);
		let root = fs.root_directory().unwrap();
		root.make_directory(&mut fs, "dup", None, None).unwrap();
		let err = root.make_directory(&mut fs, "dup", None, None).unwrap_err();
		assert!(matches!(err, Error::FileAlreadyExists));
	}
}
