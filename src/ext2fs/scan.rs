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

//! Space accounting and integrity scans. Both walk every group descriptor and the whole reachable
//! directory tree, so they live alongside the facade rather than duplicating its traversal logic.

use crate::bgdt::{Bgdt, COMPARABLE_FIELDS as BGDT_COMPARABLE_FIELDS};
use crate::bitmap;
use crate::error::Result;
use crate::file::File;
use crate::fs::Filesystem;
use crate::superblock::{self, Superblock, COMPARABLE_FIELDS};
use std::collections::{HashMap, HashSet};

/// Free-space snapshot for a single block group.
#[derive(Debug, Clone, Default)]
pub struct GroupSpace {
	pub group_id: u32,
	pub num_free_blocks: u32,
	pub num_free_inodes: u32,
}

/// Space accounting over the whole image, built from a single BFS over the reachable directory
/// tree plus a pass over the BGDT's per-group counters.
#[derive(Debug, Clone, Default)]
pub struct SpaceReport {
	pub num_regular_files: u64,
	/// Starts at 1 to account for the root directory itself.
	pub num_directories: u64,
	pub num_symlinks: u64,
	pub groups: Vec<GroupSpace>,
	/// Sum of `size` over every reachable regular file and symlink.
	pub bytes_used_by_files: u64,
	/// `total_space - bytes_used_by_files` — a coarse slack measure that does not subtract
	/// metadata overhead (superblock, BGDT, bitmaps, inode table, indirect blocks).
	pub bytes_unused_by_files: u64,
}

/// Diagnostic report from [`Filesystem::check_integrity`]. Never aborts on a per-entry anomaly;
/// every finding is recorded as a message instead.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
	pub has_magic_number: bool,
	pub messages: Vec<String>,
}

/// Absolute byte offset of the backup superblock copy in `group_id` — the first block of the
/// group, consistent with [`crate::bgdt::Bgdt::offset_for_group`]'s own group-start arithmetic.
pub(crate) fn backup_superblock_offset(sb: &Superblock, group_id: u32) -> u64 {
	(group_id as u64 * sb.num_blocks_per_group as u64 + sb.first_data_block as u64) * sb.block_size as u64
}

impl Filesystem {
	/// Counts regular files, directories, and symlinks reachable from the root, plus per-group
	/// free-space counters already cached in the BGDT.
	pub fn scan_block_groups(&mut self) -> Result<SpaceReport> {
		let groups = self
			.bgdt()
			.entries
			.iter()
			.enumerate()
			.map(|(i, e)| GroupSpace {
				group_id: i as u32,
				num_free_blocks: e.num_free_blocks as u32,
				num_free_inodes: e.num_free_inodes as u32,
			})
			.collect();

		let mut report = SpaceReport {
			num_directories: 1,
			groups,
			..Default::default()
		};

		let root = self.root_directory()?;
		let mut visited = HashSet::new();
		visited.insert(root.inode_number());
		let mut stack = vec![root];
		while let Some(dir) = stack.pop() {
			for file in dir.files(self)? {
				if file.name() == "." || file.name() == ".." {
					continue;
				}
				match file {
					File::Regular(f) => {
						report.num_regular_files += 1;
						report.bytes_used_by_files += f.size();
					}
					File::Symlink(f) => {
						report.num_symlinks += 1;
						report.bytes_used_by_files += f.size();
					}
					File::Directory(d) => {
						if visited.insert(d.inode_number()) {
							report.num_directories += 1;
							stack.push(d);
						}
					}
					File::Other(_) => {}
				}
			}
		}
		report.bytes_unused_by_files = self.total_space().saturating_sub(report.bytes_used_by_files);
		Ok(report)
	}

	/// Checks the image's internal consistency: magic number, backup superblock and BGDT
	/// agreement, and a BFS cross-checking every reachable file's blocks against the block
	/// bitmap. Never fails on a per-entry anomaly — every finding becomes one message.
	pub fn check_integrity(&mut self) -> Result<IntegrityReport> {
		let primary = self.superblock().clone();
		let has_magic_number = primary.magic_number == superblock::EXT2_MAGIC;
		let mut messages = Vec::new();

		// A 1024-byte block size shifts the first data block by one, which backup superblocks in
		// sparse-super groups are allowed to disagree on without it being real corruption.
		let sparse_benign = primary.has_sparse_super() && primary.block_size == 1024;
		for &group in &primary.copy_locations {
			if group == 0 {
				continue;
			}
			let offset = backup_superblock_offset(&primary, group);
			match Superblock::read(self.device_mut(), offset) {
				Ok(backup) => {
					for (name, accessor) in COMPARABLE_FIELDS {
						if *name == "first_data_block" && sparse_benign {
							continue;
						}
						let expected = accessor(&primary);
						let actual = accessor(&backup);
						if expected != actual {
							messages.push(format!(
								"backup superblock in group {group}: field `{name}` is {actual}, expected {expected}"
							));
						}
					}
				}
				Err(e) => messages.push(format!("backup superblock in group {group} is unreadable: {e}")),
			}

			match Bgdt::read(self.device_mut(), &primary, group) {
				Ok(backup_bgdt) => {
					let primary_bgdt = self.bgdt().clone();
					for (group_id, (primary_entry, backup_entry)) in
						primary_bgdt.entries.iter().zip(backup_bgdt.entries.iter()).enumerate()
					{
						for (name, accessor) in BGDT_COMPARABLE_FIELDS {
							let expected = accessor(primary_entry);
							let actual = accessor(backup_entry);
							if expected != actual {
								messages.push(format!(
									"backup BGDT in group {group} (descriptor for group {group_id}): field `{name}` is {actual}, expected {expected}"
								));
							}
						}
					}
				}
				Err(e) => messages.push(format!("backup BGDT in group {group} is unreadable: {e}")),
			}
		}

		let mut visited_inodes = HashSet::new();
		let mut block_owners: HashMap<u32, Vec<String>> = HashMap::new();

		let root = self.root_directory()?;
		visited_inodes.insert(root.inode_number());
		{
			let root_inode = self.read_inode(root.inode_number())?;
			for b in self.referenced_blocks(&root_inode)? {
				block_owners.entry(b).or_default().push(root.absolute_path().to_string());
			}
		}
		let mut stack = vec![root];
		while let Some(dir) = stack.pop() {
			for file in dir.files(self)? {
				if file.name() == "." || file.name() == ".." {
					continue;
				}
				if !self.is_inode_used(file.inode_number())? {
					messages.push(format!(
						"entry `{}` in `{}` references inode {} which is not marked as used",
						file.name(),
						dir.absolute_path(),
						file.inode_number()
					));
					continue;
				}
				let first_visit = visited_inodes.insert(file.inode_number());
				if !first_visit {
					continue;
				}
				let inode = self.read_inode(file.inode_number())?;
				for b in self.referenced_blocks(&inode)? {
					block_owners.entry(b).or_default().push(file.absolute_path().to_string());
				}
				if let File::Directory(d) = file {
					stack.push(d);
				}
			}
		}

		for (&block_id, owners) in &block_owners {
			if owners.len() > 1 {
				messages.push(format!(
					"block {block_id} is referenced by more than one file: {}",
					owners.join(", ")
				));
			}
			if !self.is_block_used(block_id)? {
				messages.push(format!(
					"file `{}` is referencing a block that is not marked as used (block {block_id})",
					owners[0]
				));
			}
		}

		let inodes_per_group = primary.num_inodes_per_group;
		for group in 0..primary.num_groups {
			let bitmap_offset = self.bgdt().entries[group as usize].inode_bitmap as u64 * primary.block_size as u64;
			let used = bitmap::scan_used(self.device_mut(), bitmap_offset, inodes_per_group)?;
			for local in used {
				let inode_num = group * inodes_per_group + local + 1;
				if inode_num < primary.first_inode && inode_num != superblock::ROOT_INODE {
					continue;
				}
				if !visited_inodes.contains(&inode_num) {
					messages.push(format!(
						"inode {inode_num} is marked as used but is not reachable from the root directory"
					));
				}
			}
		}

		Ok(IntegrityReport { has_magic_number, messages })
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::bitmap as bitmap_mod;
	use crate::fs::test_support::format_in_memory;

	#[test]
	fn space_report_counts_fresh_image() {
		let mut fs = format_in_memory(1024, 512, 32);
		let report = fs.scan_block_groups().unwrap();
		assert_eq!(report.num_directories, 2); // root + lost+found
		assert_eq!(report.num_regular_files, 0);
		assert_eq!(report.num_symlinks, 0);
	}

	#[test]
	fn clean_image_has_no_integrity_messages() {
		let mut fs = format_in_memory(1024, 512, 32);
		let report = fs.check_integrity().unwrap();
		assert!(report.has_magic_number);
		assert!(report.messages.is_empty(), "unexpected messages: {:?}", report.messages);
	}

	#[test]
	fn corrupted_block_bitmap_is_flagged_as_wild_block() {
		let mut fs = format_in_memory(1024, 512, 32);
		let root_inode = fs.read_inode(superblock::ROOT_INODE).unwrap();
		let root_block = fs.lookup_block_id(&root_inode, 0).unwrap().unwrap();

		let block_bitmap_offset = fs.bgdt().entries[0].block_bitmap as u64 * fs.block_size() as u64;
		let local_index = root_block - fs.superblock().first_data_block;
		bitmap_mod::set_bit(fs.device_mut(), block_bitmap_offset, local_index, false).unwrap();

		let report = fs.check_integrity().unwrap();
		assert!(
			report
				.messages
				.iter()
				.any(|m| m.contains("referencing a block that is not marked as used")),
			"messages: {:?}",
			report.messages
		);
	}

	#[test]
	fn corrupted_backup_bgdt_is_flagged() {
		let mut fs = format_in_memory(1024, 512, 32);
		let primary = fs.superblock().clone();
		let backup_group = primary.copy_locations.iter().find(|&&g| g > 0).copied().unwrap();
		let bgdt_offset = crate::bgdt::Bgdt::offset_for_group(&primary, backup_group);
		let mut backup_bgdt = crate::bgdt::Bgdt::read(fs.device_mut(), &primary, backup_group).unwrap();
		backup_bgdt.entries[0].num_free_blocks = 0;
		backup_bgdt.write_to(fs.device_mut(), bgdt_offset).unwrap();

		let report = fs.check_integrity().unwrap();
		assert!(
			report.messages.iter().any(|m| m.contains("backup BGDT") && m.contains("free_blocks_count")),
			"messages: {:?}",
			report.messages
		);
	}

	#[test]
	fn inode_allocated_but_never_linked_is_flagged_unreachable() {
		let mut fs = format_in_memory(1024, 512, 32);
		fs.allocate_inode(crate::inode::TYPE_REGULAR | 0o644, 0, 0).unwrap();

		let report = fs.check_integrity().unwrap();
		assert!(
			report.messages.iter().any(|m| m.contains("is not reachable from the root directory")),
			"messages: {:?}",
			report.messages
		);
	}
}
