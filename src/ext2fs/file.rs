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

//! File objects: a tagged enum chosen by an inode's file-type bits. None of these hold a reference
//! to the [`Filesystem`] they came from — every operation that touches the device takes an
//! explicit `&mut Filesystem` handle instead.

use crate::dirent;
use crate::error::{Error, Result};
use crate::fs::Filesystem;
use crate::inode::{Inode, TYPE_DIRECTORY, TYPE_REGULAR, TYPE_SYMLINK};
use crate::path;

/// Fields common to every file object, snapshotted at the moment it was built. `File::eq`
/// compares on this snapshot (inode number, kind, metadata) rather than on any borrow or pointer
/// identity — two lookups of the same inode yield equal values even though they're distinct
/// allocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
	pub(crate) inode_number: u32,
	pub(crate) name: String,
	pub(crate) absolute_path: String,
	pub(crate) mode: u16,
	pub(crate) uid: u32,
	pub(crate) gid: u32,
	pub(crate) size: u64,
	pub(crate) atime: u32,
	pub(crate) ctime: u32,
	pub(crate) mtime: u32,
	pub(crate) links_count: u16,
}

impl FileInfo {
	pub fn inode_number(&self) -> u32 {
		self.inode_number
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn absolute_path(&self) -> &str {
		&self.absolute_path
	}

	pub fn mode(&self) -> u16 {
		self.mode
	}

	/// Renders the conventional `ls`-style ten-character string: a leading type character from
	/// `{-,d,l,c,b,p,s}` followed by `rwxrwxrwx` with setuid/setgid/sticky folded in.
	pub fn mode_str(&self) -> String {
		let type_char = match self.mode & 0xF000 {
			TYPE_DIRECTORY => 'd',
			TYPE_SYMLINK => 'l',
			crate::inode::TYPE_CHAR_DEVICE => 'c',
			crate::inode::TYPE_BLOCK_DEVICE => 'b',
			crate::inode::TYPE_FIFO => 'p',
			crate::inode::TYPE_SOCKET => 's',
			_ => '-',
		};
		let perm = self.mode & 0x0FFF;
		let bit = |mask: u16, c: char| if perm & mask != 0 { c } else { '-' };
		let mut s = String::with_capacity(10);
		s.push(type_char);
		s.push(bit(0o400, 'r'));
		s.push(bit(0o200, 'w'));
		s.push(if perm & 0o4000 != 0 {
			if perm & 0o100 != 0 { 's' } else { 'S' }
		} else {
			bit(0o100, 'x')
		});
		s.push(bit(0o040, 'r'));
		s.push(bit(0o020, 'w'));
		s.push(if perm & 0o2000 != 0 {
			if perm & 0o010 != 0 { 's' } else { 'S' }
		} else {
			bit(0o010, 'x')
		});
		s.push(bit(0o004, 'r'));
		s.push(bit(0o002, 'w'));
		s.push(if perm & 0o1000 != 0 {
			if perm & 0o001 != 0 { 't' } else { 'T' }
		} else {
			bit(0o001, 'x')
		});
		s
	}

	pub fn uid(&self) -> u32 {
		self.uid
	}

	pub fn gid(&self) -> u32 {
		self.gid
	}

	pub fn size(&self) -> u64 {
		self.size
	}

	pub fn num_links(&self) -> u16 {
		self.links_count
	}

	pub fn time_modified(&self) -> u32 {
		self.mtime
	}

	pub fn time_accessed(&self) -> u32 {
		self.atime
	}

	pub fn time_created(&self) -> u32 {
		self.ctime
	}

	pub fn is_dir(&self) -> bool {
		self.mode & 0xF000 == TYPE_DIRECTORY
	}

	pub fn is_regular(&self) -> bool {
		self.mode & 0xF000 == TYPE_REGULAR
	}

	pub fn is_symlink(&self) -> bool {
		self.mode & 0xF000 == TYPE_SYMLINK
	}
}

/// A regular file: streams its contents one logical block at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularFile {
	pub(crate) info: FileInfo,
}

/// A directory: lists and creates children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
	pub(crate) info: FileInfo,
}

/// A symbolic link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symlink {
	pub(crate) info: FileInfo,
}

/// Anything else: char/block device, FIFO, or socket. Exists so a directory walk never has to
/// fail just because it contains a device node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherFile {
	pub(crate) info: FileInfo,
}

/// A file object, tagged by the high nibble of its inode's `mode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum File {
	Regular(RegularFile),
	Directory(Directory),
	Symlink(Symlink),
	Other(OtherFile),
}

macro_rules! common_accessors {
	($name:ident) => {
		impl $name {
			pub fn inode_number(&self) -> u32 {
				self.info.inode_number()
			}
			pub fn name(&self) -> &str {
				self.info.name()
			}
			pub fn absolute_path(&self) -> &str {
				self.info.absolute_path()
			}
			pub fn mode(&self) -> u16 {
				self.info.mode()
			}
			pub fn mode_str(&self) -> String {
				self.info.mode_str()
			}
			pub fn uid(&self) -> u32 {
				self.info.uid()
			}
			pub fn gid(&self) -> u32 {
				self.info.gid()
			}
			pub fn size(&self) -> u64 {
				self.info.size()
			}
			pub fn num_links(&self) -> u16 {
				self.info.num_links()
			}
			pub fn time_modified(&self) -> u32 {
				self.info.time_modified()
			}
			pub fn time_accessed(&self) -> u32 {
				self.info.time_accessed()
			}
			pub fn time_created(&self) -> u32 {
				self.info.time_created()
			}
			pub fn is_dir(&self) -> bool {
				self.info.is_dir()
			}
			pub fn is_regular(&self) -> bool {
				self.info.is_regular()
			}
			pub fn is_symlink(&self) -> bool {
				self.info.is_symlink()
			}
		}
	};
}

common_accessors!(RegularFile);
common_accessors!(Directory);
common_accessors!(Symlink);
common_accessors!(OtherFile);

impl File {
	pub fn inode_number(&self) -> u32 {
		self.info().inode_number()
	}

	pub fn name(&self) -> &str {
		self.info().name()
	}

	pub fn absolute_path(&self) -> &str {
		self.info().absolute_path()
	}

	pub fn mode(&self) -> u16 {
		self.info().mode()
	}

	pub fn mode_str(&self) -> String {
		self.info().mode_str()
	}

	pub fn uid(&self) -> u32 {
		self.info().uid()
	}

	pub fn gid(&self) -> u32 {
		self.info().gid()
	}

	pub fn size(&self) -> u64 {
		self.info().size()
	}

	pub fn num_links(&self) -> u16 {
		self.info().num_links()
	}

	pub fn time_modified(&self) -> u32 {
		self.info().time_modified()
	}

	pub fn time_accessed(&self) -> u32 {
		self.info().time_accessed()
	}

	pub fn time_created(&self) -> u32 {
		self.info().time_created()
	}

	pub fn is_dir(&self) -> bool {
		self.info().is_dir()
	}

	pub fn is_regular(&self) -> bool {
		self.info().is_regular()
	}

	pub fn is_symlink(&self) -> bool {
		self.info().is_symlink()
	}

	fn info(&self) -> &FileInfo {
		match self {
			Self::Regular(f) => &f.info,
			Self::Directory(f) => &f.info,
			Self::Symlink(f) => &f.info,
			Self::Other(f) => &f.info,
		}
	}

	/// Downcasts to a directory, if that's what this is — used by path resolution, which needs
	/// to keep walking through intermediate components.
	pub fn as_directory(&self) -> Option<&Directory> {
		match self {
			Self::Directory(d) => Some(d),
			_ => None,
		}
	}

	pub fn into_directory(self) -> Option<Directory> {
		match self {
			Self::Directory(d) => Some(d),
			_ => None,
		}
	}
}

/// Builds the right `File` variant for `inode_num`, reading it fresh from `fs`.
pub(crate) fn build_file(fs: &mut Filesystem, inode_num: u32, name: String, absolute_path: String) -> Result<File> {
	let inode = fs.read_inode(inode_num)?;
	let creator_os = fs.creator_os();
	let info = FileInfo {
		inode_number: inode_num,
		name,
		absolute_path,
		mode: inode.mode,
		uid: inode.merged_uid(creator_os),
		gid: inode.merged_gid(creator_os),
		size: inode.size,
		atime: inode.atime,
		ctime: inode.ctime,
		mtime: inode.mtime,
		links_count: inode.links_count,
	};
	Ok(match inode.file_type_bits() {
		TYPE_DIRECTORY => File::Directory(Directory { info }),
		TYPE_REGULAR => File::Regular(RegularFile { info }),
		TYPE_SYMLINK => File::Symlink(Symlink { info }),
		_ => File::Other(OtherFile { info }),
	})
}

/// As [`build_file`], but fails unless the built object is a directory — used for the root and
/// for resolving `make_directory`'s newly created child.
pub(crate) fn build_directory(fs: &mut Filesystem, inode_num: u32, name: String, absolute_path: String) -> Result<Directory> {
	match build_file(fs, inode_num, name, absolute_path)? {
		File::Directory(d) => Ok(d),
		_ => Err(Error::Filesystem(format!("inode {inode_num} is not a directory"))),
	}
}

/// Joins a directory's absolute path with a child name, avoiding a double slash at the root.
fn join_path(parent: &str, name: &[u8]) -> String {
	let name = String::from_utf8_lossy(name);
	if parent == "/" {
		format!("/{name}")
	} else {
		format!("{parent}/{name}")
	}
}

impl Directory {
	/// Every live entry in this directory (including `.` and `..`), in on-disk order.
	pub fn files(&self, fs: &mut Filesystem) -> Result<Vec<File>> {
		let inode = fs.read_inode(self.inode_number())?;
		let entries = fs.read_directory_entries(&inode)?;
		entries
			.into_iter()
			.filter(|e| !e.is_free())
			.map(|e| {
				let path = join_path(self.absolute_path(), &e.name);
				build_file(fs, e.inode, String::from_utf8_lossy(&e.name).into_owned(), path)
			})
			.collect()
	}

	/// Resolves `relative_path` starting from this directory: walks one component at a time,
	/// failing with `FileNotFound` on a missing component or on a path whose final component
	/// doesn't match what was actually found (guards against a caller mistaking a
	/// partially-resolved path for success).
	pub fn get_file_at(&self, fs: &mut Filesystem, relative_path: &str) -> Result<File> {
		let components = path::split(relative_path);
		let Some((last, _)) = components.split_last() else {
			return Err(Error::FileNotFound);
		};

		let mut current = File::Directory(self.clone());
		for component in &components {
			let dir = current.as_directory().ok_or(Error::FileNotFound)?;
			let inode = fs.read_inode(dir.inode_number())?;
			let entries = fs.read_directory_entries(&inode)?;
			let entry = dirent::find_in_block(&entries, component.as_bytes()).ok_or(Error::FileNotFound)?;
			let path = join_path(dir.absolute_path(), entry.name.as_slice());
			current = build_file(fs, entry.inode, component.to_string(), path)?;
		}
		if current.name() != *last {
			return Err(Error::FileNotFound);
		}
		Ok(current)
	}

	/// Creates a new child directory named `name`, owned by `uid`/`gid` (defaulting to `0` when
	/// not given).
	pub fn make_directory(&self, fs: &mut Filesystem, name: &str, uid: Option<u32>, gid: Option<u32>) -> Result<Directory> {
		let mut parent_inode = fs.read_inode(self.inode_number())?;
		let (new_inode_num, _) =
			fs.make_directory(self.inode_number(), &mut parent_inode, name, uid.unwrap_or(0), gid.unwrap_or(0))?;
		let path = join_path(self.absolute_path(), name.as_bytes());
		build_directory(fs, new_inode_num, name.to_string(), path)
	}

	/// Reserved for future use; not implemented.
	pub fn make_regular_file(&self, _fs: &mut Filesystem, _name: &str) -> Result<RegularFile> {
		Err(Error::UnsupportedOperation)
	}

	/// Reserved: not implemented, see [`Self::make_regular_file`].
	pub fn make_link(&self, _fs: &mut Filesystem, _name: &str, _target: &str) -> Result<Symlink> {
		Err(Error::UnsupportedOperation)
	}
}

/// A lazy, finite, non-restartable iterator over a regular file's contents, one logical block per
/// item. Never yields more than `size` bytes in total; the final block is truncated to `size mod
/// block_size` when that remainder is non-zero.
pub struct BlockIter<'a> {
	fs: &'a mut Filesystem,
	inode: Inode,
	next_index: u64,
	remaining: u64,
	block_size: u64,
	progress: Option<Box<dyn FnMut(u64, u64) + 'a>>,
	bytes_done: u64,
}

impl<'a> Iterator for BlockIter<'a> {
	type Item = Result<Vec<u8>>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.remaining == 0 {
			return None;
		}
		let take = self.remaining.min(self.block_size);
		let result = (|| {
			let block_id = self.fs.lookup_block_id(&self.inode, self.next_index)?;
			let bytes = match block_id {
				Some(id) => self.fs.read_block_raw(id)?,
				None => vec![0u8; self.block_size as usize],
			};
			Ok(bytes[..take as usize].to_vec())
		})();
		self.next_index += 1;
		self.remaining -= take;
		self.bytes_done += take;
		if let Some(cb) = self.progress.as_mut() {
			cb(self.bytes_done, self.bytes_done + self.remaining);
		}
		Some(result)
	}
}

impl RegularFile {
	/// As [`Self::blocks_with_progress`], with no progress callback.
	pub fn blocks<'a>(&self, fs: &'a mut Filesystem) -> Result<BlockIter<'a>> {
		self.blocks_with_progress(fs, None)
	}

	/// Streams this file's contents one block at a time, optionally reporting `(bytes_done,
	/// bytes_total)` after each block — intended for a CLI wait indicator. The core itself never
	/// spawns a thread.
	pub fn blocks_with_progress<'a>(
		&self,
		fs: &'a mut Filesystem,
		progress: Option<Box<dyn FnMut(u64, u64) + 'a>>,
	) -> Result<BlockIter<'a>> {
		let inode = fs.read_inode(self.inode_number())?;
		let block_size = fs.block_size() as u64;
		Ok(BlockIter {
			fs,
			remaining: inode.size,
			inode,
			next_index: 0,
			block_size,
			progress,
			bytes_done: 0,
		})
	}
}

impl Symlink {
	/// The link target. Inline (stored directly in the block-pointer bytes) when `size <= 60`;
	/// otherwise read from logical block 0 like a regular file.
	pub fn target(&self, fs: &mut Filesystem) -> Result<String> {
		let inode = fs.read_inode(self.inode_number())?;
		let bytes = if inode.size <= 60 {
			let mut buf = Vec::with_capacity(inode.size as usize);
			for word in &inode.block {
				buf.extend_from_slice(&word.to_le_bytes());
			}
			buf.truncate(inode.size as usize);
			buf
		} else {
			let block_id = fs.lookup_block_id(&inode, 0)?;
			let block = match block_id {
				Some(id) => fs.read_block_raw(id)?,
				None => vec![0u8; fs.block_size() as usize],
			};
			block[..inode.size as usize].to_vec()
		};
		Ok(String::from_utf8_lossy(&bytes).into_owned())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::fs::test_support::format_in_memory;

	#[test]
	fn root_lists_lost_and_found_dot_entries() {
		let mut fs = format_in_memory(1024, 512, 32);
		let root = fs.root_directory().unwrap();
		let files = root.files(&mut fs).unwrap();
		let names: Vec<&str> = files.iter().map(|f| f.name()).collect();
		assert!(names.contains(&"."));
		assert!(names.contains(&".."));
		assert!(names.contains(&"lost+found"));
		assert!(files.iter().all(|f| f.inode_number() > 0));
	}

	#[test]
	fn path_lookup_resolves_lost_and_found() {
		let mut fs = format_in_memory(1024, 512, 32);
		let file = fs.get_file_at("/lost+found").unwrap();
		assert!(file.is_dir());
	}

	#[test]
	fn path_lookup_fails_for_missing_file() {
		let mut fs = format_in_memory(1024, 512, 32);
		assert!(matches!(fs.get_file_at("/nope"), Err(Error::FileNotFound)));
	}

	#[test]
	fn path_resolution_ignores_repeated_slashes() {
		let mut fs = format_in_memory(1024, 512, 32);
		let a = fs.get_file_at("/lost+found").unwrap();
		let b = fs.get_file_at("//lost+found///").unwrap();
		assert_eq!(a.inode_number(), b.inode_number());
	}

	#[test]
	fn regular_file_blocks_yields_one_buffer_per_logical_block_truncating_the_last() {
		let mut fs = format_in_memory(1024, 512, 32);
		let (inode_num, mut inode) = fs.allocate_inode(TYPE_REGULAR | 0o644, 0, 0).unwrap();

		let contents = [[0xAAu8; 1024], [0xBBu8; 1024], [0xCCu8; 1024]];
		for chunk in &contents {
			let block_id = fs.allocate_block(false).unwrap();
			fs.assign_next_block_id(inode_num, &mut inode, block_id).unwrap();
			fs.write_block_raw(block_id, chunk).unwrap();
		}
		inode.size = 2500;
		fs.write_inode(inode_num, &inode).unwrap();

		let file = build_file(&mut fs, inode_num, "f".to_string(), "/f".to_string()).unwrap();
		let File::Regular(regular) = file else { panic!("expected a regular file") };
		let blocks: Vec<Vec<u8>> = regular.blocks(&mut fs).unwrap().collect::<Result<_>>().unwrap();

		let lengths: Vec<usize> = blocks.iter().map(Vec::len).collect();
		assert_eq!(lengths, vec![1024, 1024, 452]);
		assert!(blocks[0].iter().all(|&b| b == 0xAA));
		assert!(blocks[1].iter().all(|&b| b == 0xBB));
		assert!(blocks[2].iter().all(|&b| b == 0xCC));

		let total: usize = lengths.iter().sum();
		assert_eq!(total, 2500);
	}

	#[test]
	fn regular_file_hole_reads_as_zeros() {
		let mut fs = format_in_memory(1024, 512, 32);
		let (inode_num, mut inode) = fs.allocate_inode(TYPE_REGULAR | 0o644, 0, 0).unwrap();
		let block_id = fs.allocate_block(false).unwrap();
		fs.assign_next_block_id(inode_num, &mut inode, block_id).unwrap();
		fs.write_block_raw(block_id, &[0x11u8; 1024]).unwrap();
		// Leave the second logical block unassigned (a hole), but size covers it anyway.
		inode.size = 2048;
		fs.write_inode(inode_num, &inode).unwrap();

		let file = build_file(&mut fs, inode_num, "f".to_string(), "/f".to_string()).unwrap();
		let File::Regular(regular) = file else { panic!("expected a regular file") };
		let blocks: Vec<Vec<u8>> = regular.blocks(&mut fs).unwrap().collect::<Result<_>>().unwrap();
		assert_eq!(blocks.len(), 2);
		assert!(blocks[0].iter().all(|&b| b == 0x11));
		assert!(blocks[1].iter().all(|&b| b == 0));
	}

	#[test]
	fn make_directory_has_dot_and_dotdot_pointing_correctly() {
		let mut fs = format_in_memory(1024, 512, 32);
		let root = fs.root_directory().unwrap();
		let root_inode = root.inode_number();
		let created = root.make_directory(&mut fs, "new", None, None).unwrap();
		let new_inode = created.inode_number();

		let files = created.files(&mut fs).unwrap();
		assert_eq!(files.len(), 2);
		let dot = files.iter().find(|f| f.name() == ".").unwrap();
		let dotdot = files.iter().find(|f| f.name() == "..").unwrap();
		assert_eq!(dot.inode_number(), new_inode);
		assert_eq!(dotdot.inode_number(), root_inode);
	}

	#[test]
	fn mode_str_renders_regular_file_permissions() {
		let info = FileInfo {
			inode_number: 5,
			name: "a".into(),
			absolute_path: "/a".into(),
			mode: TYPE_REGULAR | 0o644,
			uid: 0,
			gid: 0,
			size: 0,
			atime: 0,
			ctime: 0,
			mtime: 0,
			links_count: 1,
		};
		assert_eq!(info.mode_str(), "-rw-r--r--");
	}

	#[test]
	fn mode_str_renders_directory() {
		let info = FileInfo {
			inode_number: 2,
			name: "/".into(),
			absolute_path: "/".into(),
			mode: TYPE_DIRECTORY | 0o755,
			uid: 0,
			gid: 0,
			size: 0,
			atime: 0,
			ctime: 0,
			mtime: 0,
			links_count: 2,
		};
		assert_eq!(info.mode_str(), "drwxr-xr-x");
	}
}
