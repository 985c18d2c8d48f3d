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

//! A from-scratch ext2 filesystem engine: mount a disk image, walk and mutate its directory
//! tree, and format new images — all directly against a [`device::Device`], with no dependency
//! on the host kernel's own filesystem drivers.

pub mod bgdt;
pub mod bitmap;
pub mod device;
pub mod dirent;
pub mod error;
pub mod file;
pub mod format;
pub mod fs;
pub mod inode;
mod path;
pub mod scan;
pub mod superblock;

pub use error::{Error, Result};
pub use file::{Directory, File, OtherFile, RegularFile, Symlink};
pub use fs::Filesystem;
pub use superblock::Superblock;
