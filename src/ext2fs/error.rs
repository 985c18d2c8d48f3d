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

//! Error type shared by every layer of the ext2 engine.

use std::error;
use std::fmt;
use std::io;

/// An error produced while mounting, reading, or mutating an ext2 image.
#[derive(Debug)]
pub enum Error {
	/// The image's on-disk layout does not describe a valid, supported ext2 filesystem.
	InvalidImageFormat,
	/// No file exists at the given path.
	FileNotFound,
	/// A file or directory with that name already exists.
	FileAlreadyExists,
	/// The requested operation is not implemented.
	UnsupportedOperation,
	/// The filesystem has already been unmounted.
	NotMounted,
	/// A read returned fewer bytes than requested.
	Truncated,
	/// Catch-all for invariant violations, with a human-readable reason.
	Filesystem(String),
	/// Passthrough I/O failure from the underlying device.
	Io(io::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::InvalidImageFormat => write!(fmt, "invalid or unsupported ext2 image"),
			Self::FileNotFound => write!(fmt, "file not found"),
			Self::FileAlreadyExists => write!(fmt, "file already exists"),
			Self::UnsupportedOperation => write!(fmt, "operation not supported"),
			Self::NotMounted => write!(fmt, "filesystem is not mounted"),
			Self::Truncated => write!(fmt, "device read was truncated"),
			Self::Filesystem(msg) => write!(fmt, "{msg}"),
			Self::Io(e) => write!(fmt, "{e}"),
		}
	}
}

impl error::Error for Error {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		match e.kind() {
			io::ErrorKind::UnexpectedEof => Self::Truncated,
			_ => Self::Io(e),
		}
	}
}

/// Shorthand result type for the ext2 engine.
pub type Result<T> = std::result::Result<T, Error>;
