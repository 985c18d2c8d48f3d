//! This module implements utility functions shared by the ext2 engine and the CLI.

use std::fmt;
use std::mem::size_of;
use std::slice;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Returns the current timestamp since the Unix epoch.
pub fn get_timestamp() -> Duration {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System clock panic!")
}

/// Performs the log2 operation on the given integer.
///
/// If the result is undefined, the function returns `None`.
pub fn log2(n: u64) -> Option<u64> {
	let num_bits = (size_of::<u64>() * 8) as u64;
	let n = num_bits - n.leading_zeros() as u64;
	if n > 0 {
		Some(n - 1)
	} else {
		None
	}
}

/// Returns `2^n`.
pub fn pow2(n: u32) -> u64 {
	1u64 << n
}

/// Divides `n` by `d`, rounding the result towards positive infinity.
pub fn ceil_division(n: u32, d: u32) -> u32 {
	n.div_ceil(d)
}

/// Reinterprets the given value as a byte slice.
///
/// The value must not contain padding read as uninitialized memory; callers pass
/// `#[repr(C, packed)]` structures only.
pub fn reinterpret<T>(val: &T) -> &[u8] {
	unsafe { slice::from_raw_parts(val as *const T as *const u8, size_of::<T>()) }
}

/// Reinterprets the given value as a mutable byte slice. See [`reinterpret`].
pub fn reinterpret_mut<T>(val: &mut T) -> &mut [u8] {
	unsafe { slice::from_raw_parts_mut(val as *mut T as *mut u8, size_of::<T>()) }
}

/// Structure representing a number of bytes, for human-readable display.
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut order = log2(self.0).unwrap_or(0) / log2(1024).unwrap();
		let suffix = match order {
			0 => "bytes",
			1 => "KiB",
			2 => "MiB",
			3 => "GiB",
			4 => "TiB",
			5 => "PiB",
			6 => "EiB",
			7 => "ZiB",
			8 => "YiB",
			_ => {
				order = 0;
				"bytes"
			}
		};
		let unit = 1024usize.pow(order as u32);
		let nbr = self.0 / unit as u64;
		write!(fmt, "{} {}", nbr, suffix)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn bytesize() {
		assert_eq!(format!("{}", ByteSize(0)).as_str(), "0 bytes");
		assert_eq!(format!("{}", ByteSize(1)).as_str(), "1 bytes");
		assert_eq!(format!("{}", ByteSize(1023)).as_str(), "1023 bytes");
		assert_eq!(format!("{}", ByteSize(1024)).as_str(), "1 KiB");
		assert_eq!(format!("{}", ByteSize(1024 * 1024)).as_str(), "1 MiB");
		assert_eq!(
			format!("{}", ByteSize(1024 * 1024 * 1024)).as_str(),
			"1 GiB"
		);
	}

	#[test]
	fn log2_values() {
		assert_eq!(log2(1), Some(0));
		assert_eq!(log2(1024), Some(10));
		assert_eq!(log2(4096), Some(12));
	}

	#[test]
	fn ceil_division_values() {
		assert_eq!(ceil_division(8, 8), 1);
		assert_eq!(ceil_division(9, 8), 2);
		assert_eq!(ceil_division(0, 8), 0);
	}
}
