//! `diskbot`: mount an ext2 image and inspect or mutate it, or format a brand new one.

use ext2fs::device::FileDevice;
use ext2fs::error::Error;
use ext2fs::{Directory, File, Filesystem};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::exit;
use utils::error;
use utils::util::ByteSize;

/// Inodes allotted per block group when `-c` is not given an explicit count.
const DEFAULT_INODES_PER_GROUP: u32 = 1024;

/// Block size, in bytes, used by `-c` when none is given.
const DEFAULT_BLOCK_SIZE: u32 = 1024;

fn print_usage(bin: &str) {
	eprintln!("Usage:");
	eprintln!(" {bin} <image> -s");
	eprintln!(" {bin} <image> -i");
	eprintln!(" {bin} <image> -d [path]");
	eprintln!(" {bin} <image> -c <num-blocks> [block-size] [inodes-per-group]");
	eprintln!(" {bin} <image> -f <src> [dest]");
	eprintln!(" {bin} <image> -p <hostfile> <destpath>");
	eprintln!();
	eprintln!("Options:");
	eprintln!(" -s:\t\tprints a summary of the image (space usage, inode and block group counts)");
	eprintln!(" -i:\t\tchecks the image's internal consistency");
	eprintln!(" -d [path]:\trecursively lists the directory at path (defaults to the root)");
	eprintln!(" -c:\t\tcreates a fresh image at the given path, overwriting nothing");
	eprintln!(" -f src [dest]:\tfetches the regular file at src, writing it to dest or to stdout");
	eprintln!(" -p hostfile destpath:\tpushes a host file into the image (reserved, not implemented)");
}

fn main() {
	let (bin, args) = utils::args();
	let args: Vec<_> = args.collect();
	let Some((image_arg, rest)) = args.split_first() else {
		print_usage(&bin);
		exit(1);
	};
	let Some(image_str) = image_arg.to_str() else {
		error(&bin, "image path is not valid UTF-8");
	};
	let image_path = Path::new(image_str);

	let Some(mode) = rest.first() else {
		print_usage(&bin);
		exit(1);
	};
	let mode = mode.to_string_lossy().into_owned();
	let rest = &rest[1..];

	let result = match mode.as_str() {
		"-s" => run_stat(image_path),
		"-i" => run_integrity(image_path),
		"-d" => run_list(image_path, rest.first()),
		"-c" => run_create(image_path, rest),
		"-f" => run_fetch(image_path, rest),
		"-p" => run_push(image_path, rest),
		_ => {
			print_usage(&bin);
			exit(1);
		}
	};
	if let Err(e) = result {
		error(&bin, e);
	}
}

fn run_stat(image_path: &Path) -> Result<(), Error> {
	let mut fs = Filesystem::mount(image_path)?;
	println!("Filesystem type: {}", fs.fs_type());
	println!("Revision: {}", fs.revision());
	println!("Block size: {} bytes", fs.block_size());
	println!("Block groups: {}", fs.num_block_groups());
	println!("Inodes: {}", fs.num_inodes());
	println!("Total space: {}", ByteSize(fs.total_space()));
	println!("Used space: {}", ByteSize(fs.used_space()));
	println!("Free space: {}", ByteSize(fs.free_space()));

	let report = fs.scan_block_groups()?;
	println!("Directories: {}", report.num_directories);
	println!("Regular files: {}", report.num_regular_files);
	println!("Symlinks: {}", report.num_symlinks);
	fs.unmount()
}

fn run_integrity(image_path: &Path) -> Result<(), Error> {
	let mut fs = Filesystem::mount(image_path)?;
	let report = fs.check_integrity()?;
	println!("Magic number valid: {}", report.has_magic_number);
	if report.messages.is_empty() {
		println!("No inconsistencies found.");
	} else {
		println!("{} inconsistencies found:", report.messages.len());
		for msg in &report.messages {
			println!("- {msg}");
		}
	}
	let ok = report.has_magic_number && report.messages.is_empty();
	fs.unmount()?;
	if !ok {
		exit(1);
	}
	Ok(())
}

fn run_list(image_path: &Path, path: Option<&OsString>) -> Result<(), Error> {
	let mut fs = Filesystem::mount(image_path)?;
	let start = match path {
		Some(p) => {
			let p = p.to_str().ok_or(Error::FileNotFound)?;
			fs.get_file_at(p)?.into_directory().ok_or(Error::FileNotFound)?
		}
		None => fs.root_directory()?,
	};
	list_recursive(&mut fs, &start)?;
	fs.unmount()
}

fn list_recursive(fs: &mut Filesystem, dir: &Directory) -> Result<(), Error> {
	for file in dir.files(fs)? {
		if file.name() == "." || file.name() == ".." {
			continue;
		}
		println!("{} {:>10} {}", file.mode_str(), file.size(), file.absolute_path());
		if let File::Directory(sub) = file {
			list_recursive(fs, &sub)?;
		}
	}
	Ok(())
}

fn run_create(image_path: &Path, args: &[OsString]) -> Result<(), Error> {
	let Some(num_blocks) = args.first().and_then(|a| a.to_str()).and_then(|s| s.parse::<u32>().ok()) else {
		return Err(Error::Filesystem("-c requires a number of blocks".into()));
	};
	let block_size = args
		.get(1)
		.and_then(|a| a.to_str())
		.and_then(|s| s.parse::<u32>().ok())
		.unwrap_or(DEFAULT_BLOCK_SIZE);
	let inodes_per_group = args
		.get(2)
		.and_then(|a| a.to_str())
		.and_then(|s| s.parse::<u32>().ok())
		.unwrap_or(DEFAULT_INODES_PER_GROUP);
	let blocks_per_group = block_size * 8;

	let device = FileDevice::create_new(image_path, num_blocks as u64 * block_size as u64)?;
	let fs = ext2fs::format::create_on_device(Box::new(device), num_blocks, block_size, blocks_per_group, inodes_per_group)?;
	println!("Created image at {} ({num_blocks} blocks, {block_size} bytes/block)", image_path.display());
	fs.unmount()
}

fn run_fetch(image_path: &Path, args: &[OsString]) -> Result<(), Error> {
	let Some(src) = args.first() else {
		return Err(Error::Filesystem("-f requires a source path".into()));
	};
	let src = src.to_str().ok_or(Error::FileNotFound)?;
	let dest = args.get(1);

	let mut fs = Filesystem::mount(image_path)?;
	let file = fs.get_file_at(src)?;
	let File::Regular(regular) = file else {
		return Err(Error::Filesystem(format!("{src} is not a regular file")));
	};

	match dest {
		Some(dest) => {
			let mut out = fs::File::create(dest)?;
			for block in regular.blocks(&mut fs)? {
				out.write_all(&block?)?;
			}
		}
		None => {
			let stdout = io::stdout();
			let mut out = stdout.lock();
			for block in regular.blocks(&mut fs)? {
				out.write_all(&block?)?;
			}
		}
	}
	fs.unmount()
}

fn run_push(image_path: &Path, args: &[OsString]) -> Result<(), Error> {
	let [hostfile, destpath] = args else {
		return Err(Error::Filesystem("-p requires a host file and a destination path".into()));
	};
	let _ = hostfile;
	let destpath = destpath.to_str().ok_or(Error::FileNotFound)?;
	let (parent, name) = split_parent_name(destpath);

	let mut fs = Filesystem::mount(image_path)?;
	let parent_dir = fs.get_file_at(&parent)?.into_directory().ok_or(Error::FileNotFound)?;
	let result = parent_dir.make_regular_file(&mut fs, &name);
	fs.unmount()?;
	result.map(|_| ())
}

/// Splits a path into its parent directory and final component, defaulting the parent to `/` for
/// a bare name.
fn split_parent_name(path: &str) -> (String, String) {
	let trimmed = path.trim_end_matches('/');
	match trimmed.rsplit_once('/') {
		Some((parent, name)) => (if parent.is_empty() { "/".to_string() } else { parent.to_string() }, name.to_string()),
		None => ("/".to_string(), trimmed.to_string()),
	}
}
