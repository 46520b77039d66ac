//! The `mkfs` tool creates a new, empty image file.

use std::env;
use std::path::PathBuf;
use std::process::exit;

use mofs::FsParams;

/// Structure storing command line arguments.
struct Args {
	/// The name of the current program used in command line.
	prog: String,

	/// If true, print command line help.
	help: bool,

	/// The path to the image file to create.
	image_path: Option<PathBuf>,
	/// Total size of the image, in bytes.
	size: u64,
	/// Number of inodes to provision.
	inode_count: u32,
}

impl Default for Args {
	fn default() -> Self {
		Self {
			prog: "mkfs".to_owned(),
			help: false,
			image_path: None,
			size: 4 * 1024 * 1024,
			inode_count: 1024,
		}
	}
}

fn print_usage(prog: &str) {
	eprintln!("Usage: {prog} [-h] [-s SIZE] [-n INODES] IMAGE");
	eprintln!();
	eprintln!("Creates a new MoFS image at IMAGE.");
	eprintln!();
	eprintln!("    -h, --help         print this help");
	eprintln!("    -s, --size SIZE    total image size in bytes (default: 4194304)");
	eprintln!("    -n, --inodes N     number of inodes to provision (default: 1024)");
}

fn parse_args() -> Args {
	let mut args = Args::default();
	let mut iter = env::args();

	args.prog = iter.next().unwrap_or_else(|| args.prog.clone());

	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"-h" | "--help" => args.help = true,

			"-s" | "--size" => {
				let value = iter.next().unwrap_or_else(|| {
					eprintln!("{}: {} requires an argument", args.prog, arg);
					exit(1);
				});
				args.size = value.parse().unwrap_or_else(|e| {
					eprintln!("{}: invalid size `{}`: {}", args.prog, value, e);
					exit(1);
				});
			}

			"-n" | "--inodes" => {
				let value = iter.next().unwrap_or_else(|| {
					eprintln!("{}: {} requires an argument", args.prog, arg);
					exit(1);
				});
				args.inode_count = value.parse().unwrap_or_else(|e| {
					eprintln!("{}: invalid inode count `{}`: {}", args.prog, value, e);
					exit(1);
				});
			}

			_ => {
				if args.image_path.is_some() {
					eprintln!("{}: unexpected argument `{}`", args.prog, arg);
					exit(1);
				}
				args.image_path = Some(PathBuf::from(arg));
			}
		}
	}

	args
}

fn main() {
	let args = parse_args();

	if args.help {
		print_usage(&args.prog);
		return;
	}

	let image_path = args.image_path.unwrap_or_else(|| {
		print_usage(&args.prog);
		exit(1);
	});

	let params = FsParams {
		total_bytes: args.size,
		inode_count: args.inode_count,
	};

	let mut fs = mofs::FileSystem::format(&image_path, params).unwrap_or_else(|e| {
		eprintln!("{}: {}: {}", args.prog, image_path.display(), e);
		exit(1);
	});
	fs.flush().unwrap_or_else(|e| {
		eprintln!("{}: {}: {}", args.prog, image_path.display(), e);
		exit(1);
	});

	println!(
		"{}: created {} ({} bytes, {} inodes)",
		args.prog,
		image_path.display(),
		args.size,
		args.inode_count
	);
}
