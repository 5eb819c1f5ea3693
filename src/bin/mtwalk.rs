//! A thin `du`-style demo of the `mtpt_rs` traversal API: sums each
//! directory's apparent (or on-disk) size from its descendants, grounded in
//! `original_source/mtdu.c`'s `dir_enter`/`dir_exit`/`file`/`error` usage.
//!
//! Full `du` behaviour (exclude patterns, human-readable units, one-file-system
//! mode, grand totals across multiple roots) is out of scope — this exists to
//! exercise the public callback contract end to end, not to replace `du`.

use clap::Parser;
use mtpt_rs::{Entry, EntryError, TraverseOptionsBuilder};
use std::fs::Metadata;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"), about = "Sum directory sizes using mtpt_rs::traverse")]
struct Args {
    /// Path to sum. Defaults to the current directory.
    #[arg(value_name = "PATH", default_value = ".")]
    path: PathBuf,

    /// Number of worker threads, defaults to available parallelism.
    #[arg(short = 'j', long = "threads")]
    threads: Option<usize>,

    /// Print apparent size (file length) instead of on-disk block usage.
    #[arg(short = 'A', long = "apparent-size")]
    apparent_size: bool,

    /// Only print the total for the root, not every subdirectory.
    #[arg(short = 's', long = "summarize")]
    summarize: bool,
}

struct DuArgs {
    apparent_size: bool,
    summarize: bool,
}

fn size_of(metadata: &Metadata) -> u64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt as _;
        metadata.blocks() * 512
    }
    #[cfg(not(unix))]
    {
        metadata.len()
    }
}

fn measured_size(args: &DuArgs, metadata: &Metadata) -> u64 {
    if args.apparent_size {
        metadata.len()
    } else {
        size_of(metadata)
    }
}

fn main() {
    env_logger::init();
    let cli = Args::parse();

    let mut builder = TraverseOptionsBuilder::new(DuArgs {
        apparent_size: cli.apparent_size,
        summarize: cli.summarize,
    })
    .sort(true)
    .file(|args, _path, metadata| measured_size(args, metadata))
    .dir_exit(|args, path, metadata, _continuation, entries: &mut [Entry<u64>]| {
        let mut size = measured_size(args, metadata);
        for entry in entries.iter() {
            size += entry.data.unwrap_or(0);
        }
        if !args.summarize {
            println!("{size}\t{}", path.display());
        }
        size
    })
    .error(|_args, err: &EntryError, _metadata, _continuation| {
        eprintln!("mtwalk: {err}");
        0u64
    });

    if let Some(threads) = cli.threads {
        builder = builder.threads(threads);
    }

    match builder.build(&cli.path) {
        Ok(Some(total)) => {
            if cli.summarize {
                println!("{total}\t{}", cli.path.display());
            }
        }
        Ok(None) => {}
        Err(err) => {
            eprintln!("mtwalk: {err}");
            std::process::exit(1);
        }
    }
}
