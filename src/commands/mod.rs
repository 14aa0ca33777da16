//! CLI command implementations
//!
//! `InfoCommand` prints the dimensions of a dataset (and optionally plane
//! hashes and metadata XML); `ConvertCommand` rewrites it as TIFF.

pub mod command_traits;
pub mod convert_command;
pub mod info_command;

pub use command_traits::{Command, CommandFactory};
pub use convert_command::ConvertCommand;
pub use info_command::InfoCommand;

use std::path::Path;
use clap::{Arg, ArgAction, ArgMatches, Command as ClapCommand};
use log::debug;

use crate::config::Options;
use crate::errors::{FormatError, FormatResult};
use crate::utils::logger::Logger;

/// Command-line definition of the `planeio` binary
pub fn cli() -> ClapCommand {
    ClapCommand::new("planeio")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect, hash and convert multi-dimensional image datasets")
        .arg(
            Arg::new("input")
                .help("Input file, or a file pattern such as 'img_z<1-9>.tif'")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (repeat for more)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Write log records to this file instead of stderr")
                .value_name("FILE")
                .required(false),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .help("Append a summary of each command to this file")
                .value_name("FILE")
                .required(false),
        )
        .arg(
            Arg::new("options")
                .long("options")
                .help("TOML options file with [reader] and [writer] tables")
                .value_name("FILE")
                .required(false),
        )
        .arg(
            Arg::new("series")
                .long("series")
                .help("Only process this series")
                .value_name("INDEX")
                .required(false),
        )
        .arg(
            Arg::new("no-group")
                .long("no-group")
                .help("Do not stitch numbered sibling files")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("unflattened")
                .long("unflattened")
                .help("Expose pyramid levels as resolutions instead of series")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("min-max")
                .long("min-max")
                .help("Report per-channel minimum and maximum values")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("hash")
                .long("hash")
                .help("Print the SHA-256 of every plane")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("xml")
                .long("xml")
                .help("Print the dataset metadata as XML")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("convert")
                .short('c')
                .long("convert")
                .help("Convert the dataset to TIFF")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Output TIFF file")
                .value_name("FILE")
                .required(false),
        )
        .arg(
            Arg::new("compression")
                .long("compression")
                .help("Output compression (UNCOMPRESSED, LZW, DEFLATE, JPEG, JPEG_2000, JPEG_2000_LOSSY, ZSTD)")
                .value_name("NAME")
                .required(false),
        )
        .arg(
            Arg::new("tile")
                .long("tile")
                .help("Write square tiles of this size (rounded up to a multiple of 16)")
                .value_name("PIXELS")
                .required(false),
        )
}

/// Options file (if any) with the command-line overrides applied
pub fn options_from_args(args: &ArgMatches) -> FormatResult<Options> {
    let mut options = match args.get_one::<String>("options") {
        Some(path) => Options::load(Path::new(path))?,
        None => Options::default(),
    };
    if args.get_flag("no-group") {
        options.reader.group_files = false;
    }
    if args.get_flag("unflattened") {
        options.reader.flattened_resolutions = false;
    }
    if args.get_flag("min-max") {
        options.reader.track_min_max = true;
    }
    if let Some(name) = args.get_one::<String>("compression") {
        options.writer.compression = name.parse()?;
    }
    if let Some(size) = args.get_one::<String>("tile") {
        let size = size
            .parse::<u32>()
            .map_err(|_| FormatError::GenericError(format!("Invalid tile size: {}", size)))?;
        options.writer.tile_width = Some(size);
        options.writer.tile_height = Some(size);
    }
    debug!("Effective options: {:?}", options);
    Ok(options)
}

/// Selected series, when `--series` is given
pub fn series_from_args(args: &ArgMatches) -> FormatResult<Option<usize>> {
    args.get_one::<String>("series")
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| FormatError::GenericError(format!("Invalid series: {}", s)))
        })
        .transpose()
}

/// Factory for creating command instances based on CLI arguments
pub struct PlaneioCommandFactory;

impl PlaneioCommandFactory {
    pub fn new() -> Self {
        PlaneioCommandFactory
    }
}

impl Default for PlaneioCommandFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> CommandFactory<'a> for PlaneioCommandFactory {
    fn create_command(&self, args: &ArgMatches, logger: &'a Logger) -> FormatResult<Box<dyn Command + 'a>> {
        if args.get_flag("convert") {
            Ok(Box::new(ConvertCommand::new(args, logger)?))
        } else {
            Ok(Box::new(InfoCommand::new(args, logger)?))
        }
    }
}
