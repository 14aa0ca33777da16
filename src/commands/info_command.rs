//! Dataset information command
//!
//! Opens a dataset through the reader pipeline and prints its series
//! dimensions, used files and, on request, a SHA-256 per plane, channel
//! extrema and the metadata as XML.

use std::path::PathBuf;
use clap::ArgMatches;
use log::{debug, info};
use sha2::{Digest, Sha256};

use crate::commands::command_traits::Command;
use crate::commands::{options_from_args, series_from_args};
use crate::config::Options;
use crate::errors::{FormatError, FormatResult};
use crate::meta::{copy_metadata, OmeMetadata};
use crate::reader::FormatReader;
use crate::utils::logger::Logger;
use crate::wrapper::{MinMaxCalculator, Pipeline};

/// Hex SHA-256 of a plane buffer
pub fn plane_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Command for printing dataset information
pub struct InfoCommand<'a> {
    /// Path (or file pattern) of the dataset
    input: PathBuf,
    options: Options,
    series: Option<usize>,
    hash: bool,
    xml: bool,
    /// Report sink
    logger: &'a Logger,
}

impl<'a> InfoCommand<'a> {
    /// Create a new info command
    ///
    /// # Arguments
    /// * `args` - CLI argument matches from clap
    /// * `logger` - Report sink
    ///
    /// # Returns
    /// A new InfoCommand instance or an error
    pub fn new(args: &ArgMatches, logger: &'a Logger) -> FormatResult<Self> {
        let input = args
            .get_one::<String>("input")
            .ok_or_else(|| FormatError::GenericError("Missing input file".to_string()))?;
        Ok(InfoCommand {
            input: PathBuf::from(input),
            options: options_from_args(args)?,
            series: series_from_args(args)?,
            hash: args.get_flag("hash"),
            xml: args.get_flag("xml"),
            logger,
        })
    }

    fn open(&self, reader: &mut dyn FormatReader) -> FormatResult<Vec<usize>> {
        reader.set_id(&self.input)?;
        let count = reader.series_count()?;
        match self.series {
            Some(s) if s >= count => Err(FormatError::GenericError(format!(
                "Invalid series: {} (series count {})",
                s, count
            ))),
            Some(s) => Ok(vec![s]),
            None => Ok((0..count).collect()),
        }
    }

    /// Prints the dataset-wide part of the report
    fn print_dataset(&self, reader: &dyn FormatReader) -> FormatResult<()> {
        println!("{}", self.input.display());
        println!("  Format: {}", reader.format_name());
        println!(
            "  Reader stages: {}",
            reader.stages().iter().map(|s| s.to_string()).collect::<Vec<_>>().join(" -> ")
        );
        let used = reader.used_files(false)?;
        println!("  Used files: {}", used.len());
        for file in &used {
            println!("    {}", file.display());
        }
        println!("  Series count: {}", reader.series_count()?);
        Ok(())
    }

    fn print_series(&self, reader: &mut dyn FormatReader, series: usize) -> FormatResult<()> {
        reader.set_series(series)?;
        let core = reader.core()?.into_owned();
        println!("Series #{}:", series);
        println!("  Image count: {}", core.image_count);
        println!("  Size: {} x {}", core.size_x, core.size_y);
        println!(
            "  SizeZ: {}  SizeC: {} (effective {})  SizeT: {}",
            core.size_z,
            core.size_c,
            core.effective_size_c(),
            core.size_t
        );
        println!("  Dimension order: {}", core.dimension_order);
        println!("  Pixel type: {} ({} bits)", core.pixel_type.name(), core.bits_per_pixel);
        println!(
            "  RGB: {} ({} samples, {})",
            core.rgb,
            core.rgb_channel_count(),
            if core.interleaved { "interleaved" } else { "planar" }
        );
        println!("  Indexed: {}  False color: {}", core.indexed, core.false_color);
        println!("  Byte order: {}", if core.little_endian { "little-endian" } else { "big-endian" });
        println!("  Thumbnail size: {} x {}", core.thumb_size_x, core.thumb_size_y);

        let resolutions = reader.resolution_count()?;
        if resolutions > 1 {
            println!("  Resolutions: {}", resolutions);
            for level in 1..resolutions {
                reader.set_resolution(level)?;
                println!("    #{}: {} x {}", level, reader.size_x()?, reader.size_y()?);
            }
            reader.set_resolution(0)?;
        }

        if self.hash {
            for no in 0..core.image_count {
                let bytes = reader.open_bytes(no)?;
                let [z, c, t] = reader.get_zct_coords(no)?;
                println!("  Plane {} (z={}, c={}, t={}): {}", no, z, c, t, plane_hash(&bytes));
            }
        }
        Ok(())
    }

    fn print_ranges(&self, tracker: &MinMaxCalculator) -> FormatResult<()> {
        for c in 0..tracker.effective_size_c()? {
            match (tracker.channel_global_range(c)?, tracker.channel_known_range(c)?) {
                (Some((min, max)), _) => println!("  Channel {} range: {} .. {}", c, min, max),
                (None, Some((min, max))) => println!("  Channel {} range so far: {} .. {}", c, min, max),
                (None, None) => println!("  Channel {} range: not computed (use --hash to read planes)", c),
            }
        }
        Ok(())
    }

    fn print_xml(&self, reader: &dyn FormatReader) -> FormatResult<()> {
        let Some(retrieve) = reader.metadata_store().as_retrieve() else {
            println!("(metadata store keeps no values)");
            return Ok(());
        };
        let mut meta = OmeMetadata::new();
        copy_metadata(retrieve, &mut meta)?;
        println!("{}", meta.to_xml()?);
        Ok(())
    }

    fn finish(&self, reader: &dyn FormatReader) -> FormatResult<()> {
        if self.xml {
            self.print_xml(reader)?;
        }
        let message = format!(
            "Read {} ({}, {} series)",
            self.input.display(),
            reader.format_name(),
            reader.series_count()?
        );
        info!("{}", message);
        self.logger.log(&message)?;
        Ok(())
    }
}

impl<'a> Command for InfoCommand<'a> {
    fn execute(&self) -> FormatResult<()> {
        let pipeline = Pipeline::from_options(&self.options.reader)?;
        debug!("Reading {} with stages {:?}", self.input.display(), pipeline.stages());

        if self.options.reader.track_min_max {
            let mut tracker = pipeline.build_min_max()?;
            let selected = self.open(&mut tracker)?;
            self.print_dataset(&tracker)?;
            for series in selected {
                self.print_series(&mut tracker, series)?;
                self.print_ranges(&tracker)?;
            }
            self.finish(&tracker)?;
            tracker.close()
        } else {
            let mut reader = pipeline.build()?;
            let selected = self.open(reader.as_mut())?;
            self.print_dataset(reader.as_ref())?;
            for series in selected {
                self.print_series(reader.as_mut(), series)?;
            }
            self.finish(reader.as_ref())?;
            reader.close()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cli;

    #[test]
    fn test_plane_hash_is_sha256_hex() {
        assert_eq!(
            plane_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_info_runs_on_fake_dataset() {
        let args = cli()
            .try_get_matches_from(["planeio", "info&sizeX=8&sizeY=8&sizeT=2.fake", "--hash", "--min-max", "--xml"])
            .unwrap();
        let logger = Logger::disabled();
        let command = InfoCommand::new(&args, &logger).unwrap();
        assert!(command.options.reader.track_min_max);
        command.execute().unwrap();
    }

    #[test]
    fn test_invalid_series_is_rejected() {
        let args = cli()
            .try_get_matches_from(["planeio", "one&sizeX=8&sizeY=8.fake", "--series", "4"])
            .unwrap();
        let logger = Logger::disabled();
        assert!(InfoCommand::new(&args, &logger).unwrap().execute().is_err());
    }
}
