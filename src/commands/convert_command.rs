//! Conversion command
//!
//! Rewrites a dataset as TIFF with the compression and tiling chosen on
//! the command line or in the options file.

use std::path::PathBuf;
use clap::ArgMatches;
use log::info;

use crate::commands::command_traits::Command;
use crate::commands::{options_from_args, series_from_args};
use crate::compression::DatasetConverter;
use crate::config::Options;
use crate::errors::{FormatError, FormatResult};
use crate::utils::logger::Logger;

/// Command for converting a dataset to TIFF
pub struct ConvertCommand<'a> {
    /// Path (or file pattern) of the input dataset
    input_file: PathBuf,
    /// Path to the output file
    output_file: PathBuf,
    options: Options,
    series: Option<usize>,
    /// Report sink
    logger: &'a Logger,
}

impl<'a> ConvertCommand<'a> {
    /// Create a new convert command
    ///
    /// # Arguments
    /// * `args` - CLI argument matches from clap
    /// * `logger` - Report sink
    ///
    /// # Returns
    /// A new ConvertCommand instance or an error
    pub fn new(args: &ArgMatches, logger: &'a Logger) -> FormatResult<Self> {
        let input_file = args
            .get_one::<String>("input")
            .ok_or_else(|| FormatError::GenericError("Missing input file".to_string()))?;

        let output_file = args
            .get_one::<String>("output")
            .ok_or_else(|| FormatError::GenericError("Missing output file path for conversion".to_string()))?;

        let options = options_from_args(args)?;
        info!("Using compression: {}", options.writer.compression);

        Ok(ConvertCommand {
            input_file: PathBuf::from(input_file),
            output_file: PathBuf::from(output_file),
            options,
            series: series_from_args(args)?,
            logger,
        })
    }
}

impl<'a> Command for ConvertCommand<'a> {
    fn execute(&self) -> FormatResult<()> {
        info!(
            "Converting {} to {}",
            self.input_file.display(),
            self.output_file.display()
        );

        let converter = DatasetConverter::new(
            self.logger,
            self.options.reader.clone(),
            self.options.writer.clone(),
        )
        .with_series(self.series);
        let summary = converter.convert(&self.input_file, &self.output_file)?;

        println!(
            "Wrote {}: {} series, {} planes, {} blocks",
            self.output_file.display(),
            summary.series,
            summary.planes,
            summary.blocks
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cli;
    use crate::compression::CompressionType;

    #[test]
    fn test_output_is_required() {
        let args = cli()
            .try_get_matches_from(["planeio", "a&sizeX=8&sizeY=8.fake", "--convert"])
            .unwrap();
        let logger = Logger::disabled();
        assert!(ConvertCommand::new(&args, &logger).is_err());
    }

    #[test]
    fn test_unknown_compression_is_rejected() {
        let args = cli()
            .try_get_matches_from(["planeio", "a&sizeX=8&sizeY=8.fake", "-c", "-o", "x.tif", "--compression", "packbits"])
            .unwrap();
        let logger = Logger::disabled();
        assert!(ConvertCommand::new(&args, &logger).is_err());
    }

    #[test]
    fn test_convert_writes_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.tif");
        let output_arg = output.to_string_lossy().into_owned();
        let args = cli()
            .try_get_matches_from([
                "planeio",
                "cmd&sizeX=40&sizeY=20&sizeZ=2.fake",
                "--convert",
                "-o",
                output_arg.as_str(),
                "--compression",
                "deflate",
                "--tile",
                "16",
            ])
            .unwrap();
        let logger = Logger::disabled();
        let command = ConvertCommand::new(&args, &logger).unwrap();
        assert_eq!(command.options.writer.compression, CompressionType::Deflate);
        assert_eq!(command.options.writer.tile_width, Some(16));
        command.execute().unwrap();
        assert!(output.exists());
    }
}
