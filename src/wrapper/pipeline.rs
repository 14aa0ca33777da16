//! Ordered assembly of reader stages
//!
//! Stages always nest in the same order, whatever order they were
//! requested in: format detection, file stitching, channel filling,
//! channel separation, min/max tracking and image buffers.

use log::debug;

use crate::config::ReaderOptions;
use crate::errors::{FormatError, FormatResult};
use crate::reader::{FormatReader, ImageReader, Stage};
use crate::stitcher::FileStitcher;
use super::{ChannelFiller, ChannelSeparator, ImageBufferReader, MinMaxCalculator};

fn rank(stage: Stage) -> Option<usize> {
    match stage {
        Stage::Composite => Some(0),
        Stage::Stitcher => Some(1),
        Stage::ChannelFiller => Some(2),
        Stage::ChannelSeparator => Some(3),
        Stage::MinMax => Some(4),
        Stage::BufferedImage => Some(5),
        Stage::Format(_) => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
    group_files: bool,
    flattened: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Format detection only
    pub fn new() -> Self {
        Pipeline {
            stages: vec![Stage::Composite],
            group_files: true,
            flattened: true,
        }
    }

    pub fn from_options(options: &ReaderOptions) -> FormatResult<Self> {
        let mut pipeline = Pipeline::new()
            .with_stage(Stage::Stitcher)?
            .group_files(options.group_files)
            .flattened_resolutions(options.flattened_resolutions);
        if options.fill_channels {
            pipeline = pipeline.with_stage(Stage::ChannelFiller)?;
        }
        if options.separate_channels {
            pipeline = pipeline.with_stage(Stage::ChannelSeparator)?;
        }
        if options.track_min_max {
            pipeline = pipeline.with_stage(Stage::MinMax)?;
        }
        Ok(pipeline)
    }

    /// Adds a stage at its fixed position; adding a stage twice is a no-op
    pub fn with_stage(mut self, stage: Stage) -> FormatResult<Self> {
        let Some(r) = rank(stage) else {
            return Err(FormatError::Unsupported(format!(
                "{} is a format plugin, not a pipeline stage",
                stage
            )));
        };
        if !self.stages.contains(&stage) {
            let at = self
                .stages
                .iter()
                .position(|s| rank(*s).map_or(false, |other| other > r))
                .unwrap_or(self.stages.len());
            self.stages.insert(at, stage);
        }
        Ok(self)
    }

    pub fn group_files(mut self, group: bool) -> Self {
        self.group_files = group;
        self
    }

    pub fn flattened_resolutions(mut self, flattened: bool) -> Self {
        self.flattened = flattened;
        self
    }

    /// Stages from the innermost outwards
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    fn wrap(stage: Stage, reader: Box<dyn FormatReader>) -> Box<dyn FormatReader> {
        match stage {
            Stage::Stitcher => Box::new(FileStitcher::new(reader)),
            Stage::ChannelFiller => Box::new(ChannelFiller::new(reader)),
            Stage::ChannelSeparator => Box::new(ChannelSeparator::new(reader)),
            Stage::MinMax => Box::new(MinMaxCalculator::new(reader)),
            Stage::BufferedImage => Box::new(ImageBufferReader::new(reader)),
            Stage::Composite | Stage::Format(_) => reader,
        }
    }

    fn assemble(&self, stop: Option<Stage>) -> FormatResult<Box<dyn FormatReader>> {
        let mut reader: Box<dyn FormatReader> = Box::new(ImageReader::new());
        for &stage in &self.stages {
            if Some(stage) == stop {
                break;
            }
            reader = Self::wrap(stage, reader);
        }
        reader.set_group_files(self.group_files);
        reader.set_flattened_resolutions(self.flattened)?;
        Ok(reader)
    }

    /// Builds the reader chain
    pub fn build(&self) -> FormatResult<Box<dyn FormatReader>> {
        debug!(
            "Reader pipeline: {}",
            self.stages.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(" -> ")
        );
        self.assemble(None)
    }

    /// Builds every stage below min/max tracking and returns the tracker
    /// itself, so its statistics stay reachable
    pub fn build_min_max(&self) -> FormatResult<MinMaxCalculator> {
        let inner = self.assemble(Some(Stage::MinMax))?;
        Ok(MinMaxCalculator::new(inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_stages_keep_canonical_order() {
        let pipeline = Pipeline::new()
            .with_stage(Stage::MinMax)
            .unwrap()
            .with_stage(Stage::ChannelFiller)
            .unwrap()
            .with_stage(Stage::ChannelSeparator)
            .unwrap()
            .with_stage(Stage::ChannelFiller)
            .unwrap();
        assert_eq!(
            pipeline.stages(),
            &[Stage::Composite, Stage::ChannelFiller, Stage::ChannelSeparator, Stage::MinMax]
        );
        assert!(Pipeline::new().with_stage(Stage::Format("TIFF")).is_err());
    }

    #[test]
    fn test_built_chain_reports_stages_outside_in() {
        let mut reader = Pipeline::new()
            .with_stage(Stage::ChannelSeparator)
            .unwrap()
            .with_stage(Stage::ChannelFiller)
            .unwrap()
            .build()
            .unwrap();
        reader.set_id(Path::new("chain&sizeX=8&sizeY=8&indexed=true.fake")).unwrap();
        assert_eq!(
            reader.stages(),
            vec![
                Stage::ChannelSeparator,
                Stage::ChannelFiller,
                Stage::Composite,
                Stage::Format("Simulated data"),
            ]
        );
        assert_eq!(reader.effective_size_c().unwrap(), 3);
    }

    #[test]
    fn test_options_drive_stages() {
        let options = ReaderOptions {
            fill_channels: true,
            track_min_max: true,
            ..ReaderOptions::default()
        };
        let pipeline = Pipeline::from_options(&options).unwrap();
        assert_eq!(
            pipeline.stages(),
            &[Stage::Composite, Stage::Stitcher, Stage::ChannelFiller, Stage::MinMax]
        );
        let mut tracker = pipeline.build_min_max().unwrap();
        tracker.set_id(Path::new("opts&sizeX=4&sizeY=4.fake")).unwrap();
        tracker.open_bytes(0).unwrap();
        assert!(tracker.is_min_max_populated().unwrap());
    }
}
