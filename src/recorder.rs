//! Optional CSV and binary sinks fed by the pipeline.
//!
//! Every sink is off unless enabled in [`RecorderConfig`].  Files are opened in
//! append mode so consecutive runs accumulate into the same output directory.
//!
//! | Sink | File | Row |
//! |---|---|---|
//! | raw capture | `capture_path` | verbatim packet bytes (binary) |
//! | full segment | `segments.csv` | `frame,segment` then every decoded sample |
//! | snippet | `snippets{e}.csv` | `frame,segment,sensor,led`, subtracted pixels, raw pixels |
//! | remedian | `remedians{e}.csv` | baseline per pixel |
//! | particle | `particles.csv` | `electrode,frame,weight,narrowed` |
//! | location | `locations.csv` | `frame,location,weight` |

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::error::RecorderError;
use crate::parse::decode_samples;
use crate::types::{DetectionResult, PacketContext, PixelRow, Snippet};

/// Which sinks to write and where.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Directory for all CSV sinks.
    pub output_dir: PathBuf,
    /// Destination of the raw binary capture.
    pub capture_path: PathBuf,
    pub capture_raw: bool,
    pub snippets: bool,
    pub remedians: bool,
    pub particles: bool,
    pub locations: bool,
    pub segments: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            capture_path: PathBuf::from("data.bin"),
            capture_raw: false,
            snippets: false,
            remedians: false,
            particles: false,
            locations: false,
            segments: false,
        }
    }
}

type CsvSink = csv::Writer<File>;

struct CaptureSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

fn open_append(path: &Path) -> Result<File, RecorderError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| RecorderError::Io {
            path: path.display().to_string(),
            source,
        })
}

fn open_csv(path: &Path) -> Result<CsvSink, RecorderError> {
    let file = open_append(path)?;
    Ok(csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file))
}

fn open_per_electrode(
    dir: &Path,
    prefix: &str,
    electrodes: usize,
) -> Result<Vec<CsvSink>, RecorderError> {
    (0..electrodes)
        .map(|e| open_csv(&dir.join(format!("{prefix}{e}.csv"))))
        .collect()
}

/// Writer for every enabled sink.
#[derive(Default)]
pub struct Recorder {
    capture: Option<CaptureSink>,
    segments: Option<CsvSink>,
    snippets: Option<Vec<CsvSink>>,
    remedians: Option<Vec<CsvSink>>,
    particles: Option<CsvSink>,
    locations: Option<CsvSink>,
}

impl Recorder {
    /// A recorder with every sink off.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Open the sinks enabled in `config` for `electrodes` electrodes.
    pub fn open(config: &RecorderConfig, electrodes: usize) -> Result<Self, RecorderError> {
        let dir = &config.output_dir;
        let any_csv = config.segments
            || config.snippets
            || config.remedians
            || config.particles
            || config.locations;
        if any_csv {
            fs::create_dir_all(dir).map_err(|source| RecorderError::Io {
                path: dir.display().to_string(),
                source,
            })?;
        }

        let capture = if config.capture_raw {
            info!("capturing raw packets to {}", config.capture_path.display());
            Some(CaptureSink {
                path: config.capture_path.clone(),
                writer: BufWriter::new(open_append(&config.capture_path)?),
            })
        } else {
            None
        };

        let single = |enabled: bool, name: &str| -> Result<Option<CsvSink>, RecorderError> {
            enabled.then(|| open_csv(&dir.join(name))).transpose()
        };
        let per_electrode = |enabled: bool, prefix: &str| {
            enabled
                .then(|| open_per_electrode(dir, prefix, electrodes))
                .transpose()
        };

        Ok(Self {
            capture,
            segments: single(config.segments, "segments.csv")?,
            snippets: per_electrode(config.snippets, "snippets")?,
            remedians: per_electrode(config.remedians, "remedians")?,
            particles: single(config.particles, "particles.csv")?,
            locations: single(config.locations, "locations.csv")?,
        })
    }

    /// Append the verbatim packet to the capture file and its decoded samples
    /// to the full-segment sink.
    pub fn capture(&mut self, context: &PacketContext) -> Result<(), RecorderError> {
        if let Some(sink) = &mut self.capture {
            sink.writer
                .write_all(&context.raw)
                .map_err(|source| RecorderError::Io {
                    path: sink.path.display().to_string(),
                    source,
                })?;
        }
        if let Some(csv) = &mut self.segments {
            csv.write_record([context.frame_id.to_string(), context.segment.to_string()])?;
            csv.write_record(decode_samples(context).iter().map(i16::to_string))?;
        }
        Ok(())
    }

    /// Append one snippet row: header fields, `raw - baseline` per pixel, then
    /// the raw pixels.
    pub fn snippet(
        &mut self,
        context: &PacketContext,
        snippet: &Snippet,
        baseline: &PixelRow,
    ) -> Result<(), RecorderError> {
        let Some(csv) = self
            .snippets
            .as_mut()
            .and_then(|sinks| sinks.get_mut(snippet.electrode))
        else {
            return Ok(());
        };
        let header = [
            context.frame_id.to_string(),
            context.segment.to_string(),
            context.sensor.to_string(),
            context.led_config.to_string(),
        ];
        let subtracted = snippet
            .samples
            .iter()
            .zip(baseline)
            .map(|(&raw, &base)| (raw as i32 - base as i32).to_string());
        let raw = snippet.samples.iter().map(i16::to_string);
        csv.write_record(header.into_iter().chain(subtracted).chain(raw))?;
        Ok(())
    }

    /// Append the current baseline vector of `electrode`.
    pub fn remedian(&mut self, electrode: usize, baseline: &PixelRow) -> Result<(), RecorderError> {
        if let Some(csv) = self.remedians.as_mut().and_then(|s| s.get_mut(electrode)) {
            csv.write_record(baseline.iter().map(i16::to_string))?;
        }
        Ok(())
    }

    /// Append a detection to the particle and location sinks.
    pub fn particle(
        &mut self,
        detection: &DetectionResult,
        location: usize,
    ) -> Result<(), RecorderError> {
        if let Some(csv) = &mut self.particles {
            csv.write_record([
                detection.electrode.to_string(),
                detection.frame_id.to_string(),
                detection.weight.to_string(),
                u8::from(detection.resolved_by_narrowing).to_string(),
            ])?;
        }
        if let Some(csv) = &mut self.locations {
            csv.write_record([
                detection.frame_id.to_string(),
                location.to_string(),
                detection.weight.to_string(),
            ])?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), RecorderError> {
        if let Some(sink) = &mut self.capture {
            sink.writer.flush().map_err(|source| RecorderError::Io {
                path: sink.path.display().to_string(),
                source,
            })?;
        }
        let singles = [&mut self.segments, &mut self.particles, &mut self.locations];
        for csv in singles.into_iter().flatten() {
            csv.flush().map_err(csv::Error::from)?;
        }
        for sinks in [&mut self.snippets, &mut self.remedians].into_iter().flatten() {
            for csv in sinks {
                csv.flush().map_err(csv::Error::from)?;
            }
        }
        Ok(())
    }
}
