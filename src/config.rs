//! Runtime configuration and the command line that produces it.
//!
//! Everything here is read once at startup.  The detector itself only needs
//! the electrode locations and the threshold; the rest configures the
//! surrounding links and sinks.

use std::path::PathBuf;

use clap::Parser;

use crate::error::ConfigError;
use crate::parse::validate_location;
use crate::protocol::{DEFAULT_ELECTRODE_LOCATIONS, DEFAULT_PORT, THRESHOLD};
use crate::recorder::RecorderConfig;

/// Command-line interface of the `particle-detect` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "particle-detect",
    version,
    about = "Detect particle impacts on a multi-electrode sensor array streamed over TCP"
)]
pub struct Cli {
    /// Electrode center locations, in samples from the start of a frame
    #[arg(value_name = "LOCATION")]
    pub locations: Vec<usize>,

    /// Address to accept the sensor connection on
    #[arg(long, default_value_t = format!("0.0.0.0:{DEFAULT_PORT}"))]
    pub listen: String,

    /// File the raw packets are appended to when --capture is set
    #[arg(long, default_value = "data.bin")]
    pub capture_path: PathBuf,

    /// Append every raw packet to --capture-path
    #[arg(long)]
    pub capture: bool,

    /// Write per-electrode snippet CSVs
    #[arg(long)]
    pub write_snippets: bool,

    /// Write per-electrode remedian CSVs
    #[arg(long)]
    pub write_remedians: bool,

    /// Write detected particles to particles.csv
    #[arg(long)]
    pub write_particles: bool,

    /// Write detection locations to locations.csv
    #[arg(long)]
    pub write_locations: bool,

    /// Write every decoded packet to segments.csv
    #[arg(long)]
    pub write_segments: bool,

    /// Directory for the CSV outputs
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Serial device receiving one byte per detection; detections are only
    /// logged when omitted
    ///
    /// The device is opened as a plain file, so set its line to raw mode at
    /// the receiver's baud rate beforehand, e.g.
    /// `stty -F /dev/ttyACM0 9600 raw -echo`.
    #[arg(long)]
    pub actuator: Option<PathBuf>,

    /// Detection threshold on |weight|
    #[arg(long, default_value_t = THRESHOLD)]
    pub threshold: i16,

    /// Packets buffered between the network reader and the detector
    #[arg(long, default_value_t = 64)]
    pub queue: usize,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub locations: Vec<usize>,
    pub threshold: i16,
    pub queue: usize,
    pub actuator: Option<PathBuf>,
    pub recorder: RecorderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: format!("0.0.0.0:{DEFAULT_PORT}"),
            locations: DEFAULT_ELECTRODE_LOCATIONS.to_vec(),
            threshold: THRESHOLD,
            queue: 64,
            actuator: None,
            recorder: RecorderConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_locations(&self.locations)
    }
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let locations = if cli.locations.is_empty() {
            DEFAULT_ELECTRODE_LOCATIONS.to_vec()
        } else {
            cli.locations
        };
        let config = Config {
            listen: cli.listen,
            locations,
            threshold: cli.threshold,
            queue: cli.queue.max(1),
            actuator: cli.actuator,
            recorder: RecorderConfig {
                output_dir: cli.output_dir,
                capture_path: cli.capture_path,
                capture_raw: cli.capture,
                snippets: cli.write_snippets,
                remedians: cli.write_remedians,
                particles: cli.write_particles,
                locations: cli.write_locations,
                segments: cli.write_segments,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

/// Check that `locations` is non-empty, addressable by one actuator byte, and
/// that every electrode window fits inside a packet.
pub fn validate_locations(locations: &[usize]) -> Result<(), ConfigError> {
    if locations.is_empty() {
        return Err(ConfigError::NoElectrodes);
    }
    if locations.len() > usize::from(u8::MAX) + 1 {
        return Err(ConfigError::TooManyElectrodes(locations.len()));
    }
    for (electrode, &location) in locations.iter().enumerate() {
        validate_location(electrode, location)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Config, ConfigError> {
        let cli = Cli::try_parse_from(std::iter::once("particle-detect").chain(args.iter().copied()))
            .unwrap();
        Config::try_from(cli)
    }

    #[test]
    fn defaults_mirror_the_sensor_setup() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.locations, vec![500, 750, 1000, 1250]);
        assert_eq!(config.listen, "0.0.0.0:12345");
        assert_eq!(config.threshold, THRESHOLD);
        assert!(!config.recorder.capture_raw);
        assert!(!config.recorder.particles);
        assert_eq!(config.recorder.capture_path, PathBuf::from("data.bin"));
    }

    #[test]
    fn flags_and_locations() {
        let config = parse(&[
            "--capture",
            "--capture-path",
            "run.bin",
            "--write-particles",
            "--threshold",
            "800",
            "300",
            "700",
        ])
        .unwrap();
        assert_eq!(config.locations, vec![300, 700]);
        assert_eq!(config.threshold, 800);
        assert!(config.recorder.capture_raw);
        assert!(config.recorder.particles);
        assert!(!config.recorder.snippets);
        assert_eq!(config.recorder.capture_path, PathBuf::from("run.bin"));
    }

    #[test]
    fn actuator_help_names_the_line_setup() {
        let cmd = Cli::command();
        let arg = cmd
            .get_arguments()
            .find(|a| a.get_id() == "actuator")
            .unwrap();
        let help = arg.get_long_help().unwrap().to_string();
        assert!(help.contains("stty -F"), "{help}");
    }

    #[test]
    fn rejects_bad_locations() {
        assert!(matches!(
            parse(&["500", "10"]),
            Err(ConfigError::LocationOutOfBounds { electrode: 1, .. })
        ));
        assert_eq!(validate_locations(&[]), Err(ConfigError::NoElectrodes));
        assert_eq!(
            validate_locations(&[500; 257]),
            Err(ConfigError::TooManyElectrodes(257))
        );
        assert!(Config::default().validate().is_ok());
    }
}
