//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "hush")]
#[command(about = "Ambient-noise suppression on the microphone signal", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture, suppress the declared sources and play back
    Run(RunArgs),

    /// List audio devices
    Devices,

    /// List noise presets and their defaults
    Presets,

    /// Write the default engine configuration as JSON
    InitConfig {
        /// Destination file
        path: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Scene file (JSON): master gain and source declarations
    #[arg(long, value_name = "FILE")]
    pub scene: Option<PathBuf>,

    /// Add a preset source (ac, chatter, traffic, keyboard, music, custom)
    #[arg(long = "preset", value_name = "KIND")]
    pub presets: Vec<String>,

    /// Master output gain, 0.0 - 1.0
    #[arg(long, value_name = "GAIN")]
    pub master: Option<f32>,

    /// How long to run before stopping
    #[arg(long, value_name = "SECONDS", default_value = "10")]
    pub seconds: f32,

    /// Engine configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Use the low-latency stream preset
    #[arg(long, conflicts_with = "config")]
    pub low_latency: bool,

    /// Capture device name
    #[arg(long, value_name = "NAME")]
    pub input: Option<String>,

    /// Playback device name
    #[arg(long, value_name = "NAME")]
    pub output: Option<String>,

    /// Render against a simulated device instead of audio hardware
    #[arg(long)]
    pub offline: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "hush", "run", "--preset", "ac", "--preset", "chatter", "--master", "0.5", "--offline",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.presets, vec!["ac", "chatter"]);
                assert_eq!(args.master, Some(0.5));
                assert_eq!(args.seconds, 10.0);
                assert!(args.offline);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_config_conflicts_with_low_latency() {
        let result = Cli::try_parse_from(["hush", "run", "--config", "a.json", "--low-latency"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
