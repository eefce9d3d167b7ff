//! CLI interface for dx7

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// FM synthesizer modeled on the Yamaha DX7
#[derive(Parser)]
#[command(name = "dx7")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play through scsynth from MIDI input until interrupted
    Play {
        /// Configuration file path
        #[arg(short, long, default_value = "dx7.yaml")]
        config: PathBuf,

        /// Preset to load: NAME or NAME#VOICE
        #[arg(short, long)]
        preset: Option<String>,

        /// Algorithm 1-32, overriding the preset's
        #[arg(short, long)]
        algorithm: Option<u8>,

        /// MIDI input port name (substring match)
        #[arg(short, long)]
        midi: Option<String>,

        /// Have scsynth print the OSC it receives
        #[arg(long)]
        dump_osc: bool,
    },

    /// List available MIDI input ports
    Devices,

    /// Decode a sysex bank and print every voice
    Dump {
        /// Sysex file (reads stdin if absent)
        file: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = DumpFormat::Json)]
        format: DumpFormat,
    },

    /// Write the compiled definition for an algorithm
    Synthdef {
        /// Algorithm number 1-32
        #[arg(short, long)]
        algorithm: u8,

        /// Output file path (defaults to <name>.scsyndef)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output channels
        #[arg(long, default_value = "2")]
        channels: usize,
    },

    /// Validate a configuration file
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "dx7.yaml")]
        config: PathBuf,
    },

    /// Generate an example configuration file
    Init,
}

/// Serialization used by `dump`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DumpFormat {
    Json,
    Yaml,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_play_overrides() {
        let cli = Cli::parse_from(["dx7", "play", "--preset", "rom1a#2", "-a", "5", "--dump-osc"]);
        match cli.command {
            Commands::Play { config, preset, algorithm, midi, dump_osc } => {
                assert_eq!(config, PathBuf::from("dx7.yaml"));
                assert_eq!(preset.as_deref(), Some("rom1a#2"));
                assert_eq!(algorithm, Some(5));
                assert!(midi.is_none());
                assert!(dump_osc);
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn test_parse_dump_format() {
        let cli = Cli::parse_from(["dx7", "dump", "bank.syx", "--format", "yaml"]);
        match cli.command {
            Commands::Dump { file, format } => {
                assert_eq!(file, Some(PathBuf::from("bank.syx")));
                assert_eq!(format, DumpFormat::Yaml);
            }
            _ => panic!("expected dump"),
        }
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
