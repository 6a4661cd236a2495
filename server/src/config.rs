//! Command-line options for the server.

use clap::Parser;
use std::time::{SystemTime, UNIX_EPOCH};

/// One line printed to stdout when the invocation is invalid; the process
/// then exits with status 1.
pub const USAGE: &str = "Usage: screen-worms-server [-p n] [-s n] [-t n] [-v n] [-w n] [-h n]";

fn default_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Server options. `-h` selects the board height, so clap's built-in help
/// flag is disabled.
#[derive(Parser, Debug, Clone)]
#[command(name = "screen-worms-server", disable_help_flag = true)]
pub struct Options {
    /// UDP port to bind
    #[arg(short = 'p', long = "port", default_value_t = 2021)]
    pub port: u16,

    /// Seed for the deterministic random generator; defaults to wall time
    #[arg(short = 's', long = "seed", default_value_t = default_seed())]
    pub seed: u32,

    /// Degrees added to an avatar's heading per turn when steering
    #[arg(short = 't', long = "turning-speed", default_value_t = 6,
          value_parser = clap::value_parser!(u16).range(1..))]
    pub turning_speed: u16,

    /// Simulation turns per second
    #[arg(short = 'v', long = "rounds-per-sec", default_value_t = 50,
          value_parser = clap::value_parser!(u16).range(1..=1000))]
    pub rounds_per_sec: u16,

    /// Board width in cells
    #[arg(short = 'w', long = "width", default_value_t = 640,
          value_parser = clap::value_parser!(u16).range(1..))]
    pub width: u16,

    /// Board height in cells
    #[arg(short = 'h', long = "height", default_value_t = 480,
          value_parser = clap::value_parser!(u16).range(1..))]
    pub height: u16,
}

impl Options {
    /// Wall-clock length of one simulation turn in milliseconds.
    pub fn turn_duration_ms(&self) -> u64 {
        1000 / self.rounds_per_sec as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol() {
        let options = Options::try_parse_from(["screen-worms-server"]).unwrap();
        assert_eq!(options.port, 2021);
        assert_eq!(options.turning_speed, 6);
        assert_eq!(options.rounds_per_sec, 50);
        assert_eq!(options.width, 640);
        assert_eq!(options.height, 480);
        assert_eq!(options.turn_duration_ms(), 20);
    }

    #[test]
    fn short_flags_parse() {
        let options = Options::try_parse_from([
            "screen-worms-server",
            "-p", "3000",
            "-s", "123",
            "-t", "90",
            "-v", "25",
            "-w", "10",
            "-h", "12",
        ])
        .unwrap();
        assert_eq!(options.port, 3000);
        assert_eq!(options.seed, 123);
        assert_eq!(options.turning_speed, 90);
        assert_eq!(options.rounds_per_sec, 25);
        assert_eq!(options.width, 10);
        assert_eq!(options.height, 12);
        assert_eq!(options.turn_duration_ms(), 40);
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(Options::try_parse_from(["screen-worms-server", "-w", "0"]).is_err());
        assert!(Options::try_parse_from(["screen-worms-server", "-v", "0"]).is_err());
        assert!(Options::try_parse_from(["screen-worms-server", "-x", "1"]).is_err());
    }
}
