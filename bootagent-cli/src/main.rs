//! bootagent CLI - Run the serial boot agent on a host.
//!
//! ## Features
//!
//! - Serve the update protocol on a serial port or on stdin/stdout
//! - Back the agent's flash with a raw image file
//! - Decode captured request frames
//! - List serial ports
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;

use bootagent::{ChecksumMode, ProtocolConfig, SelectorOrder};
use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if progress animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// bootagent - Serial firmware-update agent, hosted on a PC.
///
/// Environment variables:
///   BOOTAGENT_PORT            - Serial port to listen on
///   BOOTAGENT_BAUD            - Baud rate (default: 115200)
///   BOOTAGENT_IMAGE           - Flash image file
///   BOOTAGENT_CHECKSUM        - Checksum mode (none, sum16, crc16)
///   BOOTAGENT_SELECTOR_ORDER  - Selector byte order (low-first, high-first)
#[derive(Parser)]
#[command(name = "bootagent")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port to listen on.
    #[arg(short, long, global = true, env = "BOOTAGENT_PORT")]
    port: Option<String>,

    /// Baud rate.
    #[arg(short, long, global = true, env = "BOOTAGENT_BAUD")]
    baud: Option<u32>,

    /// Checksum mode for requests and replies.
    #[arg(long, global = true, env = "BOOTAGENT_CHECKSUM")]
    checksum: Option<ChecksumArg>,

    /// Byte order of the request selector field.
    #[arg(long, global = true, env = "BOOTAGENT_SELECTOR_ORDER")]
    selector_order: Option<SelectorOrderArg>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Checksum modes selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ChecksumArg {
    /// Ignore request checksums, stamp replies with 0x1122.
    None,
    /// 16-bit byte sum.
    Sum16,
    /// CRC16-XMODEM.
    Crc16,
}

impl From<ChecksumArg> for ChecksumMode {
    fn from(arg: ChecksumArg) -> Self {
        match arg {
            ChecksumArg::None => Self::None,
            ChecksumArg::Sum16 => Self::Sum16,
            ChecksumArg::Crc16 => Self::Crc16,
        }
    }
}

/// Selector byte orders selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SelectorOrderArg {
    /// Low byte first.
    LowFirst,
    /// High byte first.
    HighFirst,
}

impl From<SelectorOrderArg> for SelectorOrder {
    fn from(arg: SelectorOrderArg) -> Self {
        match arg {
            SelectorOrderArg::LowFirst => Self::LowFirst,
            SelectorOrderArg::HighFirst => Self::HighFirst,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Serve the update protocol until the host runs an image.
    Serve {
        /// Talk over stdin/stdout instead of a serial port.
        #[arg(long)]
        stdio: bool,

        /// Raw flash image file (created if missing, saved after each session).
        #[arg(long, env = "BOOTAGENT_IMAGE")]
        image: Option<PathBuf>,

        /// Stop after the first session instead of restarting on exit.
        #[arg(long)]
        once: bool,
    },

    /// Decode one captured request frame.
    Decode {
        /// Frame bytes in hex (spaces, colons and a 0x prefix are ignored).
        hex: String,

        /// Output the decoded frame as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Protocol variant from config with command-line overrides applied.
    fn protocol(&self, config: &Config) -> ProtocolConfig {
        let mut protocol = config
            .protocol
            .protocol();
        if let Some(checksum) = self.checksum {
            protocol.checksum = checksum.into();
        }
        if let Some(order) = self.selector_order {
            protocol.selector_order = order.into();
        }
        protocol
    }
}

fn main() -> Result<()> {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "bootagent v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };
    let protocol = cli.protocol(&config);

    match &cli.command {
        Commands::Serve {
            stdio,
            image,
            once,
        } => {
            let options = commands::serve::ServeOptions {
                port: cli
                    .port
                    .clone()
                    .or_else(|| {
                        config
                            .port
                            .serial
                            .clone()
                    }),
                baud: cli
                    .baud
                    .or(config.port.baud),
                stdio: *stdio,
                image: image
                    .clone()
                    .or_else(|| {
                        config
                            .flash
                            .image
                            .clone()
                    }),
                once: *once,
                quiet: cli.quiet,
            };
            commands::serve::cmd_serve(&options, config.flash.layout(), protocol)?;
        },
        Commands::Decode { hex, json } => {
            commands::decode::cmd_decode(hex, protocol, *json)?;
        },
        Commands::ListPorts { json } => {
            commands::list_ports::cmd_list_ports(*json)?;
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
        },
    }

    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::try_parse_from([
            "bootagent",
            "--port",
            "/dev/ttyUSB0",
            "--baud",
            "57600",
            "serve",
            "--image",
            "flash.bin",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud, Some(57600));
        if let Commands::Serve { stdio, image, once } = cli.command {
            assert!(!stdio);
            assert_eq!(image, Some(PathBuf::from("flash.bin")));
            assert!(!once);
        } else {
            panic!("Expected Serve command");
        }
    }

    #[test]
    fn test_cli_parse_serve_stdio_once() {
        let cli = Cli::try_parse_from(["bootagent", "-q", "serve", "--stdio", "--once"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Commands::Serve {
                stdio: true,
                once: true,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_parse_decode_json() {
        let cli =
            Cli::try_parse_from(["bootagent", "decode", "--json", "0100016000001122"]).unwrap();
        if let Commands::Decode { hex, json } = cli.command {
            assert_eq!(hex, "0100016000001122");
            assert!(json);
        } else {
            panic!("Expected Decode command");
        }
    }

    #[test]
    fn test_cli_parse_list_ports() {
        let cli = Cli::try_parse_from(["bootagent", "list-ports"]).unwrap();
        assert!(matches!(cli.command, Commands::ListPorts { json: false }));
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["bootagent", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Bash }
        ));
    }

    #[test]
    fn test_cli_protocol_overrides_config() {
        let cli = Cli::try_parse_from([
            "bootagent",
            "--checksum",
            "crc16",
            "--selector-order",
            "high-first",
            "list-ports",
        ])
        .unwrap();
        let mut config = Config::default();
        config.protocol.checksum = Some(ChecksumMode::Sum16);
        config.protocol.status_id = Some(0x30);

        let protocol = cli.protocol(&config);
        assert_eq!(protocol.checksum, ChecksumMode::Crc16);
        assert_eq!(protocol.selector_order, SelectorOrder::HighFirst);
        assert_eq!(protocol.status_id, 0x30);
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["bootagent", "list-ports"]).unwrap();
        assert!(cli.port.is_none());
        assert!(cli.baud.is_none());
        assert!(cli.checksum.is_none());
        assert!(!cli.quiet);
        assert!(cli.config_path.is_none());
    }
}
