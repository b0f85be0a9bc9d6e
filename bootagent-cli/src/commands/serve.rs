//! The serve command: run the agent against a flash image file.

use anyhow::{Context, Result};
use bootagent::transport::Duplex;
use bootagent::{
    Agent, Dispatcher, Error, FlashLayout, Handoff, Hooks, MemoryFlash, NativePort, Port,
    ProtocolConfig, SerialConfig, StreamTransport, Transport,
};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::use_fancy_output;

/// Image file used when neither `--image` nor the config names one.
const DEFAULT_IMAGE: &str = "flash.bin";

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}";

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Resolved serve options.
#[derive(Debug, Clone)]
pub(crate) struct ServeOptions {
    pub port: Option<String>,
    pub baud: Option<u32>,
    pub stdio: bool,
    pub image: Option<PathBuf>,
    pub once: bool,
    pub quiet: bool,
}

/// Serve command implementation.
pub(crate) fn cmd_serve(
    options: &ServeOptions,
    layout: FlashLayout,
    protocol: ProtocolConfig,
) -> Result<()> {
    let image = options
        .image
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE));
    let flash = MemoryFlash::load(layout, &image)
        .with_context(|| format!("Failed to load flash image {}", image.display()))?;
    debug!("Flash layout: {layout:?}");
    debug!("Protocol: {protocol:?}");

    if options.stdio {
        if let Some(port) = &options.port {
            warn!("Ignoring port {port} in stdio mode");
        }
        // Reads from stdin block, so Ctrl-C keeps its default behaviour here.
        let stream = Duplex::new(io::stdin(), FlushingStdout(io::stdout()));
        return run(StreamTransport::new(stream), flash, protocol, &image, options);
    }

    let port_name = options
        .port
        .clone()
        .context("No serial port given (use --port, BOOTAGENT_PORT or [port] serial)")?;
    let config = SerialConfig::new(
        port_name,
        options
            .baud
            .unwrap_or(bootagent::port::DEFAULT_BAUD),
    );
    let mut port = NativePort::open(&config)
        .with_context(|| format!("Failed to open serial port {}", config.port_name))?;
    port.clear_input()?;

    ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst))
        .context("Failed to install Ctrl-C handler")?;
    bootagent::set_interrupt_checker(|| INTERRUPTED.load(Ordering::SeqCst));

    if !options.quiet {
        eprintln!(
            "{} Listening on {} at {} baud",
            style("→")
                .green()
                .bold(),
            style(port.name()).cyan(),
            config.baud_rate
        );
    }
    run(StreamTransport::new(port), flash, protocol, &image, options)
}

/// Serve sessions until the host runs an image, disconnects, or `--once` ends it.
fn run<T: Transport>(
    transport: T,
    flash: MemoryFlash,
    protocol: ProtocolConfig,
    image: &Path,
    options: &ServeOptions,
) -> Result<()> {
    let dispatcher = Dispatcher::new(flash)
        .with_status_id(protocol.status_id)
        .with_hooks(ProgressHooks::new(options.quiet));
    let mut agent = Agent::with_dispatcher(transport, dispatcher, protocol);

    loop {
        let result = agent.serve();
        agent
            .dispatcher()
            .flash()
            .save(image)
            .with_context(|| format!("Failed to save flash image {}", image.display()))?;

        match result {
            Ok(Handoff::Run { address }) => {
                info!("Host requested run at {address:#010x}");
                return Ok(());
            },
            Ok(Handoff::Reset) if options.once => {
                info!("Host requested reset");
                return Ok(());
            },
            Ok(Handoff::Reset) => {
                info!("Host requested reset, starting a new session");
                agent.reset_session();
            },
            Err(Error::Disconnected) => {
                info!("Host disconnected");
                return Ok(());
            },
            Err(Error::Interrupted) => {
                warn!("Interrupted, flash image saved to {}", image.display());
                return Ok(());
            },
            Err(e) => return Err(e).context("Agent stopped"),
        }
    }
}

/// Stdout that pushes every reply out as soon as it is written.
struct FlushingStdout(io::Stdout);

impl Write for FlushingStdout {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self
            .0
            .write(buf)?;
        self.0
            .flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0
            .flush()
    }
}

/// Transfer progress on a stderr progress bar.
struct ProgressHooks {
    bar: ProgressBar,
    quiet: bool,
}

impl ProgressHooks {
    fn new(quiet: bool) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            quiet,
        }
    }
}

impl Hooks for ProgressHooks {
    fn start(&mut self, address: u32, size: u32) {
        info!("Receiving {size} bytes for {address:#010x}");
        self.bar = if self.quiet || !use_fancy_output() {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(u64::from(size));
            #[allow(clippy::unwrap_used)] // Static template string
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(PROGRESS_TEMPLATE)
                    .unwrap()
                    .progress_chars("#>-"),
            );
            pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            pb
        };
    }

    fn progress(&mut self, done: u32, _total: u32) {
        self.bar
            .set_position(u64::from(done));
    }

    fn end(&mut self) {
        self.bar
            .finish_with_message("complete");
        info!("Image received");
    }
}
