use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use twain_core::{
    DsmEntry, FilterFlag, MockDsm, PlatformMessage, ScanEvent, ScanObserver, ScanSession,
    ScanSettings, TracingObserver, TransferImageArgs, TransferMode, TwainError, WindowHandle,
};

#[cfg(windows)]
mod win32;

#[derive(Parser, Debug)]
#[command(author, version, about = "TWAIN scanning tool (Pure Rust)", long_about = None)]
struct Args {
    /// Use the built-in simulated scanner instead of the system manager
    #[arg(long)]
    simulate: bool,

    /// Pages the simulated scanner feeds per scan
    #[arg(long, default_value_t = 2)]
    pages: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the sources the manager knows
    Sources,
    /// Print the manager's default source
    Default,
    /// Dump every capability a source supports
    Caps {
        /// Source product name (default source when omitted)
        #[arg(long)]
        source: Option<String>,
    },
    /// Print the settings a source currently applies, as TOML
    Settings {
        #[arg(long)]
        source: Option<String>,
        /// Also write them to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Scan pages into a directory
    Scan {
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Scan settings file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        source: Option<String>,
        /// Resolution override
        #[arg(long)]
        dpi: Option<f32>,
        /// Use buffered memory transfer (pages saved as TIFF)
        #[arg(long)]
        memory: bool,
        /// Show the source's own dialog
        #[arg(long)]
        show_ui: bool,
    },
}

// ============================================================================
// Observer
// ============================================================================

/// Writes each transferred page into a directory.
struct PageWriter {
    dir: PathBuf,
    written: Mutex<Vec<PathBuf>>,
    failure: Mutex<Option<String>>,
}

impl PageWriter {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            written: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    fn write_page(&self, args: &TransferImageArgs) -> Result<PathBuf> {
        let bytes = args.image.to_file_bytes()?;
        let path = self
            .dir
            .join(format!("page-{:03}.{}", args.page, args.image.file_extension()));
        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    fn written(&self) -> Vec<PathBuf> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|f| f.clone())
    }
}

impl ScanObserver for PageWriter {
    fn on_event(&self, event: &ScanEvent) {
        TracingObserver.on_event(event);
    }

    fn on_image_transferred(&self, args: &mut TransferImageArgs) {
        match self.write_page(args) {
            Ok(path) => {
                info!(page = args.page, path = %path.display(), "Saved page");
                if let Ok(mut written) = self.written.lock() {
                    written.push(path);
                }
            }
            Err(e) => {
                error!(page = args.page, "Failed to save page: {:#}", e);
                if let Ok(mut failure) = self.failure.lock() {
                    *failure = Some(format!("{e:#}"));
                }
                args.continue_scanning = false;
            }
        }
    }

    fn on_scanning_complete(&self, error: Option<&TwainError>) {
        if let Some(e) = error {
            if let Ok(mut failure) = self.failure.lock() {
                failure.get_or_insert_with(|| e.to_string());
            }
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

type Session<D> = ScanSession<D, FilterFlag, PageWriter>;

fn run<D, P>(dsm: Arc<D>, window: WindowHandle, command: Command, pump: P) -> Result<()>
where
    D: DsmEntry,
    P: Fn(&mut Session<D>) -> Result<()>,
{
    let out = match &command {
        Command::Scan { out, .. } => out.clone(),
        _ => PathBuf::from("."),
    };
    let writer = Arc::new(PageWriter::new(out));
    let hook = Arc::new(FilterFlag::new(window));
    let mut session = ScanSession::with_observer(dsm, hook, writer.clone(), "twain-cli")?;

    match command {
        Command::Sources => {
            let default = session.default_source_name().ok();
            for name in session.source_names()? {
                let marker = if default.as_deref() == Some(name.as_str()) { "*" } else { " " };
                println!("{marker} {name}");
            }
        }
        Command::Default => println!("{}", session.default_source_name()?),
        Command::Caps { source } => {
            select(&mut session, source.as_deref())?;
            let source = session.source_mut().context("No source available")?;
            source.open_source()?;
            println!("{}", source.identity());
            println!("  paper detectable: {}", source.paper_detectable());
            println!("  duplex: {}", source.supports_duplex());
            for (id, value) in source.describe_capabilities() {
                match value {
                    Ok(value) => println!("  {id}: {value}"),
                    Err(e) => println!("  {id}: <{e}>"),
                }
            }
            source.close();
        }
        Command::Settings { source, save } => {
            select(&mut session, source.as_deref())?;
            let settings = session.current_scan_settings()?;
            print!("{}", toml::to_string_pretty(&settings)?);
            if let Some(path) = save {
                settings.save_to_file(&path)?;
                info!(path = %path.display(), "Settings saved");
            }
        }
        Command::Scan {
            out,
            config,
            source,
            dpi,
            memory,
            show_ui,
        } => {
            select(&mut session, source.as_deref())?;
            let mut settings = load_settings(config.as_deref())?;
            if dpi.is_some() {
                settings.dpi = dpi;
            }
            if memory {
                settings.data_transfer_mode = Some(TransferMode::Memory);
            }
            settings.show_driver_ui |= show_ui;

            fs::create_dir_all(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            if !session.start_scan(&mut settings)? {
                info!("Scan cancelled");
                return Ok(());
            }
            pump(&mut session)?;

            if let Some(failure) = writer.failure() {
                anyhow::bail!("Scan failed: {failure}");
            }
            info!(pages = writer.written().len(), dir = %out.display(), "Scan finished");
        }
    }

    session.close();
    Ok(())
}

fn select<D: DsmEntry>(session: &mut Session<D>, name: Option<&str>) -> Result<()> {
    if let Some(name) = name {
        session.select_source_by_name(name)?;
    }
    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<ScanSettings> {
    match path {
        Some(path) => ScanSettings::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display())),
        None => Ok(ScanSettings::default()),
    }
}

/// The simulated source queues its events; drain them until the scan ends.
fn pump_simulated<D: DsmEntry>(session: &mut Session<D>) -> Result<()> {
    while session.is_scanning() {
        if !session.filter_message(&PlatformMessage::default()) {
            break;
        }
    }
    Ok(())
}

#[cfg(windows)]
fn run_system(command: Command) -> Result<()> {
    let window = win32::HiddenWindow::create()?;
    let dsm = Arc::new(twain_core::Win32Dsm::load()?);
    run(dsm, window.handle(), command, win32::pump)
}

#[cfg(not(windows))]
fn run_system(_command: Command) -> Result<()> {
    anyhow::bail!("No TWAIN data source manager on this platform; use --simulate")
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {e}");
    }

    let result = if args.simulate {
        info!(pages = args.pages, "Using simulated scanner");
        run(
            Arc::new(MockDsm::simulated(args.pages)),
            WindowHandle::NULL,
            args.command,
            pump_simulated,
        )
    } else {
        run_system(args.command)
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
