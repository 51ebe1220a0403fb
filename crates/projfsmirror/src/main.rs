//! projfsmirror CLI - Project a local directory into a ProjFS virtualization root.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "projfsmirror")]
#[command(about = "Project a local directory into a virtualization root using Windows ProjFS")]
#[command(version)]
#[cfg_attr(not(windows), allow(dead_code))]
struct Args {
    /// Directory whose contents are projected
    #[arg(value_name = "BACKING_ROOT")]
    backing_root: PathBuf,

    /// Virtualization root directory (created if missing)
    #[arg(value_name = "VIRTUAL_ROOT")]
    virtual_root: PathBuf,

    /// Bytes read from the backing store per write
    #[arg(long, value_name = "BYTES", default_value_t = mirrorfs::options::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// ProjFS worker threads [default: twice the processor count]
    #[arg(long, value_name = "N")]
    threads: Option<u32>,

    /// Match names case-sensitively
    #[arg(long)]
    case_sensitive: bool,

    /// Let ProjFS cache paths reported as missing
    #[arg(long)]
    negative_path_cache: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    run(args)
}

#[cfg(not(windows))]
fn run(_args: Args) -> anyhow::Result<()> {
    anyhow::bail!("ProjFS is only available on Windows")
}

#[cfg(windows)]
fn run(args: Args) -> anyhow::Result<()> {
    use std::sync::Arc;

    use anyhow::Context;
    use mirrorfs::{CaseSensitivity, Enlistment, MirrorOptions, MirrorVirtualizer};
    use projfsmirror::ProjFsInstance;

    let enlistment = Enlistment::new(&args.virtual_root, &args.backing_root)
        .context("Cannot set up virtualization root")?;

    let mut options = MirrorOptions::default()
        .with_chunk_size(args.chunk_size)
        .with_negative_path_cache(args.negative_path_cache);
    if args.case_sensitive {
        options = options.with_case_sensitivity(CaseSensitivity::Sensitive);
    }
    if let Some(threads) = args.threads {
        options = options.with_thread_count(threads);
    }

    let provider = Arc::new(MirrorVirtualizer::new(
        enlistment,
        options,
        ProjFsInstance::new(),
    ));

    tracing::info!(
        "Marking {} as virtualization root",
        args.virtual_root.display()
    );
    provider.mark_virtualization_root()?;

    tracing::info!("Starting ProjFS virtualization...");
    provider.start()?;

    println!(
        "Projecting {} at {}",
        args.backing_root.display(),
        args.virtual_root.display()
    );
    println!("Press Ctrl+C to stop...");

    let provider_for_handler = provider.clone();
    ctrlc_handler(move || {
        tracing::info!("Received shutdown signal");
        provider_for_handler.stop();
        std::process::exit(0);
    })?;

    // Keep running
    loop {
        std::thread::park();
    }
}

#[cfg(windows)]
fn ctrlc_handler<F: Fn() + Send + Sync + 'static>(handler: F) -> anyhow::Result<()> {
    use std::sync::OnceLock;
    use windows::core::BOOL;
    use windows::Win32::System::Console::SetConsoleCtrlHandler;

    // CTRL_C_EVENT = 0, CTRL_BREAK_EVENT = 1
    const CTRL_C_EVENT: u32 = 0;
    const CTRL_BREAK_EVENT: u32 = 1;

    static HANDLER: OnceLock<Box<dyn Fn() + Send + Sync>> = OnceLock::new();
    HANDLER.get_or_init(|| Box::new(handler));

    unsafe extern "system" fn ctrl_handler(ctrl_type: u32) -> BOOL {
        if ctrl_type == CTRL_C_EVENT || ctrl_type == CTRL_BREAK_EVENT {
            if let Some(handler) = HANDLER.get() {
                handler();
            }
            BOOL(1)
        } else {
            BOOL(0)
        }
    }

    // SAFETY: ctrl_handler is a valid extern "system" fn
    unsafe {
        SetConsoleCtrlHandler(Some(ctrl_handler), true)?;
    }

    Ok(())
}
