use clap::{Parser, Subcommand};
use darkroom::config::{AppConfig, PhotoDirs};
use darkroom::imaging::PixelBackend;
use darkroom::{batch, freshness, reap, server, watch};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "darkroom")]
#[command(version)]
#[command(about = "Derived-image cache and HTTP image service for photo portfolios")]
#[command(long_about = "\
Derived-image cache and HTTP image service for photo portfolios

Your photos directory is the data source. Drop originals in the root and
darkroom maintains the derived tree next to them:

  photos/
  ├── dawn.jpg                     # source image (jpg/jpeg/png/webp)
  ├── thumbnails/dawn.webp         # 400px  q80
  ├── medium/dawn.webp             # 800px  q85
  ├── optimized/dawn.webp          # 1920px q85
  ├── thumbnails-avif/dawn.avif    # 400px  q60   (medium-/optimized- too)
  ├── lqip/dawn.txt                # inline blur-up placeholder
  └── cache/dynamic/               # on-demand sizes from /api/image

serve runs the HTTP API (content-negotiated /api/image, gallery JSON,
optimize endpoints); process derives whatever is stale and exits; watch
keeps deriving as files change; cleanup deletes derived files whose source
is gone.")]
struct Cli {
    /// Photos root directory (overrides the config file)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file
    #[arg(long, default_value = "darkroom.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Bind address, e.g. 127.0.0.1:3000 (overrides the config file)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Derive all stale images once and exit
    Process,
    /// Show derivation status: total, processed, and the stale list
    Status,
    /// Delete derived files whose source image is gone
    Cleanup,
    /// Watch the photos directory and keep the derived tree current
    Watch,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("darkroom=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    let root = cli
        .root
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.photos_root));
    let dirs = PhotoDirs::new(root);

    match cli.command {
        Command::Serve { bind } => {
            let addr = match bind {
                Some(addr) => addr,
                None => format!("{}:{}", config.server.bind, config.server.port).parse()?,
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(dirs, addr))?;
        }
        Command::Process => {
            let backend = PixelBackend::new();
            let report = batch::process_all(&dirs, &backend, |current, total, file| {
                println!("Processing {current}/{total}: {file}");
            });
            println!(
                "Completed: {} processed, {} errors",
                report.processed.len(),
                report.errors.len()
            );
            for failure in &report.errors {
                eprintln!("  {}: {}", failure.file, failure.error);
            }
            if !report.errors.is_empty() {
                std::process::exit(1);
            }
        }
        Command::Status => {
            let all = freshness::list_photo_files(&dirs);
            let stale = freshness::list_stale(&dirs);
            println!("Photos:      {}", all.len());
            println!("Processed:   {}", all.len() - stale.len());
            println!("Unprocessed: {}", stale.len());
            for file in &stale {
                println!("  {file}");
            }
        }
        Command::Cleanup => {
            let deleted = reap::reap_orphans(&dirs)?;
            println!("Deleted {} orphaned files", deleted.len());
            for path in &deleted {
                println!("  {path}");
            }
        }
        Command::Watch => {
            let backend = PixelBackend::new();
            let debounce = Duration::from_millis(config.watch.debounce_ms);
            watch::watch(&dirs, &backend, debounce)?;
        }
    }

    Ok(())
}
