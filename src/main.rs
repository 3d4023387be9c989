use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shine_loader::{LoaderConfig, NativeLibrary, Registry, SymbolSchema};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Shine Loader - resolve and probe native libraries
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Override the library path pattern
    #[arg(short, long)]
    pattern: Option<String>,

    /// Override the assets directory
    #[arg(short, long)]
    assets: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the path a library name resolves to
    Resolve {
        /// Logical library name
        name: String,
    },
    /// Load a library, bind the given symbols, and report the result
    Probe {
        /// Logical library name
        name: String,

        /// Symbol that must be exported (repeatable)
        #[arg(short, long = "symbol")]
        symbols: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    let mut config = if let Some(config_path) = &args.config {
        LoaderConfig::load_from_file(config_path)?
    } else {
        LoaderConfig::load_default()?
    };

    if let Some(pattern) = args.pattern {
        config.library_path = pattern;
    }
    if let Some(assets) = args.assets {
        config.assets_dir = assets;
    }

    match args.command {
        Command::Resolve { name } => {
            println!("{}", config.resolver().resolve(&name).display());
        }
        Command::Probe { name, symbols } => {
            let registry = Registry::from_config(&config)?;
            let library = registry.dynamic_library(SymbolSchema::new(name.as_str(), symbols))?;
            let table = library
                .load_api()
                .with_context(|| format!("Failed to load {name}"))?;

            let info = serde_yaml::to_string(&library.info())
                .context("Failed to serialize library info")?;
            print!("{info}");
            for (symbol, addr) in table.iter() {
                println!("  {symbol}: {addr:?}");
            }

            registry.unload_all()?;
        }
    }

    Ok(())
}
