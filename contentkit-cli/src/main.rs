use clap::{Parser, Subcommand};
use contentkit::watcher::WatchEvent;
use contentkit::{Builder, ChangeOutcome};
use log::LevelFilter;
use std::error::Error;
use std::path::PathBuf;
use std::process;

/// contentkit: turn a content tree into validated, typed collections
#[derive(Parser)]
#[command(name = "contentkit", version, about)]
struct Cli {
    /// Path to the config file
    #[arg(long, short, default_value = "contentkit.yaml", global = true)]
    config: PathBuf,

    /// Remove the output directory before building
    #[arg(long, global = true)]
    clean: bool,

    /// Log every step
    #[arg(long, global = true, conflicts_with = "silent")]
    verbose: bool,

    /// Only log errors
    #[arg(long, global = true)]
    silent: bool,

    /// Trace logging and full error chains
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve all collections and write the output once
    Build {
        /// Keep running and rebuild on changes
        #[arg(long)]
        watch: bool,
    },

    /// Build, then watch for changes
    Dev,
}

impl Cli {
    fn log_level(&self) -> Option<LevelFilter> {
        if self.debug {
            Some(LevelFilter::Trace)
        } else if self.verbose {
            Some(LevelFilter::Debug)
        } else if self.silent {
            Some(LevelFilter::Error)
        } else {
            None
        }
    }
}

fn init_logging(cli: &Cli) {
    let mut logger = match cli.log_level() {
        Some(level) => {
            let mut logger = env_logger::Builder::new();
            logger.filter_level(level);
            logger
        }
        None => env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")),
    };
    logger.format_timestamp(None).format_target(cli.debug).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let debug = cli.debug;

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        if debug {
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            eprintln!("{e:?}");
        }
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let watch = match cli.command {
        Command::Build { watch } => watch,
        Command::Dev => true,
    };

    let builder = Builder::open(&cli.config)?;
    if cli.clean {
        builder.clean().await?;
    }

    match builder.build().await {
        Ok(summary) => log::info!("{summary}"),
        // a broken tree is reported but does not stop dev mode
        Err(e) if watch => log::error!("{e}"),
        Err(e) => return Err(e.into()),
    }

    if watch {
        watch_loop(cli.config, builder).await?;
    }
    Ok(())
}

/// Rebuild on every debounced batch of changes. A config change reopens the
/// builder and restarts the watcher so new patterns and directories apply.
async fn watch_loop(config: PathBuf, mut builder: Builder) -> Result<(), Box<dyn Error>> {
    loop {
        let mut watcher = builder.watch()?;
        log::info!(
            "Watching {} for changes",
            builder.context().content_root.display()
        );

        loop {
            let first = tokio::select! {
                event = watcher.events.recv() => event,
                _ = tokio::signal::ctrl_c() => return Ok(()),
            };
            let Some(first) = first else {
                return Ok(());
            };
            let mut batch: Vec<WatchEvent> = vec![first];
            while let Ok(event) = watcher.events.try_recv() {
                batch.push(event);
            }

            match builder.handle_changes(&batch).await {
                Ok(ChangeOutcome::Rebuilt(summary)) => log::info!("{summary}"),
                Ok(ChangeOutcome::Ignored) => {}
                Ok(ChangeOutcome::ConfigChanged) => break,
                Err(e) => log::error!("{e}"),
            }
        }

        drop(watcher);
        log::info!("{} changed, restarting", config.display());
        match Builder::open(&config) {
            Ok(reopened) => {
                builder = reopened;
                match builder.build().await {
                    Ok(summary) => log::info!("{summary}"),
                    Err(e) => log::error!("{e}"),
                }
            }
            // keep the previous builder; the next config save retries
            Err(e) => log::error!("{e}"),
        }
    }
}
