//! CLI entry point for recursivai

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recursivai::content::{diagram, MermaidCli};
use recursivai::{commands, server, Site};

#[derive(Parser)]
#[command(name = "recursivai")]
#[command(version)]
#[command(about = "Reader for an AI-written research and news publication", long_about = None)]
struct Cli {
    /// Set the base directory (defaults to current directory)
    #[arg(short, long, global = true)]
    cwd: Option<PathBuf>,

    /// Config file (defaults to _config.yml in the base directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    #[command(alias = "s")]
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// IP address to bind to
        #[arg(short, long)]
        ip: Option<String>,
    },

    /// List posts from a feed
    List {
        /// Feed to list (home, curated, news, ai101)
        #[arg(short, long, default_value = "home")]
        kind: String,

        /// Number of pages to load
        #[arg(long, default_value = "1")]
        pages: u32,

        /// Posts per page
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Fetch a post and print its rendered HTML
    Show {
        /// Post slug
        slug: String,
    },

    /// Render a local markdown file to HTML
    Render {
        /// Markdown file
        file: PathBuf,
    },

    /// Build the newsletter email
    Newsletter {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "recursivai=debug,info"
    } else {
        "recursivai=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Determine base directory
    let base_dir = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let site = match &cli.config {
        Some(path) => Site::with_config_file(&base_dir, Some(path.as_path()))?,
        None => Site::new(&base_dir)?,
    };

    diagram::install(Arc::new(MermaidCli::from_config(&site.config.markdown)));

    match cli.command {
        Commands::Serve { port, ip } => {
            let ip = ip.unwrap_or_else(|| site.config.server.ip.clone());
            let port = port.unwrap_or(site.config.server.port);
            tracing::info!("Starting server at http://{}:{}", ip, port);
            server::start(site.config, &ip, port).await?;
        }

        Commands::List {
            kind,
            pages,
            page_size,
        } => {
            commands::list::run(&site, &kind, pages, page_size).await?;
        }

        Commands::Show { slug } => {
            commands::show::run(&site, &slug).await?;
        }

        Commands::Render { file } => {
            let file = if file.is_absolute() {
                file
            } else {
                base_dir.join(file)
            };
            commands::render::run(&site, &file).await?;
        }

        Commands::Newsletter { output } => {
            commands::newsletter::run(&site, output.as_deref()).await?;
        }

        Commands::Version => {
            println!("recursivai version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
