use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use mini_fds::core::config::{DEFAULT_DIRECTORY_PORT, EVICTION_TTL, SWEEP_INTERVAL};
use mini_fds::utils::setup_logging;
use mini_fds::{
    ChunkStore, Config, DirectoryConfig, DirectoryServer, Node, P2PError, Result, ServeMode,
    SharedFolder,
};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "mini-fds")]
#[command(about = "A minimal peer-to-peer file distribution network")]
#[command(version)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Serve {
    Chunks,
    Shared,
}

impl From<Serve> for ServeMode {
    fn from(serve: Serve) -> Self {
        match serve {
            Serve::Chunks => ServeMode::Chunks,
            Serve::Shared => ServeMode::Shared,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bootstrap directory service
    Directory {
        #[arg(short, long, default_value_t = DEFAULT_DIRECTORY_PORT)]
        port: u16,
        /// Seconds between eviction sweeps
        #[arg(long, default_value_t = SWEEP_INTERVAL.as_secs())]
        sweep_secs: u64,
        /// Seconds of silence before a peer is evicted
        #[arg(long, default_value_t = EVICTION_TTL.as_secs())]
        ttl_secs: u64,
    },
    /// Start a peer
    Peer {
        /// Directory address (host:port)
        #[arg(short, long)]
        bootstrap: String,
        /// Peer id, random when omitted
        #[arg(long)]
        id: Option<String>,
        /// Address to advertise
        #[arg(long)]
        ip: Option<IpAddr>,
        /// Transfer port (0 picks a free one)
        #[arg(short, long, default_value_t = 0)]
        port: u16,
        #[arg(long, default_value = ".")]
        storage_dir: PathBuf,
        #[arg(long, default_value = "shared_folder")]
        shared_dir: PathBuf,
        #[arg(long, value_enum, default_value = "chunks")]
        serve: Serve,
        /// Enable LAN discovery on this UDP port
        #[arg(long)]
        discovery_port: Option<u16>,
        /// File to fetch once the target peer is known
        #[arg(long, requires = "target")]
        file: Option<String>,
        /// Peer id to fetch from
        #[arg(long, requires = "file")]
        target: Option<String>,
        /// Re-hash chunks when serving them
        #[arg(long)]
        verify_chunks: bool,
    },
    /// Put a local file into the chunk store
    Store {
        path: PathBuf,
        /// Name to store under (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = ".")]
        storage_dir: PathBuf,
    },
    /// Manage the shared folder
    Files {
        #[arg(long, default_value = "shared_folder", global = true)]
        shared_dir: PathBuf,
        #[command(subcommand)]
        action: FilesAction,
    },
}

#[derive(Subcommand)]
enum FilesAction {
    List,
    Add { path: PathBuf },
    Remove { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Directory {
            port,
            sweep_secs,
            ttl_secs,
        } => {
            let config = DirectoryConfig {
                listen_addr: format!("0.0.0.0:{}", port),
                sweep_interval: Duration::from_secs(sweep_secs),
                eviction_ttl: Duration::from_secs(ttl_secs),
            };
            run_directory(config).await?;
        }
        Commands::Peer {
            bootstrap,
            id,
            ip,
            port,
            storage_dir,
            shared_dir,
            serve,
            discovery_port,
            file,
            target,
            verify_chunks,
        } => {
            let config = Config {
                peer_id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                bootstrap_addr: bootstrap,
                listen_ip: ip,
                port,
                storage_dir,
                shared_dir,
                serve_mode: serve.into(),
                verify_chunks,
                discovery_port,
                ..Config::default()
            };

            let mut node = Node::new(config).await?;
            node.start().await?;

            if let (Some(file), Some(target)) = (file, target) {
                fetch_once(&node, &target, &file).await;
            }

            node.run_until_ctrl_c().await?;
        }
        Commands::Store {
            path,
            name,
            storage_dir,
        } => {
            let name = match name {
                Some(name) => name,
                None => file_name_of(&path)?,
            };
            let data = tokio::fs::read(&path).await?;
            let store = ChunkStore::open(&storage_dir).await?;
            let meta = store.store(&name, &data).await?;

            println!(
                "Stored {} ({} bytes, {} chunks)",
                meta.filename,
                data.len(),
                meta.chunk_hashes.len()
            );
            for hash in &meta.chunk_hashes {
                println!("  {}", hash);
            }
        }
        Commands::Files { shared_dir, action } => {
            let folder = SharedFolder::new(shared_dir).await?;
            match action {
                FilesAction::List => {
                    let files = folder.list_files().await?;
                    if files.is_empty() {
                        println!("No files in {:?}", folder.path());
                    }
                    for file in files {
                        println!("  {}", file);
                    }
                }
                FilesAction::Add { path } => {
                    let name = file_name_of(&path)?;
                    let data = tokio::fs::read(&path).await?;
                    folder.add_file(&name, &data).await?;
                    println!("Added {}", name);
                }
                FilesAction::Remove { name } => {
                    folder.remove_file(&name).await?;
                    println!("Removed {}", name);
                }
            }
        }
    }

    Ok(())
}

async fn run_directory(config: DirectoryConfig) -> Result<()> {
    let server = DirectoryServer::bind(config).await?;
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down directory");
            let _ = shutdown_tx.send(()).await;
        }
    });

    server.run(shutdown_rx).await
}

async fn fetch_once(node: &Node, target: &str, file: &str) {
    let wait = node.config.peer_refresh_interval * 2;
    if let Err(e) = node.wait_for_peer(target, wait).await {
        error!("Cannot fetch {}: {}", file, e);
        return;
    }
    match node.fetch_to(target, file, Path::new(".")).await {
        Ok(path) => println!("Saved {} to {:?}", file, path),
        Err(e) => error!("Failed to fetch {} from {}: {}", file, target, e),
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| P2PError::InvalidFilename(path.display().to_string()))
}
