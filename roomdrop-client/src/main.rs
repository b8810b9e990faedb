use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roomdrop_client::config::ClientConfig;
use roomdrop_client::session::{room_id_from_link, share_link, upload_to_room};
use roomdrop_client::{merge, HttpRoomClient, RoomSession, RoomTransport};
use roomdrop_common::backend::UploadFile;
use roomdrop_common::record::FileRecord;
use roomdrop_common::room::RoomId;

#[derive(Parser)]
#[command(name = "roomdrop")]
#[command(about = "Share files through ephemeral rooms")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server URL, overrides the config file
    #[arg(long)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new room and print its identifier
    Create,
    /// Upload a file into a room
    Upload {
        /// Room identifier or share link
        room: String,
        file: PathBuf,
    },
    /// List the files in a room once
    List {
        /// Room identifier or share link
        room: String,
    },
    /// Follow a room's file list until interrupted
    Watch {
        /// Room identifier or share link
        room: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::load_or_default(cli.config.as_deref())?;
    if let Some(server) = cli.server {
        config.server_url = server;
        config.validate()?;
    }

    let transport: Arc<dyn RoomTransport> = Arc::new(HttpRoomClient::new(&config.server_url));

    match cli.command {
        Commands::Create => {
            let room = transport.create_room().await?;
            println!("{}", room);
            if let Some(base) = &config.share_base_url {
                println!("{}", share_link(base, &room));
            }
        }
        Commands::Upload { room, file } => {
            let room = resolve_room(&room)?;
            let upload = read_upload(&file).await?;
            let record = upload_to_room(transport.as_ref(), &room, upload).await?;
            print_record(&record);
        }
        Commands::List { room } => {
            let room = resolve_room(&room)?;
            let files = merge(Vec::new(), transport.list_files(&room).await?);
            if files.is_empty() {
                println!("No files in room {}", room);
            }
            for record in &files {
                print_record(record);
            }
        }
        Commands::Watch { room } => {
            let mut session = RoomSession::new(transport, config.poll_interval());
            if let Some(base) = config.share_base_url {
                session = session.with_share_base_url(base);
            }
            enter(&mut session, &room)?;
            watch(&mut session).await?;
        }
    }

    Ok(())
}

fn resolve_room(arg: &str) -> anyhow::Result<RoomId> {
    if arg.contains("://") {
        Ok(room_id_from_link(arg)?)
    } else {
        Ok(RoomId::parse(arg.trim())?)
    }
}

fn enter(session: &mut RoomSession, arg: &str) -> anyhow::Result<()> {
    if arg.contains("://") {
        session.join_from_link(arg)?;
    } else {
        session.join(arg)?;
    }
    Ok(())
}

async fn read_upload(path: &Path) -> anyhow::Result<UploadFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let mime_type = mime_guess::from_path(path).first_or_octet_stream().to_string();
    Ok(UploadFile {
        bytes: Bytes::from(bytes),
        filename,
        mime_type,
    })
}

fn print_record(record: &FileRecord) {
    println!(
        "{}\t{}\t{}\t{}",
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.display_size(),
        record.display_name(),
        record.download_url
    );
}

async fn watch(session: &mut RoomSession) -> anyhow::Result<()> {
    let mut view = session.view()?;
    if let Some(room) = session.room_id() {
        match session.share_link() {
            Ok(link) => println!("Watching room {} ({})", room, link),
            Err(_) => println!("Watching room {}", room),
        }
    }

    let mut shown: HashSet<String> = HashSet::new();
    let mut last_notice: Option<String> = None;

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = view.borrow_and_update().clone();
                if state.notice != last_notice {
                    if let Some(notice) = &state.notice {
                        eprintln!("{}", notice);
                    }
                    last_notice = state.notice.clone();
                }
                // Files are newest first; print oldest new arrivals first.
                for record in state.files.iter().rev() {
                    if shown.insert(record.storage_key.clone()) {
                        print_record(record);
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.leave();
    Ok(())
}
