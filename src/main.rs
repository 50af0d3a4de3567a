use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::Parser;
use disk_storage::{DriverManager, FileOptions, Storage, StorageConfig, StorageDriver};
use futures::TryStreamExt;
use std::{io, sync::Arc};
use tokio::{fs, io::AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    // --- Load disks ---
    let cfg = StorageConfig::load_with_env_fallback(args.config.clone())
        .context("loading storage config")?;
    tracing::debug!("Loaded storage config: {:?}", cfg);

    let storage = Storage::from_config(&cfg, &DriverManager::new())?;
    let disk = match args.disk.as_deref() {
        Some(name) => storage.disk(name)?,
        None => storage.default_disk()?,
    };
    tracing::info!("Using disk {}", disk.disk());

    run(disk, args.command).await
}

async fn run(disk: Arc<dyn StorageDriver>, command: Command) -> Result<()> {
    match command {
        Command::Put {
            path,
            file,
            content_type,
        } => {
            let content = fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file))?;
            let options = content_type.map(FileOptions::with_content_type);
            let stored = disk.put(&path, Bytes::from(content), options).await?;
            println!("{}\t{}", stored.path, stored.url);
        }
        Command::Get { path, output } => {
            let stream = disk
                .get_stream(&path)
                .map_err(io::Error::other);
            let mut reader = StreamReader::new(stream);
            match output {
                Some(output) => {
                    let mut file = fs::File::create(&output)
                        .await
                        .with_context(|| format!("creating {}", output))?;
                    tokio::io::copy(&mut reader, &mut file).await?;
                    file.flush().await?;
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    tokio::io::copy(&mut reader, &mut stdout).await?;
                    stdout.flush().await?;
                }
            }
        }
        Command::Ls { prefix } => {
            for entry in disk.list_objects(&prefix).await {
                println!(
                    "{}\t{}\t{}",
                    entry.last_modified.to_rfc3339(),
                    entry.size,
                    entry.key
                );
            }
        }
        Command::Meta { path } => {
            let meta = disk.meta(&path).await;
            if meta.is_missing() && disk.missing(&path).await {
                bail!("{} not found", path);
            }
            println!("path:           {}", meta.path);
            println!("content-type:   {}", meta.content_type);
            println!("content-length: {}", meta.content_length);
            println!("last-modified:  {}", meta.last_modified.to_rfc3339());
        }
        Command::Exists { path } => {
            let exists = disk.exists(&path).await;
            println!("{}", exists);
            if !exists {
                std::process::exit(1);
            }
        }
        Command::Url { path } => println!("{}", disk.url(&path).await?),
        Command::Sign { path, minutes } => println!("{}", disk.signed_url(&path, minutes).await?),
        Command::Rm { paths } => {
            if !disk.delete_in_batches(&paths).await {
                bail!("batch delete failed; some objects may remain");
            }
        }
        Command::RmPath { prefix } => {
            if !disk.delete_path(&prefix).await {
                bail!("delete under {} stopped partway", prefix);
            }
        }
        Command::Cp { from, to } => {
            let copied = disk.copy(&from, &to).await?;
            println!("{}\t{}", copied.path, copied.url);
        }
        Command::Mv { from, to } => {
            let moved = disk.move_to(&from, &to).await?;
            println!("{}\t{}", moved.path, moved.url);
        }
    }
    Ok(())
}
