use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

use s3_storage::s3::ObjectClient;
use s3_storage::{S3Config, S3Storage, Storage};

#[derive(Parser, Debug)]
#[command(
    name = "s3storage",
    version = env!("CARGO_PKG_VERSION"),
    author = "Tyr Chen <tyr.chen@gmail.com>",
    about = "Manage files in an S3-compatible bucket",
    long_about = "Upload, download, stream, list and delete files in an S3-compatible bucket (AWS S3, MinIO, ...). \
                  Configure the endpoint and credentials via environment variables or a .env file.",
    after_help = "Examples:\n  \
                  s3storage upload ./video.mp4 videos/video.mp4   # Upload a file\n  \
                  s3storage get videos/video.mp4 ./copy.mp4       # Stream to a file with progress\n  \
                  s3storage cat notes/todo.txt                    # Print a file\n  \
                  s3storage ls videos/                            # List files under a prefix\n  \
                  s3storage link videos/video.mp4                 # 7-day pre-signed URL\n  \
                  s3storage rm a.txt b.txt                        # Delete files\n\n\
                  Configuration (.env):\n  \
                  S3_ENDPOINT=localhost:9000\n  \
                  S3_BUCKET_NAME=esperoj\n  \
                  S3_ACCESS_KEY=minioadmin\n  \
                  S3_SECRET_KEY=minioadmin\n  \
                  S3_SECURE=false\n  \
                  S3_REGION=eu-central-1"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a local file
    Upload { src: PathBuf, dst: String },

    /// Download a file to a local path
    Download { src: String, dst: PathBuf },

    /// Stream a file to a local path with a progress bar
    Get { src: String, dst: PathBuf },

    /// Write the content of a file to stdout
    Cat { src: String },

    /// Check whether a file exists
    Exists { path: String },

    /// Print a pre-signed download URL (valid for 7 days)
    Link { path: String },

    /// List all files under a prefix
    Ls {
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Delete files
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Print the size of a file in bytes
    Size { src: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file early to get LOG_LEVEL
    dotenv::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = S3Config::from_env().context("Invalid S3 configuration")?;
    let storage = S3Storage::new(config).await;
    info!(
        "{} at {} (bucket: {})",
        storage.name(),
        storage.config().endpoint_url(),
        storage.bucket()
    );

    match cli.command {
        Command::Upload { src, dst } => {
            storage
                .upload_file(&src, &dst)
                .await
                .with_context(|| format!("Failed to upload {}", src.display()))?;
            println!(
                "{} {} → s3://{}/{}",
                style("✓").green().bold(),
                src.display(),
                storage.bucket(),
                dst
            );
        }
        Command::Download { src, dst } => {
            storage
                .download_file(&src, &dst)
                .await
                .with_context(|| format!("Failed to download {}", src))?;
            println!(
                "{} s3://{}/{} → {}",
                style("✓").green().bold(),
                storage.bucket(),
                src,
                dst.display()
            );
        }
        Command::Get { src, dst } => stream_to_file(&storage, &src, &dst).await?,
        Command::Cat { src } => {
            let mut stream = storage.get_file(&src).await?;
            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = stream.next().await {
                stdout.write_all(&chunk?).await?;
            }
            stdout.flush().await?;
        }
        Command::Exists { path } => {
            if storage.file_exists(&path).await? {
                println!("{} {}", style("EXISTS").green().bold(), path);
            } else {
                println!("{} {}", style("MISSING").yellow().bold(), path);
                std::process::exit(1);
            }
        }
        Command::Link { path } => {
            println!("{}", storage.get_link(&path).await?);
        }
        Command::Ls { prefix } => {
            for file in storage.list_files(&prefix).await? {
                println!("{}", file);
            }
        }
        Command::Rm { paths } => {
            let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
            let response = storage.delete_files(&paths).await;

            for error in &response.errors {
                eprintln!(
                    "{} {}: {}",
                    style("FAILED").red().bold(),
                    error.path,
                    style(&error.message).dim()
                );
            }

            let deleted = paths.len() - response.errors.len();
            println!(
                "{}",
                style(format!(
                    "Summary: {} deleted, {} failed",
                    deleted,
                    response.errors.len()
                ))
                .bold()
            );

            if !response.is_success() {
                std::process::exit(1);
            }
        }
        Command::Size { src } => {
            let size = storage.size(&src).await?;
            println!("{} ({})", size, format_size(size));
        }
    }

    Ok(())
}

/// Stream a file to disk, showing progress against the size reported by S3
///
/// The length comes straight from the object metadata so that empty files,
/// which `Storage::size` reports as missing, can still be fetched.
async fn stream_to_file<C: ObjectClient>(
    storage: &S3Storage<C>,
    src: &str,
    dst: &Path,
) -> Result<()> {
    let total = storage.client().stat_object(storage.bucket(), src).await?.size;
    let mut stream = storage.get_file(src).await?;

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(stream.key().to_string());

    let mut file = tokio::fs::File::create(dst)
        .await
        .with_context(|| format!("Failed to create {}", dst.display()))?;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        pb.inc(chunk.len() as u64);
    }
    file.flush().await?;

    pb.finish_with_message(format!("✓ {}", dst.display()));

    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3_storage::s3::MemoryClient;
    use tempfile::TempDir;

    fn storage_with(key: &str, content: &'static str) -> S3Storage<MemoryClient> {
        let storage = S3Storage::with_client(S3Config::default(), MemoryClient::with_chunk_size(3));
        storage.client().insert("esperoj", key, content);
        storage
    }

    #[tokio::test]
    async fn test_stream_to_file_copies_content() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("notes.txt");
        let storage = storage_with("notes.txt", "remember the milk");

        stream_to_file(&storage, "notes.txt", &dst).await.unwrap();

        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "remember the milk");
    }

    #[tokio::test]
    async fn test_stream_to_file_handles_empty_file() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("empty.txt");
        let storage = storage_with("empty.txt", "");

        stream_to_file(&storage, "empty.txt", &dst).await.unwrap();

        assert!(dst.exists());
        assert_eq!(std::fs::read(&dst).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_stream_to_file_missing_file() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("ghost.txt");
        let storage = storage_with("other.txt", "x");

        assert!(stream_to_file(&storage, "ghost.txt", &dst).await.is_err());
        assert!(!dst.exists());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_cli_parses_rm() {
        let cli = Cli::parse_from(["s3storage", "rm", "a.txt", "b.txt"]);
        match cli.command {
            Command::Rm { paths } => assert_eq!(paths, vec!["a.txt", "b.txt"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_ls_defaults_to_root() {
        let cli = Cli::parse_from(["s3storage", "ls"]);
        assert!(matches!(cli.command, Command::Ls { ref prefix } if prefix.is_empty()));
    }
}
