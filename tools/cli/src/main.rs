//! filestore CLI - Command line interface for local file storage.
//!
//! Drives the filesystem backend: upload, inspect, copy, bundle and remove
//! stored files, and run the content validation engine on local files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use filestore_common::{ByteStream, Error, FileId, FileRecord};
use filestore_content::{ContentValidationOptions, ContentValidator};
use filestore_storage::{FileStorage, FileSystemStorageOptions, LocalFileStorage};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Parser)]
#[command(name = "filestore")]
#[command(about = "filestore - Local file storage with content validation")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file (storage root and validation rules).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage root, used when no configuration file is given.
    #[arg(short, long, default_value = "filestore-data")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a local file.
    Upload {
        /// File to upload.
        #[arg(short, long)]
        file: PathBuf,

        /// Stored name (default: the file's own name).
        #[arg(short, long)]
        name: Option<String>,

        /// Declared content type.
        #[arg(short = 't', long, default_value = DEFAULT_CONTENT_TYPE)]
        content_type: String,
    },

    /// Write a stored file to disk.
    Download {
        /// File id.
        #[arg(short, long)]
        id: String,

        /// Destination path.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show a stored file's metadata.
    Info {
        /// File id.
        #[arg(short, long)]
        id: String,
    },

    /// Duplicate a stored file under a new id.
    Copy {
        /// File id.
        #[arg(short, long)]
        id: String,

        /// Name for the copy (default: the original name).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Remove a stored file.
    Delete {
        /// File id.
        #[arg(short, long)]
        id: String,
    },

    /// Bundle stored files into a zip archive.
    Zip {
        /// File ids.
        #[arg(short, long, num_args = 1.., required = true)]
        ids: Vec<String>,

        /// Destination path.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print a URL for a stored file.
    Url {
        /// File id.
        #[arg(short, long)]
        id: String,
    },

    /// Run content validation on a local file without storing it.
    Check {
        /// File to check.
        #[arg(short, long)]
        file: PathBuf,

        /// Declared content type.
        #[arg(short = 't', long)]
        content_type: String,
    },
}

/// Contents of the `--config` file.
#[derive(Debug, Deserialize)]
struct CliConfig {
    storage: FileSystemStorageOptions,
    #[serde(default)]
    content_validation: ContentValidationOptions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref(), &cli.root)?;
    let validator = ContentValidator::from_options(&config.content_validation)
        .context("Invalid content validation rules")?;

    if let Commands::Check { file, content_type } = &cli.command {
        return cmd_check(&validator, file, content_type).await;
    }

    let storage = LocalFileStorage::new(&config.storage, validator)
        .context("Failed to open storage root")?;
    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Upload {
            file,
            name,
            content_type,
        } => cmd_upload(&storage, &file, name.as_deref(), &content_type, &cancel).await,

        Commands::Download { id, output } => cmd_download(&storage, &id, &output, &cancel).await,

        Commands::Info { id } => cmd_info(&storage, &id, &cancel).await,

        Commands::Copy { id, name } => cmd_copy(&storage, &id, name.as_deref(), &cancel).await,

        Commands::Delete { id } => cmd_delete(&storage, &id, &cancel).await,

        Commands::Zip { ids, output } => cmd_zip(&storage, &ids, &output, &cancel).await,

        Commands::Url { id } => cmd_url(&storage, &id, &cancel).await,

        Commands::Check { .. } => Ok(()),
    }
}

/// Read the configuration file, or fall back to defaults rooted at `root`.
fn load_config(path: Option<&Path>, root: &Path) -> Result<CliConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("Invalid config {}", path.display()))
        }
        None => Ok(CliConfig {
            storage: FileSystemStorageOptions {
                storage_root_path: root.to_path_buf(),
                allow_download_url: true,
            },
            content_validation: ContentValidationOptions::default(),
        }),
    }
}

fn parse_id(id: &str) -> Result<FileId> {
    FileId::parse(id).context("Invalid file id")
}

async fn open_file(path: &Path) -> Result<ByteStream> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(ReaderStream::new(file).map_err(Error::from).boxed())
}

async fn write_file(path: &Path, mut content: ByteStream) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut written = 0u64;

    while let Some(chunk) = content.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

/// Rebuild a record from what the backend stores.
async fn load_record(
    storage: &LocalFileStorage,
    id: FileId,
    cancel: &CancellationToken,
) -> Result<FileRecord> {
    let mut file = storage
        .download_with_metadata(id, cancel)
        .await
        .context("Failed to read file")?;

    let mut size = 0u64;
    while let Some(chunk) = file.content.next().await {
        size += chunk?.len() as u64;
    }

    Ok(FileRecord::with_id(id, file.name, size, file.content_type)?)
}

fn print_record(record: &FileRecord) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

/// Store a local file.
async fn cmd_upload(
    storage: &LocalFileStorage,
    file: &Path,
    name: Option<&str>,
    content_type: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let name = match name {
        Some(name) => name.to_string(),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("Cannot derive a name from the file path")?,
    };

    info!("Uploading {} as '{}'", file.display(), name);
    let content = open_file(file).await?;
    let record = storage
        .upload(&name, content, content_type, cancel)
        .await
        .context("Upload failed")?;

    print_record(&record)
}

/// Write a stored file to disk.
async fn cmd_download(
    storage: &LocalFileStorage,
    id: &str,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let content = storage
        .download(parse_id(id)?, cancel)
        .await
        .context("Download failed")?;
    let written = write_file(output, content).await?;

    println!("Wrote {} bytes to {}", written, output.display());
    Ok(())
}

/// Show a stored file's metadata.
async fn cmd_info(storage: &LocalFileStorage, id: &str, cancel: &CancellationToken) -> Result<()> {
    let record = load_record(storage, parse_id(id)?, cancel).await?;
    print_record(&record)
}

/// Duplicate a stored file.
async fn cmd_copy(
    storage: &LocalFileStorage,
    id: &str,
    name: Option<&str>,
    cancel: &CancellationToken,
) -> Result<()> {
    let record = load_record(storage, parse_id(id)?, cancel).await?;
    let copy = storage
        .copy(&record, name, cancel)
        .await
        .context("Copy failed")?;

    print_record(&copy)
}

/// Remove a stored file.
async fn cmd_delete(
    storage: &LocalFileStorage,
    id: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let id = parse_id(id)?;
    storage.delete(id, cancel).await.context("Delete failed")?;

    println!("Deleted {}", id);
    Ok(())
}

/// Bundle stored files into a zip archive.
async fn cmd_zip(
    storage: &LocalFileStorage,
    ids: &[String],
    output: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let ids = ids
        .iter()
        .map(|id| parse_id(id))
        .collect::<Result<Vec<_>>>()?;

    let archive = storage
        .download_zip(&ids, cancel)
        .await
        .context("Failed to build archive")?;
    let written = write_file(output, archive).await?;

    println!("Archived {} files ({} bytes) to {}", ids.len(), written, output.display());
    Ok(())
}

/// Print a URL for a stored file.
async fn cmd_url(storage: &LocalFileStorage, id: &str, cancel: &CancellationToken) -> Result<()> {
    let url = storage
        .get_file_url(parse_id(id)?, cancel)
        .await
        .context("Failed to get URL")?;

    println!("{}", url);
    Ok(())
}

/// Run content validation on a local file.
async fn cmd_check(validator: &ContentValidator, file: &Path, content_type: &str) -> Result<()> {
    let content = open_file(file).await?;
    let (allowed, _) = validator
        .is_stream_allowed(content, content_type)
        .await
        .context("Failed to read file")?;

    if !allowed {
        anyhow::bail!(
            "{} is not allowed as {} under the {:?} policy",
            file.display(),
            content_type,
            validator.mode()
        );
    }

    println!("{} is allowed as {}", file.display(), content_type);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "filestore",
            "--root",
            "/tmp/store",
            "zip",
            "--ids",
            "a",
            "b",
            "--output",
            "out.zip",
        ])
        .unwrap();

        assert_eq!(cli.root, PathBuf::from("/tmp/store"));
        assert!(matches!(cli.command, Commands::Zip { ref ids, .. } if ids.len() == 2));
    }

    #[test]
    fn test_default_config() {
        let config = load_config(None, Path::new("data")).unwrap();
        assert_eq!(config.storage.storage_root_path, PathBuf::from("data"));
        assert!(config.storage.allow_download_url);
    }

    #[test]
    fn test_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("filestore.json");
        std::fs::write(
            &path,
            r#"{
                "storage": { "storage_root_path": "/srv/files" },
                "content_validation": {
                    "validationMode": "whitelist",
                    "mimeTypeSignatures": [
                        { "mimeType": "image/png", "signatures": ["89 50 4E 47"] }
                    ]
                }
            }"#,
        )
        .unwrap();

        let config = load_config(Some(&path), Path::new("ignored")).unwrap();
        assert_eq!(config.storage.storage_root_path, PathBuf::from("/srv/files"));
        assert!(!config.storage.allow_download_url);
        assert!(ContentValidator::from_options(&config.content_validation).is_ok());
    }

    #[tokio::test]
    async fn test_load_record() {
        let temp_dir = TempDir::new().unwrap();
        let options = FileSystemStorageOptions {
            storage_root_path: temp_dir.path().to_path_buf(),
            allow_download_url: false,
        };
        let storage = LocalFileStorage::new(&options, ContentValidator::default()).unwrap();
        let cancel = CancellationToken::new();

        let source = temp_dir.path().join("notes.txt");
        std::fs::write(&source, b"some notes").unwrap();
        let content = open_file(&source).await.unwrap();
        let record = storage
            .upload("notes.txt", content, "text/plain", &cancel)
            .await
            .unwrap();

        let loaded = load_record(&storage, record.id(), &cancel).await.unwrap();
        assert_eq!(loaded, record);
    }
}
