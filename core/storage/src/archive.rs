//! Zip bundles of stored files.

use bytes::Bytes;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use filestore_common::{ByteStream, Error, FileId, Result};

use crate::backend::collect_stream;
use crate::cancel::{ensure_active, run_cancellable};
use crate::provider::{bytes_stream, FileStorage};

/// Read every file and pack them into one archive.
///
/// Entries are named after the stored file names; duplicates get a
/// ` (n)` suffix. The first failing file aborts the archive.
pub async fn build_zip<S>(
    storage: &S,
    ids: &[FileId],
    cancel: &CancellationToken,
) -> Result<ByteStream>
where
    S: FileStorage + ?Sized,
{
    let mut entries = Vec::with_capacity(ids.len());
    let mut names = HashSet::new();

    for &id in ids {
        ensure_active(cancel)?;
        let file = storage
            .download_with_metadata(id, cancel)
            .await
            .map_err(|e| archive_error(id, e))?;
        let data = run_cancellable(cancel, collect_stream(file.content))
            .await
            .map_err(|e| archive_error(id, e))?;

        entries.push((unique_name(&file.name, &mut names), data));
    }

    let count = entries.len();
    let archive = tokio::task::spawn_blocking(move || write_zip(entries))
        .await
        .map_err(|e| Error::backend("build archive", e))??;

    debug!("Built archive of {} files ({} bytes)", count, archive.len());
    Ok(bytes_stream(Bytes::from(archive)))
}

fn write_zip(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, data) in entries {
        zip.start_file(name, options)
            .map_err(|e| Error::backend("build archive", e))?;
        zip.write_all(&data)?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| Error::backend("build archive", e))?;
    Ok(cursor.into_inner())
}

fn archive_error(id: FileId, error: Error) -> Error {
    match error {
        Error::Cancelled => Error::Cancelled,
        Error::NotFound(message) => {
            Error::NotFound(format!("{} (while archiving file {})", message, id))
        }
        other => Error::backend(format!("archive file {}", id), other),
    }
}

/// Flatten path separators and disambiguate repeated names.
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    let flat = name.replace(['/', '\\'], "_");
    if taken.insert(flat.clone()) {
        return flat;
    }

    let path = Path::new(&flat);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| flat.clone());
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1;
    loop {
        let candidate = format!("{} ({}){}", stem, n, extension);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
