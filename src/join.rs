//! Pairing of transcript lines with the audio clips from the archives

use crate::{
    download::{ArchiveEntries, ArchiveEntry},
    transcript::{MetadataTable, TranscriptRow, PATH_FIELD},
    Result,
};
use anyhow::Context;
use futures::{
    future,
    stream::{self, BoxStream},
    StreamExt, TryStreamExt,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Audio clip of an example
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Audio {
    /// Where the clip is, inside of its archive or on disk
    pub path: Box<str>,

    /// Encoded clip, as stored in the archive
    pub bytes: Vec<u8>,
}

/// Transcript line of a clip, together with the clip itself
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Example {
    /// Transcript columns, where `path` is the resolved clip path
    pub row: TranscriptRow,

    /// Audio clip
    pub audio: Audio,
}

/// Lazy sequence of examples, keyed by resolved clip path
pub type ExampleStream = BoxStream<'static, Result<(Box<str>, Example)>>;

/// Emit an example for every archived clip that has a transcript line
///
/// Archives are processed in order, and so are the entries of each archive.
/// Entries whose file name is unknown to the transcript are skipped without
/// reading their contents.
///
/// If `local_extracted_archive_paths` is specified, it must hold the
/// directory where each archive was extracted, and example paths will point
/// into these directories. Otherwise, example paths are archive entry paths.
pub fn join(
    metadata: Arc<MetadataTable>,
    local_extracted_archive_paths: Option<Vec<PathBuf>>,
    archives: Vec<ArchiveEntries>,
) -> ExampleStream {
    stream::iter(archives.into_iter().enumerate())
        .flat_map(move |(archive_idx, entries)| {
            let extracted_path = match &local_extracted_archive_paths {
                None => Ok(None),
                Some(paths) => paths
                    .get(archive_idx)
                    .cloned()
                    .map(Some)
                    .with_context(|| format!("archive #{archive_idx} was not extracted")),
            };
            match extracted_path {
                Ok(extracted_path) => entries
                    .map_ok(move |entry| (extracted_path.clone(), entry))
                    .boxed(),
                Err(e) => stream::once(future::ready(Err(e))).boxed(),
            }
        })
        .try_filter_map(move |(extracted_path, entry)| {
            let metadata = metadata.clone();
            async move { make_example(&metadata, extracted_path.as_deref(), entry).await }
        })
        .boxed()
}

/// Turn an archive entry into an example, if it has a transcript line
async fn make_example(
    metadata: &MetadataTable,
    extracted_path: Option<&Path>,
    entry: ArchiveEntry,
) -> Result<Option<(Box<str>, Example)>> {
    let filename = base_filename(entry.path());
    let Some(row) = metadata.get(filename) else {
        log::trace!("Skipped archive entry {} as it has no transcript", entry.path());
        return Ok(None);
    };
    let mut row = row.clone();
    let path: Box<str> = match extracted_path {
        Some(dir) => dir.join(entry.path()).to_string_lossy().into(),
        None => entry.path().into(),
    };
    let bytes = entry.read_content().await?;
    row.insert(PATH_FIELD, path.clone());
    let audio = Audio {
        path: path.clone(),
        bytes,
    };
    Ok(Some((path, Example { row, audio })))
}

/// Last component of a slash-separated archive path
fn base_filename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
