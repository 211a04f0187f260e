//! Transcript parsing
//!
//! Each split comes with a tab-separated transcript, whose `path` column names
//! the audio clip that each line describes. Transcripts are loaded into a
//! [`MetadataTable`] that is keyed by clip file name.

use crate::{schema::Features, Result};
use anyhow::Context;
use csv_async::AsyncReaderBuilder;
use futures::StreamExt;
use std::collections::{hash_map, BTreeMap, HashMap};
use tokio::io::AsyncRead;

/// File extension of the audio clips
pub const AUDIO_EXTENSION: &str = ".mp3";

/// Name of the column holding the audio clip's file name
pub const PATH_FIELD: &str = "path";

/// Column that was renamed in Common Voice 8.0
const LEGACY_ACCENT_FIELD: &str = "accents";

/// Current name of [`LEGACY_ACCENT_FIELD`]
const ACCENT_FIELD: &str = "accent";

/// One transcript line, as a mapping from column name to value
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TranscriptRow(BTreeMap<Box<str>, Box<str>>);
//
impl TranscriptRow {
    /// Value of a column, if present
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(|value| &**value)
    }

    /// Set the value of a column, returning the former value if any
    pub fn insert(&mut self, field: impl Into<Box<str>>, value: impl Into<Box<str>>) -> Option<Box<str>> {
        self.0.insert(field.into(), value.into())
    }

    /// Clip file name
    pub fn path(&self) -> &str {
        self.get(PATH_FIELD).unwrap_or_default()
    }

    /// Bring a raw transcript line into its canonical form
    ///
    /// - The clip file name carries the audio file extension
    /// - The legacy accent column is renamed to its current name
    /// - Every expected column is present, empty if unknown
    pub fn normalize<'a>(&mut self, expected_fields: impl IntoIterator<Item = &'a str>) {
        let path = self.0.entry(PATH_FIELD.into()).or_default();
        if !path.ends_with(AUDIO_EXTENSION) {
            *path = format!("{path}{AUDIO_EXTENSION}").into();
        }
        if let Some(accents) = self.0.remove(LEGACY_ACCENT_FIELD) {
            self.0.insert(ACCENT_FIELD.into(), accents);
        }
        for field in expected_fields {
            self.0.entry(field.into()).or_default();
        }
    }
}
//
impl<K: Into<Box<str>>, V: Into<Box<str>>> FromIterator<(K, V)> for TranscriptRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        )
    }
}

/// Transcript lines of a split, keyed by clip file name
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MetadataTable(HashMap<Box<str>, TranscriptRow>);
//
impl MetadataTable {
    /// Set up an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a normalized transcript line
    ///
    /// If another line has the same clip file name, it is replaced.
    pub fn insert(&mut self, row: TranscriptRow) {
        match self.0.entry(row.path().into()) {
            hash_map::Entry::Occupied(mut o) => {
                log::warn!(
                    "Transcript has several lines for clip {}, only the last one is kept",
                    o.key()
                );
                o.insert(row);
            }
            hash_map::Entry::Vacant(v) => {
                v.insert(row);
            }
        }
    }

    /// Transcript line associated with a clip file name
    pub fn get(&self, filename: &str) -> Option<&TranscriptRow> {
        self.0.get(filename)
    }

    /// Number of clips in the table
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Load a transcript into a metadata table
pub async fn read(
    transcript: impl AsyncRead + Unpin + Send,
    features: &Features,
) -> Result<MetadataTable> {
    // Transcripts are TSV with a header line and no quoting whatsoever. Some
    // lines may lack trailing columns, we fill them in below.
    let mut reader = AsyncReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .create_reader(transcript);
    let headers = reader
        .headers()
        .await
        .context("reading transcript header")?
        .clone();

    let mut metadata = MetadataTable::new();
    let mut records = reader.records();
    while let Some(record) = records.next().await {
        let record = record.context("reading a transcript line")?;
        if record.len() > headers.len() {
            log::trace!("Ignoring surplus columns of transcript line {record:?}");
        }
        let mut row = headers
            .iter()
            .zip(record.iter().chain(std::iter::repeat("")))
            .collect::<TranscriptRow>();
        row.normalize(features.row_fields());
        metadata.insert(row);
    }
    log::info!("Loaded transcript of {} clips", metadata.len());
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_str(tsv: &str) -> MetadataTable {
        read(tsv.as_bytes(), &Features::common_voice())
            .await
            .expect("transcript should be valid")
    }

    #[tokio::test]
    async fn full_line() {
        let metadata = read_str(
            "client_id\tpath\tsentence\tup_votes\tdown_votes\tage\tgender\taccents\tlocale\tsegment\tvariant\n\
             abc\tclip1.mp3\thi\t2\t0\ttwenties\tmale\t\ten\t\t\n",
        )
        .await;
        assert_eq!(metadata.len(), 1);
        let row = metadata.get("clip1.mp3").unwrap();
        assert_eq!(row.get("client_id"), Some("abc"));
        assert_eq!(row.get("sentence"), Some("hi"));
        assert_eq!(row.get("up_votes"), Some("2"));
        assert_eq!(row.get("age"), Some("twenties"));
        assert_eq!(row.get("locale"), Some("en"));
        assert_eq!(row.get("accent"), Some(""));
    }

    #[tokio::test]
    async fn missing_extension_is_appended() {
        let metadata = read_str("path\tsentence\nclip2\thello\n").await;
        assert!(metadata.get("clip2").is_none());
        assert_eq!(metadata.get("clip2.mp3").unwrap().path(), "clip2.mp3");
    }

    #[tokio::test]
    async fn legacy_accent_column_is_renamed() {
        let metadata = read_str("path\taccents\nclip.mp3\tScottish\n").await;
        let row = metadata.get("clip.mp3").unwrap();
        assert_eq!(row.get("accent"), Some("Scottish"));
        assert_eq!(row.get("accents"), None);
    }

    #[tokio::test]
    async fn missing_fields_are_empty() {
        let metadata = read_str("path\nclip.mp3\n").await;
        let row = metadata.get("clip.mp3").unwrap();
        for field in Features::common_voice().row_fields() {
            assert!(row.get(field).is_some(), "{field} should be backfilled");
        }
        assert_eq!(row.get("variant"), Some(""));
        assert_eq!(row.get("audio"), None);
    }

    #[tokio::test]
    async fn short_lines_are_filled() {
        let metadata = read_str("path\tsentence\tsentence_domain\nclip.mp3\n").await;
        let row = metadata.get("clip.mp3").unwrap();
        assert_eq!(row.get("sentence"), Some(""));
        assert_eq!(row.get("sentence_domain"), Some(""));
    }

    #[tokio::test]
    async fn quotes_are_literal() {
        let metadata = read_str("path\tsentence\nclip.mp3\t\"Hi,\" she said\n").await;
        assert_eq!(
            metadata.get("clip.mp3").unwrap().get("sentence"),
            Some("\"Hi,\" she said")
        );
    }

    #[tokio::test]
    async fn last_duplicate_wins() {
        let metadata = read_str("path\tsentence\nclip\tfirst\nclip.mp3\tsecond\n").await;
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.get("clip.mp3").unwrap().get("sentence"), Some("second"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut row = [("path", "a"), ("accents", "x")].into_iter().collect::<TranscriptRow>();
        row.normalize(["path", "accent", "age"]);
        let once = row.clone();
        row.normalize(["path", "accent", "age"]);
        assert_eq!(row, once);
        assert_eq!(row.path(), "a.mp3");
    }
}
