//! Download, caching and unpacking of the dataset files
//!
//! Dataset generation only interacts with remote files through the
//! [`DownloadManager`] trait. The [`HttpDownloadManager`] implementation
//! fetches files over HTTP and either caches them on disk, or, in streaming
//! mode, reads them straight from the network whenever they are opened.

use crate::{
    config::Config,
    progress::{ProgressReport, Work},
    Result,
};
use anyhow::Context;
use async_compression::tokio::bufread::GzipDecoder;
use futures::{
    stream::{self, BoxStream},
    StreamExt, TryStreamExt,
};
use reqwest::{Response, Url};
use std::{
    borrow::Cow,
    fmt,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter},
};
use tokio_util::io::StreamReader;

/// Where a dataset file can be read from
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Location {
    /// File on the local filesystem
    Local(PathBuf),

    /// Remote file, read from the network on every access
    Remote(Box<str>),
}
//
impl Location {
    /// Name of the file, as used for format detection and error reporting
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Location::Local(path) => path.to_string_lossy(),
            Location::Remote(url) => Cow::Borrowed(url),
        }
    }
}
//
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Byte stream from a dataset file
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// File from an archive
pub struct ArchiveEntry {
    /// Path of the file within the archive
    path: Box<str>,

    /// File contents, which have not been read yet
    content: BoxedReader,
}
//
impl ArchiveEntry {
    /// Wrap an archive member
    pub fn new(path: impl Into<Box<str>>, content: impl AsyncRead + Send + 'static) -> Self {
        Self {
            path: path.into(),
            content: Box::pin(content),
        }
    }

    /// Path of the file within the archive
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read the file contents
    pub async fn read_content(mut self) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        self.content
            .read_to_end(&mut content)
            .await
            .with_context(|| format!("reading {} from its archive", self.path))?;
        Ok(content)
    }
}

/// Lazy sequence of files from an archive
pub type ArchiveEntries = BoxStream<'static, Result<ArchiveEntry>>;

/// Access to the remote dataset files
pub trait DownloadManager {
    /// Truth that files are read from the network rather than downloaded
    fn is_streaming(&self) -> bool;

    /// Number of downloads that may run concurrently
    fn max_concurrent_downloads(&self) -> usize {
        1
    }

    /// Make a remote file available
    ///
    /// In streaming mode, this does not download anything and the remote
    /// location is returned as is.
    async fn download(&self, url: &str) -> Result<Location>;

    /// Unpack a downloaded archive, returning the output directory
    async fn extract(&self, archive: &Location) -> Result<PathBuf>;

    /// Make a remote file available, unpacking it if it is an archive
    async fn download_and_extract(&self, url: &str) -> Result<Location> {
        let location = self.download(url).await?;
        if is_archive(url) && !self.is_streaming() {
            Ok(Location::Local(self.extract(&location).await?))
        } else {
            Ok(location)
        }
    }

    /// Read a file, decompressing it if needed
    async fn open(&self, location: &Location) -> Result<BoxedReader>;

    /// Iterate over the files of an archive
    ///
    /// The archive is only opened once the sequence is first polled.
    fn iter_archive(&self, archive: &Location) -> ArchiveEntries;

    /// Download several files, preserving their order
    async fn download_many(&self, urls: &[Box<str>]) -> Result<Vec<Location>> {
        stream::iter(urls)
            .map(|url| self.download(url))
            .buffered(self.max_concurrent_downloads())
            .try_collect()
            .await
    }

    /// Extract several archives, preserving their order
    async fn extract_many(&self, archives: &[Location]) -> Result<Vec<PathBuf>> {
        stream::iter(archives)
            .map(|archive| self.extract(archive))
            .buffered(self.max_concurrent_downloads())
            .try_collect()
            .await
    }

    /// Download and extract several files, preserving their order
    async fn download_and_extract_many(&self, urls: &[Box<str>]) -> Result<Vec<Location>> {
        stream::iter(urls)
            .map(|url| self.download_and_extract(url))
            .buffered(self.max_concurrent_downloads())
            .try_collect()
            .await
    }
}

/// Truth that a file name designates a supported archive format
pub fn is_archive(name: &str) -> bool {
    [".tar", ".tar.gz", ".tgz"]
        .into_iter()
        .any(|extension| name.ends_with(extension))
}

/// Decompress a byte stream if its file name says it is compressed
fn decompress(name: &str, reader: BoxedReader) -> BoxedReader {
    if name.ends_with(".gz") || name.ends_with(".tgz") {
        Box::pin(GzipDecoder::new(BufReader::new(reader)))
    } else {
        reader
    }
}

/// Iterate over the regular files of a tar archive
pub fn archive_entries(name: Box<str>, reader: BoxedReader) -> Result<ArchiveEntries> {
    let mut archive = tokio_tar::Archive::new(reader);
    let entries = archive
        .entries()
        .with_context(|| format!("reading archive {name}"))?;
    Ok(entries
        .map(move |entry| entry.with_context(|| format!("reading an entry of archive {name}")))
        .try_filter_map(|entry| async move {
            if !entry.header().entry_type().is_file() {
                return Ok(None);
            }
            let path = entry
                .path()
                .context("decoding the path of an archive entry")?
                .to_string_lossy()
                .into_owned();
            Ok::<_, anyhow::Error>(Some(ArchiveEntry::new(path, entry)))
        })
        .boxed())
}

/// Download manager that fetches files over HTTP
#[derive(Clone, Debug)]
pub struct HttpDownloadManager {
    /// HTTP client
    client: reqwest::Client,

    /// Process configuration
    config: Arc<Config>,

    /// Progress report where downloads are displayed
    report: ProgressReport,
}
//
impl HttpDownloadManager {
    /// Set up a download manager
    pub fn new(config: Arc<Config>, report: ProgressReport) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            report,
        }
    }

    /// Where a remote file is cached on disk
    fn cache_path(&self, url: &str) -> Result<PathBuf> {
        let parsed = Url::parse(url).with_context(|| format!("parsing URL {url}"))?;
        let mut path = self.config.cache_dir.join("downloads");
        path.push(parsed.host_str().unwrap_or("local"));
        let segments = parsed
            .path_segments()
            .with_context(|| format!("URL {url} does not designate a file"))?;
        for segment in segments.filter(|segment| !segment.is_empty()) {
            path.push(segment);
        }
        Ok(path)
    }

    /// Start an HTTP download
    async fn get(&self, url: &str) -> Result<Response> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(Response::error_for_status)
            .with_context(|| format!("initiating download of {url}"))
    }

    /// Open a local or remote file without decompressing it
    async fn open_raw(&self, location: &Location) -> Result<BoxedReader> {
        match location {
            Location::Local(path) => {
                let file = File::open(path)
                    .await
                    .with_context(|| format!("opening {}", path.display()))?;
                Ok(Box::pin(BufReader::new(file)))
            }
            Location::Remote(url) => {
                let response = self.get(url).await?;
                Ok(Box::pin(StreamReader::new(response.bytes_stream().map(
                    // Translate reqwest errors into I/O errors
                    |res| res.map_err(|e| io::Error::new(ErrorKind::Other, Box::new(e))),
                ))))
            }
        }
    }
}
//
impl DownloadManager for HttpDownloadManager {
    fn is_streaming(&self) -> bool {
        self.config.streaming
    }

    fn max_concurrent_downloads(&self) -> usize {
        self.config.max_concurrent_downloads.get()
    }

    async fn download(&self, url: &str) -> Result<Location> {
        if self.is_streaming() {
            return Ok(Location::Remote(url.into()));
        }

        // Reuse previous complete downloads
        let target = self.cache_path(url)?;
        if fs::metadata(&target).await.is_ok() {
            log::debug!("Reusing cached download of {url} at {}", target.display());
            return Ok(Location::Local(target));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating download directory {}", parent.display()))?;
        }

        // Download into a temporary file, which is renamed once complete
        let partial = with_suffix(&target, ".incomplete");
        let mut response = self.get(url).await?;
        let file_name = url.rsplit('/').next().unwrap_or(url).to_owned();
        let bytes = self.report.add(
            format!("Downloading {file_name}"),
            Work::Bytes(response.content_length()),
        );
        let context = || format!("downloading {url} to {}", partial.display());
        let mut output = BufWriter::new(File::create(&partial).await.with_context(context)?);
        while let Some(block) = response.chunk().await.with_context(context)? {
            output.write_all(&block).await.with_context(context)?;
            bytes.make_progress(block.len() as u64);
        }
        output.flush().await.with_context(context)?;
        bytes.finish();
        fs::rename(&partial, &target).await.with_context(context)?;
        log::info!("Downloaded {url} to {}", target.display());
        Ok(Location::Local(target))
    }

    async fn extract(&self, archive: &Location) -> Result<PathBuf> {
        let Location::Local(path) = archive else {
            anyhow::bail!("cannot extract remote archive {archive} without downloading it");
        };
        let target = with_suffix(path, ".extracted");
        if fs::metadata(&target).await.is_ok() {
            log::debug!("Reusing extracted archive {}", target.display());
            return Ok(target);
        }

        // Unpack into a temporary directory, which is renamed once complete
        let partial = with_suffix(&target, ".incomplete");
        let context = || format!("extracting {} into {}", path.display(), partial.display());
        if fs::metadata(&partial).await.is_ok() {
            fs::remove_dir_all(&partial).await.with_context(context)?;
        }
        let reader = self.open(archive).await?;
        tokio_tar::Archive::new(reader)
            .unpack(&partial)
            .await
            .with_context(context)?;
        fs::rename(&partial, &target).await.with_context(context)?;
        log::info!("Extracted {} into {}", path.display(), target.display());
        Ok(target)
    }

    async fn open(&self, location: &Location) -> Result<BoxedReader> {
        let reader = self.open_raw(location).await?;
        Ok(decompress(&location.name(), reader))
    }

    fn iter_archive(&self, archive: &Location) -> ArchiveEntries {
        let manager = self.clone();
        let archive = archive.clone();
        stream::once(async move {
            let reader = manager.open(&archive).await?;
            archive_entries(archive.name().into(), reader)
        })
        .try_flatten()
        .boxed()
    }
}

/// Append a suffix to a file name
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut path = path.as_os_str().to_owned();
    path.push(suffix);
    path.into()
}

/// In-memory download manager for tests
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::{collections::HashMap, io::Cursor};

    /// Download manager that serves files from memory
    #[derive(Clone, Debug, Default)]
    pub struct MemoryDownloadManager {
        /// Truth that downloads are streamed
        pub streaming: bool,

        /// Plain files, keyed by URL
        pub files: HashMap<Box<str>, Vec<u8>>,

        /// Archives as (path, content) lists, keyed by URL
        pub archives: HashMap<Box<str>, Vec<(Box<str>, Vec<u8>)>>,
    }
    //
    impl MemoryDownloadManager {
        /// URL that a location was downloaded from
        fn url<'a>(&self, location: &'a Location) -> Cow<'a, str> {
            match location {
                Location::Local(path) => path.to_string_lossy(),
                Location::Remote(url) => Cow::Borrowed(url),
            }
        }
    }
    //
    impl DownloadManager for MemoryDownloadManager {
        fn is_streaming(&self) -> bool {
            self.streaming
        }

        async fn download(&self, url: &str) -> Result<Location> {
            anyhow::ensure!(
                self.files.contains_key(url) || self.archives.contains_key(url),
                "no such file: {url}"
            );
            Ok(if self.streaming {
                Location::Remote(url.into())
            } else {
                Location::Local(url.into())
            })
        }

        async fn extract(&self, archive: &Location) -> Result<PathBuf> {
            match archive {
                Location::Local(path) => Ok(with_suffix(path, ".extracted")),
                Location::Remote(url) => anyhow::bail!("cannot extract remote archive {url}"),
            }
        }

        async fn open(&self, location: &Location) -> Result<BoxedReader> {
            let url = self.url(location);
            let content = self
                .files
                .get(&*url)
                .with_context(|| format!("no such file: {url}"))?;
            Ok(Box::pin(Cursor::new(content.clone())))
        }

        fn iter_archive(&self, archive: &Location) -> ArchiveEntries {
            let url = self.url(archive);
            match self.archives.get(&*url) {
                Some(entries) => {
                    let entries = entries
                        .iter()
                        .map(|(path, content)| {
                            Ok(ArchiveEntry::new(path.clone(), Cursor::new(content.clone())))
                        })
                        .collect::<Vec<_>>();
                    stream::iter(entries).boxed()
                }
                None => {
                    let error = anyhow::format_err!("no such archive: {url}");
                    stream::once(async move { Err(error) }).boxed()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::write::GzipEncoder;
    use std::num::NonZeroUsize;

    /// Build a tar archive with a directory and some files
    async fn make_tar(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tokio_tar::Builder::new(Vec::new());
        let mut header = tokio_tar::Header::new_gnu();
        header.set_entry_type(tokio_tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "clips/", &[][..])
            .await
            .unwrap();
        for (path, content) in files {
            let mut header = tokio_tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .await
                .unwrap();
        }
        builder.into_inner().await.unwrap()
    }

    async fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzipEncoder::new(Vec::new());
        encoder.write_all(bytes).await.unwrap();
        encoder.shutdown().await.unwrap();
        encoder.into_inner()
    }

    fn manager(cache_dir: &Path, streaming: bool) -> HttpDownloadManager {
        let config = Config {
            language_id: "en".into(),
            urls: Default::default(),
            cache_dir: cache_dir.into(),
            streaming,
            max_concurrent_downloads: NonZeroUsize::new(2).unwrap(),
            splits: Default::default(),
        };
        HttpDownloadManager::new(Arc::new(config), ProgressReport::hidden())
    }

    async fn entries(archive: ArchiveEntries) -> Vec<(Box<str>, Vec<u8>)> {
        archive
            .and_then(|entry| async move {
                let path = Box::<str>::from(entry.path());
                Ok::<_, anyhow::Error>((path, entry.read_content().await?))
            })
            .try_collect()
            .await
            .unwrap()
    }

    const FILES: &[(&str, &str)] = &[("clips/a.mp3", "aaa"), ("clips/b.mp3", "bb")];

    #[test]
    fn archive_names() {
        assert!(is_archive("https://x/audio/en/train/en_train_0.tar"));
        assert!(is_archive("clips.tar.gz"));
        assert!(!is_archive("https://x/transcript/en/train.tsv"));
    }

    #[test]
    fn cache_layout() {
        let manager = manager(Path::new("/cache"), false);
        assert_eq!(
            manager.cache_path("https://host.org/a/b/c.tsv").unwrap(),
            Path::new("/cache/downloads/host.org/a/b/c.tsv")
        );
    }

    #[tokio::test]
    async fn iterate_local_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("en_train_0.tar");
        fs::write(&path, make_tar(FILES).await).await.unwrap();

        let manager = manager(dir.path(), false);
        let entries = entries(manager.iter_archive(&Location::Local(path))).await;
        assert_eq!(
            entries,
            [
                (Box::<str>::from("clips/a.mp3"), b"aaa".to_vec()),
                (Box::<str>::from("clips/b.mp3"), b"bb".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn iterate_gzipped_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("en_train_0.tar.gz");
        fs::write(&path, gzip(&make_tar(FILES).await).await).await.unwrap();

        let manager = manager(dir.path(), false);
        let entries = entries(manager.iter_archive(&Location::Local(path))).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(&*entries[1].0, "clips/b.mp3");
    }

    #[tokio::test]
    async fn unread_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.tar");
        fs::write(&path, make_tar(FILES).await).await.unwrap();

        let manager = manager(dir.path(), false);
        let paths = manager
            .iter_archive(&Location::Local(path))
            .map_ok(|entry| Box::<str>::from(entry.path()))
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        assert_eq!(paths, [Box::<str>::from("clips/a.mp3"), Box::<str>::from("clips/b.mp3")]);
    }

    #[tokio::test]
    async fn missing_archive_fails_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        let mut archive = manager.iter_archive(&Location::Local(dir.path().join("nope.tar")));
        assert!(archive.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn extract_local_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.tar");
        fs::write(&path, make_tar(FILES).await).await.unwrap();

        let manager = manager(dir.path(), false);
        let archive = Location::Local(path);
        let extracted = manager.extract(&archive).await.unwrap();
        assert_eq!(extracted, dir.path().join("shard.tar.extracted"));
        assert_eq!(fs::read(extracted.join("clips/a.mp3")).await.unwrap(), b"aaa");

        // Second extraction reuses the first one
        assert_eq!(manager.extract(&archive).await.unwrap(), extracted);
    }

    #[tokio::test]
    async fn streaming_mode_does_not_download() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), true);
        let url = "https://host.org/audio/en/train/en_train_0.tar";
        assert_eq!(
            manager.download(url).await.unwrap(),
            Location::Remote(url.into())
        );
        assert_eq!(
            manager.download_and_extract(url).await.unwrap(),
            Location::Remote(url.into())
        );
        assert!(manager.extract(&Location::Remote(url.into())).await.is_err());
    }

    #[tokio::test]
    async fn cached_downloads_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        let url = "https://host.invalid/transcript/en/train.tsv";
        let cached = manager.cache_path(url).unwrap();
        fs::create_dir_all(cached.parent().unwrap()).await.unwrap();
        fs::write(&cached, "path\n").await.unwrap();
        assert_eq!(manager.download(url).await.unwrap(), Location::Local(cached));
    }
}
