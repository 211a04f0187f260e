//! Common Voice dataset builder
//!
//! A dataset builder describes a dataset, plans the generation of its splits,
//! and generates the examples of each split. All file accesses go through a
//! [`DownloadManager`], so the same builder works with downloaded and
//! streamed files.

use crate::{
    config::Config,
    download::{DownloadManager, Location},
    join::{self, ExampleStream},
    languages::{Catalog, LanguageConfig},
    schema::DatasetInfo,
    splits::{NShards, SplitGenerator},
    transcript, Result,
};
use anyhow::Context;
use std::{num::NonZeroUsize, path::PathBuf, sync::Arc};
use tokio::io::AsyncReadExt;

/// Number of examples written at once
pub const DEFAULT_WRITER_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(size) => size,
    None => unreachable!(),
};

/// Interface through which datasets are loaded
pub trait DatasetBuilder {
    /// Describe the dataset and its schema
    fn info(&self) -> DatasetInfo;

    /// Plan the generation of each split
    async fn split_generators(&self, dl: &impl DownloadManager) -> Result<Vec<SplitGenerator>>;

    /// Generate the examples of one split
    async fn generate_examples(
        &self,
        dl: &impl DownloadManager,
        generator: &SplitGenerator,
    ) -> Result<ExampleStream>;
}

/// Builder for one language of the Common Voice dataset
#[derive(Clone, Debug)]
pub struct CommonVoice {
    /// Process configuration
    config: Arc<Config>,

    /// Dataset description
    info: DatasetInfo,
}
//
impl CommonVoice {
    /// Set up the builder of the configured language
    pub fn new(config: Arc<Config>, catalog: &Catalog) -> Result<Self> {
        let info = dataset_info(catalog, catalog.get(&config.language_id)?);
        Ok(Self { config, info })
    }
}

/// Describe the dataset of one language
pub fn dataset_info(catalog: &Catalog, language: &LanguageConfig) -> DatasetInfo {
    let stats = catalog.stats();
    DatasetInfo::new(stats.total_valid_hrs, stats.locales.len(), language)
}
//
impl DatasetBuilder for CommonVoice {
    fn info(&self) -> DatasetInfo {
        self.info.clone()
    }

    async fn split_generators(&self, dl: &impl DownloadManager) -> Result<Vec<SplitGenerator>> {
        let lang = &*self.config.language_id;
        let urls = &self.config.urls;
        let splits = &self.config.splits;

        // Find out how many archive shards each split has
        let n_shards_url = urls.n_shards();
        let n_shards_path = dl.download_and_extract(&n_shards_url).await?;
        let mut n_shards_json = Vec::new();
        dl.open(&n_shards_path)
            .await?
            .read_to_end(&mut n_shards_json)
            .await
            .with_context(|| format!("reading {n_shards_path}"))?;
        let n_shards = NShards::from_json(&n_shards_json)?;

        // Fetch all audio archives, then extract them unless streaming
        let mut audio_urls = Vec::new();
        let mut shard_counts = Vec::with_capacity(splits.len());
        for &split in splits.iter() {
            let num_shards = n_shards.get(lang, split)?;
            audio_urls.extend((0..num_shards).map(|shard_idx| urls.audio(lang, split, shard_idx)));
            shard_counts.push(num_shards);
        }
        let archive_paths = dl.download_many(&audio_urls).await?;
        let local_extracted_archive_paths = if dl.is_streaming() {
            None
        } else {
            Some(dl.extract_many(&archive_paths).await?)
        };

        // Fetch transcripts
        let meta_urls = splits
            .iter()
            .map(|&split| urls.transcript(lang, split))
            .collect::<Vec<_>>();
        let meta_paths = dl.download_and_extract_many(&meta_urls).await?;

        // Regroup everything by split
        let mut archive_paths = archive_paths.into_iter();
        let mut local_extracted_archive_paths = local_extracted_archive_paths.map(Vec::into_iter);
        let generators = (splits.iter().zip(shard_counts).zip(meta_paths))
            .map(|((&split, num_shards), meta_path)| SplitGenerator {
                split,
                local_extracted_archive_paths: local_extracted_archive_paths
                    .as_mut()
                    .map(|paths| paths.by_ref().take(num_shards).collect::<Vec<PathBuf>>()),
                archives: archive_paths.by_ref().take(num_shards).collect::<Vec<Location>>(),
                meta_path,
            })
            .collect();
        Ok(generators)
    }

    async fn generate_examples(
        &self,
        dl: &impl DownloadManager,
        generator: &SplitGenerator,
    ) -> Result<ExampleStream> {
        let transcript = dl.open(&generator.meta_path).await?;
        let metadata = transcript::read(transcript, &self.info.features)
            .await
            .with_context(|| format!("loading transcript {}", generator.meta_path))?;
        let archives = generator
            .archives
            .iter()
            .map(|archive| dl.iter_archive(archive))
            .collect();
        Ok(join::join(
            Arc::new(metadata),
            generator.local_extracted_archive_paths.clone(),
            archives,
        ))
    }
}
