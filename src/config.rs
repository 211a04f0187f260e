//! Process configuration

use crate::{languages::LanguageConfig, splits::Split, urls::DatasetUrls, LoadArgs, Result};
use anyhow::Context;
use directories::ProjectDirs;
use std::{num::NonZeroUsize, path::PathBuf, sync::Arc};

/// Final process configuration
///
/// This is the result of combining digested CLI arguments with the selected
/// dataset variant. Please refer to [`LoadArgs`] to know more about each field.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Config {
    /// Language code of the selected dataset variant
    pub language_id: Box<str>,

    /// Location of the dataset files
    pub urls: DatasetUrls,

    /// Where downloads are cached
    pub cache_dir: PathBuf,

    /// Truth that files are streamed from the network instead of downloaded
    pub streaming: bool,

    /// Number of downloads that may run concurrently
    pub max_concurrent_downloads: NonZeroUsize,

    /// Splits to be planned and generated, in generation order
    pub splits: Box<[Split]>,
}
//
impl Config {
    /// Determine process configuration from initialization products
    pub(crate) fn new(args: &LoadArgs, language: &LanguageConfig) -> Result<Arc<Self>> {
        let cache_dir = match &args.cache_dir {
            Some(dir) => dir.clone(),
            None => default_cache_dir()?,
        };
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("setting up the cache directory {}", cache_dir.display()))?;

        // Keep the requested splits in generation order, without duplicates
        let splits = if args.splits.is_empty() {
            Split::ALL.into()
        } else {
            Split::ALL
                .into_iter()
                .filter(|split| args.splits.contains(split))
                .collect()
        };

        Ok(Arc::new(Self {
            language_id: language.name.clone(),
            urls: DatasetUrls::new(&args.base_url),
            cache_dir,
            streaming: args.streaming,
            max_concurrent_downloads: args.max_concurrent_downloads,
            splits,
        }))
    }
}

/// Default location of the download cache
fn default_cache_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", env!("CARGO_PKG_NAME"))
        .context("determining the cache's location")?;
    Ok(dirs.cache_dir().to_owned())
}
