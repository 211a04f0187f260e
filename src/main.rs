//! This program loads the Mozilla Common Voice speech corpus, whose general
//! documentation you can find at <https://commonvoice.mozilla.org/en/datasets>.
//!
//! Each language of the corpus is a dataset variant, which is split into
//! train/dev/test/other/invalidated/validated partitions. The audio clips of
//! each partition are spread across several tar archives, and described by a
//! separate transcript. This program pairs clips with their transcript line
//! and writes the result down as one Parquet file per partition.

mod builder;
mod config;
mod download;
mod export;
mod join;
mod languages;
mod progress;
mod schema;
mod splits;
mod transcript;
mod urls;

use crate::{
    builder::{CommonVoice, DatasetBuilder, DEFAULT_WRITER_BATCH_SIZE},
    config::Config,
    download::HttpDownloadManager,
    export::ParquetSink,
    languages::{Catalog, LanguageConfig, ReleaseStats},
    progress::{ProgressReport, Work},
    schema::FeatureType,
    splits::Split,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use log::LevelFilter;
use std::{num::NonZeroUsize, path::PathBuf};

/// Load the Mozilla Common Voice speech corpus
#[derive(Parser, Debug)]
#[command(version, author)]
struct Args {
    /// Operation to be carried out
    #[command(subcommand)]
    command: Command,

    /// JSON release statistics to be used instead of the built-in ones
    ///
    /// The file must follow the layout of the statistics that are published
    /// alongside each Common Voice release. Only the `version`, `date`,
    /// `totalValidHrs` and `locales` fields are used.
    #[arg(long, global = true)]
    release_stats: Option<PathBuf>,
}
//
impl Args {
    /// Load the dataset variants
    fn catalog(&self) -> Result<Catalog> {
        let stats = match &self.release_stats {
            Some(path) => ReleaseStats::from_file(path)?,
            None => ReleaseStats::embedded()?,
        };
        anyhow::ensure!(
            !stats.locales.is_empty(),
            "release statistics do not list any language"
        );
        Ok(Catalog::new(stats))
    }
}

/// Operations supported by this program
#[derive(Subcommand, Debug)]
enum Command {
    /// List the languages of the release
    Configs,

    /// Describe the dataset and its schema
    Info {
        /// Language code, e.g. "en" or "zh-CN"
        ///
        /// Will interactively prompt for a supported language if not specified.
        #[arg(short, long)]
        language: Option<Box<str>>,
    },

    /// Show which files each split is generated from
    ///
    /// Outside of streaming mode, this downloads and extracts every archive.
    Plan(LoadArgs),

    /// Generate the examples of each split into Parquet files
    Generate {
        /// Dataset loading settings
        #[command(flatten)]
        load: LoadArgs,

        /// Directory where one Parquet file per split will be written
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Number of examples per Parquet record batch
        ///
        /// Larger batches compress better, but every audio clip of a batch
        /// must be held in memory until the batch is written.
        #[arg(long, default_value_t = DEFAULT_WRITER_BATCH_SIZE)]
        writer_batch_size: NonZeroUsize,
    },
}

/// Settings that control how the dataset is loaded
#[derive(clap::Args, Debug)]
pub struct LoadArgs {
    /// Language code, e.g. "en" or "zh-CN"
    ///
    /// Will interactively prompt for a supported language if not specified.
    #[arg(short, long)]
    pub language: Option<Box<str>>,

    /// Read archives and transcripts straight from the network
    ///
    /// By default, every file is downloaded into the cache directory and
    /// archives are extracted there, so that later runs can reuse them and
    /// example paths point to actual files. Streaming avoids using any disk
    /// space, at the cost of downloading everything again on every run.
    #[arg(long)]
    pub streaming: bool,

    /// Split to be processed, may be specified multiple times
    ///
    /// All splits are processed by default. "validation" is accepted as an
    /// alias of "dev".
    #[arg(short, long = "split")]
    pub splits: Vec<Split>,

    /// Root URL of the dataset repository
    #[arg(long, default_value = urls::DEFAULT_BASE_URL)]
    pub base_url: Box<str>,

    /// Where downloads are cached, defaults to the user's cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Maximal number of concurrent downloads
    #[arg(long, default_value = "4")]
    pub max_concurrent_downloads: NonZeroUsize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up logging
    setup_logging().map_err(|e| anyhow::format_err!("{e}"))?;

    // Decode CLI arguments and load the dataset variants
    let args = Args::parse();
    let catalog = args.catalog()?;

    match args.command {
        Command::Configs => {
            for config in catalog.configs() {
                println!(
                    "{}\t{}\t{} clips\t{}",
                    config.name, config.language, config.num_clips, config.size_human
                );
            }
        }
        Command::Info { language } => {
            let language = pick_language(&catalog, language.as_deref())?;
            let info = builder::dataset_info(&catalog, language);
            println!("{}\n", info.description);
            println!("{}\n", language.description);
            println!("Version: {}", info.version);
            println!("Homepage: {}", info.homepage);
            println!("License: {}\n", info.license);
            println!("Features:");
            for feature in info.features.iter() {
                let dtype = match feature.dtype {
                    FeatureType::String => "string".to_owned(),
                    FeatureType::Int64 => "int64".to_owned(),
                    FeatureType::Audio { sampling_rate } => format!("audio ({sampling_rate} Hz)"),
                };
                println!("  {}: {dtype}", feature.name);
            }
            println!("\nCitation:\n{}", info.citation);
        }
        Command::Plan(load) => {
            let language = pick_language(&catalog, load.language.as_deref())?;
            let config = Config::new(&load, language)?;
            let report = ProgressReport::new();
            let builder = CommonVoice::new(config.clone(), &catalog)?;
            let dl = HttpDownloadManager::new(config, report);
            let generators = builder.split_generators(&dl).await?;
            for generator in generators {
                println!("{}:", generator.name());
                println!("  transcript: {}", generator.meta_path);
                for (idx, archive) in generator.archives.iter().enumerate() {
                    match generator
                        .local_extracted_archive_paths
                        .as_ref()
                        .and_then(|paths| paths.get(idx))
                    {
                        Some(extracted) => {
                            println!("  archive: {archive} (extracted to {})", extracted.display())
                        }
                        None => println!("  archive: {archive}"),
                    }
                }
            }
        }
        Command::Generate {
            load,
            output,
            writer_batch_size,
        } => {
            let language = pick_language(&catalog, load.language.as_deref())?;
            let config = Config::new(&load, language)?;
            generate(config, &catalog, &output, writer_batch_size).await?;
        }
    }
    Ok(())
}

/// Generate the configured splits into Parquet files
async fn generate(
    config: std::sync::Arc<Config>,
    catalog: &Catalog,
    output: &std::path::Path,
    writer_batch_size: NonZeroUsize,
) -> Result<()> {
    let report = ProgressReport::new();
    let builder = CommonVoice::new(config.clone(), catalog)?;
    let dl = HttpDownloadManager::new(config, report.clone());
    tokio::fs::create_dir_all(output)
        .await
        .with_context(|| format!("creating output directory {}", output.display()))?;

    // Plan all splits upfront, so that downloads are shared
    let generators = builder.split_generators(&dl).await?;

    // Generate splits one by one
    let mut summary = Vec::with_capacity(generators.len());
    for generator in &generators {
        let name = generator.name();
        let path = output.join(format!("{name}.parquet"));
        let mut examples = builder.generate_examples(&dl, generator).await?;
        let mut sink = ParquetSink::create(&path, builder.info().features, writer_batch_size).await?;
        let progress = report.add(format!("Generating {name} examples"), Work::Steps(None));
        while let Some(example) = examples.next().await {
            let (key, example) = example.with_context(|| format!("generating {name} examples"))?;
            sink.push(&example)
                .await
                .with_context(|| format!("exporting example {key}"))?;
            progress.make_progress(1);
        }
        let num_examples = sink.finish().await?;
        progress.finish();
        log::info!("Wrote {num_examples} {name} examples to {}", path.display());
        summary.push((name, num_examples, path));
    }

    // Display what was generated once progress bars are gone
    for (name, num_examples, path) in summary {
        println!("{name}: {num_examples} examples in {}", path.display());
    }
    Ok(())
}

/// Pick a dataset variant, asking the user if it was not specified
fn pick_language<'catalog>(
    catalog: &'catalog Catalog,
    language: Option<&str>,
) -> Result<&'catalog LanguageConfig> {
    match language {
        Some(code) => catalog.get(code),
        None => catalog.prompt().context("prompting for a language"),
    }
}

/// Use anyhow for Result type erasure
pub use anyhow::Result;

/// Set up logging
fn setup_logging() -> syslog::Result<()> {
    syslog::init(
        syslog::Facility::LOG_USER,
        if cfg!(feature = "log-trace") {
            LevelFilter::Trace
        } else if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        None,
    )
}
