//! Dataset splits and the plan to generate each of them

use crate::{download::Location, Result};
use anyhow::Context;
use serde::Deserialize;
use std::{collections::HashMap, fmt, path::PathBuf, str::FromStr};

/// Named partition of the dataset
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Split {
    Train,
    Dev,
    Test,
    Other,
    Invalidated,
    Validated,
}
//
impl Split {
    /// Every split, in generation order
    pub const ALL: [Split; 6] = [
        Split::Train,
        Split::Dev,
        Split::Test,
        Split::Other,
        Split::Invalidated,
        Split::Validated,
    ];

    /// Name used in dataset URLs and in the shard count table
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Dev => "dev",
            Split::Test => "test",
            Split::Other => "other",
            Split::Invalidated => "invalidated",
            Split::Validated => "validated",
        }
    }

    /// Name under which the split is exposed to dataset users
    ///
    /// The dev split follows the usual "validation" naming, which must not be
    /// confused with the "validated" split.
    pub fn output_name(self) -> &'static str {
        match self {
            Split::Dev => "validation",
            other => other.as_str(),
        }
    }
}
//
impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
//
impl FromStr for Split {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Split::ALL
            .into_iter()
            .find(|split| split.as_str() == s || split.output_name() == s)
            .with_context(|| format!("unknown split {s:?}"))
    }
}

/// Number of archive shards, by language then by split name
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct NShards(HashMap<Box<str>, HashMap<Box<str>, usize>>);
//
impl NShards {
    /// Parse the shard count table
    pub fn from_json(json: &[u8]) -> Result<Self> {
        serde_json::from_slice(json).context("parsing the shard count table")
    }

    /// Number of shards of a language's split
    pub fn get(&self, lang: &str, split: Split) -> Result<usize> {
        self.0
            .get(lang)
            .with_context(|| format!("no shard count for language {lang}"))?
            .get(split.as_str())
            .copied()
            .with_context(|| format!("no shard count for the {split} split of language {lang}"))
    }
}

/// Everything needed to generate the examples of one split
#[derive(Clone, Debug, PartialEq)]
pub struct SplitGenerator {
    /// Split being generated
    pub split: Split,

    /// Directories where each archive was extracted, in archive order
    ///
    /// Absent in streaming mode, where nothing is extracted locally.
    pub local_extracted_archive_paths: Option<Vec<PathBuf>>,

    /// Audio archives, in shard order
    pub archives: Vec<Location>,

    /// Transcript of the split
    pub meta_path: Location,
}
//
impl SplitGenerator {
    /// Name under which this split is exposed
    pub fn name(&self) -> &'static str {
        self.split.output_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_names() {
        assert_eq!(Split::Dev.as_str(), "dev");
        assert_eq!(Split::Dev.output_name(), "validation");
        assert_eq!(Split::Validated.output_name(), "validated");
        assert_eq!("validation".parse::<Split>().unwrap(), Split::Dev);
        assert_eq!("dev".parse::<Split>().unwrap(), Split::Dev);
        assert_eq!("invalidated".parse::<Split>().unwrap(), Split::Invalidated);
        assert!("holdout".parse::<Split>().is_err());
    }

    #[test]
    fn shard_counts() {
        let n_shards = NShards::from_json(br#"{"en": {"train": 3, "dev": 1}}"#).unwrap();
        assert_eq!(n_shards.get("en", Split::Train).unwrap(), 3);
        assert_eq!(n_shards.get("en", Split::Dev).unwrap(), 1);
        let err = n_shards.get("en", Split::Test).unwrap_err();
        assert!(err.to_string().contains("test"));
        assert!(n_shards.get("fr", Split::Train).is_err());
    }
}
