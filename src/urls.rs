//! Location of the dataset files on the Hugging Face hub

use crate::splits::Split;

/// Default root of the Common Voice 17.0 dataset repository
pub const DEFAULT_BASE_URL: &str =
    "https://huggingface.co/datasets/mozilla-foundation/common_voice_17_0/resolve/main";

/// URL builder for one dataset repository
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DatasetUrls {
    /// Repository root, without trailing slash
    base: Box<str>,
}
//
impl DatasetUrls {
    /// Set up URL generation from a repository root
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').into(),
        }
    }

    /// URL of one audio archive shard
    pub fn audio(&self, lang: &str, split: Split, shard_idx: usize) -> Box<str> {
        let split = split.as_str();
        format!("{}/audio/{lang}/{split}/{lang}_{split}_{shard_idx}.tar", self.base).into()
    }

    /// URL of the transcript of one split
    pub fn transcript(&self, lang: &str, split: Split) -> Box<str> {
        format!("{}/transcript/{lang}/{}.tsv", self.base, split.as_str()).into()
    }

    /// URL of the shard count table
    pub fn n_shards(&self) -> Box<str> {
        format!("{}/n_shards.json", self.base).into()
    }
}
//
impl Default for DatasetUrls {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
