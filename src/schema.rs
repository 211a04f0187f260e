//! Dataset description and schema

use crate::{
    join::{Audio, Example},
    languages::LanguageConfig,
    Result,
};
use anyhow::Context;
use serde_json::json;

/// Where the dataset comes from
pub const HOMEPAGE: &str = "https://commonvoice.mozilla.org/en/datasets";

/// Dataset license
pub const LICENSE: &str = "https://creativecommons.org/publicdomain/zero/1.0/";

/// How to cite the dataset
pub const CITATION: &str = r"@inproceedings{commonvoice:2020,
  author = {Ardila, R. and Branson, M. and Davis, K. and Henretty, M. and Kohler, M. and Meyer, J. and Morais, R. and Saunders, L. and Tyers, F. M. and Weber, G.},
  title = {Common Voice: A Massively-Multilingual Speech Corpus},
  booktitle = {Proceedings of the 12th Conference on Language Resources and Evaluation (LREC 2020)},
  pages = {4211--4215},
  year = 2020
}";

/// Sampling rate of the audio clips
pub const SAMPLING_RATE: u32 = 48_000;

/// General information about the dataset
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetInfo {
    /// Description of the whole dataset
    pub description: Box<str>,

    /// Schema of the examples
    pub features: Features,

    /// Where the dataset comes from
    pub homepage: &'static str,

    /// Dataset license
    pub license: &'static str,

    /// How to cite the dataset
    pub citation: &'static str,

    /// Dataset version
    pub version: Box<str>,
}
//
impl DatasetInfo {
    /// Describe the dataset of a given release
    pub fn new(total_valid_hours: f64, total_languages: usize, config: &LanguageConfig) -> Self {
        let description = format!(
            "Common Voice is Mozilla's initiative to help teach machines how real people speak. \
             The dataset currently consists of {total_valid_hours} validated hours of speech  \
             in {total_languages} languages, but more voices and languages are always added."
        );
        Self {
            description: description.into(),
            features: Features::common_voice(),
            homepage: HOMEPAGE,
            license: LICENSE,
            citation: CITATION,
            version: config.version.clone(),
        }
    }
}

/// Type of a dataset field
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FeatureType {
    /// UTF-8 string
    String,

    /// 64-bit signed integer, possibly unknown
    Int64,

    /// Encoded audio clip and its path
    Audio {
        /// Sampling rate of the decoded audio
        sampling_rate: u32,
    },
}

/// Named and typed dataset field
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Feature {
    /// Field name
    pub name: &'static str,

    /// Field type
    pub dtype: FeatureType,
}

/// Schema of the examples, as an ordered list of fields
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Features(Box<[Feature]>);
//
impl Features {
    /// Fields of a Common Voice example
    pub fn common_voice() -> Self {
        use FeatureType::*;
        let feature = |name, dtype| Feature { name, dtype };
        Self(Box::new([
            feature("client_id", String),
            feature("path", String),
            feature(
                "audio",
                Audio {
                    sampling_rate: SAMPLING_RATE,
                },
            ),
            feature("sentence", String),
            feature("up_votes", Int64),
            feature("down_votes", Int64),
            feature("age", String),
            feature("gender", String),
            feature("accent", String),
            feature("locale", String),
            feature("segment", String),
            feature("variant", String),
        ]))
    }

    /// Iterate over fields
    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.0.iter()
    }

    /// Names of the fields that come from transcripts
    pub fn row_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.iter()
            .filter(|feature| !matches!(feature.dtype, FeatureType::Audio { .. }))
            .map(|feature| feature.name)
    }

    /// Convert an example into typed values, in field order
    pub fn encode<'example>(&self, example: &'example Example) -> Result<Vec<Value<'example>>> {
        self.iter()
            .map(|feature| {
                let raw = || example.row.get(feature.name).unwrap_or_default();
                Ok(match feature.dtype {
                    FeatureType::String => Value::String(raw()),
                    FeatureType::Int64 => {
                        let raw = raw().trim();
                        let value = if raw.is_empty() {
                            None
                        } else {
                            Some(raw.parse::<i64>().with_context(|| {
                                format!("field {} is not an integer: {raw:?}", feature.name)
                            })?)
                        };
                        Value::Int64(value)
                    }
                    FeatureType::Audio { .. } => Value::Audio(&example.audio),
                })
            })
            .collect()
    }

    /// Description of the schema in the Hugging Face `datasets` JSON format
    pub fn to_json(&self) -> serde_json::Value {
        let features = self
            .iter()
            .map(|feature| {
                let description = match feature.dtype {
                    FeatureType::String => json!({ "dtype": "string", "_type": "Value" }),
                    FeatureType::Int64 => json!({ "dtype": "int64", "_type": "Value" }),
                    FeatureType::Audio { sampling_rate } => {
                        json!({ "sampling_rate": sampling_rate, "_type": "Audio" })
                    }
                };
                (feature.name.to_owned(), description)
            })
            .collect::<serde_json::Map<_, _>>();
        json!({ "info": { "features": features } })
    }
}

/// Typed value of an example field
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Value<'example> {
    String(&'example str),
    Int64(Option<i64>),
    Audio(&'example Audio),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptRow;

    fn example(up_votes: &str) -> Example {
        Example {
            row: [("path", "clip.mp3"), ("sentence", "hi"), ("up_votes", up_votes)]
                .into_iter()
                .collect::<TranscriptRow>(),
            audio: Audio {
                path: "clip.mp3".into(),
                bytes: b"ID3".to_vec(),
            },
        }
    }

    #[test]
    fn field_order() {
        let features = Features::common_voice();
        let names = features.iter().map(|f| f.name).collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "client_id", "path", "audio", "sentence", "up_votes", "down_votes", "age",
                "gender", "accent", "locale", "segment", "variant"
            ]
        );
        assert!(!features.row_fields().any(|name| name == "audio"));
        assert_eq!(features.row_fields().count(), 11);
    }

    #[test]
    fn typed_encoding() {
        let features = Features::common_voice();
        let example = example("2");
        let values = features.encode(&example).unwrap();
        assert_eq!(values[0], Value::String(""));
        assert_eq!(values[1], Value::String("clip.mp3"));
        assert_eq!(values[2], Value::Audio(&example.audio));
        assert_eq!(values[3], Value::String("hi"));
        assert_eq!(values[4], Value::Int64(Some(2)));
        assert_eq!(values[5], Value::Int64(None));
    }

    #[test]
    fn bad_integer_names_field() {
        let err = Features::common_voice().encode(&example("many")).unwrap_err();
        assert!(err.to_string().contains("up_votes"));
    }

    #[test]
    fn json_schema() {
        let json = Features::common_voice().to_json();
        assert_eq!(json["info"]["features"]["audio"]["sampling_rate"], 48_000);
        assert_eq!(json["info"]["features"]["up_votes"]["dtype"], "int64");
    }

    #[test]
    fn dataset_description() {
        let config = crate::languages::Catalog::new(
            crate::languages::ReleaseStats::embedded().unwrap(),
        )
        .get("fr")
        .unwrap()
        .clone();
        let info = DatasetInfo::new(120.5, 3, &config);
        assert!(info.description.contains("120.5 validated hours of speech  in 3 languages"));
        assert_eq!(&*info.version, "17.0.0");
    }
}
