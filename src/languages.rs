//! Supported Common Voice languages
//!
//! Each language of a Common Voice release is exposed as one dataset variant,
//! described by a [`LanguageConfig`]. Variants are built once from the
//! statistics that Mozilla publishes alongside each release.

use crate::Result;
use anyhow::Context;
use dialoguer::FuzzySelect;
use serde::Deserialize;
use std::{collections::BTreeMap, path::Path};

/// Statistics of the release that this program was built against
const EMBEDDED_RELEASE_STATS: &str = include_str!("release_stats.json");

/// Statistics about a Common Voice release
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStats {
    /// Release version, e.g. "17.0.0"
    pub version: Box<str>,

    /// Release date
    pub date: Box<str>,

    /// Validated hours of speech across all languages
    pub total_valid_hrs: f64,

    /// Per-language statistics, keyed by language code
    pub locales: BTreeMap<Box<str>, LocaleStats>,
}
//
impl ReleaseStats {
    /// Statistics embedded into this program
    pub fn embedded() -> Result<Self> {
        serde_json::from_str(EMBEDDED_RELEASE_STATS).context("parsing embedded release statistics")
    }

    /// Statistics from a user-provided JSON file with the same layout
    pub fn from_file(path: &Path) -> Result<Self> {
        let context = || format!("loading release statistics from {}", path.display());
        let json = std::fs::read(path).with_context(context)?;
        serde_json::from_slice(&json).with_context(context)
    }
}

/// Statistics about one language of a release
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LocaleStats {
    /// Number of recorded clips
    pub clips: u64,

    /// Number of distinct speakers
    pub users: u64,

    /// Hours of validated speech (0 or missing means unknown)
    pub valid_hrs: Option<f64>,

    /// Hours of speech in total (0 or missing means unknown)
    pub total_hrs: Option<f64>,

    /// Size of the language's archives in bytes (0 or missing means unknown)
    pub size: Option<u64>,
}

/// Configuration of one dataset variant, i.e. one language of the release
#[derive(Clone, Debug, PartialEq)]
pub struct LanguageConfig {
    /// Variant name, which is the language code used in dataset URLs
    pub name: Box<str>,

    /// Release version
    pub version: Box<str>,

    /// Human-readable language name
    pub language: Box<str>,

    /// Release date
    pub release_date: Box<str>,

    /// Number of audio clips
    pub num_clips: u64,

    /// Number of speakers
    pub num_speakers: u64,

    /// Hours of validated speech, if known
    pub validated_hr: Option<f64>,

    /// Hours of speech in total, if known
    pub total_hr: Option<f64>,

    /// Size in bytes, if known
    pub size_bytes: Option<u64>,

    /// Human-readable version of `size_bytes`
    pub size_human: Box<str>,

    /// Auto-generated description of this variant
    pub description: Box<str>,
}
//
impl LanguageConfig {
    /// Build the configuration of a language from release statistics
    fn new(stats: &ReleaseStats, code: &str, locale: &LocaleStats) -> Self {
        let language = match language_name(code) {
            Some(name) => name,
            None => {
                log::warn!("No human-readable name is known for language {code}");
                code
            }
        };
        let validated_hr = locale.valid_hrs.filter(|&hrs| hrs != 0.0);
        let total_hr = locale.total_hrs.filter(|&hrs| hrs != 0.0);
        let size_bytes = locale.size.filter(|&size| size != 0);
        let size_human = size_str(size_bytes);
        let description = format!(
            "Common Voice speech to text dataset in {language} released on {date}. \
             The dataset comprises {validated} hours of validated transcribed speech data \
             out of {total} hours in total from {speakers} speakers. \
             The dataset contains {clips} audio clips and has a size of {size_human}.",
            date = stats.date,
            validated = fmt_hours(validated_hr),
            total = fmt_hours(total_hr),
            speakers = locale.users,
            clips = locale.clips,
        );
        Self {
            name: code.into(),
            version: stats.version.clone(),
            language: language.into(),
            release_date: stats.date.clone(),
            num_clips: locale.clips,
            num_speakers: locale.users,
            validated_hr,
            total_hr,
            size_bytes,
            size_human: size_human.into(),
            description: description.into(),
        }
    }
}

/// Every dataset variant of a release
#[derive(Clone, Debug, PartialEq)]
pub struct Catalog {
    /// Statistics the variants were built from
    stats: ReleaseStats,

    /// Variants, sorted by language code
    configs: Box<[LanguageConfig]>,
}
//
impl Catalog {
    /// Build the dataset variants of a release
    pub fn new(stats: ReleaseStats) -> Self {
        let configs = stats
            .locales
            .iter()
            .map(|(code, locale)| LanguageConfig::new(&stats, code, locale))
            .collect();
        Self { stats, configs }
    }

    /// Statistics of the release
    pub fn stats(&self) -> &ReleaseStats {
        &self.stats
    }

    /// All variants, sorted by language code
    pub fn configs(&self) -> &[LanguageConfig] {
        &self.configs
    }

    /// Get the variant associated with a language code
    pub fn get(&self, code: &str) -> Result<&LanguageConfig> {
        self.configs
            .iter()
            .find(|config| &*config.name == code)
            .with_context(|| format!("Failed to find user-requested language {code}"))
    }

    /// Ask the user to select a variant
    pub fn prompt(&self) -> dialoguer::Result<&LanguageConfig> {
        let language_names = self
            .configs
            .iter()
            .map(|config| format!("{} ({})", config.language, config.name))
            .collect::<Vec<_>>();
        let language_idx = FuzzySelect::new()
            .with_prompt("Which language should I load?")
            .items(&language_names)
            .default(0)
            .max_length(usize::MAX)
            .interact()?;
        Ok(&self.configs[language_idx])
    }
}

/// Human-readable size, using binary units
pub fn size_str(size_bytes: Option<u64>) -> String {
    const UNITS: [(&str, u64); 5] = [
        ("PiB", 1 << 50),
        ("TiB", 1 << 40),
        ("GiB", 1 << 30),
        ("MiB", 1 << 20),
        ("KiB", 1 << 10),
    ];
    let Some(size_bytes) = size_bytes.filter(|&size| size != 0) else {
        return "Unknown size".to_owned();
    };
    for (name, unit) in UNITS {
        if size_bytes >= unit {
            return format!("{:.2} {name}", size_bytes as f64 / unit as f64);
        }
    }
    format!("{size_bytes} bytes")
}

/// Display a number of hours in a description
fn fmt_hours(hours: Option<f64>) -> String {
    match hours {
        // Debug formatting keeps a trailing ".0" on round values
        Some(hours) => format!("{hours:?}"),
        None => "an unknown number of".to_owned(),
    }
}

/// Human-readable name of a language code, if known
pub fn language_name(code: &str) -> Option<&'static str> {
    LANGUAGE_NAMES
        .binary_search_by_key(&code, |&(code, _name)| code)
        .ok()
        .map(|idx| LANGUAGE_NAMES[idx].1)
}

/// Human-readable names of Common Voice languages, sorted by code
const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("ab", "Abkhaz"),
    ("af", "Afrikaans"),
    ("am", "Amharic"),
    ("ar", "Arabic"),
    ("as", "Assamese"),
    ("ast", "Asturian"),
    ("az", "Azerbaijani"),
    ("ba", "Bashkir"),
    ("bas", "Basaa"),
    ("be", "Belarusian"),
    ("bg", "Bulgarian"),
    ("bn", "Bengali"),
    ("br", "Breton"),
    ("ca", "Catalan"),
    ("ckb", "Central Kurdish"),
    ("cnh", "Hakha Chin"),
    ("cs", "Czech"),
    ("cv", "Chuvash"),
    ("cy", "Welsh"),
    ("da", "Danish"),
    ("de", "German"),
    ("dv", "Dhivehi"),
    ("dyu", "Dioula"),
    ("el", "Greek"),
    ("en", "English"),
    ("eo", "Esperanto"),
    ("es", "Spanish"),
    ("et", "Estonian"),
    ("eu", "Basque"),
    ("fa", "Persian"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("fy-NL", "Frisian"),
    ("ga-IE", "Irish"),
    ("gl", "Galician"),
    ("gn", "Guarani"),
    ("ha", "Hausa"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("hsb", "Sorbian, Upper"),
    ("hu", "Hungarian"),
    ("hy-AM", "Armenian"),
    ("ia", "Interlingua"),
    ("id", "Indonesian"),
    ("ig", "Igbo"),
    ("is", "Icelandic"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ka", "Georgian"),
    ("kab", "Kabyle"),
    ("kk", "Kazakh"),
    ("kmr", "Kurmanji Kurdish"),
    ("ko", "Korean"),
    ("ky", "Kyrgyz"),
    ("lg", "Luganda"),
    ("lij", "Ligurian"),
    ("lo", "Lao"),
    ("lt", "Lithuanian"),
    ("ltg", "Latgalian"),
    ("lv", "Latvian"),
    ("mdf", "Moksha"),
    ("mhr", "Meadow Mari"),
    ("mk", "Macedonian"),
    ("ml", "Malayalam"),
    ("mn", "Mongolian"),
    ("mr", "Marathi"),
    ("mrj", "Hill Mari"),
    ("mt", "Maltese"),
    ("myv", "Erzya"),
    ("nan-tw", "Taiwanese (Minnan)"),
    ("ne-NP", "Nepali"),
    ("nhi", "Western Sierra Puebla Nahuatl"),
    ("nl", "Dutch"),
    ("nn-NO", "Norwegian Nynorsk"),
    ("oc", "Occitan"),
    ("or", "Odia"),
    ("os", "Ossetian"),
    ("pa-IN", "Punjabi"),
    ("pl", "Polish"),
    ("ps", "Pashto"),
    ("pt", "Portuguese"),
    ("quy", "Quechua Chanka"),
    ("rm-sursilv", "Romansh Sursilvan"),
    ("rm-vallader", "Romansh Vallader"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("rw", "Kinyarwanda"),
    ("sah", "Sakha"),
    ("sat", "Santali (Ol Chiki)"),
    ("sc", "Sardinian"),
    ("sk", "Slovak"),
    ("skr", "Saraiki"),
    ("sl", "Slovenian"),
    ("sq", "Albanian"),
    ("sr", "Serbian"),
    ("sv-SE", "Swedish"),
    ("sw", "Swahili"),
    ("ta", "Tamil"),
    ("te", "Telugu"),
    ("th", "Thai"),
    ("ti", "Tigrinya"),
    ("tig", "Tigre"),
    ("tk", "Turkmen"),
    ("tok", "Toki Pona"),
    ("tr", "Turkish"),
    ("tt", "Tatar"),
    ("tw", "Twi"),
    ("ug", "Uyghur"),
    ("uk", "Ukrainian"),
    ("ur", "Urdu"),
    ("uz", "Uzbek"),
    ("vi", "Vietnamese"),
    ("vot", "Votic"),
    ("yi", "Yiddish"),
    ("yo", "Yoruba"),
    ("yue", "Cantonese"),
    ("zgh", "Tamazight"),
    ("zh-CN", "Chinese (China)"),
    ("zh-HK", "Chinese (Hong Kong)"),
    ("zh-TW", "Chinese (Taiwan)"),
    ("zu", "Zulu"),
];
