use crate::error::Result;
use serde::Deserialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SentimentWords {
  #[serde(default)]
  pub positive: Vec<String>,
  #[serde(default)]
  pub negative: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct KeywordRule {
  pub label: String,
  pub keywords: Vec<String>,
}

impl KeywordRule {
  pub fn matches(&self, text: &str) -> bool {
    self.keywords.iter().any(|k| !k.is_empty() && text.contains(k.as_str()))
  }
}

/// Keyword data behind the sentiment, tag and category heuristics.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Lexicon {
  pub sentiment: SentimentWords,
  #[serde(default)]
  pub tags: Vec<KeywordRule>,
  #[serde(default)]
  pub categories: Vec<KeywordRule>,
  #[serde(default = "default_fallback_category")]
  pub fallback_category: String,
}

fn default_fallback_category() -> String {
  "other".to_string()
}

impl Lexicon {
  pub fn from_toml_str(raw: &str) -> Result<Self> {
    Ok(toml::from_str(raw)?)
  }
}

const DEFAULT_LEXICON_RAW: &str = include_str!("../config/lexicon.toml");
static DEFAULT_LEXICON: OnceLock<Lexicon> = OnceLock::new();

pub fn default_lexicon() -> &'static Lexicon {
  DEFAULT_LEXICON.get_or_init(|| {
    Lexicon::from_toml_str(DEFAULT_LEXICON_RAW)
      .unwrap_or_else(|e| panic!("parse bundled lexicon failed: {e}"))
  })
}
