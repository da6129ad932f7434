use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PromptMessage {
  pub role: String,
  pub content: String,
}

impl PromptMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self {
      role: "system".to_string(),
      content: content.into(),
    }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self {
      role: "user".to_string(),
      content: content.into(),
    }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self {
      role: "assistant".to_string(),
      content: content.into(),
    }
  }
}

/// Remote article analysis. Missing fields fall back to the local values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleAnalysis {
  #[serde(default)]
  pub sentiment: Option<String>,
  #[serde(default)]
  pub tags: Option<Vec<String>>,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub score: Option<u32>,
  /// Whole payload as returned, including fields this crate does not read.
  #[serde(skip)]
  pub raw: Value,
}

impl ArticleAnalysis {
  /// Reads each field on its own, so one loosely typed value does not
  /// discard the rest. Scores are rounded and clamped to `0..=100`.
  pub fn from_value(value: Value) -> Self {
    let text = |key: &str| value.get(key).and_then(Value::as_str).map(|s| s.to_string());
    let tags = value.get("tags").and_then(Value::as_array).map(|items| {
      items
        .iter()
        .filter_map(Value::as_str)
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
    });
    let score = value
      .get("score")
      .and_then(Value::as_f64)
      .filter(|n| n.is_finite())
      .map(|n| n.round().clamp(0.0, 100.0) as u32);
    Self {
      sentiment: text("sentiment"),
      tags,
      category: text("category"),
      score,
      raw: value,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SummaryOptions {
  pub max_length: Option<u32>,
  pub style: Option<String>,
}
