use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

pub fn new_record_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

/// Accepts ids written either as strings or as bare numbers, which is how
/// older corpus exports stored them.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!("invalid id: {other}"))),
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
  pub id: u32,
  pub title: String,
  pub content: String,
  #[serde(default)]
  pub generated_text: String,
  #[serde(default)]
  pub is_completed: bool,
}

impl Chapter {
  pub fn new(id: u32, title: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      id,
      title: title.into(),
      content: content.into(),
      generated_text: String::new(),
      is_completed: false,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
  pub id: String,
  pub content: String,
  pub is_user: bool,
  pub timestamp: String,
}

impl ChatMessage {
  pub fn new(content: impl Into<String>, is_user: bool) -> Self {
    Self {
      id: new_record_id(),
      content: content.into(),
      is_user,
      timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusEntry {
  #[serde(deserialize_with = "id_from_string_or_number")]
  pub id: String,
  pub content: String,
  #[serde(default)]
  pub created_at: String,
}

impl CorpusEntry {
  pub fn new(content: impl Into<String>) -> Self {
    Self {
      id: new_record_id(),
      content: content.into(),
      created_at: chrono::Utc::now().to_rfc3339(),
    }
  }
}

/// Character form input. `traits_input` is the raw comma separated field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDraft {
  #[serde(default)]
  pub traits_input: String,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
  #[serde(deserialize_with = "id_from_string_or_number")]
  pub id: String,
  #[serde(default)]
  pub traits: Vec<String>,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl Character {
  pub fn from_draft(draft: CharacterDraft) -> Self {
    let traits = draft
      .traits_input
      .split(',')
      .map(|t| t.trim())
      .filter(|t| !t.is_empty())
      .map(|t| t.to_string())
      .collect();
    let mut fields = draft.fields;
    fields.remove("id");
    fields.remove("traits");
    Self {
      id: new_record_id(),
      traits,
      fields,
    }
  }

  pub fn field(&self, key: &str) -> Option<&Value> {
    self.fields.get(key)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSetting {
  #[serde(deserialize_with = "id_from_string_or_number")]
  pub id: String,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl WorldSetting {
  pub fn new(mut fields: Map<String, Value>) -> Self {
    fields.remove("id");
    Self {
      id: new_record_id(),
      fields,
    }
  }

  /// Shallow merge; keys in `patch` overwrite, the id never changes.
  pub fn merge(&mut self, patch: Map<String, Value>) {
    for (key, value) in patch {
      if key == "id" {
        continue;
      }
      self.fields.insert(key, value);
    }
  }

  pub fn field(&self, key: &str) -> Option<&Value> {
    self.fields.get(key)
  }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Template {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiConfig {
  pub api_key: String,
  #[serde(rename = "baseURL")]
  pub base_url: String,
  pub selected_model: String,
  pub max_tokens: Option<u32>,
  pub temperature: f32,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      api_key: String::new(),
      base_url: DEFAULT_BASE_URL.to_string(),
      selected_model: DEFAULT_MODEL.to_string(),
      max_tokens: None,
      temperature: 0.7,
    }
  }
}

impl ApiConfig {
  pub fn is_configured(&self) -> bool {
    !self.api_key.is_empty()
  }

  pub fn merge(&mut self, patch: ApiConfigPatch) {
    if let Some(v) = patch.api_key {
      self.api_key = v;
    }
    if let Some(v) = patch.base_url {
      self.base_url = v;
    }
    if let Some(v) = patch.selected_model {
      self.selected_model = v;
    }
    if let Some(v) = patch.max_tokens {
      self.max_tokens = v;
    }
    if let Some(v) = patch.temperature {
      self.temperature = v;
    }
  }
}

/// Partial config update. `max_tokens: Some(None)` clears the limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiConfigPatch {
  pub api_key: Option<String>,
  pub base_url: Option<String>,
  pub selected_model: Option<String>,
  pub max_tokens: Option<Option<u32>>,
  pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
  Positive,
  Negative,
  Neutral,
}

impl Sentiment {
  pub fn as_str(&self) -> &'static str {
    match self {
      Sentiment::Positive => "positive",
      Sentiment::Negative => "negative",
      Sentiment::Neutral => "neutral",
    }
  }
}

impl fmt::Display for Sentiment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleStats {
  pub word_count: usize,
  pub reading_time: usize,
  pub sentiment: String,
  pub tags: Vec<String>,
  pub category: String,
  pub score: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ai_analysis: Option<Value>,
}

impl Default for ArticleStats {
  fn default() -> Self {
    Self {
      word_count: 0,
      reading_time: 0,
      sentiment: Sentiment::Neutral.as_str().to_string(),
      tags: vec![],
      category: "other".to_string(),
      score: 50,
      ai_analysis: None,
    }
  }
}
