use regex::{Captures, Regex};
use serde::Deserialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, Deserialize)]
pub struct PromptConfig {
  pub system: String,
  pub outline: String,
  pub chapter: String,
  pub summary: String,
  pub advice: String,
  pub personalized: String,
  pub general: String,
  pub analysis: String,
}

const PROMPTS_RAW: &str = include_str!("../config/prompts.toml");
static PROMPTS: OnceLock<PromptConfig> = OnceLock::new();

pub fn prompts() -> &'static PromptConfig {
  PROMPTS.get_or_init(|| {
    toml::from_str(PROMPTS_RAW).unwrap_or_else(|e| panic!("parse prompt config failed: {e}"))
  })
}

fn placeholder_regex() -> &'static Regex {
  static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
  PLACEHOLDER.get_or_init(|| {
    Regex::new(r"\{(\w+)\}").unwrap_or_else(|e| panic!("compile placeholder regex failed: {e}"))
  })
}

/// Substitute `{key}` placeholders in one pass over the template. Inserted
/// values are never scanned again; unknown keys stay as written.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
  placeholder_regex()
    .replace_all(template, |caps: &Captures| {
      let key = &caps[1];
      match vars.iter().find(|(name, _)| *name == key) {
        Some((_, value)) => value.to_string(),
        None => caps[0].to_string(),
      }
    })
    .into_owned()
}
