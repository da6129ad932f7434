//! Local text heuristics behind `ArticleStats`.
//!
//! Everything here is pure and infallible. Lengths are counted in chars of
//! the markup-stripped text.

use crate::lexicon::Lexicon;
use crate::records::{ArticleStats, Sentiment};
use regex::Regex;
use std::sync::OnceLock;

pub const READING_CHARS_PER_MINUTE: usize = 200;

const SCORE_BASE: u32 = 50;
const SCORE_MAX: u32 = 100;
const LENGTH_STEPS: [usize; 3] = [1000, 3000, 5000];
const QUOTE_CHARS: [char; 3] = ['"', '\u{201C}', '\u{201D}'];

fn markup_regex() -> &'static Regex {
  static MARKUP: OnceLock<Regex> = OnceLock::new();
  MARKUP.get_or_init(|| Regex::new(r"<[^>]*>").unwrap_or_else(|e| panic!("compile markup regex failed: {e}")))
}

pub fn strip_markup(html: &str) -> String {
  markup_regex().replace_all(html, "").into_owned()
}

pub fn char_len(text: &str) -> usize {
  text.chars().count()
}

pub fn reading_time(word_count: usize) -> usize {
  word_count.div_ceil(READING_CHARS_PER_MINUTE)
}

fn count_hits(text: &str, words: &[String]) -> usize {
  words
    .iter()
    .filter(|w| !w.is_empty())
    .map(|w| text.matches(w.as_str()).count())
    .sum()
}

pub fn analyze_sentiment(text: &str, lexicon: &Lexicon) -> Sentiment {
  let positive = count_hits(text, &lexicon.sentiment.positive);
  let negative = count_hits(text, &lexicon.sentiment.negative);
  if positive > negative {
    Sentiment::Positive
  } else if negative > positive {
    Sentiment::Negative
  } else {
    Sentiment::Neutral
  }
}

pub fn generate_tags(text: &str, lexicon: &Lexicon) -> Vec<String> {
  lexicon
    .tags
    .iter()
    .filter(|rule| rule.matches(text))
    .map(|rule| rule.label.clone())
    .collect()
}

pub fn categorize(text: &str, lexicon: &Lexicon) -> String {
  lexicon
    .categories
    .iter()
    .find(|rule| rule.matches(text))
    .map(|rule| rule.label.clone())
    .unwrap_or_else(|| lexicon.fallback_category.clone())
}

pub fn paragraph_count(text: &str) -> usize {
  text.split("\n\n").filter(|p| !p.trim().is_empty()).count()
}

pub fn quote_count(text: &str) -> usize {
  text.chars().filter(|c| QUOTE_CHARS.contains(c)).count()
}

pub fn calculate_score(text: &str) -> u32 {
  let len = char_len(text);
  let mut score = SCORE_BASE;
  for step in LENGTH_STEPS {
    if len > step {
      score += 10;
    }
  }

  let paragraphs = paragraph_count(text);
  if paragraphs > 3 {
    score += 5;
  }
  if paragraphs > 6 {
    score += 5;
  }

  if quote_count(text) > 4 {
    score += 5;
  }

  score.min(SCORE_MAX)
}

/// Full local pass over already stripped text.
pub fn compute_stats(text: &str, lexicon: &Lexicon) -> ArticleStats {
  let word_count = char_len(text);
  ArticleStats {
    word_count,
    reading_time: reading_time(word_count),
    sentiment: analyze_sentiment(text, lexicon).as_str().to_string(),
    tags: generate_tags(text, lexicon),
    category: categorize(text, lexicon),
    score: calculate_score(text),
    ai_analysis: None,
  }
}
