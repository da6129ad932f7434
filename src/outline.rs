use crate::records::Chapter;
use regex::Regex;
use std::sync::OnceLock;

fn header_regex() -> &'static Regex {
  static HEADER: OnceLock<Regex> = OnceLock::new();
  HEADER.get_or_init(|| {
    Regex::new(r"(?m)^###(.*)$").unwrap_or_else(|e| panic!("compile outline header regex failed: {e}"))
  })
}

/// Split an outline into chapters.
///
/// Expected format:
/// ```text
/// ### Chapter title
/// What happens in this chapter.
/// ### Next title
/// ...
/// ```
///
/// A header is a line beginning with `###`; its body runs to the next header
/// or the end of input. Ids are assigned 1..n in document order, ignoring any
/// numbering inside the titles. Text before the first header is dropped.
pub fn parse_outline(outline: &str) -> Vec<Chapter> {
  let headers: Vec<(usize, usize, &str)> = header_regex()
    .captures_iter(outline)
    .filter_map(|cap| {
      let whole = cap.get(0)?;
      let title = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
      Some((whole.start(), whole.end(), title))
    })
    .collect();

  let mut chapters = Vec::with_capacity(headers.len());
  for (idx, (_, body_start, title)) in headers.iter().enumerate() {
    let body_end = headers
      .get(idx + 1)
      .map(|(next_start, _, _)| *next_start)
      .unwrap_or(outline.len());
    let body = &outline[*body_start..body_end];
    chapters.push(Chapter::new((idx + 1) as u32, title.trim(), body.trim()));
  }
  chapters
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_two_chapters() {
    let chapters = parse_outline("### Ch1\nBody one\n### Ch2\nBody two");
    assert_eq!(
      chapters,
      vec![Chapter::new(1, "Ch1", "Body one"), Chapter::new(2, "Ch2", "Body two")]
    );
    assert!(chapters.iter().all(|c| !c.is_completed && c.generated_text.is_empty()));
  }

  #[test]
  fn test_ids_ignore_numbers_in_titles() {
    let outline = "### 第十章 起源\n开端\n\n### 第三章 转折\n  中段  \n### 第一章 结局\n";
    let chapters = parse_outline(outline);
    let ids: Vec<u32> = chapters.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(chapters[0].title, "第十章 起源");
    assert_eq!(chapters[1].content, "中段");
    assert_eq!(chapters[2].content, "");
  }

  #[test]
  fn test_multiline_body_is_kept() {
    let chapters = parse_outline("# Book\nintro\n### One\nline a\n\nline b\r\n### Two\nc");
    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0].content, "line a\n\nline b");
  }

  #[test]
  fn test_mid_line_hashes_are_body_text() {
    let chapters = parse_outline("### One\nsee ### not a header\n### Two\nx");
    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0].content, "see ### not a header");
  }

  #[test]
  fn test_no_headers_yields_empty() {
    assert!(parse_outline("").is_empty());
    assert!(parse_outline("## Two hashes\nbody").is_empty());
  }

  #[test]
  fn test_count_matches_header_lines() {
    let outline = (1..=9)
      .map(|i| format!("### Part {i}\nbody {i}"))
      .collect::<Vec<_>>()
      .join("\n");
    let chapters = parse_outline(&outline);
    assert_eq!(chapters.len(), 9);
    assert_eq!(chapters.last().map(|c| c.id), Some(9));
  }
}
