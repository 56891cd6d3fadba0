//! Text normalization for tolerant name matching.
//!
//! [`normalize`] turns a display name or a free-text term into a comparison
//! key. Both ingestion (when storing `name_key` columns) and lookups go
//! through it, so `"  ASPIRIN "` and `"'Aspirin'"` meet on `"aspirin"`.
//!
//! This is not a stemmer: synonyms and translations are the job of the
//! external term extractor.

/// Characters removed outright. Quotes glue words together rather than
/// separating them (`"Crohn's"` becomes `"crohns"`).
const DROPPED: &[char] = &['\'', '"', '`', '\u{2018}', '\u{2019}'];

/// Characters treated as word separators.
const SEPARATORS: &[char] = &[
  '.', ',', ';', ':', '!', '?', '(', ')', '[', ']', '{', '}', '/', '\\', '|',
  '*', '_',
];

/// Canonicalise `text` into a comparison key.
///
/// Lower-cases, drops quote characters, turns the fixed punctuation set into
/// whitespace, then trims and collapses whitespace runs. Total and
/// idempotent.
pub fn normalize(text: &str) -> String {
  let mut key = String::with_capacity(text.len());
  let mut pending_space = false;
  // Separators before the first kept character are dropped, not deferred.
  let mut at_start = true;

  for c in text.chars() {
    if DROPPED.contains(&c) {
      continue;
    }
    if c.is_whitespace() || SEPARATORS.contains(&c) {
      pending_space = !at_start;
      continue;
    }
    if pending_space {
      key.push(' ');
      pending_space = false;
    }
    key.extend(c.to_lowercase());
    at_start = false;
  }

  key
}

/// Single quotes the source files wrap names in.
const WRAPPING: &[char] = &['\'', '`', '\u{2018}', '\u{2019}'];

/// Tidy a display name from source data before it is stored.
///
/// Source files wrap some names in single quotes and pad them with
/// whitespace; neither belongs in the catalog. Case, inner punctuation and
/// double quotes (the CSV reader has already unescaped those) are kept.
pub fn clean_display_name(raw: &str) -> String {
  raw
    .trim()
    .trim_matches(|c: char| WRAPPING.contains(&c))
    .trim()
    .to_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lowercases_and_trims() {
    assert_eq!(normalize("  ASPIRIN "), "aspirin");
  }

  #[test]
  fn collapses_inner_whitespace() {
    assert_eq!(normalize("acetyl \t salicylic\n\nacid"), "acetyl salicylic acid");
  }

  #[test]
  fn strips_quotes_without_splitting() {
    assert_eq!(normalize("'Crohn's disease'"), "crohns disease");
  }

  #[test]
  fn punctuation_becomes_separator() {
    assert_eq!(normalize("nausea,vomiting (severe)."), "nausea vomiting severe");
  }

  #[test]
  fn keeps_hyphens_and_digits() {
    assert_eq!(normalize("5-HT2A Receptor"), "5-ht2a receptor");
  }

  #[test]
  fn empty_and_blank_inputs() {
    assert_eq!(normalize(""), "");
    assert_eq!(normalize("  ...  "), "");
  }

  #[test]
  fn idempotent() {
    for input in [
      "  ASPIRIN ",
      "'Crohn's disease'",
      "Nausea;  Vomiting!!",
      "İstanbul Fever",
      "a / b \\ c | d",
      "",
    ] {
      let once = normalize(input);
      assert_eq!(normalize(&once), once, "input: {input:?}");
    }
  }

  #[test]
  fn clean_display_name_strips_wrapping_quotes() {
    assert_eq!(clean_display_name("  'aspirin' "), "aspirin");
    assert_eq!(clean_display_name("Crohn's disease"), "Crohn's disease");
    assert_eq!(clean_display_name("Ibuprofen"), "Ibuprofen");
    assert_eq!(clean_display_name(r#"Pain, "severe""#), r#"Pain, "severe""#);
  }
}
