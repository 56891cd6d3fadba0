//! A [`TermExtractor`] that needs no external service.

use medimatch_core::store::TermExtractor;

/// Splits free text on commas, semicolons, line breaks and the word "and".
///
/// "Headache, nausea and dizziness" yields `["Headache", "nausea",
/// "dizziness"]`. Terms are trimmed; empty pieces are skipped and repeated
/// terms are kept once, in first-seen order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedTermExtractor;

impl DelimitedTermExtractor {
  pub fn split(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();

    for piece in text.split([',', ';', '\n', '\r']) {
      let mut current: Vec<&str> = Vec::new();
      for word in piece.split_whitespace() {
        if word.eq_ignore_ascii_case("and") {
          push_term(&mut terms, &current);
          current.clear();
        } else {
          current.push(word);
        }
      }
      push_term(&mut terms, &current);
    }

    terms
  }
}

fn push_term(terms: &mut Vec<String>, words: &[&str]) {
  if words.is_empty() {
    return;
  }
  let term = words.join(" ");
  if !terms.iter().any(|t| t.eq_ignore_ascii_case(&term)) {
    terms.push(term);
  }
}

impl TermExtractor for DelimitedTermExtractor {
  async fn extract_terms(&self, text: &str) -> Vec<String> { Self::split(text) }
}
