//! Highlighted fragment extraction from stored page text.

/// How matched terms are marked inside a fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HighlightStyle {
    /// Plain-text `**term**` markers.
    Plain,
    /// Bold cyan ANSI escapes for terminal output.
    Ansi,
    /// `<span class="match">term</span>` for web output.
    Html,
}

impl HighlightStyle {
    fn markers(&self) -> (&'static str, &'static str) {
        match self {
            HighlightStyle::Plain => ("**", "**"),
            HighlightStyle::Ansi => ("\x1b[1;36m", "\x1b[0m"),
            HighlightStyle::Html => ("<span class=\"match\">", "</span>"),
        }
    }
}

/// Extract the words of a query string usable for literal highlighting:
/// boolean operators, field prefixes, and quoting are stripped.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c| matches!(c, '"' | '(' | ')' | '+' | '-')))
        .filter(|w| !w.is_empty())
        .filter(|w| !matches!(*w, "AND" | "OR" | "NOT"))
        .map(|w| w.rsplit(':').next().unwrap_or(w).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Generate a fragment of at most `max_chars` characters of context around
/// the earliest matching term, with matches marked per `style`. Falls back to
/// the start of the text when no term occurs literally (stemmed matches).
pub fn highlighted_fragment(
    text: &str,
    terms: &[String],
    max_chars: usize,
    style: HighlightStyle,
) -> String {
    let match_pos = terms
        .iter()
        .filter_map(|term| find_ci(text, term))
        .min()
        .unwrap_or(0);

    let context_before = max_chars / 3;
    let start = if match_pos > context_before {
        let search_start = floor_boundary(text, match_pos - context_before);
        text[search_start..match_pos]
            .find(char::is_whitespace)
            .map(|p| search_start + p + 1)
            .unwrap_or(search_start)
    } else {
        0
    };
    let start = floor_boundary(text, start);

    // Only cut on a word boundary when the window actually truncates.
    let end = if start + max_chars < text.len() {
        let window_end = floor_boundary(text, start + max_chars);
        text[start..window_end]
            .rfind(char::is_whitespace)
            .map(|p| start + p)
            .filter(|&p| p > match_pos)
            .unwrap_or(window_end)
    } else {
        text.len()
    };

    let mut fragment = String::new();
    if start > 0 {
        fragment.push_str("...");
    }
    fragment.push_str(&mark_terms(collapse_whitespace(text[start..end].trim()).as_str(), terms, style));
    if end < text.len() {
        fragment.push_str("...");
    }
    fragment
}

/// Mark every literal occurrence of the terms, preserving original case.
/// All match ranges are found on the untouched text first, so inserted
/// markers can never themselves be matched by a later term.
fn mark_terms(text: &str, terms: &[String], style: HighlightStyle) -> String {
    let (open, close) = style.markers();

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for term in terms {
        if term.is_empty() {
            continue;
        }
        let mut pos = 0;
        while pos < text.len() {
            match ci_match_len(&text[pos..], term) {
                Some(len) => {
                    ranges.push((pos, pos + len));
                    pos += len;
                }
                None => {
                    pos += text[pos..]
                        .chars()
                        .next()
                        .map(char::len_utf8)
                        .unwrap_or(1);
                }
            }
        }
    }
    ranges.sort_unstable();

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in ranges {
        // A range overlapping an already rendered one is dropped.
        if start < cursor {
            continue;
        }
        result.push_str(&text[cursor..start]);
        result.push_str(open);
        result.push_str(&text[start..end]);
        result.push_str(close);
        cursor = end;
    }
    result.push_str(&text[cursor..]);
    result
}

/// Byte length of the prefix of `window` that case-insensitively equals
/// `term` (which is already lowercase), or `None`. Comparison lowercases one
/// character at a time, so multi-byte case folds cannot drift the offsets.
fn ci_match_len(window: &str, term: &str) -> Option<usize> {
    let mut rest = term;
    let mut consumed = 0;
    for c in window.chars() {
        let lowered: String = c.to_lowercase().collect();
        rest = rest.strip_prefix(lowered.as_str())?;
        consumed += c.len_utf8();
        if rest.is_empty() {
            return Some(consumed);
        }
    }
    None
}

/// Byte position of the first case-insensitive occurrence of `term`.
fn find_ci(text: &str, term: &str) -> Option<usize> {
    if term.is_empty() {
        return None;
    }
    let mut pos = 0;
    while pos < text.len() {
        if ci_match_len(&text[pos..], term).is_some() {
            return Some(pos);
        }
        pos += text[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
    }
    None
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
