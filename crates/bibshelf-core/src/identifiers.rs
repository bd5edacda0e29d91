//! DOI extraction and cite-key derivation.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    // DOIs start with 10. followed by a registrant code and suffix.
    static ref DOI_REGEX: Regex =
        Regex::new(r"10\.\d{4,9}/[-._;/:A-Za-z0-9]+[A-Za-z0-9]").unwrap();
}

/// Extract putative DOIs from text, lowercased, in order of first appearance,
/// without duplicates.
pub fn extract_dois(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    DOI_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|doi| seen.insert(doi.clone()))
        .collect()
}

/// Derive a proposed cite key: first author family name, year, then the first
/// letter of each of the first three significant title words, lowercased.
/// `Smith` + `2020` + "A Better Computer" gives `Smith2020abc`.
pub fn derive_cite_key(family_name: &str, year: Option<i32>, title: &str) -> String {
    let mut suffix = String::new();
    for word in title.split_whitespace() {
        if let Some(ch) = word.chars().find(|c| c.is_alphanumeric()) {
            suffix.extend(ch.to_lowercase());
        }
        if suffix.chars().count() == 3 {
            break;
        }
    }

    let family: String = family_name.chars().filter(|c| !c.is_whitespace()).collect();
    format!("{}{}{}", family, year.unwrap_or(0), suffix)
}

/// Resolve a cite-key collision by appending the shortest unused letter
/// sequence: `a`, `b`, ... `z`, `aa`, `ab`, ... Deterministic given the same
/// existing-key set.
pub fn resolve_collision(proposed: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(proposed) {
        return proposed.to_string();
    }

    for len in 1usize.. {
        let mut indices = vec![0usize; len];
        loop {
            let suffix: String = indices.iter().map(|&i| (b'a' + i as u8) as char).collect();
            let candidate = format!("{}{}", proposed, suffix);
            if !existing.contains(&candidate) {
                return candidate;
            }
            // Increment the suffix as a base-26 counter.
            let mut pos = len;
            loop {
                if pos == 0 {
                    break;
                }
                pos -= 1;
                indices[pos] += 1;
                if indices[pos] < 26 {
                    break;
                }
                indices[pos] = 0;
            }
            if indices.iter().all(|&i| i == 0) {
                break;
            }
        }
    }
    unreachable!("suffix space is unbounded")
}
