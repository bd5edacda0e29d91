//! Author/editor name representation

use serde::{Deserialize, Serialize};

/// One author or editor, decomposed for display and search.
///
/// People are embedded in a work's author/editor lists; there is no
/// cross-work person identity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Person {
    pub family_name: String,
    pub given_name: Option<String>,
}

impl Person {
    /// Create a person with just a family name
    pub fn new(family_name: impl Into<String>) -> Self {
        Self {
            family_name: family_name.into(),
            given_name: None,
        }
    }

    /// Builder method to add a given name
    pub fn with_given_name(mut self, given: impl Into<String>) -> Self {
        self.given_name = Some(given.into());
        self
    }

    /// Format as "Family, Given" for citation text
    pub fn citation_name(&self) -> String {
        match &self.given_name {
            Some(given) => format!("{}, {}", self.family_name, given),
            None => self.family_name.clone(),
        }
    }

    /// Format as "Given Family" for display
    pub fn display_name(&self) -> String {
        match &self.given_name {
            Some(given) => format!("{} {}", given, self.family_name),
            None => self.family_name.clone(),
        }
    }
}
