use regex::Regex;
use serde::Deserialize;

use crate::dom::Document;
use crate::error::ConfigError;

/// Maps a location string to the canonical identifier of an item.
///
/// The first capture group is the identifier. The same pattern answers
/// "is this an item page", names the item in its context and keys the
/// thumbnail marks, so those three can never disagree.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct IdentityPattern {
    regex: Regex,
}

impl IdentityPattern {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let regex = compile(pattern)?;
        if regex.captures_len() < 2 {
            return Err(ConfigError::MissingCaptureGroup(pattern.to_string()));
        }
        Ok(Self { regex })
    }

    pub fn identify(&self, location: &str) -> Option<String> {
        self.regex
            .captures(location)?
            .get(1)
            .map(|m| m.as_str())
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
    }

    pub fn is_item_page(&self, doc: &Document) -> bool {
        self.identify(doc.location()).is_some()
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl TryFrom<String> for IdentityPattern {
    type Error = ConfigError;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        Self::new(&pattern)
    }
}

/// Plain yes/no URL filter, e.g. which response images are full-size assets.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct UrlPattern {
    regex: Regex,
}

impl UrlPattern {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            regex: compile(pattern)?,
        })
    }

    pub fn is_match(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl TryFrom<String> for UrlPattern {
    type Error = ConfigError;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        Self::new(&pattern)
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|err| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}
