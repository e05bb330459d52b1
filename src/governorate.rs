//! Explicit governorate → integer encoding.
//!
//! Codes are handed out in first-occurrence order starting at 1; 0 is kept for
//! a missing governorate. An encoding fitted on a training batch is meant to be
//! persisted next to the model and passed to every later feature build, so
//! serving never re-derives codes from its own row order.

use crate::error::{ChurnPipelineError, Result};
use crate::schema::ClientRecord;
use crate::utils::non_empty;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Code used for rows whose governorate is blank.
pub const MISSING_GOVERNORATE_CODE: u32 = 0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct GovernorateEncoding {
    names: Vec<String>,
    codes: HashMap<String, u32>,
}

impl GovernorateEncoding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fits an encoding over a client batch in row order.
    pub fn fit(clients: &[ClientRecord]) -> Self {
        Self::from_names(clients.iter().map(|c| c.governorate.as_deref()))
    }

    /// Fits an encoding over raw governorate values. Blank values do not
    /// consume a code.
    pub fn from_names<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut encoding = Self::new();
        for value in values {
            if let Some(name) = non_empty(value) {
                encoding.insert(name);
            }
        }
        encoding
    }

    /// Returns the code for `name`, assigning the next one if unseen.
    pub fn insert(&mut self, name: &str) -> u32 {
        if let Some(&code) = self.codes.get(name) {
            return code;
        }
        self.names.push(name.to_string());
        let code = self.names.len() as u32;
        self.codes.insert(name.to_string(), code);
        code
    }

    pub fn code(&self, name: &str) -> Option<u32> {
        self.codes.get(name).copied()
    }

    /// Encodes one raw value: blank maps to 0, unknown names are an error.
    pub fn encode(&self, value: Option<&str>) -> Result<u32> {
        match non_empty(value) {
            None => Ok(MISSING_GOVERNORATE_CODE),
            Some(name) => self
                .code(name)
                .ok_or_else(|| ChurnPipelineError::UnknownGovernorate(name.to_string())),
        }
    }

    pub fn name(&self, code: u32) -> Option<&str> {
        if code == MISSING_GOVERNORATE_CODE {
            return None;
        }
        self.names.get(code as usize - 1).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in code order (index 0 holds code 1).
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl TryFrom<Vec<String>> for GovernorateEncoding {
    type Error = String;

    fn try_from(names: Vec<String>) -> std::result::Result<Self, Self::Error> {
        let mut encoding = Self::new();
        for name in &names {
            if name.trim().is_empty() {
                return Err("governorate encoding contains a blank name".to_string());
            }
            if encoding.code(name).is_some() {
                return Err(format!("governorate '{}' appears twice in encoding", name));
            }
            encoding.insert(name);
        }
        Ok(encoding)
    }
}

impl From<GovernorateEncoding> for Vec<String> {
    fn from(encoding: GovernorateEncoding) -> Self {
        encoding.names
    }
}
