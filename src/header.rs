/// Decoding of the KEY:VALUE header lines of Maxwell FEM and TEM files
use std::collections::BTreeMap;

use crate::error::{Result, SurveyError};

/// Token that marks a wrapped header line
pub const CONTINUATION_MARKER: &str = " &";

/// Remove line-continuation markers before any line splitting
pub fn strip_continuations(content: &str) -> String {
    content.replace(CONTINUATION_MARKER, "")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMap {
    fields: BTreeMap<String, String>,
}

impl HeaderMap {
    /// Decode whitespace separated KEY:VALUE tokens of one header line and merge them in
    pub fn extend_from_line(&mut self, line: &str) -> Result<()> {
        for token in line.split_whitespace() {
            let (key, value) = split_token(token)?;
            self.fields.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|v| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .map(|v| v.to_string())
            .ok_or_else(|| SurveyError::MissingHeaderField(key.to_string()))
    }

    /// Read a YES/NO flag. Anything other than "YES" is false.
    pub fn flag(&self, key: &str) -> Result<bool> {
        Ok(self.require(key)? == "YES")
    }

    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }
}

/// Decode a set of header lines into one mapping; later lines overwrite earlier keys
pub fn decode_header(lines: &[&str]) -> Result<HeaderMap> {
    let mut header = HeaderMap::default();
    for line in lines {
        header.extend_from_line(line)?;
    }
    Ok(header)
}

fn split_token(token: &str) -> Result<(&str, &str)> {
    token
        .split_once(':')
        .ok_or_else(|| SurveyError::Format(format!("header token '{token}' is not of the form KEY:VALUE")))
}

/// Remove the parentheses that units are wrapped in, e.g. "(nT/s)"
pub fn clean_units(units: &str) -> String {
    units.chars().filter(|c| !matches!(c, '(' | ')')).collect()
}
