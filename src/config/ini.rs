//! config::ini
//!
//! A minimal INI reader/writer for the `.pwclientrc` format.
//!
//! # Dialect
//!
//! This accepts the subset of the INI dialect that Patchwork's own tooling
//! has historically emitted and consumed:
//!
//! - `[section]` headers; section names keep their case
//! - `key = value` or `key: value`; keys are lowercased, values keep
//!   surrounding whitespace trimmed
//! - blank lines and lines starting with `#` or `;` are ignored
//! - a duplicate key within a section overwrites the earlier value;
//!   a duplicate section continues the earlier one
//!
//! Section and key order is preserved so that a loaded file can be written
//! back without gratuitous reshuffling.

use thiserror::Error;

/// Error from parsing an INI document.
#[derive(Debug, Clone, Error)]
#[error("line {line}: {message}")]
pub struct IniError {
    /// 1-based line number of the offending line.
    pub line: usize,
    /// What was wrong with it.
    pub message: String,
}

/// A section: name plus ordered key/value pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    /// Section name as written in the file.
    pub name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    /// Look up a key (keys are stored lowercased).
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a key, replacing any existing value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let key = key.to_lowercase();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Iterate over entries in file order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// An ordered INI document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ini {
    sections: Vec<Section>,
}

impl Ini {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document from text.
    ///
    /// # Errors
    ///
    /// Returns `IniError` on an unterminated section header, a key/value
    /// line outside any section, or a line that is neither a header nor a
    /// key/value pair.
    pub fn parse(text: &str) -> Result<Self, IniError> {
        let mut doc = Ini::new();
        let mut current: Option<usize> = None;

        for (idx, raw) in text.lines().enumerate() {
            let lineno = idx + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| IniError {
                    line: lineno,
                    message: "unterminated section header".to_string(),
                })?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(IniError {
                        line: lineno,
                        message: "empty section name".to_string(),
                    });
                }
                current = Some(doc.section_index_or_insert(name));
                continue;
            }

            let split = line
                .char_indices()
                .find(|(_, c)| *c == '=' || *c == ':')
                .map(|(i, _)| i);
            let Some(split) = split else {
                return Err(IniError {
                    line: lineno,
                    message: format!("expected 'key = value', got '{line}'"),
                });
            };
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            if key.is_empty() {
                return Err(IniError {
                    line: lineno,
                    message: "empty key".to_string(),
                });
            }

            let Some(section) = current else {
                return Err(IniError {
                    line: lineno,
                    message: format!("'{key}' appears before any section header"),
                });
            };
            doc.sections[section].set(key, value);
        }

        Ok(doc)
    }

    fn section_index_or_insert(&mut self, name: &str) -> usize {
        if let Some(idx) = self.sections.iter().position(|s| s.name == name) {
            return idx;
        }
        self.sections.push(Section {
            name: name.to_string(),
            entries: Vec::new(),
        });
        self.sections.len() - 1
    }

    /// Whether a section exists.
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|s| s.name == name)
    }

    /// Get a section by name.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Get a key within a section.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    /// Set a key, creating the section if needed.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let idx = self.section_index_or_insert(section);
        self.sections[idx].set(key, value);
    }

    /// Iterate over sections in file order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }
}

impl std::fmt::Display for Ini {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in section.entries() {
                writeln!(f, "{} = {}", key, value)?;
            }
        }
        Ok(())
    }
}
