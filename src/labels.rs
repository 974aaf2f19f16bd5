//! Class-id to display-name table.
//!
//! Two on-disk formats are accepted, line by line:
//!
//! - indexed: `<id><sep><name>`, e.g. `12: stop sign` or `12 stop sign`
//! - plain: `<name>`, keyed by the 0-based line number
//!
//! `<sep>` is one or more of `:` and whitespace. Both formats may be mixed in
//! one file; a line that does not look indexed falls back to its position.
//! An all-digit prefix too large for a `u32` id is not an index either: the
//! line is kept whole under its position and a warning is logged.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{LabelFileError, UnknownClassError};

/// How one line of the label file was interpreted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelEntry {
    /// Line carried its own integer id.
    Explicit { id: u32, name: String },
    /// Line had no id prefix and is keyed by its line number.
    Positional { line: u32, name: String },
}

impl LabelEntry {
    /// Interpret a single line found at `line` (0-based).
    pub fn parse(line: u32, raw: &str) -> Self {
        static SEPARATOR_RE: OnceLock<Regex> = OnceLock::new();
        let re = SEPARATOR_RE.get_or_init(|| Regex::new(r"[:\s]+").expect("valid separator regex"));

        let trimmed = raw.trim();
        let mut tokens = re.splitn(trimmed, 2);
        let first = tokens.next().unwrap_or("").trim();
        let rest = tokens.next();

        if let Some(rest) = rest {
            if !first.is_empty() && first.bytes().all(|b| b.is_ascii_digit()) {
                match first.parse::<u32>() {
                    Ok(id) => {
                        return LabelEntry::Explicit {
                            id,
                            name: rest.trim().to_string(),
                        }
                    }
                    Err(_) => log::warn!(
                        "label line {}: id {} is out of range, keeping the line as a plain name",
                        line,
                        first
                    ),
                }
            }
        }

        LabelEntry::Positional {
            line,
            name: trimmed.to_string(),
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            LabelEntry::Explicit { id, .. } => *id,
            LabelEntry::Positional { line, .. } => *line,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LabelEntry::Explicit { name, .. } | LabelEntry::Positional { name, .. } => name,
        }
    }
}

/// Immutable mapping from class id to name, built once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    names: BTreeMap<u32, String>,
}

impl LabelTable {
    /// Load a label file from disk.
    ///
    /// Only an unreadable file is an error; malformed lines degrade to the
    /// positional interpretation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LabelFileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LabelFileError {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&text);
        log::info!("loaded {} labels from {}", table.len(), path.display());
        Ok(table)
    }

    /// Build a table from label file contents.
    pub fn parse(text: &str) -> Self {
        Self::from_entries(
            text.lines()
                .enumerate()
                .map(|(line, raw)| LabelEntry::parse(line as u32, raw)),
        )
    }

    /// Later entries win when two lines resolve to the same id.
    pub fn from_entries<I: IntoIterator<Item = LabelEntry>>(entries: I) -> Self {
        let mut names = BTreeMap::new();
        for entry in entries {
            let id = entry.id();
            let name = match entry {
                LabelEntry::Explicit { name, .. } | LabelEntry::Positional { name, .. } => name,
            };
            names.insert(id, name);
        }
        Self { names }
    }

    pub fn lookup(&self, class_id: u32) -> Result<&str, UnknownClassError> {
        self.names
            .get(&class_id)
            .map(String::as_str)
            .ok_or(UnknownClassError(class_id))
    }

    /// First id whose name equals `name`.
    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .find(|(_, candidate)| candidate.as_str() == name)
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names.iter().map(|(id, name)| (*id, name.as_str()))
    }
}
