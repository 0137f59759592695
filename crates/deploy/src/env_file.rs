//! Line-preserving model of a stack `.env` file.
//!
//! Only the keys that are explicitly set or removed are rewritten. Every other line
//! (comments, blank lines, unknown keys) is kept verbatim.

use std::path::{Path, PathBuf};

use crate::error::{DeployError, Result};

/// An ordered sequence of `KEY=VALUE` lines backed by a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFile {
    path: PathBuf,
    lines: Vec<String>,
    /// Rendered content as last read from or written to disk.
    persisted: String,
    /// Keys modified since the last save, for error context.
    touched: Vec<String>,
}

impl EnvFile {
    /// Load an environment file. A missing file loads as empty.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(DeployError::io(path, e)),
        };
        Ok(Self::parse(path, &content))
    }

    /// Parse environment file content that belongs to `path`.
    pub fn parse(path: &Path, content: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            lines: content.lines().map(str::to_string).collect(),
            persisted: content.to_string(),
            touched: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The value of the first occurrence of `key`, unquoted.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lines
            .iter()
            .find_map(|line| match split_entry(line) {
                Some((k, raw)) if k == key => Some(parse_value(raw)),
                _ => None,
            })
    }

    /// Returns true if `key` is present with a non-empty value.
    pub fn has_value(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| !value.is_empty())
    }

    /// Number of lines defining `key`.
    pub fn occurrences(&self, key: &str) -> usize {
        self.lines
            .iter()
            .filter(|line| split_entry(line).is_some_and(|(k, _)| k == key))
            .count()
    }

    /// Set `key` to `value`.
    ///
    /// The first occurrence is rewritten in place, later duplicates are dropped, and the
    /// key is appended when absent. Returns true if the content changed.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let line = format!("{key}={}", format_value(value));
        let exported = format!("export {line}");
        let before = self.lines.len();

        let mut seen = false;
        let mut changed = false;
        self.lines.retain_mut(|existing| {
            if !split_entry(existing).is_some_and(|(k, _)| k == key) {
                return true;
            }
            if seen {
                return false;
            }
            seen = true;
            let replacement = if existing.trim_start().starts_with("export ") {
                &exported
            } else {
                &line
            };
            if *existing != *replacement {
                *existing = replacement.clone();
                changed = true;
            }
            true
        });

        if !seen {
            self.lines.push(line);
        }

        let changed = changed || !seen || self.lines.len() != before;
        if changed {
            self.touched.push(key.to_string());
        }
        changed
    }

    /// Remove every occurrence of `key`. Returns true if the content changed.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|line| !split_entry(line).is_some_and(|(k, _)| k == key));

        let changed = self.lines.len() != before;
        if changed {
            self.touched.push(key.to_string());
        }
        changed
    }

    /// Render the file content.
    pub fn render(&self) -> String {
        let mut content = self.lines.join("\n");
        if !self.lines.is_empty() {
            content.push('\n');
        }
        content
    }

    /// Write the file if its content changed. Returns true if it was written.
    pub fn save(&mut self) -> Result<bool> {
        let content = self.render();
        if content == self.persisted {
            return Ok(false);
        }

        std::fs::write(&self.path, &content)
            .map_err(|e| DeployError::config_write(&self.path, self.touched.join(","), e))?;

        tracing::debug!(
            path = %self.path.display(),
            keys = ?self.touched,
            "Environment file updated"
        );

        self.persisted = content;
        self.touched.clear();
        Ok(true)
    }
}

/// Split an assignment line into its key and raw value.
fn split_entry(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, raw) = line.split_once('=')?;
    let key = key.trim_end();

    let mut chars = key.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    valid.then_some((key, raw))
}

/// Format a value for writing: numeric values stay bare, everything else is quoted.
pub fn format_value(value: &str) -> String {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Parse a raw value, removing quotes and escapes.
///
/// A quoted value ends at its closing quote; anything after it, such as an inline
/// comment, is ignored.
pub fn parse_value(raw: &str) -> String {
    let raw = raw.trim();

    if let Some(inner) = raw.strip_prefix('"') {
        let mut value = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => break,
                '\\' => match chars.next() {
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some(other) => value.push(other),
                    None => value.push('\\'),
                },
                c => value.push(c),
            }
        }
        return value;
    }

    if let Some(inner) = raw.strip_prefix('\'') {
        // Single quotes take everything literally up to the closing quote.
        return match inner.find('\'') {
            Some(end) => inner[..end].to_string(),
            None => inner.to_string(),
        };
    }

    // Unquoted values end at an inline comment.
    match raw.find(" #") {
        Some(idx) => raw[..idx].trim_end().to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(content: &str) -> EnvFile {
        EnvFile::parse(Path::new("/tmp/.env"), content)
    }

    #[test]
    fn test_get_unquotes_values() {
        let file = env(
            "# comment\nCHAIN_ID=\"evolve-test\"\nDA_RPC_PORT=26658\nSINGLE='raw \\value'\nexport TOKEN=abc # note\nEMPTY=\n",
        );

        assert_eq!(file.get("CHAIN_ID").as_deref(), Some("evolve-test"));
        assert_eq!(file.get("DA_RPC_PORT").as_deref(), Some("26658"));
        assert_eq!(file.get("SINGLE").as_deref(), Some("raw \\value"));
        assert_eq!(file.get("TOKEN").as_deref(), Some("abc"));
        assert_eq!(file.get("EMPTY").as_deref(), Some(""));
        assert!(!file.has_value("EMPTY"));
        assert_eq!(file.get("MISSING"), None);
    }

    #[test]
    fn test_commented_keys_are_ignored() {
        let file = env("# CHAIN_ID=\"old\"\n  #DA_NAMESPACE=x\n");
        assert_eq!(file.get("CHAIN_ID"), None);
        assert_eq!(file.get("DA_NAMESPACE"), None);
    }

    #[test]
    fn test_set_rewrites_first_and_drops_duplicates() {
        let mut file = env("A=1\nDA_NAMESPACE=\nB=2\nDA_NAMESPACE=\"old\"\n");

        assert!(file.set("DA_NAMESPACE", "abc123"));
        assert_eq!(file.render(), "A=1\nDA_NAMESPACE=\"abc123\"\nB=2\n");
        assert_eq!(file.occurrences("DA_NAMESPACE"), 1);

        assert!(!file.set("DA_NAMESPACE", "abc123"));
    }

    #[test]
    fn test_set_appends_missing_key() {
        let mut file = env("A=1");
        assert!(file.set("CHAIN_ID", "42"));
        assert_eq!(file.render(), "A=1\nCHAIN_ID=42\n");
    }

    #[test]
    fn test_values_are_quoted_unless_numeric() {
        assert_eq!(format_value("1234"), "1234");
        assert_eq!(format_value(""), "\"\"");
        assert_eq!(format_value("abc"), "\"abc\"");
        assert_eq!(format_value("-1"), "\"-1\"");
        assert_eq!(format_value("a\"b\\c\nd"), "\"a\\\"b\\\\c\\nd\"");
        assert_eq!(parse_value(&format_value("a\"b\\c\nd")), "a\"b\\c\nd");
    }

    #[test]
    fn test_quoted_values_ignore_trailing_comments() {
        let file = env(
            "EVM_SIGNER_PASSPHRASE=\"\" # generated\nDA_NAMESPACE=\"abc123\" # namespace\nESCAPED=\"a\\\"b\" # x\nSINGLE='raw # kept' trailing\nOPEN=\"unterminated\n",
        );

        assert_eq!(file.get("EVM_SIGNER_PASSPHRASE").as_deref(), Some(""));
        assert!(!file.has_value("EVM_SIGNER_PASSPHRASE"));
        assert_eq!(file.get("DA_NAMESPACE").as_deref(), Some("abc123"));
        assert_eq!(file.get("ESCAPED").as_deref(), Some("a\"b"));
        assert_eq!(file.get("SINGLE").as_deref(), Some("raw # kept"));
        assert_eq!(file.get("OPEN").as_deref(), Some("unterminated"));
    }

    #[test]
    fn test_set_keeps_export_prefix() {
        let mut file = env("export CHAIN_ID=\"old\" # set by hand\nA=1\nexport CHAIN_ID=dup\n");

        assert_eq!(file.get("CHAIN_ID").as_deref(), Some("old"));
        assert!(file.set("CHAIN_ID", "1234"));
        assert_eq!(file.render(), "export CHAIN_ID=1234\nA=1\n");
        assert!(!file.set("CHAIN_ID", "1234"));
    }

    #[test]
    fn test_remove_drops_all_occurrences() {
        let mut file = env("DA_NAMESPACE=\nA=1\nDA_NAMESPACE=x\n");
        assert!(file.remove("DA_NAMESPACE"));
        assert_eq!(file.render(), "A=1\n");
        assert!(!file.remove("DA_NAMESPACE"));
    }

    #[test]
    fn test_save_only_writes_changes() {
        let dir = tempdir::TempDir::new("evstack-env").unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "A=1\n").unwrap();

        let mut file = EnvFile::load(&path).unwrap();
        assert!(!file.save().unwrap());

        file.set("B", "two");
        assert!(file.save().unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A=1\nB=\"two\"\n");
        assert!(!file.save().unwrap());
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir::TempDir::new("evstack-env").unwrap();
        let file = EnvFile::load(&dir.path().join(".env")).unwrap();
        assert_eq!(file.render(), "");
    }
}
