//! Line-indexed editor for TOML-like node configuration files.
//!
//! Edits are structural (section-scoped key lookup and insertion) but the document is
//! kept as lines, so every line that is not targeted is written back verbatim.

use std::path::{Path, PathBuf};

use crate::error::{DeployError, Result};

/// A node configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfigDocument {
    path: PathBuf,
    lines: Vec<String>,
    persisted: String,
    touched: Vec<String>,
}

impl NodeConfigDocument {
    /// Load a document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DeployError::io(path, e))?;
        Ok(Self::parse(path, &content))
    }

    /// Parse document content that belongs to `path`.
    pub fn parse(path: &Path, content: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            lines: content.lines().map(str::to_string).collect(),
            persisted: content.to_string(),
            touched: Vec::new(),
        }
    }

    /// Line range `(header, end)` of a section, `end` being exclusive.
    fn section_span(&self, section: &str) -> Option<(usize, usize)> {
        let header = format!("[{section}]");
        let start = self
            .lines
            .iter()
            .position(|line| strip_comment(line).trim() == header)?;

        let end = self.lines[start + 1..]
            .iter()
            .position(|line| line.trim_start().starts_with('['))
            .map_or(self.lines.len(), |offset| start + 1 + offset);

        Some((start, end))
    }

    /// Set `key = literal` inside `section`.
    ///
    /// An existing key in the section span is rewritten (keeping its indentation);
    /// otherwise the key is inserted right after the section header. A missing section is
    /// appended at the end of the document. Returns true if the document changed.
    pub fn set_in_section(&mut self, section: &str, key: &str, literal: &str) -> bool {
        let Some((start, end)) = self.section_span(section) else {
            if self.lines.last().is_some_and(|line| !line.trim().is_empty()) {
                self.lines.push(String::new());
            }
            self.lines.push(format!("[{section}]"));
            self.lines.push(format!("  {key} = {literal}"));
            self.touched.push(format!("{section}.{key}"));
            return true;
        };

        let existing = (start + 1..end).find(|&idx| match_key(&self.lines[idx], key).is_some());

        let changed = match existing {
            Some(idx) => {
                let line = &self.lines[idx];
                let indent = &line[..line.len() - line.trim_start().len()];
                let updated = format!("{indent}{key} = {literal}");
                if *line == updated {
                    false
                } else {
                    self.lines[idx] = updated;
                    true
                }
            }
            None => {
                let indent = self.lines[start + 1..end]
                    .iter()
                    .find(|line| !line.trim().is_empty())
                    .map(|line| line[..line.len() - line.trim_start().len()].to_string())
                    .unwrap_or_default();
                self.lines
                    .insert(start + 1, format!("{indent}{key} = {literal}"));
                true
            }
        };

        if changed {
            self.touched.push(format!("{section}.{key}"));
        }
        changed
    }

    /// Rewrite loopback bindings of `port` (`localhost:<port>`, `127.0.0.1:<port>`) to the
    /// wildcard address on every non-comment line. Returns the number of rewritten lines.
    pub fn rebind_loopback(&mut self, port: u16) -> usize {
        let wildcard = format!("0.0.0.0:{port}");
        let loopbacks = [format!("localhost:{port}"), format!("127.0.0.1:{port}")];

        let mut rewritten = 0;
        for line in &mut self.lines {
            if line.trim_start().starts_with('#') {
                continue;
            }
            let mut updated = line.clone();
            for loopback in &loopbacks {
                updated = replace_host_port(&updated, loopback, &wildcard);
            }
            if updated != *line {
                *line = updated;
                rewritten += 1;
            }
        }

        if rewritten > 0 {
            self.touched.push(format!("bind:{port}"));
        }
        rewritten
    }

    pub fn render(&self) -> String {
        let mut content = self.lines.join("\n");
        if !self.lines.is_empty() {
            content.push('\n');
        }
        content
    }

    /// Write the document if it changed. Returns true if it was written.
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
            "Node configuration updated"
        );

        self.persisted = content;
        self.touched.clear();
        Ok(true)
    }
}

/// Match `key = value` anchored at the start of the line (after optional whitespace).
fn match_key<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.trim_start().strip_prefix(key)?;
    let value = rest.trim_start().strip_prefix('=')?;
    Some(value.trim())
}

/// Replace whole `host:port` occurrences. A match followed by another digit belongs to a
/// longer port, and one preceded by a host character belongs to another host.
fn replace_host_port(line: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(idx) = rest.find(from) {
        let end = idx + from.len();
        let before = rest[..idx].chars().next_back();
        let after = rest[end..].chars().next();
        let whole = !before.is_some_and(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
            && !after.is_some_and(|c| c.is_ascii_digit());

        out.push_str(&rest[..idx]);
        out.push_str(if whole { to } else { from });
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Format a string as a TOML basic string literal.
pub fn toml_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"[Node]
  StartupTimeout = "2m0s"

[State]
  DefaultKeyName = "my_celes_key"
  # TxWorkerAccounts = 8
  TxWorkerAccounts = 0

[Header]
  TrustedHash = ""
  [Header.Syncer]
    TrustedHash = "nested"

[DASer]
  SampleFrom = 1
"#;

    fn doc(content: &str) -> NodeConfigDocument {
        NodeConfigDocument::parse(Path::new("/tmp/config.toml"), content)
    }

    #[test]
    fn test_update_existing_key_in_section() {
        let mut doc = doc(CONFIG);

        assert!(doc.set_in_section("State", "TxWorkerAccounts", "16"));
        assert!(doc.render().contains("  # TxWorkerAccounts = 8\n"));
        assert!(doc.render().contains("  TxWorkerAccounts = 16\n"));
        assert!(!doc.set_in_section("State", "TxWorkerAccounts", "16"));
    }

    #[test]
    fn test_update_is_scoped_to_section() {
        let mut doc = doc(CONFIG);

        doc.set_in_section("Header", "TrustedHash", &toml_string("ABCDEF"));

        let rendered = doc.render();
        assert!(rendered.contains("[Header]\n  TrustedHash = \"ABCDEF\"\n"));
        assert!(rendered.contains("  [Header.Syncer]\n    TrustedHash = \"nested\"\n"));
    }

    #[test]
    fn test_insert_after_header_when_missing() {
        let mut doc = doc(CONFIG);

        assert!(doc.set_in_section("DASer", "SampleTimeout", "\"4m\""));
        assert!(doc
            .render()
            .contains("[DASer]\n  SampleTimeout = \"4m\"\n  SampleFrom = 1\n"));
    }

    #[test]
    fn test_key_prefix_does_not_match() {
        let mut doc = doc("[grpc]\nenable-unsafe = true\n");
        doc.set_in_section("grpc", "enable", "true");
        assert_eq!(doc.render(), "[grpc]\nenable = true\nenable-unsafe = true\n");
    }

    #[test]
    fn test_missing_section_is_appended() {
        let mut doc = doc("[api]\nenable = false\n");
        assert!(doc.set_in_section("grpc", "enable", "true"));
        assert_eq!(
            doc.render(),
            "[api]\nenable = false\n\n[grpc]\n  enable = true\n"
        );
    }

    #[test]
    fn test_rebind_loopback_skips_comments() {
        let mut doc = doc(
            "[grpc]\n# address = \"localhost:9090\"\naddress = \"localhost:9090\"\n[api]\naddress = \"tcp://127.0.0.1:1317\"\n",
        );

        assert_eq!(doc.rebind_loopback(9090), 1);
        let rendered = doc.render();
        assert!(rendered.contains("# address = \"localhost:9090\""));
        assert!(rendered.contains("\naddress = \"0.0.0.0:9090\""));
        assert!(rendered.contains("tcp://127.0.0.1:1317"));
        assert_eq!(doc.rebind_loopback(9090), 0);
    }

    #[test]
    fn test_rebind_loopback_matches_whole_port() {
        let mut doc = doc(
            "[api]\naddress = \"tcp://localhost:90901\"\n[grpc]\naddress = \"127.0.0.1:9090\"\n[rpc]\nladdr = \"tcp://myhost-127.0.0.1:9090\"\nweb = \"localhost:9090,localhost:9091\"\n",
        );

        assert_eq!(doc.rebind_loopback(9090), 2);
        assert_eq!(
            doc.render(),
            "[api]\naddress = \"tcp://localhost:90901\"\n[grpc]\naddress = \"0.0.0.0:9090\"\n[rpc]\nladdr = \"tcp://myhost-127.0.0.1:9090\"\nweb = \"0.0.0.0:9090,localhost:9091\"\n"
        );
    }
}
