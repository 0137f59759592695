//! Content source serving the stack artifacts.

use std::{path::PathBuf, time::Duration};

use url::Url;

use crate::error::{BoxError, DeployError, Result};

/// Default artifact base: every manifest path is resolved under it.
pub const DEFAULT_ARTIFACT_BASE: &str =
    "https://raw.githubusercontent.com/evstack/ev-toolbox/main/ev-stacks/";

/// Where artifacts are fetched from.
#[derive(Debug, Clone)]
pub enum ContentSource {
    /// An HTTPS file host.
    Http { client: reqwest::Client, base: Url },
    /// A local mirror of the artifact tree.
    Local { root: PathBuf },
}

impl ContentSource {
    /// Build a content source from a base location.
    ///
    /// `http(s)://` locations are fetched over the network with the given request timeout,
    /// `file://` URLs and plain paths are read from disk.
    pub fn from_location(location: &str, timeout: Duration) -> Result<Self> {
        if location.starts_with("http://") || location.starts_with("https://") {
            // A base without a trailing slash would have its last segment replaced on join.
            let normalized = if location.ends_with('/') {
                location.to_string()
            } else {
                format!("{location}/")
            };
            let base = Url::parse(&normalized).map_err(|e| {
                DeployError::Validation(format!("Invalid artifact base URL {location}: {e}"))
            })?;
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| {
                    DeployError::Validation(format!("Failed to create HTTP client: {e}"))
                })?;
            return Ok(ContentSource::Http { client, base });
        }

        if location.starts_with("file://") {
            let root = Url::parse(location)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| {
                    DeployError::Validation(format!("Invalid artifact base URL {location}"))
                })?;
            return Ok(ContentSource::Local { root });
        }

        Ok(ContentSource::Local {
            root: PathBuf::from(location),
        })
    }

    /// Fetch the artifact at `path`, relative to the base.
    pub async fn fetch(&self, path: &str) -> std::result::Result<Vec<u8>, BoxError> {
        match self {
            ContentSource::Http { client, base } => {
                let url = base.join(path)?;
                tracing::trace!(%url, "Fetching artifact");
                let response = client.get(url).send().await?.error_for_status()?;
                Ok(response.bytes().await?.to_vec())
            }
            ContentSource::Local { root } => {
                let file = root.join(path);
                tracing::trace!(path = %file.display(), "Reading artifact");
                Ok(tokio::fs::read(&file).await?)
            }
        }
    }
}

impl std::fmt::Display for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentSource::Http { base, .. } => write!(f, "{base}"),
            ContentSource::Local { root } => write!(f, "{}", root.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_http_base_gets_trailing_slash() {
        let source =
            ContentSource::from_location("https://example.com/ev-stacks", TIMEOUT).unwrap();
        let ContentSource::Http { base, .. } = source else {
            panic!("expected an HTTP source");
        };
        assert_eq!(
            base.join("lib/logging.sh").unwrap().as_str(),
            "https://example.com/ev-stacks/lib/logging.sh"
        );
    }

    #[test]
    fn test_paths_and_file_urls_are_local() {
        let source = ContentSource::from_location("/srv/mirror", TIMEOUT).unwrap();
        assert!(matches!(source, ContentSource::Local { ref root } if root == &PathBuf::from("/srv/mirror")));

        let source = ContentSource::from_location("file:///srv/mirror", TIMEOUT).unwrap();
        assert!(matches!(source, ContentSource::Local { ref root } if root == &PathBuf::from("/srv/mirror")));
    }

    #[tokio::test]
    async fn test_local_fetch() {
        let dir = tempdir::TempDir::new("evstack-source").unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/logging.sh"), "#!/bin/sh\n").unwrap();

        let source = ContentSource::Local {
            root: dir.path().to_path_buf(),
        };
        assert_eq!(source.fetch("lib/logging.sh").await.unwrap(), b"#!/bin/sh\n");
        assert!(source.fetch("lib/missing.sh").await.is_err());
    }
}
