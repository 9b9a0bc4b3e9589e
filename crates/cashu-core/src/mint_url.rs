//! Normalized mint base URL: lowercases scheme/host and trims a trailing slash
//! so the same mint is never stored under two different string keys.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;

/// A mint's base URL, normalized on construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MintUrl(String);

impl MintUrl {
    fn format_url(url: &str) -> Result<String, Error> {
        if url.is_empty() {
            return Err(Error::InvalidMintUrl);
        }

        let url = url.trim_end_matches('/');
        let mut parts = url.splitn(2, "://");
        let protocol = parts.next().ok_or(Error::InvalidMintUrl)?.to_lowercase();
        let rest = parts.next().ok_or(Error::InvalidMintUrl)?;

        let mut rest_parts = rest.splitn(2, '/');
        let host = rest_parts.next().ok_or(Error::InvalidMintUrl)?.to_lowercase();
        let path = rest_parts.next().unwrap_or("");

        let mut formatted = format!("{protocol}://{host}");
        if !path.is_empty() {
            formatted.push('/');
            formatted.push_str(path);
        }
        Ok(formatted)
    }

    /// Join a path segment onto this mint's base URL.
    pub fn join(&self, path: &str) -> Result<url::Url, Error> {
        let base = url::Url::parse(&self.0).map_err(|_| Error::InvalidMintUrl)?;
        let base_path = base.path();
        let normalized_path = if base_path.ends_with('/') {
            format!("{base_path}{path}")
        } else {
            format!("{base_path}/{path}")
        };
        let mut result = base;
        result.set_path(&normalized_path);
        Ok(result)
    }

    /// Join several path elements, e.g. `["v1", "mint", "bolt11"]`.
    pub fn join_paths(&self, elements: &[&str]) -> Result<url::Url, Error> {
        self.join(&elements.join("/"))
    }
}

impl FromStr for MintUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        Ok(Self(Self::format_url(url)?))
    }
}

impl fmt::Display for MintUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for MintUrl {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MintUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_trailing_slashes() {
        assert_eq!(
            MintUrl::from_str("http://mint.example.com////").unwrap(),
            MintUrl::from_str("http://mint.example.com").unwrap()
        );
    }

    #[test]
    fn test_lowercases_scheme_and_host() {
        let url = MintUrl::from_str("HTTPS://Mint.Example.COM/v1").unwrap();
        assert_eq!(url.to_string(), "https://mint.example.com/v1");
    }

    #[test]
    fn test_join_preserves_base_path() {
        let url = MintUrl::from_str("https://mint.example.com/nostr").unwrap();
        let joined = url.join("v1/swap").unwrap();
        assert_eq!(joined.as_str(), "https://mint.example.com/nostr/v1/swap");
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(MintUrl::from_str("").is_err());
    }
}
