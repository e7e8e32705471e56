//! Tenant resolution from the address the app was opened with.
//!
//! Lookup order: hostname subdomain, then the `company` query parameter,
//! then the bare domain. The result is lower-cased and trimmed.

use std::fmt;

use url::{Host, Url};

/// Query parameter naming the tenant explicitly
const COMPANY_PARAM: &str = "company";

/// Organization lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantKey(String);

impl TenantKey {
    /// Normalize a raw identifier. Blank input yields `None`.
    pub fn new(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_url_str(raw: &str) -> Result<Option<Self>, url::ParseError> {
        Ok(Self::from_url(&Url::parse(raw.trim())?))
    }

    pub fn from_url(url: &Url) -> Option<Self> {
        let labels: Vec<&str> = match url.host() {
            Some(Host::Domain(domain)) => domain
                .trim_end_matches('.')
                .split('.')
                .filter(|label| !label.is_empty())
                .collect(),
            _ => Vec::new(),
        };
        let labels: &[&str] = match labels.split_first() {
            Some((first, rest)) if first.eq_ignore_ascii_case("www") => rest,
            _ => &labels,
        };

        if labels.len() >= 3 {
            if let Some(key) = Self::new(labels[0]) {
                return Some(key);
            }
        }

        let company = url
            .query_pairs()
            .find(|(name, _)| name == COMPANY_PARAM)
            .and_then(|(_, value)| Self::new(&value));
        if company.is_some() {
            return company;
        }

        match labels.len() {
            0 => None,
            1 => Self::new(labels[0]),
            n => Self::new(labels[n - 2]),
        }
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
