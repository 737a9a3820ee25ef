use chrono::{DateTime, Utc};
use url::Url;

/// A URL discovered from a sitemap, optionally carrying its `<lastmod>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedUrl {
    pub url: Url,
    pub last_modified: Option<DateTime<Utc>>,
}
