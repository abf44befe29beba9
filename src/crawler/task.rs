use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use url::Url;

/// Length of a platform note identifier
pub const NOTE_ID_LENGTH: usize = 24;

const EXPLORE_URL: &str = "https://www.xiaohongshu.com/explore";

/// A note to fetch: its identifier plus the access token required alongside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    /// Fixed-length note identifier
    pub id: String,

    /// Short-lived access token (`xsec_token`)
    #[serde(rename = "xsec_token")]
    pub access_token: String,
}

impl ContentRef {
    pub fn new(id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            access_token: access_token.into(),
        }
    }

    /// Parse a note share link such as `.../explore/<id>?xsec_token=<token>`
    pub fn from_url(link: &str) -> Option<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"https://www\.xiaohongshu\.com/(?:explore|discovery/item)/([a-zA-Z0-9]+)\?.*?xsec_token=([^&=]+)")
                .expect("note link pattern is valid")
        });

        let captures = pattern.captures(link)?;
        Some(Self::new(&captures[1], &captures[2]))
    }

    /// Canonical explore link for this note
    pub fn explore_url(&self) -> String {
        let base = format!("{}/{}", EXPLORE_URL, self.id);
        match Url::parse_with_params(&base, &[
            ("xsec_token", self.access_token.as_str()),
            ("xsec_source", "pc_search"),
            ("source", "web_search_result_notes"),
        ]) {
            Ok(url) => url.to_string(),
            Err(_) => base,
        }
    }
}

/// A named batch of crawl work backed by one input and one output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Category {
    pub fn new(name: impl Into<String>, input_root: &Path, output_root: &Path) -> Self {
        let name = name.into();
        Self {
            input_dir: input_root.join(&name),
            output_dir: output_root.join(&name),
            name,
        }
    }
}

/// Outcome of processing one category
#[derive(Debug, Clone, Default)]
pub struct CategoryReport {
    pub name: String,

    /// Valid refs found across the category's manifests, after dedup
    pub discovered: usize,

    /// Records already on disk when the category started
    pub already_fetched: usize,

    /// Refs scheduled for fetching
    pub pending: usize,

    pub succeeded: usize,
    pub failed: usize,

    /// Identifiers rejected by the length rule
    pub invalid_ids: Vec<String>,

    /// Set when the category could not be processed at all
    pub error: Option<String>,
}

/// Outcome of a full run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub categories: Vec<CategoryReport>,
}

impl RunReport {
    pub fn total_succeeded(&self) -> usize {
        self.categories.iter().map(|c| c.succeeded).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.categories.iter().map(|c| c.failed).sum()
    }
}
