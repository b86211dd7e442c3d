//! Small helpers shared by tools and resources: registry URI parsing,
//! version validation, pagination arguments and readme trimming.

use once_cell::sync::Lazy;
use regex::Regex;

pub const PROVIDER_BASE_PATH: &str = "registry://providers";

static SEMVER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v?\d+\.\d+\.\d+(-[a-zA-Z0-9]+)?$").expect("semver pattern is valid")
});

static MARKDOWN_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#+\s?").expect("header pattern is valid"));

/// Extracts `(namespace, name, version)` from a provider resource URI of the
/// form `registry://providers/{namespace}/name/{name}/version/{version}`.
pub fn extract_provider_name_and_version(uri: &str) -> Result<(String, String, String), String> {
    let parts: Vec<&str> = uri.split('/').collect();
    if parts.len() < 5 {
        return Err(format!("invalid provider URI format: {uri}"));
    }
    let len = parts.len();
    Ok((
        parts[len - 5].to_string(),
        parts[len - 3].to_string(),
        parts[len - 1].to_string(),
    ))
}

/// Whether a version string looks like a released semantic version
/// (optionally `v`-prefixed, optionally with a pre-release tag).
pub fn is_valid_provider_version(version: &str) -> bool {
    SEMVER_RE.is_match(version)
}

pub fn is_valid_provider_data_type(data_type: &str) -> bool {
    matches!(
        data_type,
        "resources" | "data-sources" | "functions" | "guides" | "overview"
    )
}

/// Categories only served by the v2 registry API.
pub fn is_v2_provider_data_type(data_type: &str) -> bool {
    matches!(data_type, "guides" | "functions" | "overview")
}

/// Returns the readme content up to (not including) its second header, which
/// is enough context for a model without shipping the entire document.
pub fn extract_readme(readme: &str) -> String {
    if readme.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let mut header_seen = false;
    for line in readme.lines() {
        if MARKDOWN_HEADER_RE.is_match(line) {
            if header_seen {
                break;
            }
            header_seen = true;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.truncate(out.trim_end_matches('\n').len());
    out
}

/// Pagination window accepted by the list-shaped tools.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl Pagination {
    /// Builds a window from optional tool arguments, rejecting out-of-range
    /// values.
    pub fn from_args(page_number: Option<u32>, page_size: Option<u32>) -> Result<Self, String> {
        let defaults = Self::default();
        let page = match page_number {
            Some(0) => return Err("page_number must be a positive integer".to_string()),
            Some(page) => page,
            None => defaults.page,
        };
        let page_size = match page_size {
            Some(size) if (1..=100).contains(&size) => size,
            Some(_) => return Err("page_size must be between 1 and 100".to_string()),
            None => defaults.page_size,
        };
        Ok(Self { page, page_size })
    }
}
