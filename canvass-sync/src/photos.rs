//! Public photo URLs
//!
//! Photos live in the API server's file area and are served at
//! `{api_url}/{prefix}/submissions/{id}/photos/{filename}`. The prefix differs
//! between deployments (`api` behind the proxy, empty in development).

use canvass_common::config::PhotoConfig;
use canvass_common::PhotoReference;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUrlTemplate {
    api_url: String,
    prefix: String,
}

impl PhotoUrlTemplate {
    pub fn new(api_url: &str, prefix: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &PhotoConfig) -> Self {
        Self::new(&config.api_url, &config.path_prefix)
    }

    pub fn url(&self, photo: &PhotoReference) -> String {
        if self.prefix.is_empty() {
            format!(
                "{}/submissions/{}/photos/{}",
                self.api_url, photo.submission_id, photo.filename
            )
        } else {
            format!(
                "{}/{}/submissions/{}/photos/{}",
                self.api_url, self.prefix, photo.submission_id, photo.filename
            )
        }
    }

    pub fn urls(&self, photos: &[PhotoReference]) -> Vec<String> {
        photos.iter().map(|p| self.url(p)).collect()
    }
}
