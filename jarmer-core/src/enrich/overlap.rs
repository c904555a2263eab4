use super::http::{ApiError, HttpClient};
use reqwest::Url;
use serde::Deserialize;

pub trait OverlapFilter {
  fn has_overlap(&self, jarm_hash: &str) -> Result<bool, ApiError>;
}

#[derive(Debug, Deserialize)]
struct OverlapResponse {
  overlapping_domains: Vec<serde_json::Value>,
}

pub struct JarmOnlineOverlap {
  http: HttpClient,
  url: Url,
}

impl JarmOnlineOverlap {
  pub fn new(http: HttpClient, url: Url) -> Self {
    Self { http, url }
  }
}

impl OverlapFilter for JarmOnlineOverlap {
  fn has_overlap(&self, jarm_hash: &str) -> Result<bool, ApiError> {
    let response: OverlapResponse = self
      .http
      .get_json(&self.url, &[("jarm_hash", jarm_hash.to_string())])?;
    let overlapping = response.overlapping_domains.len();
    if overlapping > 0 {
      tracing::debug!(jarm_hash, overlapping, "fingerprint shared with popular domains");
    }
    Ok(overlapping > 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn response_requires_overlapping_domains_field() {
    assert!(serde_json::from_str::<OverlapResponse>(r#"{"domains":[]}"#).is_err());

    let resp: OverlapResponse = serde_json::from_str(
      r#"{"overlapping_domains":[{"domain":"google.com","tranco_rank":1}]}"#,
    )
    .unwrap();
    assert_eq!(resp.overlapping_domains.len(), 1);
  }
}
