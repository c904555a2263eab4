use super::http::{ApiError, HttpClient};
use crate::types::SubmissionRecord;
use reqwest::Url;

pub trait Submitter {
  fn submit(&self, record: &SubmissionRecord) -> Result<(), ApiError>;

  // False when `submit` succeeds without anything leaving the process.
  fn forwards(&self) -> bool {
    true
  }
}

pub struct CollectorSubmitter {
  http: HttpClient,
  url: Url,
  token: String,
}

impl CollectorSubmitter {
  pub fn new(http: HttpClient, url: Url, token: String) -> Self {
    Self { http, url, token }
  }
}

impl Submitter for CollectorSubmitter {
  fn submit(&self, record: &SubmissionRecord) -> Result<(), ApiError> {
    self.http.post(
      &self.url,
      record,
      &[("Authorization", format!("Bearer {}", self.token))],
    )
  }
}

pub struct DisabledSubmitter;

impl Submitter for DisabledSubmitter {
  fn forwards(&self) -> bool {
    false
  }

  fn submit(&self, record: &SubmissionRecord) -> Result<(), ApiError> {
    tracing::info!(
      host = %record.host,
      port = ?record.port,
      jarm_hash = %record.jarm_hash,
      "collector not configured; confirmation not forwarded"
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn disabled_submitter_accepts_but_does_not_forward() {
    let record = SubmissionRecord {
      host: "1.2.3.4".to_string(),
      port: Some(443),
      jarm_hash: "abc".to_string(),
      scan_timestamp: 1,
      threat_fox_first_seen: 0,
      confidence_level: serde_json::json!(100),
      malware: serde_json::Value::Null,
    };
    assert!(DisabledSubmitter.submit(&record).is_ok());
    assert!(!DisabledSubmitter.forwards());
  }
}
