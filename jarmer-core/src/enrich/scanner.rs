use super::http::{ApiError, HttpClient};
use crate::types::{Endpoint, FingerprintResult};
use reqwest::Url;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanReply {
  Fingerprint(FingerprintResult),
  RemoteError { host: String, error: String },
}

pub trait FingerprintScanner {
  fn scan(&self, endpoint: &Endpoint) -> Result<ScanReply, ApiError>;
}

#[derive(Debug, Deserialize)]
struct ScanResponse {
  #[serde(default)]
  host: Option<String>,
  #[serde(default)]
  jarm_hash: Option<String>,
  #[serde(default)]
  error: Option<serde_json::Value>,
}

pub struct JarmOnlineScanner {
  http: HttpClient,
  url: Url,
}

impl JarmOnlineScanner {
  pub fn new(http: HttpClient, url: Url) -> Self {
    Self { http, url }
  }
}

impl FingerprintScanner for JarmOnlineScanner {
  fn scan(&self, endpoint: &Endpoint) -> Result<ScanReply, ApiError> {
    let response: ScanResponse = self.http.get_json(&self.url, &endpoint.fields())?;
    interpret(&self.url, endpoint, response)
  }
}

fn interpret(url: &Url, endpoint: &Endpoint, response: ScanResponse) -> Result<ScanReply, ApiError> {
  let host = response.host.unwrap_or_else(|| endpoint.host.clone());

  if let Some(error) = response.error.as_ref().and_then(error_text) {
    return Ok(ScanReply::RemoteError { host, error });
  }

  let jarm_hash = response
    .jarm_hash
    .map(|h| h.trim().to_string())
    .filter(|h| !h.is_empty())
    .ok_or_else(|| ApiError::protocol(url, "response has neither jarm_hash nor error"))?;

  Ok(ScanReply::Fingerprint(FingerprintResult {
    host,
    port: endpoint.port,
    jarm_hash,
  }))
}

fn error_text(value: &serde_json::Value) -> Option<String> {
  match value {
    serde_json::Value::Null => None,
    serde_json::Value::String(s) if s.trim().is_empty() => None,
    serde_json::Value::String(s) => Some(s.clone()),
    serde_json::Value::Object(map) => map
      .get("error_type")
      .or_else(|| map.get("message"))
      .and_then(|v| v.as_str())
      .map(str::to_string)
      .or_else(|| Some(value.to_string())),
    other => Some(other.to_string()),
  }
}
