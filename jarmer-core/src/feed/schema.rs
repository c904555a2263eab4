use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct FeedQuery {
  pub query: &'static str,
  pub days: u32,
}

impl FeedQuery {
  pub fn recent(days: u32) -> Self {
    Self {
      query: "get_iocs",
      days,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedResponse {
  #[serde(default)]
  pub query_status: Option<String>,

  // An array on success, a message string on `no_result`.
  #[serde(default)]
  pub data: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawIoc {
  #[serde(default)]
  pub ioc: Option<String>,

  #[serde(default)]
  pub ioc_type: Option<String>,

  #[serde(default)]
  pub threat_type: Option<String>,

  #[serde(default)]
  pub first_seen: Option<String>,

  #[serde(default)]
  pub confidence_level: serde_json::Value,

  #[serde(default)]
  pub malware: serde_json::Value,
}
