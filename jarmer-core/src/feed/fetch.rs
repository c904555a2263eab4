use super::schema::{FeedQuery, FeedResponse, RawIoc};
use super::FeedClient;
use crate::enrich::http::{ApiError, HttpClient};
use reqwest::Url;

const API_KEY_HEADER: &str = "Auth-Key";

pub struct ThreatFoxClient {
  http: HttpClient,
  url: Url,
  api_key: Option<String>,
}

impl ThreatFoxClient {
  pub fn new(http: HttpClient, url: Url, api_key: Option<String>) -> Self {
    Self {
      http,
      url,
      api_key: api_key.filter(|k| !k.trim().is_empty()),
    }
  }
}

impl FeedClient for ThreatFoxClient {
  fn fetch_recent(&self, days: u32) -> Result<Vec<RawIoc>, ApiError> {
    let mut headers = Vec::new();
    if let Some(key) = &self.api_key {
      headers.push((API_KEY_HEADER, key.trim().to_string()));
    }

    let response: FeedResponse = self
      .http
      .post_json(&self.url, &FeedQuery::recent(days), &headers)?;
    extract_items(&self.url, response)
  }
}

pub(crate) fn extract_items(url: &Url, response: FeedResponse) -> Result<Vec<RawIoc>, ApiError> {
  match response.query_status.as_deref() {
    Some("ok") | None => {}
    Some("no_result") => return Ok(Vec::new()),
    Some(other) => {
      return Err(ApiError::protocol(url, format!("query_status {other}")));
    }
  }

  match response.data {
    serde_json::Value::Array(items) => Ok(
      items
        .into_iter()
        .map(|item| serde_json::from_value::<RawIoc>(item).unwrap_or_default())
        .collect(),
    ),
    serde_json::Value::Null => Ok(Vec::new()),
    _ => Err(ApiError::protocol(url, "data is not an array")),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url() -> Url {
    Url::parse("https://threatfox-api.abuse.ch/api/v1/").unwrap()
  }

  fn parse(raw: &str) -> FeedResponse {
    serde_json::from_str(raw).unwrap()
  }

  #[test]
  fn query_body_matches_feed_api() {
    let body = serde_json::to_value(FeedQuery::recent(1)).unwrap();
    assert_eq!(body, serde_json::json!({"query": "get_iocs", "days": 1}));
  }

  #[test]
  fn ok_response_yields_items() {
    let items = extract_items(
      &url(),
      parse(
        r#"{"query_status":"ok","data":[
          {"ioc":"1.2.3.4:443","ioc_type":"ip:port","threat_type":"botnet_cc",
           "first_seen":"2024-01-01 00:00:00 UTC","confidence_level":100,"malware":"win.cobalt_strike"}
        ]}"#,
      ),
    )
    .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].ioc.as_deref(), Some("1.2.3.4:443"));
    assert_eq!(items[0].confidence_level, serde_json::json!(100));
  }

  #[test]
  fn no_result_is_empty() {
    let items = extract_items(
      &url(),
      parse(r#"{"query_status":"no_result","data":"Your search did not yield any results"}"#),
    )
    .unwrap();
    assert!(items.is_empty());
  }

  #[test]
  fn other_status_is_protocol_failure() {
    let err = extract_items(&url(), parse(r#"{"query_status":"unknown_auth_key","data":null}"#)).unwrap_err();
    assert!(matches!(err, ApiError::Protocol { .. }));
  }

  #[test]
  fn odd_item_does_not_fail_response() {
    let items = extract_items(&url(), parse(r#"{"query_status":"ok","data":[42,{"ioc":"a.example"}]}"#)).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0], RawIoc::default());
  }
}
