use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::time::Duration;

const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("request to {target} failed: {source}")]
  Transport {
    target: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("unexpected HTTP status {status} from {target}")]
  Status { status: u16, target: String },

  #[error("reading response from {target} failed: {source}")]
  Body {
    target: String,
    #[source]
    source: std::io::Error,
  },

  #[error("response from {target} exceeds max size {max_bytes} bytes")]
  TooLarge { target: String, max_bytes: usize },

  #[error("could not encode request body for {target}: {source}")]
  Encode {
    target: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("malformed response from {target}: {source}")]
  Decode {
    target: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("protocol error from {target}: {details}")]
  Protocol { target: String, details: String },
}

impl ApiError {
  pub fn protocol(url: &Url, details: impl Into<String>) -> Self {
    Self::Protocol {
      target: safe_url_label(url),
      details: details.into(),
    }
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, Self::Transport { source, .. } if source.is_timeout())
  }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
  client: Client,
  max_bytes: usize,
}

impl HttpClient {
  pub fn new(timeout: Duration) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .redirect(Policy::none())
      .user_agent(format!("jarmer/{}", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| anyhow::anyhow!("build HTTP client: {e}"))?;
    Ok(Self {
      client,
      max_bytes: MAX_RESPONSE_BYTES,
    })
  }

  pub fn get_json<T: DeserializeOwned>(
    &self,
    base: &Url,
    query: &[(&str, String)],
  ) -> Result<T, ApiError> {
    let mut url = base.clone();
    if !query.is_empty() {
      let mut pairs = url.query_pairs_mut();
      for (k, v) in query {
        pairs.append_pair(k, v);
      }
    }
    let body = self.send(&url, self.client.get(url.clone()))?;
    decode(&url, &body)
  }

  pub fn post_json<B: Serialize, T: DeserializeOwned>(
    &self,
    url: &Url,
    body: &B,
    headers: &[(&str, String)],
  ) -> Result<T, ApiError> {
    let body = self.post_raw(url, body, headers)?;
    decode(url, &body)
  }

  pub fn post<B: Serialize>(
    &self,
    url: &Url,
    body: &B,
    headers: &[(&str, String)],
  ) -> Result<(), ApiError> {
    self.post_raw(url, body, headers).map(|_| ())
  }

  fn post_raw<B: Serialize>(
    &self,
    url: &Url,
    body: &B,
    headers: &[(&str, String)],
  ) -> Result<Vec<u8>, ApiError> {
    let payload = serde_json::to_vec(body).map_err(|source| ApiError::Encode {
      target: safe_url_label(url),
      source,
    })?;
    let mut req = self
      .client
      .post(url.clone())
      .header(CONTENT_TYPE, "application/json")
      .body(payload);
    for (name, value) in headers {
      req = req.header(*name, value.as_str());
    }
    self.send(url, req)
  }

  fn send(&self, url: &Url, req: RequestBuilder) -> Result<Vec<u8>, ApiError> {
    let response = req.send().map_err(|source| ApiError::Transport {
      target: safe_url_label(url),
      source,
    })?;

    if !response.status().is_success() {
      return Err(ApiError::Status {
        status: response.status().as_u16(),
        target: safe_url_label(url),
      });
    }

    read_response_with_limit(url, response, self.max_bytes)
  }
}

fn decode<T: DeserializeOwned>(url: &Url, body: &[u8]) -> Result<T, ApiError> {
  serde_json::from_slice(body).map_err(|source| ApiError::Decode {
    target: safe_url_label(url),
    source,
  })
}

fn read_response_with_limit(
  url: &Url,
  response: Response,
  max_bytes: usize,
) -> Result<Vec<u8>, ApiError> {
  let mut out = Vec::new();
  let mut limited = response.take((max_bytes.saturating_add(1)) as u64);
  limited
    .read_to_end(&mut out)
    .map_err(|source| ApiError::Body {
      target: safe_url_label(url),
      source,
    })?;

  if out.len() > max_bytes {
    return Err(ApiError::TooLarge {
      target: safe_url_label(url),
      max_bytes,
    });
  }

  Ok(out)
}

// Query strings and credentials stay out of logs.
pub fn safe_url_label(url: &Url) -> String {
  let host = url.host_str().unwrap_or("<no-host>");
  let mut path = url.path().to_string();
  if path.is_empty() {
    path = "/".to_string();
  }
  format!("{host}{path}")
}

pub fn parse_url(raw: &str) -> anyhow::Result<Url> {
  Url::parse(raw.trim()).map_err(|e| anyhow::anyhow!("invalid URL {raw:?}: {e}"))
}
