use crate::checkpoint::FeedTimestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const C2_THREAT_TYPE: &str = "botnet_cc";

pub const IP_PORT_FORMAT: &str = "ip:port";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IocType {
  Host,
  IpPort,
}

impl IocType {
  pub fn from_feed(raw: Option<&str>) -> Self {
    match raw {
      Some(IP_PORT_FORMAT) => Self::IpPort,
      _ => Self::Host,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Indicator {
  pub value: String,
  pub ioc_type: IocType,
  pub first_seen: FeedTimestamp,
  pub confidence_level: serde_json::Value,
  pub malware: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
  pub host: String,
  pub port: Option<u16>,
}

impl Endpoint {
  pub fn host(host: impl Into<String>) -> Self {
    Self {
      host: host.into(),
      port: None,
    }
  }

  pub fn with_port(host: impl Into<String>, port: u16) -> Self {
    Self {
      host: host.into(),
      port: Some(port),
    }
  }

  pub fn from_indicator(ioc: &Indicator) -> anyhow::Result<Self> {
    let value = ioc.value.trim();
    if value.is_empty() {
      anyhow::bail!("empty indicator value");
    }

    match ioc.ioc_type {
      IocType::Host => Ok(Self::host(value)),
      IocType::IpPort => {
        // Last colon, so bracketless IPv6 literals keep their host part intact.
        let (host, port) = value
          .rsplit_once(':')
          .ok_or_else(|| anyhow::anyhow!("ip:port indicator without port: {value}"))?;
        if host.is_empty() {
          anyhow::bail!("ip:port indicator without host: {value}");
        }
        let port = port
          .parse::<u16>()
          .map_err(|_| anyhow::anyhow!("invalid port in indicator: {value}"))?;
        Ok(Self::with_port(host, port))
      }
    }
  }

  pub fn fields(&self) -> Vec<(&'static str, String)> {
    let mut out = vec![("host", self.host.clone())];
    if let Some(port) = self.port {
      out.push(("port", port.to_string()));
    }
    out
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.port {
      Some(port) => write!(f, "{}:{}", self.host, port),
      None => f.write_str(&self.host),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintResult {
  pub host: String,
  pub port: Option<u16>,
  pub jarm_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
  pub host: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub port: Option<u16>,
  pub jarm_hash: String,
  pub scan_timestamp: i64,
  pub threat_fox_first_seen: i64,
  pub confidence_level: serde_json::Value,
  pub malware: serde_json::Value,
}

impl SubmissionRecord {
  pub fn new(ioc: &Indicator, fingerprint: &FingerprintResult, scanned_at: FeedTimestamp) -> Self {
    Self {
      host: fingerprint.host.clone(),
      port: fingerprint.port,
      jarm_hash: fingerprint.jarm_hash.clone(),
      scan_timestamp: scanned_at.ceil_unix_seconds(),
      threat_fox_first_seen: ioc.first_seen.ceil_unix_seconds(),
      confidence_level: ioc.confidence_level.clone(),
      malware: ioc.malware.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
  NotC2,
  BadTimestamp,
  AlreadyProcessed,
  BadEndpoint,
  Duplicate,
  RemoteScanError(String),
  CommonFingerprint,
}

impl SkipReason {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NotC2 => "not_c2",
      Self::BadTimestamp => "bad_timestamp",
      Self::AlreadyProcessed => "already_processed",
      Self::BadEndpoint => "bad_endpoint",
      Self::Duplicate => "duplicate",
      Self::RemoteScanError(_) => "remote_scan_error",
      Self::CommonFingerprint => "common_fingerprint",
    }
  }
}

#[derive(Debug)]
pub enum ItemOutcome {
  Processed { submitted: bool },
  Skipped(SkipReason),
  Failed(anyhow::Error),
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ioc(value: &str, ioc_type: IocType) -> Indicator {
    Indicator {
      value: value.to_string(),
      ioc_type,
      first_seen: FeedTimestamp::EPOCH,
      confidence_level: serde_json::json!(100),
      malware: serde_json::json!("win.cobalt_strike"),
    }
  }

  #[test]
  fn ip_port_indicator_splits_into_host_and_port() {
    let ep = Endpoint::from_indicator(&ioc("1.2.3.4:8443", IocType::IpPort)).unwrap();
    assert_eq!(ep, Endpoint::with_port("1.2.3.4", 8443));
  }

  #[test]
  fn host_indicator_keeps_value_as_host() {
    let ep = Endpoint::from_indicator(&ioc("evil.example", IocType::Host)).unwrap();
    assert_eq!(ep, Endpoint::host("evil.example"));
    assert_eq!(ep.to_string(), "evil.example");
  }

  #[test]
  fn malformed_ip_port_indicators_are_rejected() {
    assert!(Endpoint::from_indicator(&ioc("1.2.3.4", IocType::IpPort)).is_err());
    assert!(Endpoint::from_indicator(&ioc(":443", IocType::IpPort)).is_err());
    assert!(Endpoint::from_indicator(&ioc("1.2.3.4:http", IocType::IpPort)).is_err());
    assert!(Endpoint::from_indicator(&ioc("  ", IocType::Host)).is_err());
  }

  #[test]
  fn ioc_type_only_recognizes_exact_ip_port() {
    assert_eq!(IocType::from_feed(Some("ip:port")), IocType::IpPort);
    assert_eq!(IocType::from_feed(Some("domain")), IocType::Host);
    assert_eq!(IocType::from_feed(None), IocType::Host);
  }

  #[test]
  fn submission_record_rounds_timestamps_up() {
    let mut item = ioc("1.2.3.4:443", IocType::IpPort);
    item.first_seen = FeedTimestamp::parse("2024-01-01 00:00:00 UTC").unwrap();
    let fp = FingerprintResult {
      host: "1.2.3.4".to_string(),
      port: Some(443),
      jarm_hash: "2ad2ad0002ad2ad00042d42d000000".to_string(),
    };
    let scanned_at = FeedTimestamp::from_unix_nanos(1_704_067_200_000_000_001).unwrap();

    let rec = SubmissionRecord::new(&item, &fp, scanned_at);
    assert_eq!(rec.threat_fox_first_seen, 1_704_067_200);
    assert_eq!(rec.scan_timestamp, 1_704_067_201);

    let json = serde_json::to_value(&rec).unwrap();
    assert_eq!(json["port"], 443);
    assert_eq!(json["malware"], "win.cobalt_strike");
    assert_eq!(json["confidence_level"], 100);
  }
}
