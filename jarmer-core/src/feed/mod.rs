use crate::checkpoint::FeedTimestamp;
use crate::enrich::ApiError;
use crate::types::{Indicator, IocType};

pub mod fetch;
pub mod schema;

pub use fetch::ThreatFoxClient;
pub use schema::RawIoc;

pub trait FeedClient {
  fn fetch_recent(&self, days: u32) -> Result<Vec<RawIoc>, ApiError>;
}

impl RawIoc {
  pub fn parsed_first_seen(&self) -> Option<FeedTimestamp> {
    self
      .first_seen
      .as_deref()
      .and_then(|raw| FeedTimestamp::parse(raw).ok())
  }

  pub fn label(&self) -> &str {
    self.ioc.as_deref().unwrap_or("<missing>")
  }

  pub fn into_indicator(self, first_seen: FeedTimestamp) -> Indicator {
    Indicator {
      value: self.ioc.unwrap_or_default(),
      ioc_type: IocType::from_feed(self.ioc_type.as_deref()),
      first_seen,
      confidence_level: self.confidence_level,
      malware: self.malware,
    }
  }
}

// The stable sort keeps same-second items in reversed delivery order.
pub fn chronological(mut items: Vec<RawIoc>) -> Vec<RawIoc> {
  items.reverse();
  items.sort_by_cached_key(|item| item.parsed_first_seen());
  items
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(ioc: &str, first_seen: &str) -> RawIoc {
    RawIoc {
      ioc: Some(ioc.to_string()),
      first_seen: Some(first_seen.to_string()),
      ..RawIoc::default()
    }
  }

  fn order(items: &[RawIoc]) -> Vec<&str> {
    items.iter().map(|i| i.label()).collect()
  }

  #[test]
  fn newest_first_response_is_reversed() {
    let items = vec![
      item("c", "2024-01-01 02:00:00 UTC"),
      item("b", "2024-01-01 01:00:00 UTC"),
      item("a", "2024-01-01 00:00:00 UTC"),
    ];
    assert_eq!(order(&chronological(items)), vec!["a", "b", "c"]);
  }

  #[test]
  fn same_second_items_keep_reversed_delivery_order() {
    let items = vec![
      item("y", "2024-01-01 01:00:00 UTC"),
      item("x", "2024-01-01 01:00:00 UTC"),
      item("a", "2024-01-01 00:00:00 UTC"),
    ];
    assert_eq!(order(&chronological(items)), vec!["a", "x", "y"]);
  }

  #[test]
  fn misplaced_item_is_repaired() {
    let items = vec![
      item("b", "2024-01-01 01:00:00 UTC"),
      item("c", "2024-01-01 02:00:00 UTC"),
      item("a", "2024-01-01 00:00:00 UTC"),
    ];
    assert_eq!(order(&chronological(items)), vec!["a", "b", "c"]);
  }

  #[test]
  fn unreadable_timestamps_sort_first() {
    let items = vec![item("b", "2024-01-01 01:00:00 UTC"), item("bad", "yesterday")];
    assert_eq!(order(&chronological(items)), vec!["bad", "b"]);
  }

  #[test]
  fn into_indicator_maps_ioc_type() {
    let raw = RawIoc {
      ioc: Some("1.2.3.4:443".to_string()),
      ioc_type: Some("ip:port".to_string()),
      threat_type: Some("botnet_cc".to_string()),
      ..RawIoc::default()
    };
    let ioc = raw.into_indicator(FeedTimestamp::EPOCH);
    assert_eq!(ioc.ioc_type, IocType::IpPort);
    assert_eq!(ioc.value, "1.2.3.4:443");
  }
}
