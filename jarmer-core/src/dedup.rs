use crate::types::Endpoint;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct AcknowledgedSet {
  keys: HashSet<String>,
}

impl AcknowledgedSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn compute_key(endpoint: &Endpoint) -> String {
    let mut fields = endpoint.fields();
    fields.sort_by_key(|(name, _)| *name);
    fields
      .iter()
      .map(|(name, value)| format!("{name}:{}", escape(value)))
      .collect::<Vec<_>>()
      .join("-")
  }

  pub fn add(&mut self, endpoint: &Endpoint) {
    self.keys.insert(Self::compute_key(endpoint));
  }

  pub fn contains(&self, endpoint: &Endpoint) -> bool {
    self.keys.contains(&Self::compute_key(endpoint))
  }

  pub fn len(&self) -> usize {
    self.keys.len()
  }

  pub fn is_empty(&self) -> bool {
    self.keys.is_empty()
  }
}

// Keeps `:` and `-` inside values from forging another endpoint's key.
fn escape(value: &str) -> String {
  value
    .replace('%', "%25")
    .replace(':', "%3A")
    .replace('-', "%2D")
}
