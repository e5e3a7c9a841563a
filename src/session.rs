//! Per-translation-unit mutable state shared by the parser and the generator.
//!
//! Counters only ever grow; two sessions never share them, so independent
//! units can be compiled side by side.

#[derive(Debug, Default)]
pub struct Session {
  labels: usize,
  unique_names: usize,
}

impl Session {
  pub fn new() -> Self {
    Self::default()
  }

  /// Suffix for a fresh family of control-flow labels.
  pub fn next_label(&mut self) -> usize {
    self.labels += 1;
    self.labels
  }

  /// A symbol name that cannot collide with any C identifier.
  pub fn unique_name(&mut self) -> String {
    let name = format!(".L..{}", self.unique_names);
    self.unique_names += 1;
    name
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counters_are_monotonic_and_independent() {
    let mut session = Session::new();
    assert_eq!(session.next_label(), 1);
    assert_eq!(session.next_label(), 2);
    assert_eq!(session.unique_name(), ".L..0");
    assert_eq!(session.unique_name(), ".L..1");
    assert_eq!(session.next_label(), 3);

    let mut other = Session::new();
    assert_eq!(other.next_label(), 1);
  }
}
