//! Change tokens: everything one edit did, recorded so it can be undone.
//!
//! A [`Delta`] rides along with every mutating store call. It keeps the
//! first-seen old value of each changed byte and the net effect on the
//! run index, name bindings, and parked pointers. [`Delta::revert`]
//! plays the whole token backwards and returns the token that would redo
//! it, which is what [`ChangeHistory`](crate::history::ChangeHistory)
//! stacks.

use std::collections::BTreeMap;

use crate::run::Run;
use crate::store::ByteStore;

/// A record of one edit against a [`ByteStore`].
#[derive(Default)]
pub struct Delta {
  old_data: BTreeMap<usize, u8>,
  added_runs: BTreeMap<usize, Run>,
  removed_runs: BTreeMap<usize, Run>,
  added_names: BTreeMap<usize, String>,
  removed_names: BTreeMap<usize, String>,
  added_unmapped: BTreeMap<usize, String>,
  removed_unmapped: BTreeMap<usize, String>,
  // The image length before this token grew it, if it did.
  expanded_from: Option<usize>,
}

impl Delta {
  /// An empty token.
  pub fn new() -> Delta {
    Delta::default()
  }

  /// True when the token records nothing at all.
  pub fn is_empty(&self) -> bool {
    self.old_data.is_empty()
      && self.added_runs.is_empty()
      && self.removed_runs.is_empty()
      && self.added_names.is_empty()
      && self.removed_names.is_empty()
      && self.added_unmapped.is_empty()
      && self.removed_unmapped.is_empty()
      && self.expanded_from.is_none()
  }

  /// True when any raw byte changed under this token.
  pub fn has_data_change(&self) -> bool {
    !self.old_data.is_empty() || self.expanded_from.is_some()
  }

  /// The lowest address whose byte changed under this token.
  pub fn earliest_change(&self) -> Option<usize> {
    self.old_data.keys().next().copied()
  }

  /// Writes one byte, remembering its first-seen old value.
  pub fn change_data(&mut self, store: &mut ByteStore, address: usize, value: u8) {
    self.old_data.entry(address).or_insert_with(|| store.byte(address));
    store.set_byte_raw(address, value);
  }

  pub(crate) fn add_run(&mut self, run: Run) {
    self.added_runs.insert(run.start(), run);
  }

  pub(crate) fn remove_run(&mut self, run: Run) {
    let start = run.start();
    if self.added_runs.remove(&start).is_none() && !self.removed_runs.contains_key(&start) {
      self.removed_runs.insert(start, run);
    }
  }

  pub(crate) fn add_name(&mut self, address: usize, name: &str) {
    self.added_names.insert(address, name.to_string());
  }

  pub(crate) fn remove_name(&mut self, address: usize, name: &str) {
    if self.added_names.get(&address).map(String::as_str) == Some(name) {
      self.added_names.remove(&address);
    } else if !self.removed_names.contains_key(&address) {
      self.removed_names.insert(address, name.to_string());
    }
  }

  pub(crate) fn add_unmapped(&mut self, source: usize, name: &str) {
    self.added_unmapped.insert(source, name.to_string());
  }

  pub(crate) fn remove_unmapped(&mut self, source: usize, name: &str) {
    if self.added_unmapped.get(&source).map(String::as_str) == Some(name) {
      self.added_unmapped.remove(&source);
    } else if !self.removed_unmapped.contains_key(&source) {
      self.removed_unmapped.insert(source, name.to_string());
    }
  }

  pub(crate) fn note_expansion(&mut self, old_len: usize) {
    if self.expanded_from.is_none() {
      self.expanded_from = Some(old_len);
    }
  }

  /// Plays the token backwards against `store` and returns its inverse.
  ///
  /// Bytes go back to their first-seen values, an expansion shrinks back
  /// to the old length, and the run, name, and parked-pointer bookkeeping
  /// is swapped out. Reverting the returned token redoes the edit.
  pub fn revert(self, store: &mut ByteStore) -> Delta {
    let mut reverse = Delta::new();

    // Bytes past the current end mean this token is an inverse of an
    // expansion; grow back before restoring them.
    if let Some(&max) = self.old_data.keys().next_back() {
      if max >= store.len() {
        reverse.expanded_from = Some(store.len());
        store.expand_raw(max + 1);
      }
    }
    for (&address, &old) in &self.old_data {
      reverse.old_data.insert(address, store.byte(address));
      store.set_byte_raw(address, old);
    }
    if let Some(original_len) = self.expanded_from {
      // Capture the tail being cut off so the inverse grows back to the
      // exact same length with the same contents.
      for address in original_len..store.len() {
        reverse
          .old_data
          .entry(address)
          .or_insert_with(|| store.byte(address));
      }
      store.truncate_raw(original_len);
    }

    store.mass_update_from_delta(
      &self.added_runs,
      &self.removed_runs,
      &self.added_names,
      &self.removed_names,
      &self.added_unmapped,
      &self.removed_unmapped,
    );

    reverse.added_runs = self.removed_runs;
    reverse.removed_runs = self.added_runs;
    reverse.added_names = self.removed_names;
    reverse.removed_names = self.added_names;
    reverse.added_unmapped = self.removed_unmapped;
    reverse.removed_unmapped = self.added_unmapped;
    reverse
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::run::NoInfoRun;
  use crate::run::TextRun;

  #[test]
  fn remembers_first_seen_values_only() {
    let mut store = ByteStore::new(vec![0xAA; 0x10]);
    let mut token = Delta::new();
    token.change_data(&mut store, 4, 0x01);
    token.change_data(&mut store, 4, 0x02);
    assert_eq!(store.byte(4), 0x02);

    token.revert(&mut store);
    assert_eq!(store.byte(4), 0xAA);
  }

  #[test]
  fn earliest_change_tracks_the_lowest_address() {
    let mut store = ByteStore::new(vec![0x00; 0x10]);
    let mut token = Delta::new();
    assert_eq!(token.earliest_change(), None);
    token.change_data(&mut store, 8, 1);
    token.change_data(&mut store, 3, 1);
    assert_eq!(token.earliest_change(), Some(3));
  }

  #[test]
  fn revert_restores_runs_and_names() {
    let mut store = ByteStore::new(vec![0xFF; 0x40]);
    let mut token = Delta::new();
    store.observe_anchor_written(
      &mut token,
      "label",
      Run::Text(TextRun {
        start: 0x10,
        length: 4,
        sources: None,
      }),
    );
    assert!(store.get_next_run(0x10).is_some());

    let redo = token.revert(&mut store);
    assert!(store.get_next_run(0x10).is_none());
    assert_eq!(store.address_of_anchor("label"), None);

    redo.revert(&mut store);
    assert!(matches!(store.get_next_run(0x10), Some(Run::Text(_))));
    assert_eq!(store.address_of_anchor("label"), Some(0x10));
  }

  #[test]
  fn create_and_destroy_within_one_token_nets_out() {
    let mut store = ByteStore::new(vec![0xFF; 0x40]);
    let mut token = Delta::new();
    store.observe_run_written(
      &mut token,
      Run::NoInfo(NoInfoRun {
        start: 0x10,
        sources: Some(vec![]),
      }),
    );
    store.clear_format(&mut token, 0x10, 1);

    token.revert(&mut store);
    assert!(store.get_next_run(0x00).is_none());
  }

  #[test]
  fn expansion_round_trips_through_revert() {
    let mut store = ByteStore::new(vec![0x00; 0x10]);
    let mut token = Delta::new();
    store.expand(&mut token, 0x18);
    token.change_data(&mut store, 0x14, 0x42);
    assert_eq!(store.len(), 0x18);

    let redo = token.revert(&mut store);
    assert_eq!(store.len(), 0x10);

    let undo = redo.revert(&mut store);
    assert_eq!(store.len(), 0x18);
    assert_eq!(store.byte(0x14), 0x42);

    undo.revert(&mut store);
    assert_eq!(store.len(), 0x10);
  }

  #[test]
  fn parked_pointer_bookkeeping_reverts() {
    let mut store = ByteStore::new(vec![0xFF; 0x20]);
    let mut token = Delta::new();
    store.write_pointer_to_name(&mut token, 0x04, "ghost");
    assert_eq!(store.unmapped_pointers().count(), 1);

    let redo = token.revert(&mut store);
    assert_eq!(store.unmapped_pointers().count(), 0);

    redo.revert(&mut store);
    assert_eq!(store.unmapped_pointers().count(), 1);
  }
}
