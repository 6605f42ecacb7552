//! The byte store: raw image bytes plus the run index layered over them.
//!
//! All editing goes through a [`Delta`](crate::delta::Delta) token so the
//! history can replay it backwards. The store itself only guarantees two
//! invariants: runs in the index never overlap, and the two anchor maps
//! (name to address, address to name) stay mirror images of each other.

use std::collections::BTreeMap;

use crate::delta::Delta;
use crate::format::ArrayRun;
use crate::run;
use crate::run::NoInfoRun;
use crate::run::Run;

/// The offset a GBA ROM is mapped to; pointers store `address + PC_START`.
pub const PC_START: usize = 0x0800_0000;

/// Image bytes with a sorted, non-overlapping run index and named anchors.
pub struct ByteStore {
  data: Vec<u8>,
  runs: Vec<Run>,
  anchor_to_address: BTreeMap<String, usize>,
  address_to_anchor: BTreeMap<usize, String>,
  // Pointer sources whose target name hasn't been given an address yet.
  unmapped: BTreeMap<String, Vec<usize>>,
}

impl ByteStore {
  /// Wraps raw bytes with an empty run index.
  pub fn new(data: Vec<u8>) -> ByteStore {
    ByteStore {
      data,
      runs: Vec::new(),
      anchor_to_address: BTreeMap::new(),
      address_to_anchor: BTreeMap::new(),
      unmapped: BTreeMap::new(),
    }
  }

  /// Wraps raw bytes and seeds the run index by scanning for pointers.
  ///
  /// Every word-aligned little-endian word whose high byte is `0x08` and
  /// whose target is word-aligned and in bounds is taken as a pointer;
  /// each target gets an anchor run recording its sources.
  pub fn with_pointers(data: Vec<u8>) -> ByteStore {
    let mut store = ByteStore::new(data);
    let mut destinations: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut address = 0;
    while address + 4 <= store.data.len() {
      if let Some(destination) = store.read_pointer(address) {
        if destination % 4 == 0 {
          store.runs.push(Run::Pointer(run::PointerRun {
            start: address,
            sources: None,
          }));
          destinations.entry(destination).or_default().push(address);
        }
      }
      address += 4;
    }
    for (destination, sources) in destinations {
      match store.find_run(destination) {
        // The target is the middle of a pointer found earlier; the word
        // there can't also head a run.
        Some(run) if run.start() != destination => continue,
        Some(run) => {
          let merged = run::merge_anchor(run, Some(&sources));
          store.replace_run(merged);
        }
        None => {
          let index = store
            .runs
            .binary_search_by_key(&destination, Run::start)
            .unwrap_err();
          store.runs.insert(
            index,
            Run::NoInfo(NoInfoRun {
              start: destination,
              sources: Some(sources),
            }),
          );
        }
      }
    }
    store
  }

  /// The number of bytes in the image.
  pub fn len(&self) -> usize {
    self.data.len()
  }

  /// True when the image holds no bytes.
  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// The raw image bytes.
  pub fn bytes(&self) -> &[u8] {
    &self.data
  }

  /// One raw byte.
  pub fn byte(&self, address: usize) -> u8 {
    self.data[address]
  }

  /// All runs, in ascending address order.
  pub fn runs(&self) -> impl Iterator<Item = &Run> {
    self.runs.iter()
  }

  /// The run covering `address`, or the first run after it.
  pub fn get_next_run(&self, address: usize) -> Option<&Run> {
    match self.runs.binary_search_by_key(&address, Run::start) {
      Ok(index) => Some(&self.runs[index]),
      Err(index) => {
        if index > 0 && self.runs[index - 1].contains(address) {
          Some(&self.runs[index - 1])
        } else {
          self.runs.get(index)
        }
      }
    }
  }

  /// Records a run in the index, merging pointer knowledge with whatever
  /// is already known about that address.
  ///
  /// A bare anchor never downgrades an existing formatted run. Writing a
  /// pointer run also records its target as an anchor run.
  ///
  /// # Panics
  ///
  /// Panics if the run claims no bytes, or if it overlaps a run that
  /// starts at a different address.
  pub fn observe_run_written(&mut self, token: &mut Delta, run: Run) {
    assert!(run.len() >= 1, "a written run must claim at least one byte");
    let start = run.start();
    match self.runs.binary_search_by_key(&start, Run::start) {
      Ok(index) => {
        let existing = &self.runs[index];
        if matches!(run, Run::NoInfo(_)) && !matches!(existing, Run::NoInfo(_)) {
          return;
        }
        let merged = run::merge_anchor(&run, existing.pointer_sources());
        if let Some(next) = self.runs.get(index + 1) {
          assert!(
            start + merged.len() <= next.start(),
            "run at {:#x} overlaps the run at {:#x}",
            start,
            next.start()
          );
        }
        token.remove_run(self.runs[index].clone());
        token.add_run(merged.clone());
        self.runs[index] = merged;
      }
      Err(index) => {
        if index > 0 {
          let previous = &self.runs[index - 1];
          assert!(
            previous.start() + previous.len() <= start,
            "run at {:#x} overlaps the run at {:#x}",
            start,
            previous.start()
          );
        }
        if let Some(next) = self.runs.get(index) {
          assert!(
            start + run.len() <= next.start(),
            "run at {:#x} overlaps the run at {:#x}",
            start,
            next.start()
          );
        }
        token.add_run(run.clone());
        self.runs.insert(index, run.clone());
      }
    }

    if let Run::Pointer(pointer) = &run {
      if let Some(destination) = self.read_pointer(pointer.start) {
        self.observe_pointer_target(token, pointer.start, destination);
      }
    }
  }

  /// Binds `name` to the run's start address and records the run.
  ///
  /// Pointers that were written against the name before it had an address
  /// are resolved now. A zero-length run (an array whose anchored length
  /// hasn't resolved) records only the name binding. Arrays whose length
  /// mirrors `name` are re-measured.
  pub fn observe_anchor_written(&mut self, token: &mut Delta, name: &str, run: Run) {
    let start = run.start();
    if let Some(&old) = self.anchor_to_address.get(name) {
      if old != start {
        self.address_to_anchor.remove(&old);
        token.remove_name(old, name);
      }
    }
    if let Some(old_name) = self.address_to_anchor.get(&start).cloned() {
      if old_name != name {
        self.anchor_to_address.remove(&old_name);
        token.remove_name(start, &old_name);
      }
    }
    self.anchor_to_address.insert(name.to_string(), start);
    self.address_to_anchor.insert(start, name.to_string());
    token.add_name(start, name);

    let waiting = self.unmapped.remove(name).unwrap_or_default();
    for &source in &waiting {
      token.remove_unmapped(source, name);
      self.write_pointer(token, source, start);
    }
    let run = if waiting.is_empty() {
      run
    } else {
      run::merge_anchor(&run, Some(&waiting))
    };

    if !run.is_empty() {
      self.observe_run_written(token, run);
    }

    self.remeasure_dependent_arrays(token, name);
  }

  /// The address bound to `name`, if any.
  pub fn address_of_anchor(&self, name: &str) -> Option<usize> {
    self.anchor_to_address.get(name).copied()
  }

  /// The name bound to `address`, if any.
  pub fn anchor_of_address(&self, address: usize) -> Option<String> {
    self.address_to_anchor.get(&address).cloned()
  }

  /// All name bindings, in address order.
  pub fn anchors(&self) -> impl Iterator<Item = (&str, usize)> {
    self
      .address_to_anchor
      .iter()
      .map(|(&address, name)| (name.as_str(), address))
  }

  /// Pointer sources waiting for a name to be bound, grouped by name.
  pub fn unmapped_pointers(&self) -> impl Iterator<Item = (&str, &[usize])> {
    self
      .unmapped
      .iter()
      .map(|(name, sources)| (name.as_str(), sources.as_slice()))
  }

  /// Drops format claims over `[start, start + length)`. The bytes are
  /// untouched.
  ///
  /// A cleared run that pointers target leaves a bare anchor behind so
  /// those pointers stay resolvable. Clearing a pointer run removes it
  /// from its target's source list. Name bindings survive only where an
  /// anchor run survives.
  pub fn clear_format(&mut self, token: &mut Delta, start: usize, length: usize) {
    let end = start + length;
    let cleared: Vec<Run> = self
      .runs
      .iter()
      .filter(|run| run.start() < end && start < run.start() + run.len())
      .cloned()
      .collect();

    for run in cleared {
      let index = self
        .runs
        .binary_search_by_key(&run.start(), Run::start)
        .unwrap();
      token.remove_run(run.clone());
      self.runs.remove(index);

      if let Run::Pointer(pointer) = &run {
        if let Some(destination) = self.read_pointer(pointer.start) {
          self.forget_pointer_source(token, destination, pointer.start);
        }
      }

      match run.pointer_sources() {
        Some(sources) if !sources.is_empty() && run.start() >= start => {
          let anchor = Run::NoInfo(NoInfoRun {
            start: run.start(),
            sources: Some(sources.to_vec()),
          });
          token.add_run(anchor.clone());
          let index = self
            .runs
            .binary_search_by_key(&run.start(), Run::start)
            .unwrap_err();
          self.runs.insert(index, anchor);
        }
        _ => {
          if let Some(name) = self.address_to_anchor.remove(&run.start()) {
            self.anchor_to_address.remove(&name);
            token.remove_name(run.start(), &name);
          }
        }
      }
    }
  }

  /// Reads the pointer word at `address`. Returns `None` for a null word
  /// or a word that doesn't map into the image.
  pub fn read_pointer(&self, address: usize) -> Option<usize> {
    if address + 4 > self.data.len() {
      return None;
    }
    let word = self.data[address] as usize
      | (self.data[address + 1] as usize) << 8
      | (self.data[address + 2] as usize) << 16
      | (self.data[address + 3] as usize) << 24;
    if word == 0 {
      return None;
    }
    let destination = word.checked_sub(PC_START)?;
    if destination < self.data.len() {
      Some(destination)
    } else {
      None
    }
  }

  /// Writes a pointer word targeting `destination`.
  pub fn write_pointer(&mut self, token: &mut Delta, address: usize, destination: usize) {
    let word = destination + PC_START;
    for i in 0..4 {
      token.change_data(self, address + i, (word >> (8 * i)) as u8);
    }
  }

  /// Writes a pointer word targeting `name`.
  ///
  /// When the name has no address yet the word is written as null and the
  /// source is parked until [`ByteStore::observe_anchor_written`] binds
  /// the name.
  pub fn write_pointer_to_name(&mut self, token: &mut Delta, address: usize, name: &str) {
    match self.address_of_anchor(name) {
      Some(destination) => {
        self.write_pointer(token, address, destination);
        self.observe_pointer_target(token, address, destination);
      }
      None => {
        for i in 0..4 {
          token.change_data(self, address + i, 0);
        }
        let sources = self.unmapped.entry(name.to_string()).or_default();
        if !sources.contains(&address) {
          sources.push(address);
          token.add_unmapped(address, name);
        }
      }
    }
  }

  /// Finds `length` free bytes: word-aligned, all `0xFF`, claimed by no
  /// run.
  pub fn find_free_space(&self, length: usize) -> Option<usize> {
    let mut address = 0;
    'candidates: while address + length <= self.data.len() {
      if let Some(run) = self.get_next_run(address) {
        if run.start() < address + length {
          address = next_word(run.start() + run.len().max(1));
          continue;
        }
      }
      for offset in 0..length {
        if self.data[address + offset] != 0xFF {
          address = next_word(address + offset + 1);
          continue 'candidates;
        }
      }
      return Some(address);
    }
    None
  }

  /// Makes room for a run to grow to `needed` bytes.
  ///
  /// If the run already has the space, it is returned unchanged.
  /// Otherwise it moves to free space (growing the image when none
  /// exists), its old bytes are cleared to `0xFF`, and every pointer to
  /// it is repointed; a name bound to it moves with it. The relocated run
  /// is NOT yet in the index; the caller writes the new contents and then
  /// observes the replacement run.
  pub fn relocate_for_expansion(&mut self, token: &mut Delta, run: &Run, needed: usize) -> Run {
    if needed <= run.len() {
      return run.clone();
    }

    let destination = match self.find_free_space(needed) {
      Some(destination) => destination,
      None => {
        let destination = next_word(self.data.len());
        self.expand(token, destination + needed);
        destination
      }
    };

    let start = run.start();
    if let Ok(index) = self.runs.binary_search_by_key(&start, Run::start) {
      token.remove_run(self.runs[index].clone());
      self.runs.remove(index);
    }
    for offset in 0..run.len() {
      token.change_data(self, start + offset, 0xFF);
    }
    if let Some(sources) = run.pointer_sources() {
      for &source in sources {
        self.write_pointer(token, source, destination);
      }
    }
    if let Some(name) = self.address_to_anchor.remove(&start) {
      token.remove_name(start, &name);
      self.anchor_to_address.insert(name.clone(), destination);
      self.address_to_anchor.insert(destination, name.clone());
      token.add_name(destination, &name);
    }
    run.at(destination)
  }

  /// Applies both halves of a reverted token's bookkeeping: drops the
  /// given runs, names, and parked pointers, then inserts their
  /// replacements.
  pub fn mass_update_from_delta(
    &mut self,
    removed_runs: &BTreeMap<usize, Run>,
    added_runs: &BTreeMap<usize, Run>,
    removed_names: &BTreeMap<usize, String>,
    added_names: &BTreeMap<usize, String>,
    removed_unmapped: &BTreeMap<usize, String>,
    added_unmapped: &BTreeMap<usize, String>,
  ) {
    for &start in removed_runs.keys() {
      if let Ok(index) = self.runs.binary_search_by_key(&start, Run::start) {
        self.runs.remove(index);
      }
    }
    for run in added_runs.values() {
      match self.runs.binary_search_by_key(&run.start(), Run::start) {
        Ok(index) => self.runs[index] = run.clone(),
        Err(index) => self.runs.insert(index, run.clone()),
      }
    }
    for (&address, name) in removed_names {
      self.address_to_anchor.remove(&address);
      self.anchor_to_address.remove(name);
    }
    for (&address, name) in added_names {
      self.address_to_anchor.insert(address, name.clone());
      self.anchor_to_address.insert(name.clone(), address);
    }
    for (&source, name) in removed_unmapped {
      if let Some(sources) = self.unmapped.get_mut(name) {
        sources.retain(|&s| s != source);
        if sources.is_empty() {
          self.unmapped.remove(name);
        }
      }
    }
    for (&source, name) in added_unmapped {
      let sources = self.unmapped.entry(name.clone()).or_default();
      if !sources.contains(&source) {
        sources.push(source);
        sources.sort_unstable();
      }
    }
  }

  /// Grows the image to `new_len`, filling with `0xFF`.
  pub fn expand(&mut self, token: &mut Delta, new_len: usize) {
    if new_len <= self.data.len() {
      return;
    }
    token.note_expansion(self.data.len());
    self.data.resize(new_len, 0xFF);
  }

  pub(crate) fn set_byte_raw(&mut self, address: usize, value: u8) {
    self.data[address] = value;
  }

  pub(crate) fn truncate_raw(&mut self, new_len: usize) {
    self.data.truncate(new_len);
    self.runs.retain(|run| run.start() < new_len);
  }

  pub(crate) fn expand_raw(&mut self, new_len: usize) {
    if new_len > self.data.len() {
      self.data.resize(new_len, 0xFF);
    }
  }

  fn find_run(&self, start: usize) -> Option<&Run> {
    match self.runs.binary_search_by_key(&start, Run::start) {
      Ok(index) => Some(&self.runs[index]),
      Err(index) => {
        if index > 0 && self.runs[index - 1].contains(start) {
          Some(&self.runs[index - 1])
        } else {
          None
        }
      }
    }
  }

  fn replace_run(&mut self, run: Run) {
    let index = self
      .runs
      .binary_search_by_key(&run.start(), Run::start)
      .unwrap();
    self.runs[index] = run;
  }

  // Records that a pointer at `source` targets `destination`, creating a
  // bare anchor there if nothing claims it yet.
  fn observe_pointer_target(&mut self, token: &mut Delta, source: usize, destination: usize) {
    match self.find_run(destination) {
      Some(run) if run.start() == destination => {
        let merged = run::merge_anchor(run, Some(&[source]));
        token.remove_run(run.clone());
        token.add_run(merged.clone());
        self.replace_run(merged);
      }
      Some(_) => {}
      None => {
        let anchor = Run::NoInfo(NoInfoRun {
          start: destination,
          sources: Some(vec![source]),
        });
        let index = self
          .runs
          .binary_search_by_key(&destination, Run::start)
          .unwrap_err();
        token.add_run(anchor.clone());
        self.runs.insert(index, anchor);
      }
    }
  }

  fn forget_pointer_source(&mut self, token: &mut Delta, destination: usize, source: usize) {
    if let Ok(index) = self.runs.binary_search_by_key(&destination, Run::start) {
      let updated = run::remove_source(&self.runs[index], source);
      token.remove_run(self.runs[index].clone());
      token.add_run(updated.clone());
      self.runs[index] = updated;
    }
  }

  fn remeasure_dependent_arrays(&mut self, token: &mut Delta, name: &str) {
    let dependents: Vec<(String, usize, Option<Vec<usize>>)> = self
      .runs
      .iter()
      .filter_map(|run| match run {
        Run::Array(array) if array.length_from_anchor() == Some(name) => Some((
          array.format_string().to_string(),
          array.start(),
          array.sources().map(<[usize]>::to_vec),
        )),
        _ => None,
      })
      .collect();
    for (format, start, sources) in dependents {
      if let Ok(remeasured) = ArrayRun::parse(self, &format, start, sources) {
        if !remeasured.is_empty() {
          self.observe_run_written(token, Run::Array(remeasured));
        }
      }
    }
  }
}

fn next_word(address: usize) -> usize {
  (address + 3) / 4 * 4
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::run::TextRun;

  fn pointer_bytes(destination: usize) -> [u8; 4] {
    let word = destination + PC_START;
    [
      word as u8,
      (word >> 8) as u8,
      (word >> 16) as u8,
      (word >> 24) as u8,
    ]
  }

  #[test]
  fn pointer_scan_finds_aligned_words() {
    let mut data = vec![0u8; 0x40];
    data[0x10..0x14].copy_from_slice(&pointer_bytes(0x20));
    data[0x14..0x18].copy_from_slice(&pointer_bytes(0x20));
    let store = ByteStore::with_pointers(data);

    let run = store.get_next_run(0x20).unwrap();
    assert_eq!(run.start(), 0x20);
    assert_eq!(run.pointer_sources(), Some(&[0x10, 0x14][..]));
  }

  #[test]
  fn pointer_scan_skips_misaligned_targets() {
    let mut data = vec![0u8; 0x40];
    data[0x10..0x14].copy_from_slice(&pointer_bytes(0x21));
    let store = ByteStore::with_pointers(data);
    assert!(store.get_next_run(0x10).is_none());
  }

  #[test]
  fn pointer_round_trip() {
    let mut store = ByteStore::new(vec![0u8; 0x20]);
    let mut token = Delta::new();
    store.write_pointer(&mut token, 4, 0x10);
    assert_eq!(store.read_pointer(4), Some(0x10));
    assert_eq!(store.byte(7), 0x08);
  }

  #[test]
  fn null_pointers_read_as_none() {
    let store = ByteStore::new(vec![0u8; 0x20]);
    assert_eq!(store.read_pointer(4), None);
  }

  #[test]
  fn get_next_run_covers_and_follows() {
    let mut store = ByteStore::new(vec![0xFF; 0x40]);
    let mut token = Delta::new();
    store.observe_run_written(
      &mut token,
      Run::Text(TextRun {
        start: 0x10,
        length: 8,
        sources: None,
      }),
    );
    assert_eq!(store.get_next_run(0x00).unwrap().start(), 0x10);
    assert_eq!(store.get_next_run(0x13).unwrap().start(), 0x10);
    assert!(store.get_next_run(0x18).is_none());
  }

  #[test]
  #[should_panic(expected = "overlaps")]
  fn overlapping_runs_are_rejected() {
    let mut store = ByteStore::new(vec![0xFF; 0x40]);
    let mut token = Delta::new();
    store.observe_run_written(
      &mut token,
      Run::Text(TextRun {
        start: 0x10,
        length: 8,
        sources: None,
      }),
    );
    store.observe_run_written(
      &mut token,
      Run::Text(TextRun {
        start: 0x14,
        length: 8,
        sources: None,
      }),
    );
  }

  #[test]
  fn bare_anchor_never_downgrades_a_formatted_run() {
    let mut store = ByteStore::new(vec![0xFF; 0x40]);
    let mut token = Delta::new();
    store.observe_run_written(
      &mut token,
      Run::Text(TextRun {
        start: 0x10,
        length: 8,
        sources: None,
      }),
    );
    store.observe_run_written(
      &mut token,
      Run::NoInfo(NoInfoRun {
        start: 0x10,
        sources: Some(vec![4]),
      }),
    );
    assert!(matches!(store.get_next_run(0x10), Some(Run::Text(_))));
  }

  #[test]
  fn anchors_bind_both_ways() {
    let mut store = ByteStore::new(vec![0xFF; 0x40]);
    let mut token = Delta::new();
    store.observe_anchor_written(
      &mut token,
      "names",
      Run::NoInfo(NoInfoRun {
        start: 0x10,
        sources: None,
      }),
    );
    assert_eq!(store.address_of_anchor("names"), Some(0x10));
    assert_eq!(store.anchor_of_address(0x10).as_deref(), Some("names"));
  }

  #[test]
  fn unmapped_pointers_resolve_when_the_name_arrives() {
    let mut store = ByteStore::new(vec![0xFF; 0x40]);
    let mut token = Delta::new();
    store.write_pointer_to_name(&mut token, 0x04, "later");
    assert_eq!(store.read_pointer(0x04), None);
    assert_eq!(
      store.unmapped_pointers().collect::<Vec<_>>(),
      vec![("later", &[0x04][..])]
    );

    store.observe_anchor_written(
      &mut token,
      "later",
      Run::NoInfo(NoInfoRun {
        start: 0x20,
        sources: None,
      }),
    );
    assert_eq!(store.read_pointer(0x04), Some(0x20));
    assert_eq!(store.unmapped_pointers().count(), 0);
    assert_eq!(
      store.get_next_run(0x20).unwrap().pointer_sources(),
      Some(&[0x04][..])
    );
  }

  #[test]
  fn clear_format_keeps_bytes_and_pointed_anchors() {
    let mut data = vec![0xFF; 0x40];
    data[0x10..0x14].copy_from_slice(&pointer_bytes(0x20));
    let mut store = ByteStore::with_pointers(data);
    let mut token = Delta::new();
    store.observe_run_written(
      &mut token,
      Run::Text(TextRun {
        start: 0x20,
        length: 4,
        sources: Some(vec![0x10]),
      }),
    );

    store.clear_format(&mut token, 0x20, 4);
    assert_eq!(store.byte(0x10), pointer_bytes(0x20)[0]);
    let anchor = store.get_next_run(0x20).unwrap();
    assert!(matches!(anchor, Run::NoInfo(_)));
    assert_eq!(anchor.pointer_sources(), Some(&[0x10][..]));
  }

  #[test]
  fn clearing_a_pointer_forgets_its_source() {
    let mut data = vec![0xFF; 0x40];
    data[0x10..0x14].copy_from_slice(&pointer_bytes(0x20));
    let mut store = ByteStore::with_pointers(data);
    let mut token = Delta::new();

    store.clear_format(&mut token, 0x10, 4);
    assert_eq!(
      store.get_next_run(0x20).unwrap().pointer_sources(),
      Some(&[][..])
    );
  }

  #[test]
  fn free_space_is_word_aligned_and_unclaimed() {
    let mut data = vec![0xFF; 0x40];
    data[0x05] = 0x00;
    let mut store = ByteStore::new(data);
    let mut token = Delta::new();
    store.observe_run_written(
      &mut token,
      Run::Text(TextRun {
        start: 0x08,
        length: 8,
        sources: None,
      }),
    );
    assert_eq!(store.find_free_space(8), Some(0x10));
  }

  #[test]
  fn relocation_repoints_sources_and_moves_names() {
    let mut data = vec![0x00; 0x20];
    data[0x10..0x20].iter_mut().for_each(|b| *b = 0xFF);
    data[0x00..0x04].copy_from_slice(&pointer_bytes(0x08));
    let mut store = ByteStore::new(data);
    let mut token = Delta::new();
    let run = Run::Text(TextRun {
      start: 0x08,
      length: 4,
      sources: Some(vec![0x00]),
    });
    store.observe_anchor_written(&mut token, "moved", run.clone());

    let relocated = store.relocate_for_expansion(&mut token, &run, 8);
    assert_eq!(relocated.start(), 0x10);
    assert_eq!(store.read_pointer(0x00), Some(0x10));
    assert_eq!(store.address_of_anchor("moved"), Some(0x10));
    // The old location was cleared.
    assert!(store.bytes()[0x08..0x0C].iter().all(|&b| b == 0xFF));
  }

  #[test]
  fn relocation_expands_when_no_space_is_free() {
    let mut store = ByteStore::new(vec![0x00; 0x10]);
    let mut token = Delta::new();
    let run = Run::Text(TextRun {
      start: 0x08,
      length: 4,
      sources: None,
    });
    store.observe_run_written(&mut token, run.clone());

    let relocated = store.relocate_for_expansion(&mut token, &run, 8);
    assert_eq!(relocated.start(), 0x10);
    assert_eq!(store.len(), 0x18);
  }
}
