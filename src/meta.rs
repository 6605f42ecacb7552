//! Image metadata, which records the named anchors and their formats so a
//! session can be rebuilt over the same bytes later.

use serde::Deserialize;
use serde::Serialize;

use crate::delta::Delta;
use crate::format::ErrorKind;
use crate::format::FormatError;
use crate::run;
use crate::store::ByteStore;

/// Everything known about an image that isn't stored in its bytes.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Metadata {
  /// Named anchors, in address order.
  #[serde(default)]
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub anchors: Vec<Anchor>,
  /// Pointers written against names that have no address yet.
  #[serde(default)]
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub unmapped_pointers: Vec<UnmappedPointer>,
}

/// One named anchor.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Anchor {
  /// The anchor's name.
  pub name: String,
  /// The address the name is bound to.
  pub address: usize,
  /// The format string of the run at that address, empty for a bare
  /// anchor.
  #[serde(default)]
  #[serde(skip_serializing_if = "String::is_empty")]
  pub format: String,
}

/// One pointer parked against an unbound name.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UnmappedPointer {
  /// The name the pointer is waiting for.
  pub name: String,
  /// The address of the pointer word.
  pub source: usize,
}

impl Metadata {
  /// Reads metadata from json5 text.
  pub fn parse(text: &str) -> Result<Metadata, json5::Error> {
    json5::from_str(text)
  }

  /// Renders metadata as json5 text.
  pub fn render(&self) -> Result<String, json5::Error> {
    json5::to_string(self)
  }

  /// Captures the named anchors and parked pointers of a store.
  pub fn collect(store: &ByteStore) -> Metadata {
    let anchors = store
      .anchors()
      .map(|(name, address)| {
        let format = match store.get_next_run(address) {
          Some(run) if run.start() == address => run.format_string(),
          _ => String::new(),
        };
        Anchor {
          name: name.to_string(),
          address,
          format,
        }
      })
      .collect();
    let unmapped_pointers = store
      .unmapped_pointers()
      .flat_map(|(name, sources)| {
        sources.iter().map(move |&source| UnmappedPointer {
          name: name.to_string(),
          source,
        })
      })
      .collect();
    Metadata {
      anchors,
      unmapped_pointers,
    }
  }

  /// Replays this metadata onto a store: every anchor's format is parsed
  /// and observed under its name, then the parked pointers are parked
  /// again. Entries whose addresses fall outside the image are rejected,
  /// since the sidecar may have been hand-edited or saved against a
  /// different image.
  pub fn apply(&self, store: &mut ByteStore, token: &mut Delta) -> Result<(), FormatError> {
    for anchor in &self.anchors {
      if anchor.address >= store.len() {
        return Err(FormatError::new(&anchor.name, ErrorKind::OutOfBounds));
      }
      let run = run::from_format(store, &anchor.format, anchor.address, None)?;
      store.observe_anchor_written(token, &anchor.name, run);
    }
    for pointer in &self.unmapped_pointers {
      if pointer.source + 4 > store.len() {
        return Err(FormatError::new(&pointer.name, ErrorKind::OutOfBounds));
      }
      store.write_pointer_to_name(token, pointer.source, &pointer.name);
    }
    Ok(())
  }
}
