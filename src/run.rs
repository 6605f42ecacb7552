//! Runs: typed claims over spans of the byte store.
//!
//! A run records that the bytes from its start for its length hold one
//! kind of data. Runs never overlap; the store's index enforces that.

use crate::format::ArrayRun;
use crate::format::ErrorKind;
use crate::format::FormatError;
use crate::lz::PaletteFormat;
use crate::lz::PaletteRun;
use crate::lz::SpriteFormat;
use crate::lz::SpriteRun;
use crate::store::ByteStore;
use crate::text;

/// A span of bytes with no known interpretation, kept only because
/// pointers target it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NoInfoRun {
  /// The claimed address.
  pub start: usize,
  /// Addresses of pointers into this run, if any are known.
  pub sources: Option<Vec<usize>>,
}

/// A four-byte pointer.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PointerRun {
  /// The address of the pointer's low byte.
  pub start: usize,
  /// Addresses of pointers into this run, if any are known.
  pub sources: Option<Vec<usize>>,
}

/// A terminated character string.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TextRun {
  /// The address of the first character.
  pub start: usize,
  /// The length in bytes, terminator included.
  pub length: usize,
  /// Addresses of pointers into this run, if any are known.
  pub sources: Option<Vec<usize>>,
}

/// The entry point of an event script.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ScriptStartRun {
  /// The address of the first script command.
  pub start: usize,
  /// Addresses of pointers into this run, if any are known.
  pub sources: Option<Vec<usize>>,
}

/// Any claim the model can make about a span of bytes.
#[derive(Clone, PartialEq, Debug)]
pub enum Run {
  /// An anchor with no format attached.
  NoInfo(NoInfoRun),
  /// A four-byte pointer.
  Pointer(PointerRun),
  /// A table of repeating elements.
  Array(ArrayRun),
  /// A compressed palette.
  Palette(PaletteRun),
  /// Compressed sprite tiles.
  Sprite(SpriteRun),
  /// A terminated string.
  Text(TextRun),
  /// An event script entry point.
  ScriptStart(ScriptStartRun),
}

impl Run {
  /// The first address the run claims.
  pub fn start(&self) -> usize {
    match self {
      Run::NoInfo(run) => run.start,
      Run::Pointer(run) => run.start,
      Run::Array(run) => run.start(),
      Run::Palette(run) => run.start,
      Run::Sprite(run) => run.start,
      Run::Text(run) => run.start,
      Run::ScriptStart(run) => run.start,
    }
  }

  /// The number of bytes the run claims. Anchors with no format and
  /// script entry points claim a single byte.
  pub fn len(&self) -> usize {
    match self {
      Run::NoInfo(_) => 1,
      Run::Pointer(_) => 4,
      Run::Array(run) => run.len(),
      Run::Palette(run) => run.len(),
      Run::Sprite(run) => run.len(),
      Run::Text(run) => run.length,
      Run::ScriptStart(_) => 1,
    }
  }

  /// True when the run claims no bytes at all. Only arrays with an
  /// unresolved anchored length get into this state.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// True when `address` falls inside the run.
  pub fn contains(&self, address: usize) -> bool {
    self.start() <= address && address < self.start() + self.len()
  }

  /// Addresses of pointers into this run. `None` means the question has
  /// never been asked, which is distinct from a known-empty list.
  pub fn pointer_sources(&self) -> Option<&[usize]> {
    match self {
      Run::NoInfo(run) => run.sources.as_deref(),
      Run::Pointer(run) => run.sources.as_deref(),
      Run::Array(run) => run.sources(),
      Run::Palette(run) => run.sources.as_deref(),
      Run::Sprite(run) => run.sources.as_deref(),
      Run::Text(run) => run.sources.as_deref(),
      Run::ScriptStart(run) => run.sources.as_deref(),
    }
  }

  /// The format string that would recreate this run.
  pub fn format_string(&self) -> String {
    match self {
      Run::NoInfo(_) => String::new(),
      Run::Pointer(_) => "<>".to_string(),
      Run::Array(run) => run.format_string().to_string(),
      Run::Palette(run) => run.format_string(),
      Run::Sprite(run) => run.format_string(),
      Run::Text(_) => "\"\"".to_string(),
      Run::ScriptStart(_) => "`xse`".to_string(),
    }
  }

  /// Returns a copy of this run at a different start address.
  pub fn at(&self, start: usize) -> Run {
    match self {
      Run::NoInfo(run) => Run::NoInfo(NoInfoRun {
        start,
        sources: run.sources.clone(),
      }),
      Run::Pointer(run) => Run::Pointer(PointerRun {
        start,
        sources: run.sources.clone(),
      }),
      Run::Array(run) => Run::Array(run.at(start)),
      Run::Palette(run) => Run::Palette(run.at(start)),
      Run::Sprite(run) => Run::Sprite(run.at(start)),
      Run::Text(run) => Run::Text(TextRun {
        start,
        ..run.clone()
      }),
      Run::ScriptStart(run) => Run::ScriptStart(ScriptStartRun {
        start,
        sources: run.sources.clone(),
      }),
    }
  }

  /// Decodes the byte at `address` into a typed value.
  pub fn value_at(&self, store: &ByteStore, address: usize) -> Value {
    match self {
      Run::Array(run) => run.decode(store, address),
      Run::Pointer(run) => {
        let destination = store.read_pointer(run.start);
        let anchor = destination.and_then(|d| store.anchor_of_address(d));
        Value::Pointer {
          destination,
          anchor,
        }
      }
      Run::Text(run) => Value::Text {
        start: run.start,
        text: text::decode(store.bytes(), run.start, run.length).unwrap_or_default(),
      },
      _ => Value::None,
    }
  }
}

/// A typed reading of some bytes within a run.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Value {
  /// The byte carries no decodable value.
  None,
  /// A pointer, possibly to a named anchor.
  Pointer {
    /// The address the pointer targets, or `None` for a null pointer.
    destination: Option<usize>,
    /// The name bound to the destination, when one exists.
    anchor: Option<String>,
  },
  /// A little-endian unsigned integer.
  Integer {
    /// The decoded value.
    value: u32,
    /// The address of the low byte.
    start: usize,
    /// The width in bytes.
    length: usize,
  },
  /// A decoded character string.
  Text {
    /// The address of the first character.
    start: usize,
    /// The decoded characters, opening quote included.
    text: String,
  },
}

/// Returns a copy of `run` carrying exactly `sources`.
pub fn with_pointer_sources(run: &Run, sources: Option<Vec<usize>>) -> Run {
  let sources = sources.map(normalize);
  match run {
    Run::NoInfo(run) => Run::NoInfo(NoInfoRun {
      start: run.start,
      sources,
    }),
    Run::Pointer(run) => Run::Pointer(PointerRun {
      start: run.start,
      sources,
    }),
    Run::Array(run) => Run::Array(run.with_sources(sources)),
    Run::Palette(run) => Run::Palette(run.with_sources(sources)),
    Run::Sprite(run) => Run::Sprite(run.with_sources(sources)),
    Run::Text(run) => Run::Text(TextRun {
      sources,
      ..run.clone()
    }),
    Run::ScriptStart(run) => Run::ScriptStart(ScriptStartRun {
      start: run.start,
      sources,
    }),
  }
}

/// Merges another run's pointer sources into `run`. An unknown source
/// list on either side defers to the other; two known lists are unioned.
pub fn merge_anchor(run: &Run, incoming: Option<&[usize]>) -> Run {
  let merged = match (run.pointer_sources(), incoming) {
    (None, None) => None,
    (Some(existing), None) => Some(existing.to_vec()),
    (None, Some(incoming)) => Some(incoming.to_vec()),
    (Some(existing), Some(incoming)) => {
      let mut merged = existing.to_vec();
      merged.extend_from_slice(incoming);
      Some(merged)
    }
  };
  with_pointer_sources(run, merged)
}

/// Removes one pointer source from `run`. Removing from an unknown
/// source list is a no-op.
pub fn remove_source(run: &Run, source: usize) -> Run {
  match run.pointer_sources() {
    None => run.clone(),
    Some(sources) => {
      let remaining = sources.iter().copied().filter(|&s| s != source).collect();
      with_pointer_sources(run, Some(remaining))
    }
  }
}

fn normalize(mut sources: Vec<usize>) -> Vec<usize> {
  sources.sort_unstable();
  sources.dedup();
  sources
}

/// Builds the run described by `format` at `start`.
///
/// An empty format makes a bare anchor, `<>` a pointer. `[` opens an
/// array format. `` `lzp…` `` and `` `lzs…` `` claim compressed palette
/// and sprite streams, `""` a terminated string, `` `xse` `` a script
/// entry point.
pub fn from_format(
  store: &ByteStore,
  format: &str,
  start: usize,
  sources: Option<Vec<usize>>,
) -> Result<Run, FormatError> {
  let unknown = || FormatError::new(format, ErrorKind::UnknownFormat);
  if format.is_empty() {
    return Ok(Run::NoInfo(NoInfoRun { start, sources }));
  }
  if format == "<>" {
    if start + 4 > store.len() {
      return Err(FormatError::new(format, ErrorKind::OutOfBounds));
    }
    return Ok(Run::Pointer(PointerRun { start, sources }));
  }
  if format.starts_with('[') {
    return ArrayRun::parse(store, format, start, sources).map(Run::Array);
  }
  if format.starts_with("`lzp") {
    let shape = PaletteFormat::parse(format).ok_or_else(unknown)?;
    return PaletteRun::parse(store, start, shape, sources)
      .map(Run::Palette)
      .ok_or_else(unknown);
  }
  if format.starts_with("`lzs") {
    let shape = SpriteFormat::parse(format).ok_or_else(unknown)?;
    return SpriteRun::parse(store, start, shape, sources)
      .map(Run::Sprite)
      .ok_or_else(unknown);
  }
  if format == "\"\"" {
    if start >= store.len() {
      return Err(unknown());
    }
    let length =
      text::read_string(store.bytes(), start, true, store.len() - start).ok_or_else(unknown)?;
    return Ok(Run::Text(TextRun {
      start,
      length,
      sources,
    }));
  }
  if format == "`xse`" {
    return Ok(Run::ScriptStart(ScriptStartRun { start, sources }));
  }
  Err(unknown())
}
