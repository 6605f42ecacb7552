//! Array runs: repeating fixed-shape records.

use std::cell::RefCell;
use std::rc::Rc;

use crate::format::parse::parse_format;
use crate::format::parse::ErrorKind;
use crate::format::parse::FormatError;
use crate::format::parse::LengthSpec;
use crate::format::parse::Segment;
use crate::format::parse::SegmentType;
use crate::run::Run;
use crate::run::Value;
use crate::store::ByteStore;
use crate::text;

/// Reads a little-endian unsigned integer of up to four bytes.
pub fn read_integer(data: &[u8], start: usize, length: usize) -> u32 {
  let mut result: u32 = 0;
  let mut multiplier: u32 = 1;
  for i in 0..length {
    result = result.wrapping_add(data[start + i] as u32 * multiplier);
    multiplier = multiplier.wrapping_mul(0x100);
  }
  result
}

/// A byte offset within an array, resolved to its element and segment.
///
/// Derived on demand and never persisted.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ArrayOffset {
  /// Which element the byte falls in.
  pub element_index: usize,
  /// Which segment of that element the byte falls in.
  pub segment_index: usize,
  /// The address where that segment begins.
  pub segment_start: usize,
  /// The byte's offset within the segment.
  pub segment_offset: usize,
}

#[derive(Clone, Debug)]
struct TextCache {
  segment_start: usize,
  segment_offset: usize,
  text: String,
}

/// A run of repeating elements, each a fixed sequence of named segments.
#[derive(Clone, Debug)]
pub struct ArrayRun {
  start: usize,
  sources: Option<Vec<usize>>,
  format: String,
  segments: Rc<[Segment]>,
  element_count: usize,
  element_length: usize,
  length_from_anchor: Option<String>,
  // Single-entry decode cache for forward, sequential scans over a string
  // segment. Keyed by segment start; invalidated when a query moves to an
  // earlier offset within the segment.
  cache: RefCell<Option<TextCache>>,
}

impl PartialEq for ArrayRun {
  fn eq(&self, other: &ArrayRun) -> bool {
    self.start == other.start
      && self.sources == other.sources
      && self.format == other.format
      && self.segments == other.segments
      && self.element_count == other.element_count
  }
}

impl ArrayRun {
  /// Parses `format` and places the resulting array at `start`.
  ///
  /// When the format carries no length, the element count is inferred by
  /// probing the data until it stops matching the element shape or the
  /// next registered run begins. When the format names another array, the
  /// count mirrors that array's count, or zero if the name doesn't
  /// currently resolve to an array.
  pub fn parse(
    store: &ByteStore,
    format: &str,
    start: usize,
    sources: Option<Vec<usize>>,
  ) -> Result<ArrayRun, FormatError> {
    let (segments, length_spec) = parse_format(format)?;
    let segments: Rc<[Segment]> = segments.into();
    let element_length = segments.iter().map(|s| s.length).sum();

    let mut length_from_anchor = None;
    let element_count = match length_spec {
      LengthSpec::Infer => infer_count(store, start, &segments, element_length),
      LengthSpec::Literal(count) => {
        if count
          .checked_mul(element_length)
          .map_or(true, |total| start + total > store.len())
        {
          return Err(FormatError::new(format, ErrorKind::OutOfBounds));
        }
        count
      }
      LengthSpec::Anchor(name) => {
        let count = count_from_anchor(store, &name);
        length_from_anchor = Some(name);
        count
      }
    };

    Ok(ArrayRun {
      start,
      sources,
      format: format.to_string(),
      segments,
      element_count,
      element_length,
      length_from_anchor,
      cache: RefCell::new(None),
    })
  }

  /// Scans the whole image for the boundary with the longest stretch of
  /// elements matching `format`, in ascending address order.
  ///
  /// Boundaries already claimed as arrays, and boundaries nothing points
  /// to, are skipped. Ties keep the lowest address. Returns `None` when no
  /// boundary matches even one element.
  pub fn search(store: &ByteStore, format: &str) -> Result<Option<ArrayRun>, FormatError> {
    let (segments, _) = parse_format(format)?;
    let segments: Rc<[Segment]> = segments.into();
    let element_length: usize = segments.iter().map(|s| s.length).sum();

    let mut best_start = None;
    let mut best_count = 0;
    for run in store.runs() {
      if matches!(run, Run::Array(_)) || run.pointer_sources().is_none() {
        continue;
      }
      let mut count = 0;
      let mut address = run.start();
      while element_matches(store, address, &segments) {
        count += 1;
        address += element_length;
      }
      if count > best_count {
        best_count = count;
        best_start = Some(run.start());
      }
    }

    let start = match best_start {
      Some(start) => start,
      None => return Ok(None),
    };

    let close = format.rfind(']').unwrap();
    let format = format!("{}{}", &format[..=close], best_count);
    let sources = store
      .get_next_run(start)
      .and_then(|run| run.pointer_sources())
      .map(<[usize]>::to_vec);
    Ok(Some(ArrayRun {
      start,
      sources,
      format,
      segments,
      element_count: best_count,
      element_length,
      length_from_anchor: None,
      cache: RefCell::new(None),
    }))
  }

  /// Returns a copy of this run with `additional` more elements (fewer,
  /// if negative). A literal or anchored length suffix is replaced by the
  /// new literal count.
  pub fn append(&self, additional: isize) -> ArrayRun {
    let element_count = (self.element_count as isize + additional).max(0) as usize;
    let close = self.format.rfind(']').unwrap();
    let mut format = self.format[..=close].to_string();
    if format != self.format {
      format.push_str(&element_count.to_string());
    }
    ArrayRun {
      start: self.start,
      sources: self.sources.clone(),
      format,
      segments: Rc::clone(&self.segments),
      element_count,
      element_length: self.element_length,
      length_from_anchor: None,
      cache: RefCell::new(None),
    }
  }

  /// Returns a copy of this run at a different start address.
  pub fn at(&self, start: usize) -> ArrayRun {
    ArrayRun {
      start,
      cache: RefCell::new(None),
      ..self.clone()
    }
  }

  /// Returns a copy of this run with different pointer sources.
  pub fn with_sources(&self, sources: Option<Vec<usize>>) -> ArrayRun {
    ArrayRun {
      sources,
      cache: RefCell::new(None),
      ..self.clone()
    }
  }

  /// The address of the first element.
  pub fn start(&self) -> usize {
    self.start
  }

  /// The total length of the array in bytes.
  pub fn len(&self) -> usize {
    self.element_count * self.element_length
  }

  /// True when the array currently holds no elements, which happens when
  /// an anchored length hasn't resolved yet.
  pub fn is_empty(&self) -> bool {
    self.element_count == 0
  }

  /// Addresses of pointers into this run, if any are known.
  pub fn sources(&self) -> Option<&[usize]> {
    self.sources.as_deref()
  }

  /// The format string this run was built from.
  pub fn format_string(&self) -> &str {
    &self.format
  }

  /// The segments making up one element.
  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  /// The number of elements.
  pub fn element_count(&self) -> usize {
    self.element_count
  }

  /// The length of one element in bytes.
  pub fn element_length(&self) -> usize {
    self.element_length
  }

  /// The name of the array this one's length mirrors, if any.
  pub fn length_from_anchor(&self) -> Option<&str> {
    self.length_from_anchor.as_deref()
  }

  /// Resolves a byte address inside the array to its element and segment.
  pub fn offset_at(&self, address: usize) -> ArrayOffset {
    let offset = address - self.start;
    let element_index = offset / self.element_length;
    let mut segment_offset = offset % self.element_length;
    let mut segment_index = 0;
    while segment_offset >= self.segments[segment_index].length {
      segment_offset -= self.segments[segment_index].length;
      segment_index += 1;
    }
    ArrayOffset {
      element_index,
      segment_index,
      segment_start: address - segment_offset,
      segment_offset,
    }
  }

  /// Decodes the segment covering `address` into a typed value.
  ///
  /// Read-only with respect to the store; the only mutable state is the
  /// run-local string cache.
  ///
  /// # Panics
  ///
  /// Panics if the segment's content type is not decodable; that state is
  /// unreachable for runs built by [`ArrayRun::parse`].
  pub fn decode(&self, store: &ByteStore, address: usize) -> Value {
    let offset = self.offset_at(address);
    let segment = &self.segments[offset.segment_index];
    match segment.ty {
      SegmentType::Text => {
        let mut cache = self.cache.borrow_mut();
        let stale = match cache.as_ref() {
          Some(entry) => {
            entry.segment_start != offset.segment_start
              || entry.segment_offset > offset.segment_offset
          }
          None => true,
        };
        if stale {
          *cache = Some(TextCache {
            segment_start: offset.segment_start,
            segment_offset: offset.segment_offset,
            text: text::decode(store.bytes(), offset.segment_start, segment.length)
              .unwrap_or_default(),
          });
        }
        Value::Text {
          start: offset.segment_start,
          text: cache.as_ref().unwrap().text.clone(),
        }
      }
      SegmentType::Integer => Value::Integer {
        value: read_integer(store.bytes(), offset.segment_start, segment.length),
        start: offset.segment_start,
        length: segment.length,
      },
      SegmentType::Unknown => panic!(
        "array segment '{}' has an undecodable content type",
        segment.name
      ),
    }
  }
}

fn count_from_anchor(store: &ByteStore, name: &str) -> usize {
  let address = match store.address_of_anchor(name) {
    Some(address) => address,
    // The name may simply not be defined yet; treat as empty for now.
    None => return 0,
  };
  match store.get_next_run(address) {
    Some(Run::Array(array)) if array.start() == address => array.element_count(),
    _ => 0,
  }
}

fn infer_count(
  store: &ByteStore,
  start: usize,
  segments: &[Segment],
  element_length: usize,
) -> usize {
  let boundary = inference_boundary(store, start);
  let mut consumed = 0;
  let mut count = 0;
  while start + consumed + element_length <= boundary
    && element_matches(store, start + consumed, segments)
  {
    consumed += element_length;
    count += 1;
  }
  count
}

// The next claimed address after `start`, skipping anonymous placeholder
// runs, which don't constrain inference.
fn inference_boundary(store: &ByteStore, start: usize) -> usize {
  let mut address = start;
  loop {
    match store.get_next_run(address) {
      Some(Run::NoInfo(run)) => address = run.start + 1,
      Some(run) => return run.start(),
      None => return usize::MAX,
    }
  }
}

fn element_matches(store: &ByteStore, mut start: usize, segments: &[Segment]) -> bool {
  for segment in segments {
    if start + segment.length > store.len() {
      return false;
    }
    if !segment_matches(store, start, segment, segments.len() == 1) {
      return false;
    }
    start += segment.length;
  }
  true
}

fn segment_matches(
  store: &ByteStore,
  start: usize,
  segment: &Segment,
  single_segment: bool,
) -> bool {
  let data = store.bytes();
  match segment.ty {
    SegmentType::Integer => true,
    SegmentType::Text => {
      let read = match text::read_string(data, start, true, segment.length) {
        Some(read) => read,
        None => return false,
      };
      if read > segment.length {
        return false;
      }
      // A field of nothing but 0xFF is deleted data, not a string.
      if data[start..start + segment.length].iter().all(|&b| b == 0xFF) {
        return false;
      }
      // Everything after the terminator must be padding.
      if !data[start + read..start + segment.length]
        .iter()
        .all(|&b| b == text::PAD || b == text::TERMINATOR)
      {
        return false;
      }
      // A lone string segment followed by a pad byte would greedily match
      // the tail of a longer string field; reject it.
      if single_segment
        && store.len() > start + segment.length
        && data[start + segment.length] == text::PAD
      {
        return false;
      }
      true
    }
    SegmentType::Unknown => panic!(
      "array segment '{}' has an unmatchable content type",
      segment.name
    ),
  }
}
