//! The GBA's stock LZ77 compression, plus the palette and sprite runs that
//! wrap it.
//!
//! A compressed stream starts with a four-byte header: the magic byte `0x10`
//! followed by the decompressed length as a 24-bit little-endian integer.
//! The payload is organized in groups of eight tokens, each group prefixed
//! by a bitfield byte read msb-first: a clear bit means the token is one
//! literal byte, a set bit means a two-byte back-reference encoding
//! `runLength = (b0 >> 4) + 3` and `runOffset = (((b0 & 0xF) << 8) | b1) + 1`.
//!
//! Some streams found in shipped ROMs declare a length that doesn't quite
//! match their payload. Passing `lenient = true` accepts those streams,
//! logging the mismatch instead of rejecting it.

use crate::delta::Delta;
use crate::run::Run;
use crate::store::ByteStore;

/// The header magic byte.
pub const MAGIC: u8 = 0x10;

/// Reads a stream header, returning the decompressed length.
fn read_header(data: &[u8], start: usize) -> Option<usize> {
  if start + 4 > data.len() || data[start] != MAGIC {
    return None;
  }
  let length = data[start + 1] as usize
    | (data[start + 2] as usize) << 8
    | (data[start + 3] as usize) << 16;
  if length == 0 {
    return None;
  }
  Some(length)
}

fn read_token(data: &[u8], start: usize) -> (usize, usize) {
  let byte1 = data[start] as usize;
  let byte2 = data[start + 1] as usize;
  let run_length = (byte1 >> 4) + 3;
  let run_offset = ((byte1 & 0xF) << 8 | byte2) + 1;
  (run_length, run_offset)
}

/// Measures the compressed stream starting at `start`, returning its byte
/// length, or `None` if the bytes are not a valid stream.
pub fn compressed_size(data: &[u8], start: usize, lenient: bool) -> Option<usize> {
  let initial = start;
  let length = read_header(data, start)?;
  let mut start = start + 4;
  let mut index = 0;

  while index < length && start < data.len() {
    let mut bitfield = data[start];
    start += 1;
    for _ in 0..8 {
      if index > length {
        if !lenient {
          return None;
        }
        log::warn!("lz stream at {:#x} overruns its declared length", initial);
        return Some(start - initial);
      }
      if index == length {
        if bitfield != 0 && !lenient {
          return None;
        }
        return Some(start - initial);
      }
      let compressed = bitfield & 0x80 != 0;
      bitfield <<= 1;
      if !compressed {
        index += 1;
        start += 1;
      } else {
        if start + 2 > data.len() {
          return None;
        }
        let (run_length, run_offset) = read_token(data, start);
        start += 2;
        if run_offset > index {
          return None;
        }
        index += run_length;
      }
    }
  }

  if index >= length && start <= data.len() {
    if index > length {
      if !lenient {
        return None;
      }
      log::warn!("lz stream at {:#x} overruns its declared length", initial);
    }
    Some(start - initial)
  } else {
    None
  }
}

/// Decompresses the stream starting at `start`.
///
/// Returns `None` for corrupt or truncated data; with `lenient` set, a
/// stream whose payload disagrees with its declared length is decoded
/// anyway, truncated or zero-padded to the declared length.
pub fn decompress(data: &[u8], start: usize, lenient: bool) -> Option<Vec<u8>> {
  let initial = start;
  let length = read_header(data, start)?;
  let mut start = start + 4;
  let mut index = 0;
  let mut result = vec![0u8; length];

  while index < length {
    if start >= data.len() {
      return None;
    }
    let mut bitfield = data[start];
    start += 1;
    for _ in 0..8 {
      if index == length {
        if bitfield != 0 && !lenient {
          return None;
        }
        return Some(result);
      }
      if start >= data.len() {
        return None;
      }
      let compressed = bitfield & 0x80 != 0;
      bitfield <<= 1;
      if !compressed {
        result[index] = data[start];
        index += 1;
        start += 1;
      } else {
        if start + 2 > data.len() {
          return None;
        }
        let (mut run_length, run_offset) = read_token(data, start);
        start += 2;
        if run_offset > index {
          return None;
        }
        if index + run_length > length {
          if !lenient {
            return None;
          }
          log::warn!("lz stream at {:#x} overruns its declared length", initial);
          run_length = length - index;
        }
        for j in 0..run_length {
          result[index + j] = result[index + j - run_offset];
        }
        index += run_length;
      }
    }
  }

  Some(result)
}

enum Token {
  Raw(u8),
  Back { length: usize, offset: usize },
}

impl Token {
  fn compression_bit(&self, slot: usize) -> u8 {
    match self {
      Token::Raw(_) => 0,
      Token::Back { .. } => 1 << (7 - slot),
    }
  }

  fn render(&self, out: &mut Vec<u8>) {
    match self {
      Token::Raw(value) => out.push(*value),
      Token::Back { length, offset } => {
        let offset = offset - 1;
        let length = length - 3;
        out.push((length << 4 | offset >> 8) as u8);
        out.push(offset as u8);
      }
    }
  }
}

/// Compresses `data` into a fresh stream.
///
/// `decompress(compress(x)) == x` holds for every non-empty input; an
/// empty buffer encodes to a header `decompress` rejects, and no run
/// ever expands to zero bytes.
pub fn compress(data: &[u8]) -> Vec<u8> {
  let mut tokens = Vec::new();
  let mut index = 0;
  while index < data.len() {
    let (run_length, run_offset) = find_longest_match(data, index);
    if run_length < 3 {
      tokens.push(Token::Raw(data[index]));
      index += 1;
    } else {
      tokens.push(Token::Back {
        length: run_length,
        offset: run_offset,
      });
      index += run_length;
    }
  }

  let mut result = vec![
    MAGIC,
    data.len() as u8,
    (data.len() >> 8) as u8,
    (data.len() >> 16) as u8,
  ];
  for (i, token) in tokens.iter().enumerate() {
    if i % 8 == 0 {
      let mut bitfield = 0;
      for (j, token) in tokens[i..].iter().take(8).enumerate() {
        bitfield |= token.compression_bit(j);
      }
      result.push(bitfield);
    }
    token.render(&mut result);
  }

  result
}

fn find_longest_match(data: &[u8], start: usize) -> (usize, usize) {
  let mut best_length = 2;
  let mut best_offset = 0;
  for run_offset in 1..=0x1000usize.min(start) {
    let mut run_length = 0;
    while start + run_length < data.len()
      && run_length < 18
      && data[start - run_offset + run_length] == data[start + run_length]
    {
      run_length += 1;
    }
    if run_length > best_length {
      best_length = run_length;
      best_offset = run_offset;
    }
  }
  (best_length, best_offset)
}

/// The shape of a compressed palette: `bits` per pixel, so one page holds
/// `2^bits` colors of two bytes each.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PaletteFormat {
  /// Bits per pixel; 4 for a 16-color palette, 8 for a 256-color one.
  pub bits: u32,
}

impl PaletteFormat {
  /// The number of expanded bytes in one palette page.
  pub fn page_size(self) -> usize {
    2 * (1 << self.bits)
  }

  /// Parses a format signature such as `` `lzp4` ``.
  pub fn parse(format: &str) -> Option<PaletteFormat> {
    let inner = format.strip_prefix("`lzp")?.strip_suffix('`')?;
    let bits = inner.parse().ok()?;
    Some(PaletteFormat { bits })
  }
}

/// A compressed palette run.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PaletteRun {
  /// The address of the stream header.
  pub start: usize,
  /// Addresses of pointers into this run, if any are known.
  pub sources: Option<Vec<usize>>,
  /// The palette shape.
  pub format: PaletteFormat,
  length: usize,
}

impl PaletteRun {
  /// Reads the stream at `start` and claims it as a palette, or returns
  /// `None` if the data there is not a stream holding at least one page.
  pub fn parse(
    store: &ByteStore,
    start: usize,
    format: PaletteFormat,
    sources: Option<Vec<usize>>,
  ) -> Option<PaletteRun> {
    let length = compressed_size(store.bytes(), start, false)?;
    let expanded = read_header(store.bytes(), start)?;
    if format.page_size() > expanded {
      return None;
    }
    Some(PaletteRun {
      start,
      sources,
      format,
      length,
    })
  }

  /// Returns a copy of this run at a different start address.
  pub fn at(&self, start: usize) -> PaletteRun {
    PaletteRun {
      start,
      ..self.clone()
    }
  }

  /// Returns a copy of this run with different pointer sources.
  pub fn with_sources(&self, sources: Option<Vec<usize>>) -> PaletteRun {
    PaletteRun {
      sources,
      ..self.clone()
    }
  }

  /// The compressed length of this run in the store.
  pub fn len(&self) -> usize {
    self.length
  }

  /// The number of whole pages in the expanded data.
  pub fn pages(&self, store: &ByteStore) -> usize {
    match read_header(store.bytes(), self.start) {
      Some(expanded) => expanded / self.format.page_size(),
      None => 0,
    }
  }

  /// Decompresses and extracts one page of 15-bit colors.
  pub fn palette(&self, store: &ByteStore, page: usize) -> Option<Vec<u16>> {
    let data = decompress(store.bytes(), self.start, false)?;
    let pages = data.len() / self.format.page_size();
    if pages == 0 {
      return None;
    }
    let offset = (page % pages) * self.format.page_size();
    let colors = (0..1 << self.format.bits)
      .map(|i| {
        let at = offset + i * 2;
        data[at] as u16 | (data[at + 1] as u16) << 8
      })
      .collect();
    Some(colors)
  }

  /// The format signature, e.g. `` `lzp4` ``.
  pub fn format_string(&self) -> String {
    format!("`lzp{}`", self.format.bits)
  }
}

/// The shape of a compressed sprite: bits per pixel plus tile dimensions,
/// so one page holds `width * height` 8x8 tiles.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SpriteFormat {
  /// Bits per pixel.
  pub bits: u32,
  /// Page width, in tiles.
  pub width: usize,
  /// Page height, in tiles.
  pub height: usize,
}

impl SpriteFormat {
  /// The number of expanded bytes in one sprite page. An 8x8 tile occupies
  /// `8 * bits` bytes.
  pub fn page_size(self) -> usize {
    self.width * self.height * 8 * self.bits as usize
  }

  /// Parses a format signature such as `` `lzs4x2x2` ``.
  pub fn parse(format: &str) -> Option<SpriteFormat> {
    let inner = format.strip_prefix("`lzs")?.strip_suffix('`')?;
    let mut parts = inner.split('x');
    let bits = parts.next()?.parse().ok()?;
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
      return None;
    }
    Some(SpriteFormat {
      bits,
      width,
      height,
    })
  }
}

/// A compressed sprite run.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SpriteRun {
  /// The address of the stream header.
  pub start: usize,
  /// Addresses of pointers into this run, if any are known.
  pub sources: Option<Vec<usize>>,
  /// The sprite shape.
  pub format: SpriteFormat,
  length: usize,
}

impl SpriteRun {
  /// Reads the stream at `start` and claims it as sprite data, or returns
  /// `None` if the data there is not a stream holding at least one page.
  pub fn parse(
    store: &ByteStore,
    start: usize,
    format: SpriteFormat,
    sources: Option<Vec<usize>>,
  ) -> Option<SpriteRun> {
    let length = compressed_size(store.bytes(), start, false)?;
    let expanded = read_header(store.bytes(), start)?;
    if format.page_size() > expanded {
      return None;
    }
    Some(SpriteRun {
      start,
      sources,
      format,
      length,
    })
  }

  /// Returns a copy of this run at a different start address.
  pub fn at(&self, start: usize) -> SpriteRun {
    SpriteRun {
      start,
      ..self.clone()
    }
  }

  /// Returns a copy of this run with different pointer sources.
  pub fn with_sources(&self, sources: Option<Vec<usize>>) -> SpriteRun {
    SpriteRun {
      sources,
      ..self.clone()
    }
  }

  /// The compressed length of this run in the store.
  pub fn len(&self) -> usize {
    self.length
  }

  /// The number of whole pages in the expanded data.
  pub fn pages(&self, store: &ByteStore) -> usize {
    match read_header(store.bytes(), self.start) {
      Some(expanded) => expanded / self.format.page_size(),
      None => 0,
    }
  }

  /// Decompresses and extracts one page of tile data.
  pub fn page(&self, store: &ByteStore, page: usize) -> Option<Vec<u8>> {
    let data = decompress(store.bytes(), self.start, false)?;
    let pages = data.len() / self.format.page_size();
    if pages == 0 {
      return None;
    }
    let offset = (page % pages) * self.format.page_size();
    Some(data[offset..offset + self.format.page_size()].to_vec())
  }

  /// The format signature, e.g. `` `lzs4x2x2` ``.
  pub fn format_string(&self) -> String {
    let SpriteFormat { bits, width, height } = self.format;
    format!("`lzs{}x{}x{}`", bits, width, height)
  }
}

/// Re-encodes a compressed run with new expanded contents.
///
/// If the new stream is larger than the space the run occupies, the run is
/// relocated to free space first; trailing bytes at the old location are
/// cleared to `0xFF` so stale stream data can't be misread. Returns the
/// replacement run, already written into the store's run index.
pub fn write_expanded(
  store: &mut ByteStore,
  token: &mut Delta,
  run: &Run,
  expanded: &[u8],
) -> Run {
  let encoded = compress(expanded);
  let run = store.relocate_for_expansion(token, run, encoded.len());
  let start = run.start();
  let old_length = run.len();

  for (i, &byte) in encoded.iter().enumerate() {
    token.change_data(store, start + i, byte);
  }
  for i in encoded.len()..old_length {
    token.change_data(store, start + i, 0xFF);
  }

  let replacement = match &run {
    Run::Palette(palette) => Run::Palette(PaletteRun {
      start,
      sources: palette.sources.clone(),
      format: palette.format,
      length: encoded.len(),
    }),
    Run::Sprite(sprite) => Run::Sprite(SpriteRun {
      start,
      sources: sprite.sources.clone(),
      format: sprite.format,
      length: encoded.len(),
    }),
    _ => panic!("write_expanded only applies to compressed runs"),
  };
  store.observe_run_written(token, replacement.clone());
  replacement
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn round_trip_simple() {
    let data: Vec<u8> = (0..64u8).collect();
    let packed = compress(&data);
    assert_eq!(decompress(&packed, 0, false), Some(data));
  }

  #[test]
  fn round_trip_repetitive() {
    let mut data = vec![0u8; 256];
    for (i, byte) in data.iter_mut().enumerate() {
      *byte = (i % 7) as u8;
    }
    let packed = compress(&data);
    assert!(packed.len() < data.len());
    assert_eq!(decompress(&packed, 0, false), Some(data));
  }

  #[test]
  fn round_trip_all_same() {
    let data = vec![0xAB; 100];
    let packed = compress(&data);
    assert_eq!(decompress(&packed, 0, false), Some(data));
  }

  #[test]
  fn compressed_size_matches_stream() {
    let data: Vec<u8> = (0..50u8).chain(0..50u8).collect();
    let packed = compress(&data);
    assert_eq!(compressed_size(&packed, 0, false), Some(packed.len()));
  }

  #[test]
  fn rejects_bad_magic() {
    let mut packed = compress(&[1, 2, 3, 4]);
    packed[0] = 0x11;
    assert_eq!(decompress(&packed, 0, false), None);
    assert_eq!(compressed_size(&packed, 0, false), None);
  }

  #[test]
  fn rejects_truncated_stream() {
    let data = vec![7u8; 32];
    let packed = compress(&data);
    assert_eq!(decompress(&packed[..packed.len() - 1], 0, false), None);
  }

  #[test]
  fn strict_rejects_length_mismatch() {
    // Declare a shorter length than the payload provides.
    let data = vec![9u8; 40];
    let mut packed = compress(&data);
    packed[1] = 30;
    assert_eq!(decompress(&packed, 0, false), None);
    assert_eq!(decompress(&packed, 0, true).map(|d| d.len()), Some(30));
  }

  #[test]
  fn token_arithmetic() {
    // length 3, offset 1 encodes as 0x00 0x00.
    assert_eq!(read_token(&[0x00, 0x00], 0), (3, 1));
    // length 18, offset 0x1000 encodes as 0xFF 0xFF.
    assert_eq!(read_token(&[0xFF, 0xFF], 0), (18, 0x1000));
  }

  #[test]
  fn palette_page_math() {
    // A 4-bit palette page holds 16 colors of 2 bytes.
    assert_eq!(PaletteFormat { bits: 4 }.page_size(), 32);
    assert_eq!(PaletteFormat::parse("`lzp4`"), Some(PaletteFormat { bits: 4 }));
    assert_eq!(PaletteFormat::parse("`lzp4"), None);
  }

  #[test]
  fn sprite_format_parsing() {
    let format = SpriteFormat::parse("`lzs4x2x2`").unwrap();
    assert_eq!(format.bits, 4);
    assert_eq!(format.width, 2);
    assert_eq!(format.height, 2);
    assert_eq!(format.page_size(), 128);
    assert_eq!(SpriteFormat::parse("`lzs4x2`"), None);
  }

  // Plants a compressed stream at `start` inside a store of 0xFF filler.
  fn store_with_stream(size: usize, start: usize, expanded: &[u8]) -> ByteStore {
    let mut data = vec![0xFF; size];
    let packed = compress(expanded);
    data[start..start + packed.len()].copy_from_slice(&packed);
    ByteStore::new(data)
  }

  #[test]
  fn palette_runs_count_whole_pages() {
    // Two 4-bit pages: 64 expanded bytes.
    let colors: Vec<u8> = (0..64).collect();
    let store = store_with_stream(0x100, 0x10, &colors);
    let format = PaletteFormat { bits: 4 };
    let run = PaletteRun::parse(&store, 0x10, format, None).unwrap();
    assert_eq!(run.pages(&store), 2);

    let page = run.palette(&store, 1).unwrap();
    assert_eq!(page.len(), 16);
    assert_eq!(page[0], 32 | 33 << 8);
  }

  #[test]
  fn palette_parse_requires_a_whole_page() {
    let store = store_with_stream(0x100, 0x10, &[0u8; 16]);
    let format = PaletteFormat { bits: 4 };
    assert!(PaletteRun::parse(&store, 0x10, format, None).is_none());
  }

  #[test]
  fn sprite_runs_count_whole_pages() {
    // Two one-tile 4-bit pages: 64 expanded bytes.
    let tiles: Vec<u8> = (0..64).collect();
    let store = store_with_stream(0x100, 0x10, &tiles);
    let format = SpriteFormat {
      bits: 4,
      width: 1,
      height: 1,
    };
    let run = SpriteRun::parse(&store, 0x10, format, None).unwrap();
    assert_eq!(run.pages(&store), 2);
    assert_eq!(
      run.len(),
      compressed_size(store.bytes(), 0x10, false).unwrap()
    );

    let page = run.page(&store, 1).unwrap();
    assert_eq!(page.len(), 32);
    assert_eq!(page[0], 32);
    assert_eq!(page[31], 63);
  }

  #[test]
  fn sprite_parse_requires_a_whole_page() {
    let store = store_with_stream(0x100, 0x10, &[0u8; 16]);
    let format = SpriteFormat {
      bits: 4,
      width: 1,
      height: 1,
    };
    assert!(SpriteRun::parse(&store, 0x10, format, None).is_none());
  }

  #[test]
  fn write_expanded_in_place_when_it_fits() {
    let colors = vec![0u8; 64];
    let mut store = store_with_stream(0x100, 0x10, &colors);
    let mut token = Delta::new();
    let format = PaletteFormat { bits: 4 };
    let run = Run::Palette(PaletteRun::parse(&store, 0x10, format, None).unwrap());
    store.observe_run_written(&mut token, run.clone());

    // Same content re-encoded lands in the same spot.
    let replacement = write_expanded(&mut store, &mut token, &run, &colors);
    assert_eq!(replacement.start(), 0x10);
    assert_eq!(
      decompress(store.bytes(), 0x10, false),
      Some(colors)
    );
  }

  #[test]
  fn write_expanded_relocates_when_it_grows() {
    let colors = vec![0u8; 32];
    let mut store = store_with_stream(0x100, 0x10, &colors);
    let mut token = Delta::new();
    let format = PaletteFormat { bits: 4 };
    let run = Run::Palette(PaletteRun::parse(&store, 0x10, format, None).unwrap());
    let old_length = run.len();
    store.observe_run_written(&mut token, run.clone());

    // Incompressible growth forces a move.
    let grown: Vec<u8> = (0..64).collect();
    let replacement = write_expanded(&mut store, &mut token, &run, &grown);
    assert_ne!(replacement.start(), 0x10);
    assert_eq!(
      decompress(store.bytes(), replacement.start(), false),
      Some(grown)
    );
    // The old location was cleared back to filler.
    assert!(store.bytes()[0x10..0x10 + old_length].iter().all(|&b| b == 0xFF));
  }
}
