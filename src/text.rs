//! The fixed-width text encoding used by Game Freak's GBA titles.
//!
//! Strings in the ROM are sequences of single-byte glyph codes, closed by a
//! `0xFF` terminator. `0xFD` is an escape: the byte after it is interpreted
//! raw. Decoded strings are rendered with a leading `"` and the terminator
//! renders as a closing `"`, so a decoded value reads like a string literal.

use lazy_static::lazy_static;

/// The end-of-string byte.
pub const TERMINATOR: u8 = 0xFF;

/// The escape byte; the byte following it is interpreted raw.
pub const ESCAPE: u8 = 0xFD;

/// The padding byte used to fill fixed-width fields after the terminator.
pub const PAD: u8 = 0x00;

lazy_static! {
  static ref GLYPHS: [Option<&'static str>; 0x100] = build_table();
}

fn build_table() -> [Option<&'static str>; 0x100] {
  let mut table = [None; 0x100];
  table[0x00] = Some(" ");

  table[0x1B] = Some("é");
  table[0x2D] = Some("&");

  fill(&mut table, 0x53, "\\pk \\mn \\Po \\Ke \\Bl \\Lo \\Ck");
  fill(&mut table, 0x5B, "%()");
  fill(&mut table, 0xA1, "0123456789");
  // \. is an ellipsis; \qo and \qc are open/close quotes; \sm and \sf are
  // the male/female symbols.
  fill(&mut table, 0xAB, "! ? . - ‧ \\. \\qo \\qc ‘ ' \\sm \\sf $ , * /");
  fill(&mut table, 0xBB, "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
  fill(&mut table, 0xD5, "abcdefghijklmnopqrstuvwxyz");

  table[0xF0] = Some(":");
  table[0xF9] = Some("\\9");
  table[0xFA] = Some("\\l");
  table[0xFB] = Some("\\pn");
  table[0xFC] = Some("\\CC");
  table[0xFD] = Some("\\\\");
  table[0xFE] = Some("\\n");
  table[0xFF] = Some("\"");

  table
}

fn fill(table: &mut [Option<&'static str>; 0x100], start: usize, glyphs: &'static str) {
  if glyphs.contains(' ') {
    for (i, part) in glyphs.split(' ').enumerate() {
      table[start + i] = Some(part);
    }
  } else {
    let mut index = start;
    let mut rest = glyphs;
    while !rest.is_empty() {
      let len = rest.chars().next().unwrap().len_utf8();
      table[index] = Some(&rest[..len]);
      index += 1;
      rest = &rest[len..];
    }
  }
}

/// Decodes `length` bytes starting at `start` into displayable text.
///
/// Every byte in the window is rendered, including padding after the
/// terminator. Returns `None` if any byte has no glyph assigned.
pub fn decode(data: &[u8], start: usize, length: usize) -> Option<String> {
  let mut result = String::from("\"");
  let mut i = 0;
  while i < length {
    let byte = *data.get(start + i)?;
    result.push_str(GLYPHS[byte as usize]?);
    if byte == ESCAPE {
      result.push_str(&format!("{:02X}", *data.get(start + i + 1)?));
      i += 1;
    }
    i += 1;
  }
  Some(result)
}

/// Encodes `input` back into glyph codes.
///
/// A leading `"` is skipped, unrecognized characters are dropped, and the
/// result always ends with the terminator byte.
pub fn encode(input: &str) -> Vec<u8> {
  let mut rest = input.strip_prefix('"').unwrap_or(input);
  let mut result = Vec::new();

  while !rest.is_empty() {
    let mut matched = false;
    for byte in 0..0x100usize {
      let glyph = match GLYPHS[byte] {
        Some(glyph) => glyph,
        None => continue,
      };
      if !rest.starts_with(glyph) {
        continue;
      }
      result.push(byte as u8);
      rest = &rest[glyph.len()..];
      if byte == ESCAPE as usize && rest.len() >= 2 {
        if let Ok(raw) = u8::from_str_radix(&rest[..2], 16) {
          result.push(raw);
          rest = &rest[2..];
        }
      }
      matched = true;
      break;
    }
    if !matched {
      // Skip past anything we can't encode, such as literal newlines.
      let len = rest.chars().next().unwrap().len_utf8();
      rest = &rest[len..];
    }
  }

  if result.last() != Some(&TERMINATOR) {
    result.push(TERMINATOR);
  }
  result
}

/// Measures the encoded string starting at `start`.
///
/// Returns the total byte length including the terminator, or `None` if the
/// bytes do not form a string within `max_length` bytes. When
/// `allow_repeats` is false, more than three identical bytes in a row
/// disqualify the data; real text rarely repeats, so this cuts down on
/// false positives when scanning.
pub fn read_string(
  data: &[u8],
  start: usize,
  allow_repeats: bool,
  max_length: usize,
) -> Option<usize> {
  let mut recent = *data.get(start)?;
  let mut count = 0;
  let mut length = 0;

  while start + length < data.len() && length <= max_length {
    let byte = data[start + length];
    if byte == recent {
      count += 1;
    } else {
      count = 1;
      recent = byte;
    }
    if count > 3 && !allow_repeats {
      return None;
    }
    if GLYPHS[recent as usize].is_none() {
      return None;
    }
    if byte == TERMINATOR {
      return Some(length + 1);
    }
    if byte == ESCAPE {
      length += 1;
    }
    length += 1;
  }

  None
}
