//! The format-string parser.

use std::fmt;

use pest::error::Error as PestError;
use pest::error::InputLocation;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "format/grammar.pest"]
struct PegParser;

/// One typed sub-field of an array element.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Segment {
  /// The field name; always non-empty.
  pub name: String,
  /// How the field's bytes are interpreted.
  pub ty: SegmentType,
  /// The field width in bytes.
  pub length: usize,
}

/// The interpretation of a segment's bytes.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SegmentType {
  /// Not yet determined; decoding one of these is a bug.
  Unknown,
  /// A fixed-width encoded string (see [`crate::text`]).
  Text,
  /// A little-endian unsigned integer.
  Integer,
}

/// The trailing length specification of a format string.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LengthSpec {
  /// No length given; probe the data to count elements.
  Infer,
  /// A literal element count.
  Literal(usize),
  /// Mirror the element count of the array anchored at this name.
  Anchor(String),
}

/// A format-string parsing error.
#[derive(Clone, Debug)]
pub struct FormatError {
  /// The text that failed to parse.
  pub text: String,
  /// What went wrong.
  pub kind: ErrorKind,
}

/// The kinds of [`FormatError`].
#[derive(Clone, Debug)]
pub enum ErrorKind {
  /// The grammar rejected the text.
  Grammar(PestError<Rule>),
  /// A string field declared a width of zero bytes.
  EmptyTextField,
  /// A literal element count would run past the end of the data.
  OutOfBounds,
  /// The text does not name a known run format at all.
  UnknownFormat,
}

impl FormatError {
  pub(crate) fn new(text: &str, kind: ErrorKind) -> Self {
    FormatError {
      text: text.to_string(),
      kind,
    }
  }

  /// The substring at which parsing failed, for error reporting.
  pub fn offending(&self) -> &str {
    match &self.kind {
      ErrorKind::Grammar(err) => {
        let pos = match err.location {
          InputLocation::Pos(pos) => pos,
          InputLocation::Span((pos, _)) => pos,
        };
        &self.text[pos.min(self.text.len())..]
      }
      _ => &self.text,
    }
  }
}

impl fmt::Display for FormatError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match &self.kind {
      ErrorKind::Grammar(_) => {
        write!(f, "could not parse format at '{}'", self.offending())
      }
      ErrorKind::EmptyTextField => {
        write!(f, "string field must be at least one byte in '{}'", self.text)
      }
      ErrorKind::OutOfBounds => {
        write!(f, "'{}' runs past the end of the data", self.text)
      }
      ErrorKind::UnknownFormat => {
        write!(f, "'{}' is not a recognized format", self.text)
      }
    }
  }
}

/// Parses the body of an array format string into its segment list and
/// length specification.
pub fn parse_format(input: &str) -> Result<(Vec<Segment>, LengthSpec), FormatError> {
  use pest::Parser;
  let mut pairs = PegParser::parse(Rule::format, input)
    .map_err(|err| FormatError::new(input, ErrorKind::Grammar(err)))?;

  let mut segments = Vec::new();
  let mut length = LengthSpec::Infer;

  for pair in pairs.next().unwrap().into_inner() {
    match pair.as_rule() {
      Rule::segment => {
        let mut inner = pair.into_inner();
        let name = inner.next().unwrap().as_str().to_string();
        let marker = inner.next().unwrap().into_inner().next().unwrap();
        let (ty, byte_length) = match marker.as_rule() {
          Rule::text => {
            let digits = marker.into_inner().next().unwrap().as_str();
            let width: usize = digits
              .parse()
              .map_err(|_| FormatError::new(input, ErrorKind::EmptyTextField))?;
            if width == 0 {
              return Err(FormatError::new(input, ErrorKind::EmptyTextField));
            }
            (SegmentType::Text, width)
          }
          Rule::int4 => (SegmentType::Integer, 4),
          Rule::int3 => (SegmentType::Integer, 3),
          Rule::int2 => (SegmentType::Integer, 2),
          Rule::int1 => (SegmentType::Integer, 1),
          _ => unreachable!(),
        };
        segments.push(Segment {
          name,
          ty,
          length: byte_length,
        });
      }
      Rule::length => {
        let spec = pair.as_str();
        length = match spec.parse::<usize>() {
          Ok(count) => LengthSpec::Literal(count),
          Err(_) => LengthSpec::Anchor(spec.to_string()),
        };
      }
      Rule::EOI => {}
      _ => unreachable!(),
    }
  }

  Ok((segments, length))
}
