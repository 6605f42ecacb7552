//! The array format mini-language and the runs built from it.
//!
//! A format string like `[name""10val:]5` describes a table of repeating
//! elements: named segments inside the brackets, an optional element
//! count after them. [`ArrayRun`] places the parsed segments over the
//! data.

pub mod array;

mod parse;

pub use array::ArrayOffset;
pub use array::ArrayRun;
pub use parse::ErrorKind;
pub use parse::FormatError;
pub use parse::LengthSpec;
pub use parse::Segment;
pub use parse::SegmentType;
