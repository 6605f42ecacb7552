//! rommap, a semantic annotation tool for GBA images.

#![deny(missing_docs)]
#![deny(unused)]
#![deny(warnings)]
#![deny(unsafe_code)]

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;

use structopt::StructOpt;

use rommap::delta::Delta;
use rommap::format::ArrayRun;
use rommap::format::FormatError;
use rommap::meta::Metadata;
use rommap::store::ByteStore;

#[derive(StructOpt)]
#[structopt(name = "rommap", about = "Annotates the structures inside a GBA image.")]
enum Command {
  /// Scans an image for pointers and lists the anchors they create.
  Scan {
    /// The image to scan.
    image: PathBuf,
  },
  /// Searches an image for the longest table matching a format.
  Search {
    /// The image to search.
    image: PathBuf,
    /// An element format, e.g. `[name""10type.]`.
    format: String,
  },
  /// Prints an image's metadata sidecar, optionally applying one first.
  Meta {
    /// The image to describe.
    image: PathBuf,
    /// A json5 sidecar whose anchors are applied before printing.
    #[structopt(long)]
    apply: Option<PathBuf>,
  },
}

enum Error {
  Io(io::Error),
  Format(FormatError),
  Meta(json5::Error),
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Error::Io(e) => write!(f, "{}", e),
      Error::Format(e) => write!(f, "{}", e),
      Error::Meta(e) => write!(f, "{}", e),
    }
  }
}

impl From<io::Error> for Error {
  fn from(e: io::Error) -> Error {
    Error::Io(e)
  }
}

impl From<FormatError> for Error {
  fn from(e: FormatError) -> Error {
    Error::Format(e)
  }
}

impl From<json5::Error> for Error {
  fn from(e: json5::Error) -> Error {
    Error::Meta(e)
  }
}

fn main() {
  if let Err(error) = run(Command::from_args()) {
    eprintln!("error: {}", error);
    process::exit(1);
  }
}

fn run(command: Command) -> Result<(), Error> {
  match command {
    Command::Scan { image } => {
      let store = ByteStore::with_pointers(fs::read(image)?);
      for run in store.runs() {
        if let Some(sources) = run.pointer_sources() {
          println!(
            "{:#010x}: {} source(s){}",
            run.start(),
            sources.len(),
            match run.format_string().as_str() {
              "" => String::new(),
              format => format!(", {}", format),
            }
          );
        }
      }
    }
    Command::Search { image, format } => {
      let store = ByteStore::with_pointers(fs::read(image)?);
      match ArrayRun::search(&store, &format)? {
        Some(found) => println!(
          "{:#010x}: {} ({} elements)",
          found.start(),
          found.format_string(),
          found.element_count()
        ),
        None => println!("no table matches {}", format),
      }
    }
    Command::Meta { image, apply } => {
      let mut store = ByteStore::with_pointers(fs::read(image)?);
      let mut token = Delta::new();
      if let Some(sidecar) = apply {
        let metadata = Metadata::parse(&fs::read_to_string(sidecar)?)?;
        metadata.apply(&mut store, &mut token)?;
      }
      println!("{}", Metadata::collect(&store).render()?);
    }
  }
  Ok(())
}
