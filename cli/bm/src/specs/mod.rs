//! Parsers for the compact value grammars accepted on the command line.

pub mod disc;
pub mod size;

pub use disc::{parse_disc_spec, DiscSpec, DiscSpecError};
pub use size::{parse_size, SizeSpecError};
