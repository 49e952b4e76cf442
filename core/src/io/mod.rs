//! External collaborators of the scheduling engine: the batch reader over
//! the input file and the result collector.

pub mod collector;
pub mod reader;

pub use collector::Collector;
pub use reader::{LineFileSource, Reader, RecordSource, parse_record};
