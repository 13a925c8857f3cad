//! Message handling - Parsing of inbound text

pub mod parser;

pub use parser::{MessageParser, ParsedInput};
