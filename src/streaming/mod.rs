//! Generation backend client and stream decoding

pub mod client;
pub mod parser;

pub use client::{collect_stream, ClientTimeouts, FragmentStream, OllamaClient};
pub use parser::{decode_fragment, LineDecoder, StreamFragment};
