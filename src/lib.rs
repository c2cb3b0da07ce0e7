//! Streaming chat client core: an SSE event decoder, a content block
//! assembler, the message lifecycle controller, and slash-command triggers.

pub mod api;
pub mod config;
pub mod logging;
pub mod runtime;
pub mod state;
pub mod triggers;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;
