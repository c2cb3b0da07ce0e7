pub mod api;

pub use api::{ChatRequest, StreamEvent, KNOWN_EVENT_TYPES};
