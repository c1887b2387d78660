//! Model Response Validation
//!
//! JSON extraction and repair for raw model output. Typed validation of the
//! repaired value happens in `ai::structured`.

mod json_repair;

pub use json_repair::{JsonRepairer, extract_json_from_response};
