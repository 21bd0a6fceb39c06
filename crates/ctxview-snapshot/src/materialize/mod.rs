//! Renderings of a finished snapshot. None of these touch the target VM.

pub mod display;
pub mod json;
pub mod path;
pub mod schema;

pub use display::{display_tree, DisplayNode};
pub use json::{circular_marker, to_json, to_pretty_json};
pub use path::{dotted_path, parse_selection};
pub use schema::{SchemaGenerator, SchemaOptions};
