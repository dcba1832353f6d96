//! Schemaless data shared by front matter, templates and island props.

mod value;

pub use value::{Data, DataMap};
