//! FHIR interactions on top of the record store.

pub mod everything;
pub mod render;
pub mod resources;
pub mod search;
pub mod writes;

pub use render::render;
