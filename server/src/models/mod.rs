//! FHIR R4 wire types.

pub mod bundle;
pub mod datatypes;
pub mod outcome;
pub mod resources;

pub use bundle::*;
pub use datatypes::*;
pub use outcome::*;
pub use resources::*;
