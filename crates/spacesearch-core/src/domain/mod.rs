//! Domain Layer
//!
//! - Identity: storage/space/opaque resource ids and references
//! - Resource: the document shape both backends index
//! - Path: normalized in-space paths and subtree arithmetic
//! - Search: request, match and response types

pub mod errors;
pub mod identity;
pub mod path;
pub mod resource;
pub mod search;

pub use errors::*;
pub use identity::*;
pub use path::*;
pub use resource::*;
pub use search::*;
