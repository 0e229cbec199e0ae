//! Track scheduling and pose mixing for skeletal animation rigs.
//!
//! The crate owns no loader or renderer. Setup data is built in code (or, with the `json` feature,
//! mix tables are read from JSON) and poses are written into a plain [`Skeleton`].

#![forbid(unsafe_code)]

mod error;
mod model;
mod runtime;

#[cfg(feature = "json")]
pub mod json;

pub use error::*;
pub use model::*;
pub use runtime::*;
