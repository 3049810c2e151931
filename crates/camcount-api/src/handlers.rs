//! Request handlers.

pub mod health;
pub mod manifest;

pub use health::*;
pub use manifest::*;
