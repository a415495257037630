//! Opaque session tokens and their redacting wrapper.

pub mod pair;
pub mod secret;
