//! Common types shared by the admin client crates and services

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
