//! Core types and constants shared by the geolocation components

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
