//! Collaborator-facing API
//!
//! Input DTOs, JSON shaping with structured error objects, and a blocking
//! facade that can be shared between request-handling threads.

pub mod blocking;
pub mod types;
pub mod formatting;

pub use blocking::GeoLocationApi;
pub use types::{ChangeResponse, ObservationInput, ReferenceInput, ServiceState};
pub use formatting::{change_result, position_result, ErrorResult};
