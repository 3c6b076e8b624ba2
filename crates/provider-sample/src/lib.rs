//! # Provider Sample
//!
//! Two resource types driven through `provider-framework` against a simulated control
//! plane. Exposed as a library so the integration tests can drive it.

pub mod clients;
pub mod control_plane;
pub mod lifecycle;
pub mod model;
