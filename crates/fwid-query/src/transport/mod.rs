//! Bus collaborators used by the scheduler
//!
//! The scheduler never touches CAN frames. It hands address lists and
//! request patterns to a [`FwQueryTransport`], and candidate addresses to a
//! [`PresenceProbe`]. Framing, segmentation and response collection live
//! behind those traits.
//!
//! - [`SimulatedBus`] answers both from a list of simulated ECUs, for demos
//!   and tests

mod adapter;
pub mod error;
pub mod simulated;

pub use adapter::{FirmwareQuery, FirmwareResponses, FwQueryTransport, PresenceProbe};
pub use error::TransportError;
pub use simulated::{SimulatedBus, SimulatedEcu};

#[cfg(test)]
pub use adapter::{MockFwQueryTransport, MockPresenceProbe};
