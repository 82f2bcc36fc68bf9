//! Command implementations for fwid

pub mod identify;
pub mod list;
pub mod scan;

pub use identify::identify;
pub use list::{brands, models};
pub use scan::scan;
