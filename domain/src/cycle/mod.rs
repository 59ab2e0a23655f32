//! Cycle identity and the dates a cycle covers

mod dates;
mod id;

pub use dates::{CycleWindow, DateLabel};
pub use id::CycleId;
