#![forbid(unsafe_code)]

//! livebus walkthrough.
//!
//! Two "screens" (lifecycles) share named channels through a [`BusHub`]
//! (`livebus_runtime::BusHub`). The walkthrough shows liveness gating,
//! sticky replay on activation, removal when a screen is destroyed, and a
//! background thread whose publishes collapse into one delivery.

pub mod cli;
pub mod walkthrough;
