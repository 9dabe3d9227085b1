//! Admission control for outgoing requests
//!
//! This module bounds how many network operations run at once:
//! - a global ceiling across all destinations
//! - a per-host ceiling for each destination host
//! - a broadcast wakeup gate that re-checks all waiters on every release

mod controller;
mod gate;

pub use controller::{AdmissionController, AdmissionLimits, AdmissionPermit};
