//! Application-level orchestration.
//!
//! Owns the tick loop and the handling of operator commands. The console and
//! output layers only talk to this module through channels.

mod commands;
mod controller;

pub(crate) use controller::{run_controller, SystemController, UiCommand};
