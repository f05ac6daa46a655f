// SPDX-License-Identifier: GPL-3.0-or-later

//! Input grab arbitration for a display server.
//!
//! Decides, for every raw input event, which client receives it: the owner of an active
//! grab, the client whose passive grab the event activates, the claimants of a touch or
//! gesture sequence, or nobody in particular so that normal focus delivery applies.
//! Devices can be frozen by synchronous grabs until their owner allows events again.
//!
//! [`state::Arbiter`] is the entry point.

pub mod cli;
pub mod config;
pub mod device;
pub mod freeze;
pub mod grab;
pub mod input;
pub mod script;
pub mod state;
pub mod touch;
