// SPDX-License-Identifier: GPL-3.0-or-later

//! Input events as seen by the arbiter, and the handles they refer to.
//!
//! Nothing in here owns a client, window, or cursor. They are plain handles that
//! the surrounding server resolves; the arbiter only compares them.

use crate::device::DeviceId;

/// A connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u32);

/// A window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u32);

/// A cursor handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
#[serde(transparent)]
pub struct CursorId(pub u32);

/// The id of a touch point or gesture sequence, unique per device while it is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
#[serde(transparent)]
pub struct TouchId(pub u32);

/// Server time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, serde::Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u32);

impl Timestamp {
    /// Stands in for "now" in client requests. Never stale.
    pub const CURRENT_TIME: Timestamp = Timestamp(0);

    pub fn is_current(self) -> bool {
        self == Self::CURRENT_TIME
    }

    /// Whether a client supplied time is older than `reference`.
    ///
    /// [`Timestamp::CURRENT_TIME`] is never older than anything.
    pub fn is_stale_against(self, reference: Timestamp) -> bool {
        !self.is_current() && self < reference
    }
}

bitflags::bitflags! {
    /// The core modifier state attached to every input event.
    ///
    /// A passive grab stores exactly one of these values. The empty mask means
    /// "no modifiers held" and only matches events with no modifiers held.
    #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Default, PartialOrd, Ord)]
    pub struct ModifierMask: u32 {
        /// The shift key
        const SHIFT = 1;
        /// Caps lock
        const LOCK = 1 << 1;
        /// The ctrl key
        const CONTROL = 1 << 2;
        /// Usually alt
        const MOD1 = 1 << 3;
        /// Usually num lock
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        /// Usually super
        const MOD4 = 1 << 6;
        const MOD5 = 1 << 7;
    }
}

impl ModifierMask {
    /// Parses a modifier value from a request.
    ///
    /// Returns `None` if `value` carries bits outside the core modifiers.
    pub fn from_request(value: u32) -> Option<Self> {
        Self::from_bits(value)
    }
}

/// Where a touch point or gesture is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePhase {
    Begin,
    Update,
    End,
}

/// Which family of continuous sequence an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceClass {
    Touch,
    GesturePinch,
    GestureSwipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Button { button: u32, pressed: bool },
    Key { keycode: u32, pressed: bool },
    Motion,
    Enter,
    Leave,
    FocusIn,
    FocusOut,
    Touch { touch_id: TouchId, phase: SequencePhase },
    GesturePinch { touch_id: TouchId, phase: SequencePhase },
    GestureSwipe { touch_id: TouchId, phase: SequencePhase },
}

impl EventKind {
    /// The sequence this event is part of, if it is a touch or gesture event.
    pub fn sequence(&self) -> Option<(SequenceClass, TouchId, SequencePhase)> {
        match *self {
            EventKind::Touch { touch_id, phase } => Some((SequenceClass::Touch, touch_id, phase)),
            EventKind::GesturePinch { touch_id, phase } => {
                Some((SequenceClass::GesturePinch, touch_id, phase))
            }
            EventKind::GestureSwipe { touch_id, phase } => {
                Some((SequenceClass::GestureSwipe, touch_id, phase))
            }
            EventKind::Button { .. }
            | EventKind::Key { .. }
            | EventKind::Motion
            | EventKind::Enter
            | EventKind::Leave
            | EventKind::FocusIn
            | EventKind::FocusOut => None,
        }
    }
}

/// A raw input event on its way to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    /// The device that produced the event.
    pub device: DeviceId,
    pub time: Timestamp,
    pub modifiers: ModifierMask,
    /// The windows under the event, root first. The last entry is the event window.
    pub spine: Vec<WindowId>,
    pub kind: EventKind,
}

impl InputEvent {
    pub fn new(device: DeviceId, time: Timestamp, kind: EventKind) -> Self {
        Self {
            device,
            time,
            modifiers: ModifierMask::empty(),
            spine: Vec::new(),
            kind,
        }
    }

    pub fn with_modifiers(mut self, modifiers: ModifierMask) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_spine(mut self, spine: impl IntoIterator<Item = WindowId>) -> Self {
        self.spine = spine.into_iter().collect();
        self
    }

    /// The deepest window under the event.
    pub fn event_window(&self) -> Option<WindowId> {
        self.spine.last().copied()
    }
}
