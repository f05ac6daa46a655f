// SPDX-License-Identifier: GPL-3.0-or-later

//! Grab data model.
//!
//! A grab is a client's claim on a device's events. Passive grabs sit in the
//! [`GrabTable`](table::GrabTable) until a matching event activates them; an active grab
//! routes every event of its device to its owner until it is released.

pub mod passive;
pub mod table;

use crate::{
    device::DeviceId,
    input::{ClientId, CursorId, EventKind, ModifierMask, SequenceClass, SequencePhase, Timestamp, WindowId},
};

/// The "any button" / "any key" detail.
pub const ANY_DETAIL: u32 = 0;

/// The largest detail a grab can ever match. Keycodes above this don't exist.
pub const MAX_DETAIL: u32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrabKind {
    Button,
    Key,
    Enter,
    FocusIn,
    TouchBegin,
    GesturePinchBegin,
    GestureSwipeBegin,
}

impl GrabKind {
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => GrabKind::Button,
            1 => GrabKind::Key,
            2 => GrabKind::Enter,
            3 => GrabKind::FocusIn,
            4 => GrabKind::TouchBegin,
            5 => GrabKind::GesturePinchBegin,
            6 => GrabKind::GestureSwipeBegin,
            _ => return None,
        })
    }

    pub fn code(self) -> u32 {
        match self {
            GrabKind::Button => 0,
            GrabKind::Key => 1,
            GrabKind::Enter => 2,
            GrabKind::FocusIn => 3,
            GrabKind::TouchBegin => 4,
            GrabKind::GesturePinchBegin => 5,
            GrabKind::GestureSwipeBegin => 6,
        }
    }

    /// Whether grabs of this kind carry a button or keycode.
    ///
    /// Every other kind requires a detail of exactly zero.
    pub fn takes_detail(self) -> bool {
        match self {
            GrabKind::Button | GrabKind::Key => true,
            GrabKind::Enter
            | GrabKind::FocusIn
            | GrabKind::TouchBegin
            | GrabKind::GesturePinchBegin
            | GrabKind::GestureSwipeBegin => false,
        }
    }

    /// The kind of grab that claims sequences of this class.
    pub fn for_sequence(class: SequenceClass) -> Self {
        match class {
            SequenceClass::Touch => GrabKind::TouchBegin,
            SequenceClass::GesturePinch => GrabKind::GesturePinchBegin,
            SequenceClass::GestureSwipe => GrabKind::GestureSwipeBegin,
        }
    }

    /// The grab kind and detail an event can activate, if any.
    pub fn triggered_by(kind: &EventKind) -> Option<(GrabKind, u32)> {
        match *kind {
            EventKind::Button {
                button,
                pressed: true,
            } => Some((GrabKind::Button, button)),
            EventKind::Key {
                keycode,
                pressed: true,
            } => Some((GrabKind::Key, keycode)),
            EventKind::Enter => Some((GrabKind::Enter, ANY_DETAIL)),
            EventKind::FocusIn => Some((GrabKind::FocusIn, ANY_DETAIL)),
            EventKind::Touch {
                phase: SequencePhase::Begin,
                ..
            } => Some((GrabKind::TouchBegin, ANY_DETAIL)),
            EventKind::GesturePinch {
                phase: SequencePhase::Begin,
                ..
            } => Some((GrabKind::GesturePinchBegin, ANY_DETAIL)),
            EventKind::GestureSwipe {
                phase: SequencePhase::Begin,
                ..
            } => Some((GrabKind::GestureSwipeBegin, ANY_DETAIL)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrabMode {
    /// Freeze the device once the grab activates.
    #[serde(alias = "sync")]
    Synchronous,
    #[serde(alias = "async")]
    Asynchronous,
}

impl GrabMode {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(GrabMode::Synchronous),
            1 => Some(GrabMode::Asynchronous),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            GrabMode::Synchronous => 0,
            GrabMode::Asynchronous => 1,
        }
    }
}

/// The result of an attempt to grab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrabStatus {
    Success,
    /// Someone else already holds the grab.
    AlreadyGrabbed,
    /// The device is frozen by another client's grab.
    Frozen,
    /// The request time is older than the device's last grab.
    InvalidTime,
}

/// The identity of a passive grab.
///
/// At most one passive grab exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassiveGrabKey {
    pub device: DeviceId,
    pub window: WindowId,
    pub kind: GrabKind,
    pub detail: u32,
    pub modifiers: ModifierMask,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassiveGrab {
    pub owner: ClientId,
    pub key: PassiveGrabKey,
    pub cursor: Option<CursorId>,
    pub owner_events: bool,
    pub this_mode: GrabMode,
    pub other_mode: GrabMode,
    pub event_mask: u32,
}

impl PassiveGrab {
    pub fn device(&self) -> DeviceId {
        self.key.device
    }

    pub fn window(&self) -> WindowId {
        self.key.window
    }
}

/// What caused a passive grab to become active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrabTrigger {
    pub key: PassiveGrabKey,
    /// The actual button or keycode of the triggering event.
    pub detail: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveGrab {
    pub owner: ClientId,
    pub device: DeviceId,
    pub window: WindowId,
    pub cursor: Option<CursorId>,
    pub owner_events: bool,
    pub this_mode: GrabMode,
    pub other_mode: GrabMode,
    pub event_mask: u32,
    /// When the grab was established.
    pub time: Timestamp,
    /// Set when a passive grab activated this grab.
    pub trigger: Option<GrabTrigger>,
}

impl ActiveGrab {
    pub fn from_passive(grab: &PassiveGrab, detail: u32, time: Timestamp) -> Self {
        Self {
            owner: grab.owner,
            device: grab.device(),
            window: grab.window(),
            cursor: grab.cursor,
            owner_events: grab.owner_events,
            this_mode: grab.this_mode,
            other_mode: grab.other_mode,
            event_mask: grab.event_mask,
            time,
            trigger: Some(GrabTrigger {
                key: grab.key,
                detail,
            }),
        }
    }

    /// Whether `kind` ends this grab when it was activated passively.
    ///
    /// Button and key grabs end on release of the triggering button or key, enter grabs
    /// on leave, and focus grabs on focus out.
    pub fn is_released_by(&self, kind: &EventKind) -> bool {
        let Some(trigger) = self.trigger else {
            return false;
        };

        match (trigger.key.kind, *kind) {
            (
                GrabKind::Button,
                EventKind::Button {
                    button,
                    pressed: false,
                },
            ) => button == trigger.detail,
            (
                GrabKind::Key,
                EventKind::Key {
                    keycode,
                    pressed: false,
                },
            ) => keycode == trigger.detail,
            (GrabKind::Enter, EventKind::Leave) => true,
            (GrabKind::FocusIn, EventKind::FocusOut) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_button_and_key_take_a_detail() {
        let with_detail = (0..7)
            .filter_map(GrabKind::from_code)
            .filter(|kind| kind.takes_detail())
            .collect::<Vec<_>>();
        assert_eq!(with_detail, vec![GrabKind::Button, GrabKind::Key]);
        assert_eq!(GrabKind::from_code(7), None);
    }

    #[test]
    fn codes_round_trip() {
        for code in 0..7 {
            assert_eq!(GrabKind::from_code(code).map(GrabKind::code), Some(code));
        }
        assert_eq!(GrabMode::from_code(2), None);
    }

    #[test]
    fn press_triggers_and_release_ends_button_grab() {
        let press = EventKind::Button {
            button: 3,
            pressed: true,
        };
        assert_eq!(GrabKind::triggered_by(&press), Some((GrabKind::Button, 3)));

        let grab = PassiveGrab {
            owner: ClientId(1),
            key: PassiveGrabKey {
                device: DeviceId(2),
                window: WindowId(1),
                kind: GrabKind::Button,
                detail: ANY_DETAIL,
                modifiers: ModifierMask::empty(),
            },
            cursor: None,
            owner_events: false,
            this_mode: GrabMode::Asynchronous,
            other_mode: GrabMode::Asynchronous,
            event_mask: 0,
        };
        let active = ActiveGrab::from_passive(&grab, 3, Timestamp(10));

        assert!(!active.is_released_by(&EventKind::Button {
            button: 1,
            pressed: false
        }));
        assert!(active.is_released_by(&EventKind::Button {
            button: 3,
            pressed: false
        }));
        assert!(!active.is_released_by(&EventKind::Leave));
    }
}
