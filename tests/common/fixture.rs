// SPDX-License-Identifier: GPL-3.0-or-later

use grab_arbiter::{
    device::{DeviceId, DeviceRole, Registry},
    freeze::AllowMode,
    grab::{
        GrabKind, GrabMode,
        passive::{GrabFailure, InstallRequest, UninstallRequest},
    },
    input::{ClientId, CursorId, EventKind, InputEvent, SequencePhase, Timestamp, TouchId, WindowId},
    state::{
        AllowEventsMode, AllowEventsReply, AllowEventsRequest, Arbiter, EventOutcome,
        RequestError,
    },
};

pub const POINTER: DeviceId = DeviceId(2);
pub const KEYBOARD: DeviceId = DeviceId(3);
/// A mouse attached to [`POINTER`].
pub const MOUSE: DeviceId = DeviceId(6);
/// A touchscreen attached to [`POINTER`].
pub const TOUCHSCREEN: DeviceId = DeviceId(7);

pub const ROOT: WindowId = WindowId(1);
pub const FRAME: WindowId = WindowId(10);
pub const APP: WindowId = WindowId(20);
/// The spine of every event the fixture sends, root first.
pub const SPINE: [WindowId; 3] = [ROOT, FRAME, APP];

pub const CURSOR: CursorId = CursorId(5);

pub const WM: ClientId = ClientId(1);
pub const APP_CLIENT: ClientId = ClientId(2);

pub const SHIFT: u32 = 1;
pub const CONTROL: u32 = 1 << 2;

/// One master pointer/keyboard pair with a mouse and a touchscreen.
pub struct Fixture {
    pub arbiter: Arbiter,
}

impl Fixture {
    pub fn new() -> Self {
        let mut registry = Registry::new();
        registry
            .add_device(POINTER, DeviceRole::MasterPointer)
            .unwrap();
        registry
            .add_device(KEYBOARD, DeviceRole::MasterKeyboard)
            .unwrap();
        registry.add_device(MOUSE, DeviceRole::Floating).unwrap();
        registry
            .add_device(TOUCHSCREEN, DeviceRole::Floating)
            .unwrap();
        registry.pair(POINTER, KEYBOARD).unwrap();
        registry.attach(MOUSE, POINTER).unwrap();
        registry.attach(TOUCHSCREEN, POINTER).unwrap();

        for window in SPINE {
            registry.add_window(window);
        }
        registry.add_cursor(CURSOR);

        Self {
            arbiter: Arbiter::new(registry),
        }
    }

    pub fn install(
        &mut self,
        client: ClientId,
        request: &InstallRequest,
    ) -> Result<Vec<GrabFailure>, RequestError> {
        self.arbiter.install_passive_grab(client, request)
    }

    pub fn uninstall(
        &mut self,
        client: ClientId,
        request: &UninstallRequest,
    ) -> Result<(), RequestError> {
        self.arbiter.uninstall_passive_grab(client, request)
    }

    pub fn send(&mut self, device: DeviceId, time: u32, kind: EventKind) -> EventOutcome {
        self.arbiter
            .process_event(InputEvent::new(device, Timestamp(time), kind).with_spine(SPINE))
    }

    pub fn press(&mut self, button: u32, time: u32) -> EventOutcome {
        self.send(
            MOUSE,
            time,
            EventKind::Button {
                button,
                pressed: true,
            },
        )
    }

    pub fn release(&mut self, button: u32, time: u32) -> EventOutcome {
        self.send(
            MOUSE,
            time,
            EventKind::Button {
                button,
                pressed: false,
            },
        )
    }

    pub fn touch(&mut self, touch_id: u32, phase: SequencePhase, time: u32) -> EventOutcome {
        self.send(
            TOUCHSCREEN,
            time,
            EventKind::Touch {
                touch_id: TouchId(touch_id),
                phase,
            },
        )
    }

    pub fn allow(
        &mut self,
        client: ClientId,
        device: DeviceId,
        mode: AllowMode,
        time: u32,
    ) -> AllowEventsReply {
        self.arbiter
            .allow_events(
                client,
                &AllowEventsRequest {
                    device,
                    time: Timestamp(time),
                    mode: AllowEventsMode::Device(mode),
                },
            )
            .unwrap()
    }

    pub fn decide_touch(
        &mut self,
        client: ClientId,
        touch_id: u32,
        window: WindowId,
        accept: bool,
    ) -> AllowEventsReply {
        let touch_id = TouchId(touch_id);
        let mode = if accept {
            AllowEventsMode::AcceptTouch { touch_id, window }
        } else {
            AllowEventsMode::RejectTouch { touch_id, window }
        };

        self.arbiter
            .allow_events(
                client,
                &AllowEventsRequest {
                    device: TOUCHSCREEN,
                    time: Timestamp::CURRENT_TIME,
                    mode,
                },
            )
            .unwrap()
    }
}

/// An asynchronous grab request on [`POINTER`].
pub fn grab_request(
    window: WindowId,
    kind: GrabKind,
    detail: u32,
    modifiers: &[u32],
) -> InstallRequest {
    InstallRequest {
        device: POINTER,
        window,
        cursor: None,
        grab_type: kind.code(),
        detail,
        owner_events: false,
        this_mode: GrabMode::Asynchronous.code(),
        other_mode: GrabMode::Asynchronous.code(),
        event_mask: 0,
        modifiers: modifiers.to_vec(),
    }
}

/// A button grab on [`POINTER`] that freezes it when it activates.
pub fn sync_button_grab(window: WindowId, button: u32) -> InstallRequest {
    InstallRequest {
        this_mode: GrabMode::Synchronous.code(),
        ..grab_request(window, GrabKind::Button, button, &[0])
    }
}

/// A touch grab on [`POINTER`]. Touch grabs always use these modes.
pub fn touch_grab(window: WindowId) -> InstallRequest {
    InstallRequest {
        this_mode: GrabMode::Synchronous.code(),
        ..grab_request(window, GrabKind::TouchBegin, 0, &[0])
    }
}

pub fn uninstall_request(
    window: WindowId,
    kind: GrabKind,
    detail: u32,
    modifiers: &[u32],
) -> UninstallRequest {
    UninstallRequest {
        device: POINTER,
        window,
        grab_type: kind.code(),
        detail,
        modifiers: modifiers.to_vec(),
    }
}
