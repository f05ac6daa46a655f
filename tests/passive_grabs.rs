// SPDX-License-Identifier: GPL-3.0-or-later

use assert_matches::assert_matches;
use common::fixture::*;
use grab_arbiter::{
    device::DeviceId,
    grab::{
        GrabKind, GrabStatus,
        passive::{GrabFailure, InstallError},
    },
    input::{CursorId, EventKind, InputEvent, ModifierMask, Timestamp, WindowId},
    state::{Delivery, RequestError},
};
use test_log::test;

mod common;

#[test]
fn installing_twice_reports_one_conflict() {
    let mut fixture = Fixture::new();
    let request = grab_request(FRAME, GrabKind::Button, 1, &[0]);

    assert_eq!(fixture.install(WM, &request), Ok(vec![]));
    assert_eq!(
        fixture.install(APP_CLIENT, &request),
        Ok(vec![GrabFailure {
            modifiers: 0,
            status: GrabStatus::AlreadyGrabbed,
        }])
    );

    assert_eq!(fixture.arbiter.grabs().passive_count(), 1);
    let owners = fixture
        .arbiter
        .grabs()
        .passive_grabs(FRAME)
        .map(|grab| grab.owner)
        .collect::<Vec<_>>();
    assert_eq!(owners, vec![WM]);
}

#[test]
fn partial_conflict_installs_the_rest() {
    let mut fixture = Fixture::new();
    fixture
        .install(WM, &grab_request(FRAME, GrabKind::Key, 38, &[0]))
        .unwrap();

    let failures = fixture
        .install(WM, &grab_request(FRAME, GrabKind::Key, 38, &[0, SHIFT]))
        .unwrap();

    assert_eq!(
        failures,
        vec![GrabFailure {
            modifiers: 0,
            status: GrabStatus::AlreadyGrabbed,
        }]
    );
    assert_eq!(fixture.arbiter.grabs().passive_count(), 2);
    assert!(
        fixture
            .arbiter
            .grabs()
            .passive_grabs(FRAME)
            .any(|grab| grab.key.modifiers == ModifierMask::SHIFT)
    );
}

#[test]
fn uninstalling_nothing_succeeds() {
    let mut fixture = Fixture::new();
    fixture
        .install(WM, &grab_request(FRAME, GrabKind::Button, 1, &[0]))
        .unwrap();

    let request = uninstall_request(APP, GrabKind::Button, 2, &[SHIFT]);
    assert_eq!(fixture.uninstall(WM, &request), Ok(()));
    assert_eq!(fixture.arbiter.grabs().passive_count(), 1);
}

#[test]
fn uninstall_removes_installed_grabs() {
    let mut fixture = Fixture::new();
    fixture
        .install(WM, &grab_request(FRAME, GrabKind::Button, 1, &[0, SHIFT]))
        .unwrap();

    fixture
        .uninstall(WM, &uninstall_request(FRAME, GrabKind::Button, 1, &[SHIFT]))
        .unwrap();

    assert_eq!(fixture.arbiter.grabs().passive_count(), 1);
}

#[test]
fn detail_above_255_is_rejected_for_every_kind() {
    let mut fixture = Fixture::new();

    for code in 0..7 {
        let mut request = grab_request(FRAME, GrabKind::Button, 256, &[0]);
        request.grab_type = code;

        assert_eq!(
            fixture.install(WM, &request),
            Err(RequestError::Install(InstallError::DetailOutOfRange(256)))
        );
    }
    assert_eq!(fixture.arbiter.grabs().passive_count(), 0);
}

#[test]
fn nonzero_detail_is_invalid_for_detailless_kinds() {
    let mut fixture = Fixture::new();

    for kind in [
        GrabKind::Enter,
        GrabKind::FocusIn,
        GrabKind::TouchBegin,
        GrabKind::GesturePinchBegin,
        GrabKind::GestureSwipeBegin,
    ] {
        assert_matches!(
            fixture.install(WM, &grab_request(FRAME, kind, 3, &[0])),
            Err(RequestError::Install(InstallError::InvalidValue {
                field: "detail",
                value: 3
            }))
        );
    }
    assert_eq!(fixture.arbiter.grabs().passive_count(), 0);
}

#[test]
fn illegal_modifier_stops_batch_without_rollback() {
    let mut fixture = Fixture::new();
    let request = grab_request(FRAME, GrabKind::Button, 1, &[0, SHIFT, 1 << 15, CONTROL]);

    assert_matches!(
        fixture.install(WM, &request),
        Err(RequestError::Install(InstallError::InvalidValue {
            field: "modifiers",
            ..
        }))
    );

    // Values before the bad one stay installed.
    assert_eq!(fixture.arbiter.grabs().passive_count(), 2);
}

#[test]
fn unknown_handles_are_protocol_errors() {
    let mut fixture = Fixture::new();

    let mut request = grab_request(WindowId(99), GrabKind::Button, 1, &[0]);
    assert_eq!(
        fixture.install(WM, &request),
        Err(RequestError::BadWindow(WindowId(99)))
    );

    request.window = FRAME;
    request.device = DeviceId(42);
    assert_eq!(
        fixture.install(WM, &request),
        Err(RequestError::BadDevice(DeviceId(42)))
    );

    request.device = POINTER;
    request.cursor = Some(CursorId(77));
    assert_eq!(
        fixture.install(WM, &request),
        Err(RequestError::BadCursor(CursorId(77)))
    );

    request.cursor = Some(CURSOR);
    assert_eq!(fixture.install(WM, &request), Ok(vec![]));
}

#[test]
fn too_many_modifier_values_is_a_length_error() {
    let mut fixture = Fixture::new();
    let modifiers = vec![0; 70_000];

    assert_eq!(
        fixture.install(WM, &grab_request(FRAME, GrabKind::Button, 1, &modifiers)),
        Err(RequestError::BadLength(70_000))
    );
}

#[test]
fn button_grab_activates_and_releases() {
    let mut fixture = Fixture::new();
    fixture
        .install(WM, &grab_request(FRAME, GrabKind::Button, 1, &[0]))
        .unwrap();

    assert_eq!(
        fixture.press(1, 10).delivery,
        Delivery::Activated {
            client: WM,
            window: FRAME,
            frozen: false,
        }
    );
    assert_eq!(
        fixture.send(MOUSE, 11, EventKind::Motion).delivery,
        Delivery::Grab {
            client: WM,
            window: FRAME
        }
    );
    assert_eq!(
        fixture.release(1, 12).delivery,
        Delivery::Grab {
            client: WM,
            window: FRAME
        }
    );

    assert!(fixture.arbiter.grabs().active(POINTER).is_none());
    assert_eq!(fixture.send(MOUSE, 13, EventKind::Motion).delivery, Delivery::Focus);
}

#[test]
fn root_most_window_and_exact_detail_win() {
    let mut fixture = Fixture::new();
    fixture
        .install(APP_CLIENT, &grab_request(APP, GrabKind::Button, 1, &[0]))
        .unwrap();
    fixture
        .install(WM, &grab_request(FRAME, GrabKind::Button, 0, &[0]))
        .unwrap();
    fixture
        .install(APP_CLIENT, &grab_request(FRAME, GrabKind::Button, 1, &[0]))
        .unwrap();

    assert_eq!(
        fixture.press(1, 10).delivery,
        Delivery::Activated {
            client: APP_CLIENT,
            window: FRAME,
            frozen: false,
        }
    );
    fixture.release(1, 11);

    assert_eq!(
        fixture.press(2, 12).delivery,
        Delivery::Activated {
            client: WM,
            window: FRAME,
            frozen: false,
        }
    );
}

#[test]
fn modifiers_must_match_exactly() {
    let mut fixture = Fixture::new();
    let mut request = grab_request(FRAME, GrabKind::Key, 38, &[SHIFT]);
    request.device = KEYBOARD;
    fixture.install(WM, &request).unwrap();

    let key = |modifiers| {
        InputEvent::new(
            KEYBOARD,
            Timestamp(10),
            EventKind::Key {
                keycode: 38,
                pressed: true,
            },
        )
        .with_spine(SPINE)
        .with_modifiers(modifiers)
    };

    assert_eq!(
        fixture.arbiter.process_event(key(ModifierMask::empty())).delivery,
        Delivery::Focus
    );
    assert_eq!(
        fixture
            .arbiter
            .process_event(key(ModifierMask::SHIFT | ModifierMask::CONTROL))
            .delivery,
        Delivery::Focus
    );
    assert_eq!(
        fixture.arbiter.process_event(key(ModifierMask::SHIFT)).delivery,
        Delivery::Activated {
            client: WM,
            window: FRAME,
            frozen: false,
        }
    );
}
