// SPDX-License-Identifier: GPL-3.0-or-later

//! Installing and removing passive grabs in batches of modifier values.

use std::collections::TryReserveError;

use tracing::{debug, trace};

use crate::{
    device::DeviceId,
    input::{ClientId, CursorId, ModifierMask, WindowId},
};

use super::{
    table::GrabTable, GrabKind, GrabMode, GrabStatus, PassiveGrab, PassiveGrabKey, MAX_DETAIL,
};

/// A request to install one passive grab per modifier value.
///
/// Kind and modes are kept as raw codes; they are validated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub device: DeviceId,
    pub window: WindowId,
    pub cursor: Option<CursorId>,
    pub grab_type: u32,
    pub detail: u32,
    pub owner_events: bool,
    pub this_mode: u32,
    pub other_mode: u32,
    pub event_mask: u32,
    pub modifiers: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallRequest {
    pub device: DeviceId,
    pub window: WindowId,
    pub grab_type: u32,
    pub detail: u32,
    pub modifiers: Vec<u32>,
}

/// A modifier value that could not be grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrabFailure {
    pub modifiers: u32,
    pub status: GrabStatus,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InstallError {
    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: u32 },
    /// Details above [`MAX_DETAIL`] are valid on the wire but can never match anything.
    #[error("detail {0} can never match")]
    DetailOutOfRange(u32),
    #[error("failed to allocate the failure list: {0}")]
    Alloc(#[from] TryReserveError),
}

/// Checks that apply to the whole request, before any modifier is looked at.
fn validate_request(
    request: &InstallRequest,
) -> Result<(GrabKind, GrabMode, GrabMode), InstallError> {
    let (grab_type, detail) = (request.grab_type, request.detail);
    let kind = GrabKind::from_code(grab_type).ok_or(InstallError::InvalidValue {
        field: "grab type",
        value: grab_type,
    })?;

    if detail > MAX_DETAIL {
        return Err(InstallError::DetailOutOfRange(detail));
    }

    if !kind.takes_detail() && detail != 0 {
        return Err(InstallError::InvalidValue {
            field: "detail",
            value: detail,
        });
    }

    let this = GrabMode::from_code(request.this_mode).ok_or(InstallError::InvalidValue {
        field: "this device mode",
        value: request.this_mode,
    })?;
    let other = GrabMode::from_code(request.other_mode).ok_or(InstallError::InvalidValue {
        field: "other devices mode",
        value: request.other_mode,
    })?;

    match kind {
        GrabKind::TouchBegin
            if this != GrabMode::Synchronous || other != GrabMode::Asynchronous =>
        {
            return Err(InstallError::InvalidValue {
                field: "touch grab mode",
                value: request.this_mode,
            });
        }
        GrabKind::Button
        | GrabKind::Key
        | GrabKind::Enter
        | GrabKind::FocusIn
        | GrabKind::TouchBegin
        | GrabKind::GesturePinchBegin
        | GrabKind::GestureSwipeBegin => (),
    }

    Ok((kind, this, other))
}

/// Installs one passive grab per modifier value in `request`.
///
/// Returns the modifier values that failed. Values already grabbed on the same key are
/// reported as [`GrabStatus::AlreadyGrabbed`] and the rest of the batch carries on.
///
/// An illegal modifier value stops the batch with an error. Grabs installed for earlier
/// values in the same request stay installed.
pub fn install(
    table: &mut GrabTable,
    client: ClientId,
    request: &InstallRequest,
) -> Result<Vec<GrabFailure>, InstallError> {
    let (kind, this_mode, other_mode) = validate_request(request)?;

    let mut failures = Vec::new();
    failures.try_reserve_exact(request.modifiers.len())?;

    for &modifiers in request.modifiers.iter() {
        let mask = ModifierMask::from_request(modifiers).ok_or(InstallError::InvalidValue {
            field: "modifiers",
            value: modifiers,
        })?;

        let grab = PassiveGrab {
            owner: client,
            key: PassiveGrabKey {
                device: request.device,
                window: request.window,
                kind,
                detail: request.detail,
                modifiers: mask,
            },
            cursor: request.cursor,
            owner_events: request.owner_events,
            this_mode,
            other_mode,
            event_mask: request.event_mask,
        };

        if table.insert_passive(grab) {
            trace!(?client, ?kind, detail = request.detail, modifiers, "Installed passive grab");
        } else {
            failures.push(GrabFailure {
                modifiers,
                status: GrabStatus::AlreadyGrabbed,
            });
        }
    }

    debug!(
        ?client,
        device = ?request.device,
        window = ?request.window,
        ?kind,
        requested = request.modifiers.len(),
        failed = failures.len(),
        "Passive grab batch done"
    );

    Ok(failures)
}

/// Removes the client's passive grab for each modifier value in `request`.
///
/// Values with nothing to remove, or grabbed by someone else, are skipped.
pub fn uninstall(
    table: &mut GrabTable,
    client: ClientId,
    request: &UninstallRequest,
) -> Result<(), InstallError> {
    let kind = GrabKind::from_code(request.grab_type).ok_or(InstallError::InvalidValue {
        field: "grab type",
        value: request.grab_type,
    })?;

    if !kind.takes_detail() && request.detail != 0 {
        return Err(InstallError::InvalidValue {
            field: "detail",
            value: request.detail,
        });
    }

    let mut removed = 0;

    for &modifiers in request.modifiers.iter() {
        // A value with stray bits was never installable.
        let Some(mask) = ModifierMask::from_request(modifiers) else {
            continue;
        };

        let key = PassiveGrabKey {
            device: request.device,
            window: request.window,
            kind,
            detail: request.detail,
            modifiers: mask,
        };

        let owned = table
            .get_passive(&key)
            .is_some_and(|grab| grab.owner == client);
        if owned && table.remove_passive(&key) {
            removed += 1;
        }
    }

    debug!(?client, ?kind, detail = request.detail, removed, "Uninstalled passive grabs");

    Ok(())
}
