// SPDX-License-Identifier: GPL-3.0-or-later

//! The arbitration facade.
//!
//! [`Arbiter`] owns the grab table, the freeze state of every device, and the ownership
//! of every touch and gesture sequence. Requests and raw events go in, routing decisions
//! come out. Nothing here blocks and nothing here talks to clients directly.

pub mod api_handlers;

use tracing::{debug, trace, warn};

use crate::{
    device::{Device, DeviceId, Registry},
    freeze::{
        AllowMode, AllowResult, FreezeStateMachine, HeldEvent, IgnoreReason, Intercepted, Thaw,
    },
    grab::{
        ActiveGrab, GrabKind, GrabMode, GrabStatus, ANY_DETAIL,
        passive::{self, GrabFailure, InstallError, InstallRequest, UninstallRequest},
        table::GrabTable,
    },
    input::{
        ClientId, CursorId, InputEvent, SequenceClass, SequencePhase, Timestamp, TouchId,
        WindowId,
    },
    touch::{Claimant, Resolution, TouchGestureArbiter},
};

/// The most modifier values a single request can carry.
pub const MAX_MODIFIER_VALUES: usize = u16::MAX as usize;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("no such device {0:?}")]
    BadDevice(DeviceId),
    #[error("no such window {0:?}")]
    BadWindow(WindowId),
    #[error("no such cursor {0:?}")]
    BadCursor(CursorId),
    #[error("request carries {0} modifier values")]
    BadLength(usize),
    #[error(transparent)]
    Install(#[from] InstallError),
}

/// Where an event went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// To the owner of the device's active grab.
    Grab { client: ClientId, window: WindowId },
    /// The event activated a passive grab and went to its owner.
    Activated {
        client: ClientId,
        window: WindowId,
        /// The grab froze its device.
        frozen: bool,
    },
    /// To the listeners of a touch or gesture sequence, top of the stack first.
    Sequence { recipients: Vec<Claimant> },
    /// No grab wants it. Normal focus delivery applies.
    Focus,
    /// Kept back by a device that froze on it.
    Held,
    /// Queued behind a frozen device.
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub event: InputEvent,
    pub delivery: Delivery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventOutcome {
    pub delivery: Delivery,
    /// Events let through as a side effect, in delivery order.
    pub released: Vec<Dispatched>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowEventsMode {
    Device(AllowMode),
    AcceptTouch { touch_id: TouchId, window: WindowId },
    RejectTouch { touch_id: TouchId, window: WindowId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowEventsRequest {
    pub device: DeviceId,
    pub time: Timestamp,
    pub mode: AllowEventsMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowEventsReply {
    /// Nothing changed. The request still succeeded.
    Ignored(IgnoreReason),
    Thawed {
        /// The re-offered event of a replay.
        replayed: Option<Dispatched>,
        released: Vec<Dispatched>,
    },
    Touch(Resolution),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrabDeviceRequest {
    pub device: DeviceId,
    pub window: WindowId,
    pub cursor: Option<CursorId>,
    pub owner_events: bool,
    pub this_mode: GrabMode,
    pub other_mode: GrabMode,
    pub event_mask: u32,
    pub time: Timestamp,
}

/// Everything that went away with a client or window.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub passive_removed: usize,
    /// Events that flowed once the revoked grabs let go of their devices.
    pub released: Vec<Dispatched>,
    pub sequences: Vec<Resolution>,
}

#[derive(Debug, Default)]
pub struct Arbiter {
    pub registry: Registry,
    grabs: GrabTable,
    freeze: FreezeStateMachine,
    touch: TouchGestureArbiter,
    /// The latest event time seen, what [`Timestamp::CURRENT_TIME`] resolves to.
    now: Timestamp,
}

impl Arbiter {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            ..Default::default()
        }
    }

    pub fn grabs(&self) -> &GrabTable {
        &self.grabs
    }

    pub fn freeze(&self) -> &FreezeStateMachine {
        &self.freeze
    }

    pub fn touch(&self) -> &TouchGestureArbiter {
        &self.touch
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    fn resolve_time(&self, time: Timestamp) -> Timestamp {
        if time.is_current() { self.now } else { time }
    }

    fn check_device(&self, device: DeviceId) -> Result<&Device, RequestError> {
        self.registry
            .device(device)
            .ok_or(RequestError::BadDevice(device))
    }

    fn check_window(&self, window: WindowId) -> Result<(), RequestError> {
        if !self.registry.window_exists(window) {
            return Err(RequestError::BadWindow(window));
        }
        Ok(())
    }

    fn check_cursor(&self, cursor: Option<CursorId>) -> Result<(), RequestError> {
        match cursor {
            Some(cursor) if !self.registry.cursor_exists(cursor) => {
                Err(RequestError::BadCursor(cursor))
            }
            _ => Ok(()),
        }
    }

    /// The client whose grab has a say over `device`'s freeze: the owner of the grab that
    /// froze it, else the owner of its own active grab.
    fn freeze_owner(&self, device: DeviceId) -> Option<ClientId> {
        let by = self.freeze.frozen_by(device).unwrap_or(device);
        self.grabs.active(by).map(|grab| grab.owner)
    }

    /// The devices an event from `device` is routed through, most specific first.
    fn routing_devices(&self, device: DeviceId) -> Vec<DeviceId> {
        std::iter::once(device)
            .chain(self.registry.master_of(device))
            .collect()
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Requests

    /// Installs a batch of passive grabs for `client`.
    ///
    /// See [`passive::install`] for how the batch behaves.
    pub fn install_passive_grab(
        &mut self,
        client: ClientId,
        request: &InstallRequest,
    ) -> Result<Vec<GrabFailure>, RequestError> {
        self.check_device(request.device)?;
        self.check_window(request.window)?;
        self.check_cursor(request.cursor)?;
        if request.modifiers.len() > MAX_MODIFIER_VALUES {
            return Err(RequestError::BadLength(request.modifiers.len()));
        }

        Ok(passive::install(&mut self.grabs, client, request)?)
    }

    pub fn uninstall_passive_grab(
        &mut self,
        client: ClientId,
        request: &UninstallRequest,
    ) -> Result<(), RequestError> {
        self.check_device(request.device)?;
        self.check_window(request.window)?;
        if request.modifiers.len() > MAX_MODIFIER_VALUES {
            return Err(RequestError::BadLength(request.modifiers.len()));
        }

        Ok(passive::uninstall(&mut self.grabs, client, request)?)
    }

    /// Lets a grabbing client decide what happens to a frozen device or a sequence it
    /// has a claim on.
    ///
    /// Device modes only count when they come from the owner of the grab that controls
    /// the device's freeze. Everyone else is ignored, successfully. Paired modes leave the
    /// partner alone when another client's grab controls it.
    pub fn allow_events(
        &mut self,
        client: ClientId,
        request: &AllowEventsRequest,
    ) -> Result<AllowEventsReply, RequestError> {
        let device = self.check_device(request.device)?;
        let (is_master, device) = (device.is_master(), device.id);

        let mode = match request.mode {
            AllowEventsMode::AcceptTouch { touch_id, window } => {
                self.check_window(window)?;
                let resolution = self.touch.accept(device, touch_id, client, window);
                return Ok(AllowEventsReply::Touch(resolution));
            }
            AllowEventsMode::RejectTouch { touch_id, window } => {
                self.check_window(window)?;
                let resolution = self.touch.reject(device, touch_id, client, window);
                return Ok(AllowEventsReply::Touch(resolution));
            }
            AllowEventsMode::Device(mode) => mode,
        };

        let owner = self.freeze_owner(device);
        if owner != Some(client) {
            warn!(?client, ?owner, ?device, "Allow events from non-owner, ignoring");
            return Ok(AllowEventsReply::Ignored(IgnoreReason::NotOwner));
        }

        let partner = self.registry.paired(device).filter(|&partner| {
            let owner = self.freeze_owner(partner);
            let foreign = owner.is_some_and(|owner| owner != client);
            if foreign {
                debug!(?partner, ?owner, "Partner held by another client, leaving it alone");
            }
            !foreign
        });
        let thaw = match self
            .freeze
            .allow(device, mode, request.time, is_master, partner)
        {
            AllowResult::Applied(thaw) => thaw,
            AllowResult::Ignored(reason) => return Ok(AllowEventsReply::Ignored(reason)),
        };

        if mode == AllowMode::ReplayDevice
            && let Some(grab) = self.grabs.clear_active(device)
        {
            debug!(?device, owner = ?grab.owner, "Replay released the active grab");
        }

        let mut released = Vec::new();
        let replayed = self.apply_thaw(thaw, &mut released);
        Ok(AllowEventsReply::Thawed { replayed, released })
    }

    /// Actively grabs a device for `client`.
    pub fn grab_device(
        &mut self,
        client: ClientId,
        request: &GrabDeviceRequest,
    ) -> Result<GrabStatus, RequestError> {
        self.check_device(request.device)?;
        self.check_window(request.window)?;
        self.check_cursor(request.cursor)?;

        let device = request.device;
        let time = self.resolve_time(request.time);

        if let Some(current) = self.grabs.active(device)
            && current.owner != client
        {
            return Ok(GrabStatus::AlreadyGrabbed);
        }
        if !request.time.is_current()
            && self
                .grabs
                .last_grab_time(device)
                .is_some_and(|last| time < last)
        {
            return Ok(GrabStatus::InvalidTime);
        }

        if let Some(by) = self.freeze.frozen_by(device) {
            let frozen_by_other = self
                .grabs
                .active(by)
                .is_none_or(|grab| grab.owner != client);
            if frozen_by_other {
                return Ok(GrabStatus::Frozen);
            }
        }

        self.grabs.set_active(ActiveGrab {
            owner: client,
            device,
            window: request.window,
            cursor: request.cursor,
            owner_events: request.owner_events,
            this_mode: request.this_mode,
            other_mode: request.other_mode,
            event_mask: request.event_mask,
            time,
            trigger: None,
        });
        self.freeze.grab_started(device);
        self.freeze_for(device, request.this_mode, request.other_mode, None, time);

        debug!(?client, ?device, window = ?request.window, "Device grabbed");
        Ok(GrabStatus::Success)
    }

    /// Releases `client`'s active grab on `device`.
    ///
    /// Does nothing if someone else holds the grab or `time` predates it.
    pub fn ungrab_device(
        &mut self,
        client: ClientId,
        device: DeviceId,
        time: Timestamp,
    ) -> Result<Vec<Dispatched>, RequestError> {
        self.check_device(device)?;

        let Some(grab) = self.grabs.active(device) else {
            return Ok(Vec::new());
        };
        if grab.owner != client || time.is_stale_against(grab.time) {
            debug!(?client, ?device, ?time, "Ignoring ungrab");
            return Ok(Vec::new());
        }

        let mut released = Vec::new();
        self.end_grab(device, &mut released);
        Ok(released)
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Events

    /// Routes one raw input event.
    pub fn process_event(&mut self, event: InputEvent) -> EventOutcome {
        self.now = self.now.max(event.time);

        if self.registry.device(event.device).is_none() {
            warn!(device = ?event.device, "Event from unknown device, delivering normally");
            return EventOutcome {
                delivery: Delivery::Focus,
                released: Vec::new(),
            };
        }

        let mut released = Vec::new();
        let delivery = self.route(&event, &mut released);
        EventOutcome { delivery, released }
    }

    /// Passes an event through the freeze machine, then dispatches it.
    fn route(&mut self, event: &InputEvent, released: &mut Vec<Dispatched>) -> Delivery {
        let devices = self.routing_devices(event.device);
        let replay_below = devices
            .iter()
            .find_map(|&device| self.grabs.active(device))
            .map(|grab| grab.window);

        let registry = &self.registry;
        let intercepted =
            self.freeze
                .intercept(event, &devices, |device| registry.paired(device), replay_below);

        match intercepted {
            Some(Intercepted::Held(_)) => Delivery::Held,
            Some(Intercepted::Queued(_)) => Delivery::Queued,
            None => self.dispatch(event, None, released),
        }
    }

    /// Decides who gets an event that is allowed through.
    ///
    /// With `replay_below` set, passive grabs are only looked for on windows below it.
    fn dispatch(
        &mut self,
        event: &InputEvent,
        replay_below: Option<WindowId>,
        released: &mut Vec<Dispatched>,
    ) -> Delivery {
        if let Some((class, touch_id, phase)) = event.kind.sequence() {
            return self.dispatch_sequence(event, class, touch_id, phase, replay_below);
        }

        let devices = self.routing_devices(event.device);

        if let Some(grab) = devices.iter().find_map(|&device| self.grabs.active(device)) {
            let (client, window, device) = (grab.owner, grab.window, grab.device);
            let ends = grab.is_released_by(&event.kind);
            trace!(?client, ?device, kind = ?event.kind, "Delivering to grab");

            if ends && !self.freeze.is_frozen(device) {
                self.end_grab(device, released);
            }
            return Delivery::Grab { client, window };
        }

        self.activate_passive(event, &devices, replay_below)
            .unwrap_or(Delivery::Focus)
    }

    fn activate_passive(
        &mut self,
        event: &InputEvent,
        devices: &[DeviceId],
        replay_below: Option<WindowId>,
    ) -> Option<Delivery> {
        let (kind, detail) = GrabKind::triggered_by(&event.kind)?;
        let grab = candidate_windows(&event.spine, replay_below)
            .iter()
            .find_map(|&window| {
                self.grabs
                    .lookup_passive(window, devices, kind, detail, event.modifiers)
            })?
            .clone();

        let device = grab.device();
        self.grabs
            .set_active(ActiveGrab::from_passive(&grab, detail, event.time));
        self.freeze.grab_started(device);

        let trigger = HeldEvent {
            event: event.clone(),
            delivered: true,
            replay_below: Some(grab.window()),
        };
        let frozen = self.freeze_for(
            device,
            grab.this_mode,
            grab.other_mode,
            Some(trigger),
            event.time,
        );

        debug!(
            owner = ?grab.owner,
            ?device,
            window = ?grab.window(),
            ?kind,
            detail,
            frozen,
            "Passive grab activated"
        );
        Some(Delivery::Activated {
            client: grab.owner,
            window: grab.window(),
            frozen,
        })
    }

    /// Freezes whatever a newly active grab's modes ask for. Returns whether the grabbed
    /// device itself froze.
    fn freeze_for(
        &mut self,
        device: DeviceId,
        this_mode: GrabMode,
        other_mode: GrabMode,
        trigger: Option<HeldEvent>,
        time: Timestamp,
    ) -> bool {
        if other_mode == GrabMode::Synchronous
            && let Some(partner) = self.registry.paired(device)
        {
            self.freeze.freeze_other(partner, device, time);
        }

        if this_mode == GrabMode::Synchronous {
            self.freeze.freeze_for_grab(device, trigger, time);
            return true;
        }
        false
    }

    fn dispatch_sequence(
        &mut self,
        event: &InputEvent,
        class: SequenceClass,
        touch_id: TouchId,
        phase: SequencePhase,
        replay_below: Option<WindowId>,
    ) -> Delivery {
        let device = event.device;

        if phase == SequencePhase::Begin {
            let devices = self.routing_devices(device);
            let kind = GrabKind::for_sequence(class);

            // Leaf first, so the grab closest to the root ends up on top.
            for &window in candidate_windows(&event.spine, replay_below).iter().rev() {
                if let Some(grab) =
                    self.grabs
                        .lookup_passive(window, &devices, kind, ANY_DETAIL, event.modifiers)
                {
                    let claimant = Claimant::new(grab.owner, window);
                    self.touch.claim(device, touch_id, class, claimant);
                }
            }
        }

        let recipients = self.touch.recipients(device, touch_id);
        if phase == SequencePhase::End && self.touch.end(device, touch_id).is_some() {
            trace!(?device, ?touch_id, "Sequence ended");
        }

        if recipients.is_empty() {
            Delivery::Focus
        } else {
            Delivery::Sequence { recipients }
        }
    }

    /// Clears a device's active grab and lets everything it froze go.
    fn end_grab(&mut self, device: DeviceId, released: &mut Vec<Dispatched>) {
        if let Some(grab) = self.grabs.clear_active(device) {
            debug!(?device, owner = ?grab.owner, "Grab released");
        }
        let thaw = self.freeze.grab_ended(device);
        self.apply_thaw(thaw, released);
    }

    /// Delivers what a thaw let go, in order: the replayed event, held events nobody
    /// saw yet, then the queues of the thawed devices.
    fn apply_thaw(&mut self, thaw: Thaw, released: &mut Vec<Dispatched>) -> Option<Dispatched> {
        let Thaw {
            release,
            replay,
            drain,
        } = thaw;

        let replayed = replay.map(|held| {
            trace!(device = ?held.event.device, "Replaying held event");
            let delivery = self.dispatch(&held.event, held.replay_below, released);
            Dispatched {
                event: held.event,
                delivery,
            }
        });

        for event in release {
            let delivery = self.dispatch(&event, None, released);
            released.push(Dispatched { event, delivery });
        }

        for device in drain {
            self.drain(device, released);
        }

        replayed
    }

    /// Routes a device's queued events until it runs dry or freezes again.
    fn drain(&mut self, device: DeviceId, released: &mut Vec<Dispatched>) {
        while let Some(event) = self.freeze.pop_queued(device) {
            let delivery = self.route(&event, released);
            released.push(Dispatched { event, delivery });
        }
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Lifecycle

    /// Drops every grab and claim `client` holds.
    pub fn client_disconnected(&mut self, client: ClientId) -> Revocation {
        let passive_removed = self.grabs.retain_passive(|grab| grab.owner != client);

        let mut released = Vec::new();
        for device in self.grabs.active_devices_of(client) {
            self.end_grab(device, &mut released);
        }

        let sequences = self.touch.revoke_client(client);

        debug!(
            ?client,
            passive_removed,
            sequences = sequences.len(),
            "Client grabs revoked"
        );
        Revocation {
            passive_removed,
            released,
            sequences,
        }
    }

    /// Drops every grab and claim made through `window` and forgets the window.
    pub fn window_destroyed(&mut self, window: WindowId) -> Revocation {
        let passive_removed = self.grabs.remove_window(window);

        let devices = self
            .grabs
            .active_grabs()
            .filter(|grab| grab.window == window)
            .map(|grab| grab.device)
            .collect::<Vec<_>>();
        let mut released = Vec::new();
        for device in devices {
            self.end_grab(device, &mut released);
        }

        let sequences = self.touch.revoke_window(window);
        self.registry.remove_window(window);

        debug!(?window, passive_removed, "Window grabs revoked");
        Revocation {
            passive_removed,
            released,
            sequences,
        }
    }
}

/// The part of `spine` a lookup may consider: everything below `replay_below`, or the
/// whole spine without it.
fn candidate_windows(spine: &[WindowId], replay_below: Option<WindowId>) -> &[WindowId] {
    let Some(below) = replay_below else {
        return spine;
    };
    match spine.iter().position(|&window| window == below) {
        Some(index) => &spine[index + 1..],
        None => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_skip_the_replaying_window_and_above() {
        let spine = [WindowId(1), WindowId(5), WindowId(9)];

        assert_eq!(candidate_windows(&spine, None), &spine);
        assert_eq!(candidate_windows(&spine, Some(WindowId(5))), &[WindowId(9)]);
        assert!(candidate_windows(&spine, Some(WindowId(9))).is_empty());
        assert!(candidate_windows(&spine, Some(WindowId(42))).is_empty());
    }
}
