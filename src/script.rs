// SPDX-License-Identifier: GPL-3.0-or-later

//! Replay scripts.
//!
//! A script is a TOML list of steps: client requests, raw input events, and window
//! destruction. Replaying feeds them to an [`Arbiter`] in order and collects what
//! happened at each step.

use std::{fmt, path::Path};

use anyhow::Context;
use tracing::{info, warn};

use crate::{
    device::DeviceId,
    freeze::AllowMode,
    grab::{
        GrabKind, GrabMode,
        passive::{InstallRequest, UninstallRequest},
    },
    input::{ClientId, CursorId, EventKind, InputEvent, ModifierMask, Timestamp, TouchId, WindowId},
    state::{
        AllowEventsMode, AllowEventsRequest, Arbiter, EventOutcome, GrabDeviceRequest,
        RequestError, Revocation,
        api_handlers::{Reply, Request},
    },
};

#[derive(serde::Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Install {
        client: ClientId,
        device: DeviceId,
        window: WindowId,
        cursor: Option<CursorId>,
        kind: GrabKind,
        #[serde(default)]
        detail: u32,
        #[serde(default)]
        owner_events: bool,
        this_mode: GrabMode,
        other_mode: GrabMode,
        #[serde(default)]
        event_mask: u32,
        /// Raw modifier values, so illegal ones can be scripted too.
        modifiers: Vec<u32>,
    },
    Uninstall {
        client: ClientId,
        device: DeviceId,
        window: WindowId,
        kind: GrabKind,
        #[serde(default)]
        detail: u32,
        modifiers: Vec<u32>,
    },
    AllowEvents {
        client: ClientId,
        device: DeviceId,
        #[serde(default)]
        time: Timestamp,
        mode: AllowMode,
    },
    AcceptTouch {
        client: ClientId,
        device: DeviceId,
        touch_id: TouchId,
        window: WindowId,
    },
    RejectTouch {
        client: ClientId,
        device: DeviceId,
        touch_id: TouchId,
        window: WindowId,
    },
    GrabDevice {
        client: ClientId,
        device: DeviceId,
        window: WindowId,
        cursor: Option<CursorId>,
        #[serde(default)]
        owner_events: bool,
        this_mode: GrabMode,
        other_mode: GrabMode,
        #[serde(default)]
        event_mask: u32,
        #[serde(default)]
        time: Timestamp,
    },
    UngrabDevice {
        client: ClientId,
        device: DeviceId,
        #[serde(default)]
        time: Timestamp,
    },
    Event {
        device: DeviceId,
        time: Timestamp,
        #[serde(default)]
        modifiers: u32,
        /// Windows under the event, root first.
        #[serde(default)]
        spine: Vec<WindowId>,
        kind: EventKind,
    },
    Disconnect {
        client: ClientId,
    },
    DestroyWindow {
        window: WindowId,
    },
}

enum Action {
    Request(ClientId, Request),
    Event(InputEvent),
    DestroyWindow(WindowId),
}

impl Step {
    fn into_action(self) -> Action {
        match self {
            Step::Install {
                client,
                device,
                window,
                cursor,
                kind,
                detail,
                owner_events,
                this_mode,
                other_mode,
                event_mask,
                modifiers,
            } => Action::Request(
                client,
                Request::InstallPassiveGrab(InstallRequest {
                    device,
                    window,
                    cursor,
                    grab_type: kind.code(),
                    detail,
                    owner_events,
                    this_mode: this_mode.code(),
                    other_mode: other_mode.code(),
                    event_mask,
                    modifiers,
                }),
            ),
            Step::Uninstall {
                client,
                device,
                window,
                kind,
                detail,
                modifiers,
            } => Action::Request(
                client,
                Request::UninstallPassiveGrab(UninstallRequest {
                    device,
                    window,
                    grab_type: kind.code(),
                    detail,
                    modifiers,
                }),
            ),
            Step::AllowEvents {
                client,
                device,
                time,
                mode,
            } => Action::Request(
                client,
                Request::AllowEvents(AllowEventsRequest {
                    device,
                    time,
                    mode: AllowEventsMode::Device(mode),
                }),
            ),
            Step::AcceptTouch {
                client,
                device,
                touch_id,
                window,
            } => Action::Request(
                client,
                Request::AllowEvents(AllowEventsRequest {
                    device,
                    time: Timestamp::CURRENT_TIME,
                    mode: AllowEventsMode::AcceptTouch { touch_id, window },
                }),
            ),
            Step::RejectTouch {
                client,
                device,
                touch_id,
                window,
            } => Action::Request(
                client,
                Request::AllowEvents(AllowEventsRequest {
                    device,
                    time: Timestamp::CURRENT_TIME,
                    mode: AllowEventsMode::RejectTouch { touch_id, window },
                }),
            ),
            Step::GrabDevice {
                client,
                device,
                window,
                cursor,
                owner_events,
                this_mode,
                other_mode,
                event_mask,
                time,
            } => Action::Request(
                client,
                Request::GrabDevice(GrabDeviceRequest {
                    device,
                    window,
                    cursor,
                    owner_events,
                    this_mode,
                    other_mode,
                    event_mask,
                    time,
                }),
            ),
            Step::UngrabDevice {
                client,
                device,
                time,
            } => Action::Request(client, Request::UngrabDevice { device, time }),
            Step::Event {
                device,
                time,
                modifiers,
                spine,
                kind,
            } => Action::Event(
                InputEvent::new(device, time, kind)
                    .with_modifiers(ModifierMask::from_bits_truncate(modifiers))
                    .with_spine(spine),
            ),
            Step::Disconnect { client } => Action::Request(client, Request::Disconnect),
            Step::DestroyWindow { window } => Action::DestroyWindow(window),
        }
    }
}

/// What one step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Reply(Reply),
    Error(RequestError),
    Event(EventOutcome),
    WindowDestroyed(Revocation),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Reply(reply) => write!(f, "ok: {reply:?}"),
            StepOutcome::Error(err) => write!(f, "error: {err}"),
            StepOutcome::Event(outcome) => {
                write!(f, "event: {:?}", outcome.delivery)?;
                for released in outcome.released.iter() {
                    write!(f, "; released {:?} -> {:?}", released.event.kind, released.delivery)?;
                }
                Ok(())
            }
            StepOutcome::WindowDestroyed(revocation) => write!(f, "destroyed: {revocation:?}"),
        }
    }
}

impl Script {
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("Failed to deserialize script")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script at {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Bad script at {}", path.display()))
    }

    /// Runs every step against `arbiter`, in order.
    ///
    /// A failing request does not stop the script.
    pub fn replay(self, arbiter: &mut Arbiter) -> Vec<StepOutcome> {
        info!(steps = self.steps.len(), "Replaying script");

        self.steps
            .into_iter()
            .map(|step| match step.into_action() {
                Action::Request(client, request) => {
                    match arbiter.handle_request(client, request) {
                        Ok(reply) => StepOutcome::Reply(reply),
                        Err(err) => {
                            warn!(?client, "Request failed: {err}");
                            StepOutcome::Error(err)
                        }
                    }
                }
                Action::Event(event) => StepOutcome::Event(arbiter.process_event(event)),
                Action::DestroyWindow(window) => {
                    StepOutcome::WindowDestroyed(arbiter.window_destroyed(window))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::{config::Config, grab::GrabStatus};

    const CONFIG: &str = r#"
        windows = [1, 10]

        [[device]]
        id = 2
        role = "master_pointer"
    "#;

    #[test]
    fn steps_parse_from_toml() -> anyhow::Result<()> {
        let script = Script::parse(
            r#"
            [[step]]
            action = "install"
            client = 1
            device = 2
            window = 10
            kind = "button"
            detail = 1
            this_mode = "sync"
            other_mode = "async"
            modifiers = [0]

            [[step]]
            action = "event"
            device = 2
            time = 5
            spine = [1, 10]
            kind = { type = "button", button = 1, pressed = true }

            [[step]]
            action = "allow_events"
            client = 1
            device = 2
            mode = "replay_device"
            "#,
        )?;

        assert_eq!(script.steps.len(), 3);
        assert_matches!(
            script.steps[2],
            Step::AllowEvents {
                mode: AllowMode::ReplayDevice,
                time: Timestamp::CURRENT_TIME,
                ..
            }
        );
        Ok(())
    }

    #[test]
    fn replay_keeps_going_after_errors() -> anyhow::Result<()> {
        let mut arbiter = Arbiter::new(Config::parse(CONFIG)?.build_registry()?);
        let script = Script::parse(
            r#"
            [[step]]
            action = "grab_device"
            client = 1
            device = 99
            window = 10
            this_mode = "async"
            other_mode = "async"

            [[step]]
            action = "grab_device"
            client = 1
            device = 2
            window = 10
            this_mode = "async"
            other_mode = "async"
            "#,
        )?;

        let outcomes = script.replay(&mut arbiter);

        assert_matches!(
            outcomes[0],
            StepOutcome::Error(RequestError::BadDevice(DeviceId(99)))
        );
        assert_eq!(
            outcomes[1],
            StepOutcome::Reply(Reply::GrabDevice {
                status: GrabStatus::Success
            })
        );
        Ok(())
    }
}
