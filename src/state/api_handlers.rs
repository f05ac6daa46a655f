// SPDX-License-Identifier: GPL-3.0-or-later

use tracing::trace_span;

use crate::{
    device::DeviceId,
    grab::{
        GrabStatus,
        passive::{GrabFailure, InstallRequest, UninstallRequest},
    },
    input::{ClientId, Timestamp},
};

use super::{
    AllowEventsReply, AllowEventsRequest, Arbiter, Dispatched, GrabDeviceRequest, RequestError,
    Revocation,
};

/// A client request aimed at the arbiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    InstallPassiveGrab(InstallRequest),
    UninstallPassiveGrab(UninstallRequest),
    AllowEvents(AllowEventsRequest),
    GrabDevice(GrabDeviceRequest),
    UngrabDevice { device: DeviceId, time: Timestamp },
    /// The client went away.
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    PassiveGrab { failures: Vec<GrabFailure> },
    Done,
    AllowEvents(AllowEventsReply),
    GrabDevice { status: GrabStatus },
    Ungrab { released: Vec<Dispatched> },
    Disconnected(Revocation),
}

impl Arbiter {
    pub fn handle_request(
        &mut self,
        client: ClientId,
        request: Request,
    ) -> Result<Reply, RequestError> {
        let _span = trace_span!("request", ?client).entered();

        match request {
            Request::InstallPassiveGrab(request) => {
                let failures = self.install_passive_grab(client, &request)?;
                Ok(Reply::PassiveGrab { failures })
            }
            Request::UninstallPassiveGrab(request) => {
                self.uninstall_passive_grab(client, &request)?;
                Ok(Reply::Done)
            }
            Request::AllowEvents(request) => {
                self.allow_events(client, &request).map(Reply::AllowEvents)
            }
            Request::GrabDevice(request) => {
                let status = self.grab_device(client, &request)?;
                Ok(Reply::GrabDevice { status })
            }
            Request::UngrabDevice { device, time } => {
                let released = self.ungrab_device(client, device, time)?;
                Ok(Reply::Ungrab { released })
            }
            Request::Disconnect => Ok(Reply::Disconnected(self.client_disconnected(client))),
        }
    }
}
