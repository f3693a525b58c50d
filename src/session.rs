use std::mem;

use tracing::{debug, info};

use crate::protocols::{
    ConnectionDetails, GameData,
    link::{ConnectionIn, ConnectionOut, ConnectionOutMessage}
};

/// The server's counterpart of one portal connection.
#[derive(Debug)]
pub struct Session {
    pub client_id: String,
    pub details: ConnectionDetails,
    // Registry-assigned, distinct for every Session ever created in the process.
    serial: u64,
    outbox: Vec<GameData>,
    out_events: Vec<ConnectionOut>
}

impl Session {
    pub fn new(details: ConnectionDetails, serial: u64) -> Self {
        Self {
            client_id: details.client_id.clone(),
            details,
            serial,
            outbox: Default::default(),
            out_events: Default::default()
        }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn send(&mut self, data: GameData) {
        self.outbox.push(data);
    }

    pub fn send_mssp(&mut self, status: Vec<(String, String)>) {
        self.flush();
        self.out_events.push(ConnectionOut::Mssp(status));
    }

    /// Asks the portal to drop this client once everything queued before it was delivered.
    pub fn disconnect(&mut self, reason: &str) {
        self.flush();
        self.out_events.push(ConnectionOut::Disconnect(reason.to_string()));
    }

    /// Moves buffered game data into one GAMEDATA event.
    pub fn flush(&mut self) {
        if !self.outbox.is_empty() {
            self.out_events.push(ConnectionOut::GameData(mem::take(&mut self.outbox)));
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.outbox.is_empty() || !self.out_events.is_empty()
    }

    pub fn take_out_events(&mut self) -> Vec<ConnectionOutMessage> {
        mem::take(&mut self.out_events)
            .into_iter()
            .map(|msg| ConnectionOutMessage::new(&self.client_id, msg))
            .collect()
    }
}

/// Game logic plugs in here. Every hook runs on the server actor, in event order.
pub trait SessionHandler: Send {
    fn on_connect(&mut self, _session: &mut Session) {}

    fn on_disconnect(&mut self, _session: &mut Session, _reason: &str) {}

    fn on_event(&mut self, _session: &mut Session, _ev: &ConnectionIn) {}
}

/// Handler used when no game is attached: answers status requests and logs the rest.
#[derive(Debug, Clone, Default)]
pub struct StatusHandler {
    mssp: Vec<(String, String)>
}

impl StatusHandler {
    pub fn new(mssp: Vec<(String, String)>) -> Self {
        Self { mssp }
    }
}

impl SessionHandler for StatusHandler {
    fn on_connect(&mut self, session: &mut Session) {
        info!(client_id = %session.client_id, protocol = %session.details.protocol,
              client = %session.details.client_name, "session created");
    }

    fn on_disconnect(&mut self, session: &mut Session, reason: &str) {
        info!(client_id = %session.client_id, reason, "session ended");
    }

    fn on_event(&mut self, session: &mut Session, ev: &ConnectionIn) {
        match ev {
            ConnectionIn::ReqStatus => session.send_mssp(self.mssp.clone()),
            ConnectionIn::GameData(data) => {
                for d in data {
                    debug!(client_id = %session.client_id, cmd = %d.cmd, "game data");
                }
            },
            ConnectionIn::Update(details) => {
                debug!(client_id = %session.client_id, width = details.width, height = details.height, "client updated");
            },
            _ => {}
        }
    }
}
