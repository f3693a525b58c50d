use std::{
    collections::{HashMap, VecDeque, hash_map::Entry},
    time::Duration
};

use tokio::{
    sync::mpsc::{Sender, Receiver, channel},
    time
};

use tokio_stream::wrappers::IntervalStream;

use futures::stream::StreamExt;

use tracing::{debug, info, trace, warn};

use crate::{
    msg::Msg2Server,
    protocols::{
        ConnectionDetails,
        link::{
            ConnectionIn, ConnectionInMessage, LinkEvent, LinkStub,
            ServerIn, ServerInMessage, PortalOut, PortalOutMessage
        }
    },
    session::{Session, SessionHandler}
};

/// How often sessions are flushed onto the link.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Owns every Session on the server side, keyed by client id.
pub struct SessionRegistry<H> {
    sessions: HashMap<String, Session>,
    handler: H,
    next_serial: u64
}

impl<H: SessionHandler> SessionRegistry<H> {
    pub fn new(handler: H) -> Self {
        Self {
            sessions: Default::default(),
            handler,
            next_serial: 0
        }
    }

    /// Refreshes the session for `details.client_id`, creating it if needed. Nothing else
    /// inserts into the registry.
    pub fn get_or_create(&mut self, details: ConnectionDetails) -> &mut Session {
        let Self { sessions, handler, next_serial } = self;
        match sessions.entry(details.client_id.clone()) {
            Entry::Occupied(e) => {
                let session = e.into_mut();
                session.details = details;
                session
            },
            Entry::Vacant(e) => {
                *next_serial += 1;
                let session = e.insert(Session::new(details, *next_serial));
                handler.on_connect(session);
                session
            }
        }
    }

    pub fn process_event(&mut self, ev: ConnectionInMessage) {
        let ConnectionInMessage { client_id, msg } = ev;
        match msg {
            ConnectionIn::Ready(mut details) => {
                details.client_id = client_id;
                self.get_or_create(details);
            },
            ConnectionIn::Disconnect(reason) => {
                match self.sessions.remove(&client_id) {
                    Some(mut session) => self.handler.on_disconnect(&mut session, &reason),
                    None => trace!(client_id = %client_id, "disconnect for unknown session")
                }
            },
            other => {
                let Some(session) = self.sessions.get_mut(&client_id) else {
                    trace!(client_id = %client_id, "dropping event for unknown session");
                    return;
                };
                if let ConnectionIn::Update(details) = &other {
                    session.details = details.clone();
                    session.details.client_id = client_id.clone();
                }
                self.handler.on_event(session, &other);
            }
        }
    }

    /// Rebuilds the session set from a portal snapshot. Sessions missing from the snapshot stay.
    pub fn process_hello(&mut self, snapshot: Vec<ConnectionDetails>) {
        for details in snapshot {
            self.get_or_create(details);
        }
    }

    pub fn process_message(&mut self, msg: ServerInMessage) {
        match msg.msg {
            ServerIn::Events(events) => {
                for ev in events {
                    self.process_event(ev);
                }
            },
            ServerIn::Hello(snapshot) => {
                info!(process_id = msg.process_id, connections = snapshot.len(), "portal snapshot received");
                self.process_hello(snapshot);
            },
            ServerIn::System(data) => {
                debug!(process_id = msg.process_id, %data, "system message from portal");
            }
        }
    }

    /// Flushes every session and gathers the results into one batch, or None if all were idle.
    pub fn tick(&mut self) -> Option<PortalOutMessage> {
        let mut events = Vec::new();
        for session in self.sessions.values_mut().filter(|s| s.has_pending()) {
            session.flush();
            events.extend(session.take_out_events());
        }
        if events.is_empty() {
            None
        } else {
            Some(PortalOutMessage::new(PortalOut::Events(events)))
        }
    }

    pub fn get(&self, client_id: &str) -> Option<&Session> {
        self.sessions.get(client_id)
    }

    pub fn details(&self) -> Vec<ConnectionDetails> {
        self.sessions.values().map(|s| s.details.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}


pub struct Server<H> {
    pub tx_server: Sender<Msg2Server>,
    rx_server: Receiver<Msg2Server>,
    registry: SessionRegistry<H>,
    link: Option<LinkStub<PortalOutMessage>>,
    // Set once HELLO went out on the current link.
    link_ready: bool,
    backlog: VecDeque<PortalOutMessage>,
    running: bool
}

impl<H: SessionHandler> Server<H> {
    pub fn new(registry: SessionRegistry<H>) -> Self {
        let (tx_server, rx_server) = channel(1024);
        Self {
            tx_server,
            rx_server,
            registry,
            link: None,
            link_ready: false,
            backlog: Default::default(),
            running: true
        }
    }

    pub async fn run(&mut self) {
        let mut interval_timer = IntervalStream::new(time::interval(TICK_INTERVAL));

        while self.running {
            tokio::select! {
                s_msg = self.rx_server.recv() => {
                    match s_msg {
                        Some(msg) => self.process_server_message(msg),
                        None => self.running = false
                    }
                },
                i_msg = interval_timer.next() => {
                    if i_msg.is_some() {
                        if let Some(batch) = self.registry.tick() {
                            self.send_or_queue(batch);
                        }
                    }
                }
            }
        }

        if let Some(link) = self.link.take() {
            link.close();
        }
        info!("server stopped");
    }

    fn process_server_message(&mut self, msg: Msg2Server) {
        match msg {
            Msg2Server::Kill => self.running = false,
            Msg2Server::Link(ev) => self.process_link_event(ev),
            Msg2Server::ListSessions(tx) => {
                let _ = tx.send(self.registry.details());
            }
        }
    }

    fn process_link_event(&mut self, ev: LinkEvent<ServerInMessage, PortalOutMessage>) {
        match ev {
            LinkEvent::Connected(stub) => {
                info!(link_id = stub.link_id, peer = %stub.peer, "portal link connected");
                let hello = stub.send(PortalOutMessage::new(PortalOut::Hello));
                if let Some(old) = self.link.replace(stub) {
                    old.close();
                }
                self.link_ready = hello.is_ok();
                self.flush_backlog();
            },
            LinkEvent::Message(link_id, msg) => {
                if self.link.as_ref().map(|l| l.link_id) == Some(link_id) {
                    self.registry.process_message(msg);
                } else {
                    debug!(link_id, "ignoring message from a stale link");
                }
            },
            LinkEvent::Disconnected(link_id, reason) => {
                if self.link.as_ref().map(|l| l.link_id) == Some(link_id) {
                    warn!(link_id, reason = %reason, "portal link lost");
                    self.link = None;
                    self.link_ready = false;
                }
            }
        }
    }

    fn send_or_queue(&mut self, msg: PortalOutMessage) {
        if self.link_ready {
            if let Some(link) = &self.link {
                match link.send(msg) {
                    Ok(()) => return,
                    Err(msg) => {
                        self.link_ready = false;
                        self.backlog.push_back(msg);
                        return;
                    }
                }
            }
        }
        self.backlog.push_back(msg);
    }

    fn flush_backlog(&mut self) {
        while self.link_ready {
            let Some(msg) = self.backlog.pop_front() else {
                break;
            };
            let Some(link) = &self.link else {
                self.backlog.push_front(msg);
                break;
            };
            if let Err(msg) = link.send(msg) {
                self.link_ready = false;
                self.backlog.push_front(msg);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocols::{GameData, Protocol, link::{ConnectionOut, ConnectionOutMessage}},
        session::StatusHandler
    };

    #[derive(Default)]
    struct Recorder {
        connects: Vec<String>,
        disconnects: Vec<(String, String)>,
        seen: Vec<(String, ConnectionIn)>
    }

    impl SessionHandler for Recorder {
        fn on_connect(&mut self, session: &mut Session) {
            self.connects.push(session.client_id.clone());
        }

        fn on_disconnect(&mut self, session: &mut Session, reason: &str) {
            self.disconnects.push((session.client_id.clone(), reason.to_string()));
        }

        fn on_event(&mut self, session: &mut Session, ev: &ConnectionIn) {
            self.seen.push((session.client_id.clone(), ev.clone()));
            if let ConnectionIn::GameData(data) = ev {
                for d in data {
                    session.send(d.clone());
                }
            }
        }
    }

    fn details(id: &str) -> ConnectionDetails {
        ConnectionDetails::new(id, Protocol::Telnet)
    }

    fn ready(id: &str) -> ConnectionInMessage {
        ConnectionInMessage::new(id, ConnectionIn::Ready(details(id)))
    }

    fn line(id: &str, text: &str) -> ConnectionInMessage {
        ConnectionInMessage::new(id, ConnectionIn::GameData(vec![GameData::line(text)]))
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut reg = SessionRegistry::new(Recorder::default());
        let first = reg.get_or_create(details("a")).serial();
        let second = reg.get_or_create(details("a")).serial();
        assert_eq!(first, second);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.handler.connects, vec![String::from("a")]);
    }

    #[test]
    fn get_or_create_refreshes_details() {
        let mut reg = SessionRegistry::new(Recorder::default());
        reg.get_or_create(details("a"));
        let mut wide = details("a");
        wide.width = 200;
        reg.get_or_create(wide);
        assert_eq!(reg.get("a").unwrap().details.width, 200);
    }

    #[test]
    fn events_for_unknown_sessions_are_dropped() {
        let mut reg = SessionRegistry::new(Recorder::default());
        reg.process_event(line("ghost", "hello"));
        reg.process_event(ConnectionInMessage::new("ghost", ConnectionIn::Disconnect("gone".into())));
        assert!(reg.is_empty());
        assert!(reg.handler.seen.is_empty());
        assert!(reg.handler.disconnects.is_empty());
    }

    #[test]
    fn batch_is_processed_in_order() {
        let mut reg = SessionRegistry::new(Recorder::default());
        reg.process_message(ServerInMessage::new(ServerIn::Events(vec![
            ready("a"),
            line("a", "1"),
            ready("b"),
            line("b", "x"),
            line("a", "2"),
            line("a", "3"),
        ])));

        let for_a: Vec<&ConnectionIn> = reg.handler.seen.iter().filter(|(id, _)| id == "a").map(|(_, ev)| ev).collect();
        assert_eq!(for_a, vec![&line("a", "1").msg, &line("a", "2").msg, &line("a", "3").msg]);

        let batch = reg.tick().unwrap();
        match batch.msg {
            PortalOut::Events(events) => {
                let a: Vec<ConnectionOutMessage> = events.into_iter().filter(|e| e.client_id == "a").collect();
                assert_eq!(a, vec![ConnectionOutMessage::new("a", ConnectionOut::GameData(vec![
                    GameData::line("1"), GameData::line("2"), GameData::line("3")
                ]))]);
            },
            other => panic!("unexpected {:?}", other)
        }
    }

    #[test]
    fn idle_tick_sends_nothing() {
        let mut reg = SessionRegistry::new(Recorder::default());
        reg.get_or_create(details("a"));
        assert!(reg.tick().is_none());
    }

    #[test]
    fn disconnect_runs_hook_and_removes() {
        let mut reg = SessionRegistry::new(Recorder::default());
        reg.process_event(ready("a"));
        reg.process_event(ConnectionInMessage::new("a", ConnectionIn::Disconnect("quit".into())));
        assert!(reg.get("a").is_none());
        assert_eq!(reg.handler.disconnects, vec![(String::from("a"), String::from("quit"))]);
    }

    #[test]
    fn hello_keeps_sessions_missing_from_snapshot() {
        let mut reg = SessionRegistry::new(Recorder::default());
        reg.process_event(ready("stale"));
        reg.process_hello(vec![details("a"), details("b")]);
        assert_eq!(reg.len(), 3);
        assert!(reg.get("stale").is_some());
    }

    #[test]
    fn hello_restores_every_snapshot_entry() {
        let mut reg = SessionRegistry::new(Recorder::default());
        reg.process_message(ServerInMessage::new(ServerIn::Hello(
            (0..5).map(|i| details(&format!("c{}", i))).collect()
        )));
        assert_eq!(reg.len(), 5);
        reg.process_message(ServerInMessage::new(ServerIn::Hello(
            (0..5).map(|i| details(&format!("c{}", i))).collect()
        )));
        assert_eq!(reg.len(), 5);
        assert_eq!(reg.handler.connects.len(), 5);
    }

    #[test]
    fn update_replaces_details_on_known_session() {
        let mut reg = SessionRegistry::new(StatusHandler::default());
        reg.process_event(ready("a"));
        let mut d = details("a");
        d.client_name = String::from("MUDLET");
        reg.process_event(ConnectionInMessage::new("a", ConnectionIn::Update(d)));
        assert_eq!(reg.get("a").unwrap().details.client_name, "MUDLET");
    }
}
