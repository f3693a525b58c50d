use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    mem,
    net::SocketAddr,
    time::{Duration, Instant}
};

use tokio::{
    sync::mpsc::{Sender, Receiver, UnboundedSender, channel, unbounded_channel},
    time
};

use tokio_stream::wrappers::IntervalStream;

use futures::stream::StreamExt;

use tracing::{debug, info, trace, warn};

use crate::{
    config::{Config, check_port},
    error::ConfigError,
    msg::{Msg2MudProtocol, Msg2Portal, ProtocolLink},
    protocols::{
        ConnectionDetails, Protocol,
        link::{
            ConnectionIn, ConnectionInMessage, ConnectionOut, ConnectionOutMessage,
            LinkEvent, LinkStub, ServerIn, ServerInMessage, PortalOut, PortalOutMessage
        }
    },
    util::generate_id
};

/// How often pending client events are batched onto the link and ended connections swept.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// How long a telnet client gets to negotiate before it is announced to the server.
pub const TELNET_READY_DELAY: Duration = Duration::from_millis(300);

const CLIENT_ID_LENGTH: usize = 20;

/// A validated listener that has not been bound yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerDef {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub tls: Option<String>
}

/// The portal's record of one live client socket.
#[derive(Debug)]
pub struct MudConnection {
    pub client_id: String,
    pub listener: String,
    pub created: Instant,
    pub started: bool,
    pub ended: bool,
    pub details: ConnectionDetails,
    // Events that arrived before the connection was started.
    pending: Vec<ConnectionIn>,
    tx_protocol: UnboundedSender<Msg2MudProtocol>
}

impl MudConnection {
    fn check_ready(&self, now: Instant) -> bool {
        match self.details.protocol {
            Protocol::Telnet => now.saturating_duration_since(self.created) >= TELNET_READY_DELAY,
            Protocol::WebSocket => true
        }
    }
}

/// Owns every client connection on the portal side. All methods are synchronous and take the
/// current time where it matters, so the Portal actor decides when things happen.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    listeners: BTreeMap<String, ListenerDef>,
    connections: HashMap<String, MudConnection>,
    in_events: Vec<ConnectionInMessage>
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register_listener(&mut self, name: &str, interface: &str, port: i64, protocol: Protocol,
                             tls: Option<&str>, config: &Config) -> Result<(), ConfigError> {
        if self.listeners.contains_key(name) {
            return Err(ConfigError::DuplicateListener(name.to_string()));
        }
        let host = config.resolve_interface(interface)
            .ok_or_else(|| ConfigError::UnknownInterface(interface.to_string()))?;
        let port = check_port(port)?;
        if let Some(t) = tls {
            if !config.tls.contains_key(t) {
                return Err(ConfigError::UnknownTls(t.to_string()));
            }
        }

        self.listeners.insert(name.to_string(), ListenerDef {
            name: name.to_string(),
            host,
            port,
            protocol,
            tls: tls.map(String::from)
        });
        Ok(())
    }

    pub fn register_from_config(&mut self, config: &Config) -> Result<(), ConfigError> {
        for (name, l) in config.listeners.iter() {
            self.register_listener(name, &l.interface, l.port, l.protocol, l.tls.as_deref(), config)?;
        }
        Ok(())
    }

    pub fn listeners(&self) -> impl Iterator<Item = &ListenerDef> {
        self.listeners.values()
    }

    /// Registers a newly accepted socket under a fresh client id.
    pub fn accept(&mut self, listener: &str, protocol: Protocol, addr: SocketAddr, tls: bool,
                  now: Instant) -> ProtocolLink {
        let client_id = generate_id(listener, CLIENT_ID_LENGTH, |id| self.connections.contains_key(id));
        let (tx_protocol, rx_protocol) = unbounded_channel();

        let mut details = ConnectionDetails::new(&client_id, protocol);
        details.host_address = addr.ip().to_string();
        details.host_port = addr.port();
        details.tls = tls;

        let conn = MudConnection {
            client_id: client_id.clone(),
            listener: listener.to_string(),
            created: now,
            started: false,
            ended: false,
            details: details.clone(),
            pending: Vec::new(),
            tx_protocol
        };
        self.connections.insert(client_id.clone(), conn);
        debug!(client_id = %client_id, listener, %addr, "client connected");

        // Websockets have nothing to negotiate, so they go live immediately.
        if protocol == Protocol::WebSocket {
            self.start(&client_id);
        }

        ProtocolLink {
            client_id,
            details,
            rx_protocol
        }
    }

    fn start(&mut self, client_id: &str) {
        if let Some(conn) = self.connections.get_mut(client_id) {
            conn.started = true;
            self.in_events.push(ConnectionInMessage::new(client_id, ConnectionIn::Ready(conn.details.clone())));
            for ev in conn.pending.drain(..) {
                self.in_events.push(ConnectionInMessage::new(client_id, ev));
            }
            info!(client_id, "client ready");
        }
    }

    pub fn client_event(&mut self, client_id: &str, ev: ConnectionIn) {
        match self.connections.get_mut(client_id) {
            Some(conn) if !conn.ended => {
                if conn.started {
                    self.in_events.push(ConnectionInMessage::new(client_id, ev));
                } else {
                    conn.pending.push(ev);
                }
            },
            _ => trace!(client_id, "dropping event from unknown client")
        }
    }

    pub fn client_update(&mut self, client_id: &str, mut details: ConnectionDetails) {
        if let Some(conn) = self.connections.get_mut(client_id) {
            if conn.ended {
                return;
            }
            details.client_id = conn.client_id.clone();
            conn.details = details;
            if conn.started {
                self.in_events.push(ConnectionInMessage::new(client_id, ConnectionIn::Update(conn.details.clone())));
            }
        }
    }

    /// Marks a client as gone. The record itself is removed on the next tick.
    pub fn client_disconnected(&mut self, client_id: &str, reason: &str) {
        if let Some(conn) = self.connections.get_mut(client_id) {
            if conn.ended {
                return;
            }
            conn.ended = true;
            conn.pending.clear();
            if conn.started {
                self.in_events.push(ConnectionInMessage::new(client_id, ConnectionIn::Disconnect(reason.to_string())));
            }
            info!(client_id, reason, "client disconnected");
        }
    }

    /// Promotes ready connections, drains the event list into one batch, and sweeps ended
    /// connections. Returns None when there was nothing to send.
    pub fn tick(&mut self, now: Instant) -> Option<ServerInMessage> {
        let ready: Vec<String> = self.connections.values()
            .filter(|c| !c.started && !c.ended && c.check_ready(now))
            .map(|c| c.client_id.clone())
            .collect();
        for client_id in ready {
            self.start(&client_id);
        }

        let batch = if self.in_events.is_empty() {
            None
        } else {
            Some(ServerInMessage::new(ServerIn::Events(mem::take(&mut self.in_events))))
        };

        self.connections.retain(|_, c| !c.ended);
        batch
    }

    /// Delivers server events to their connections. Unknown ids belong to clients that are
    /// already gone and are dropped.
    pub fn dispatch(&mut self, events: Vec<ConnectionOutMessage>) {
        for ev in events {
            let ended = match self.connections.get(&ev.client_id) {
                Some(conn) if !conn.ended => {
                    let (out, ended) = match ev.msg {
                        ConnectionOut::GameData(data) => (Msg2MudProtocol::Data(data), None),
                        ConnectionOut::Mssp(status) => (Msg2MudProtocol::ServerStatus(status), None),
                        ConnectionOut::Disconnect(reason) => (Msg2MudProtocol::Disconnect(reason.clone()), Some(reason))
                    };
                    if conn.tx_protocol.send(out).is_err() {
                        debug!(client_id = %ev.client_id, "connection task already finished");
                    }
                    ended
                },
                _ => {
                    trace!(client_id = %ev.client_id, "dropping server event for unknown client");
                    None
                }
            };
            if let Some(reason) = ended {
                self.client_disconnected(&ev.client_id, &reason);
            }
        }
    }

    /// Details of every started connection, for answering HELLO.
    pub fn snapshot(&self) -> Vec<ConnectionDetails> {
        self.connections.values()
            .filter(|c| c.started && !c.ended)
            .map(|c| c.details.clone())
            .collect()
    }

    pub fn get(&self, client_id: &str) -> Option<&MudConnection> {
        self.connections.get(client_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}


pub struct Portal {
    pub tx_portal: Sender<Msg2Portal>,
    rx_portal: Receiver<Msg2Portal>,
    registry: ConnectionRegistry,
    link: Option<LinkStub<ServerInMessage>>,
    // Set once the server has said HELLO on the current link.
    link_ready: bool,
    backlog: VecDeque<ServerInMessage>,
    running: bool
}

impl Portal {
    pub fn new(registry: ConnectionRegistry) -> Self {
        let (tx_portal, rx_portal) = channel(1024);
        Self {
            tx_portal,
            rx_portal,
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
                p_msg = self.rx_portal.recv() => {
                    match p_msg {
                        Some(msg) => self.process_portal_message(msg),
                        None => self.running = false
                    }
                },
                i_msg = interval_timer.next() => {
                    if let Some(ins) = i_msg {
                        self.handle_interval_timer(ins.into_std());
                    }
                }
            }
        }

        if let Some(link) = self.link.take() {
            link.close();
        }
        info!("portal stopped");
    }

    fn handle_interval_timer(&mut self, now: Instant) {
        if let Some(batch) = self.registry.tick(now) {
            self.send_or_queue(batch);
        }
    }

    fn process_portal_message(&mut self, msg: Msg2Portal) {
        match msg {
            Msg2Portal::Kill => self.running = false,
            Msg2Portal::ClientAccepted(req) => {
                let link = self.registry.accept(&req.listener, req.protocol, req.addr, req.tls, Instant::now());
                if let Err(link) = req.tx_response.send(link) {
                    self.registry.client_disconnected(&link.client_id, "abandoned during accept");
                }
            },
            Msg2Portal::FromClient(client_id, ev) => self.registry.client_event(&client_id, ev),
            Msg2Portal::ClientUpdate(client_id, details) => self.registry.client_update(&client_id, details),
            Msg2Portal::ClientDisconnected(client_id, reason) => self.registry.client_disconnected(&client_id, &reason),
            Msg2Portal::Link(ev) => self.process_link_event(ev),
            Msg2Portal::ListConnections(tx) => {
                let _ = tx.send(self.registry.snapshot());
            }
        }
    }

    fn process_link_event(&mut self, ev: LinkEvent<PortalOutMessage, ServerInMessage>) {
        match ev {
            LinkEvent::Connected(stub) => {
                // Handshakes finish out of order; the most recently accepted link wins.
                if let Some(current) = &self.link {
                    if current.link_id > stub.link_id {
                        info!(link_id = stub.link_id, current = current.link_id, "dropping link older than the current one");
                        stub.close();
                        return;
                    }
                }
                info!(link_id = stub.link_id, peer = %stub.peer, "server link connected");
                if let Some(old) = self.link.replace(stub) {
                    info!(link_id = old.link_id, "superseding previous server link");
                    old.close();
                }
                self.link_ready = false;
            },
            LinkEvent::Message(link_id, msg) => {
                if self.link.as_ref().map(|l| l.link_id) == Some(link_id) {
                    self.process_server_message(msg);
                } else {
                    debug!(link_id, "ignoring message from a stale link");
                }
            },
            LinkEvent::Disconnected(link_id, reason) => {
                if self.link.as_ref().map(|l| l.link_id) == Some(link_id) {
                    warn!(link_id, reason = %reason, "server link lost");
                    self.link = None;
                    self.link_ready = false;
                }
            }
        }
    }

    fn process_server_message(&mut self, msg: PortalOutMessage) {
        match msg.msg {
            PortalOut::Events(events) => self.registry.dispatch(events),
            PortalOut::Hello => {
                let snapshot = self.registry.snapshot();
                info!(process_id = msg.process_id, connections = snapshot.len(), "server said hello, sending snapshot");
                if let Some(link) = &self.link {
                    if link.send(ServerInMessage::new(ServerIn::Hello(snapshot))).is_ok() {
                        self.link_ready = true;
                    }
                }
                self.flush_backlog();
            },
            PortalOut::System(data) => {
                debug!(process_id = msg.process_id, %data, "system message from server");
            }
        }
    }

    fn send_or_queue(&mut self, msg: ServerInMessage) {
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
    use std::collections::HashSet;
    use tokio::sync::mpsc::UnboundedReceiver;
    use crate::protocols::GameData;

    fn addr() -> SocketAddr {
        "127.0.0.1:5555".parse().unwrap()
    }

    fn events(batch: Option<ServerInMessage>) -> Vec<ConnectionInMessage> {
        match batch.map(|b| b.msg) {
            Some(ServerIn::Events(evs)) => evs,
            None => Vec::new(),
            Some(other) => panic!("unexpected batch {:?}", other)
        }
    }

    fn line(text: &str) -> ConnectionIn {
        ConnectionIn::GameData(vec![GameData::line(text)])
    }

    fn accept(reg: &mut ConnectionRegistry, protocol: Protocol, now: Instant) -> (String, UnboundedReceiver<Msg2MudProtocol>) {
        let link = reg.accept("telnet", protocol, addr(), false, now);
        (link.client_id, link.rx_protocol)
    }

    #[test]
    fn register_listener_validates() {
        let mut conf = Config::default();
        conf.tls.insert("main".into(), crate::config::Keys { key: "k".into(), pem: "p".into() });
        let mut reg = ConnectionRegistry::new();

        reg.register_listener("telnet", "any", 4000, Protocol::Telnet, None, &conf).unwrap();
        assert!(matches!(reg.register_listener("telnet", "any", 4001, Protocol::Telnet, None, &conf),
                         Err(ConfigError::DuplicateListener(_))));
        assert!(matches!(reg.register_listener("a", "mars", 4001, Protocol::Telnet, None, &conf),
                         Err(ConfigError::UnknownInterface(_))));
        assert!(matches!(reg.register_listener("b", "any", 65536, Protocol::Telnet, None, &conf),
                         Err(ConfigError::InvalidPort(65536))));
        assert!(matches!(reg.register_listener("c", "any", 4002, Protocol::Telnet, Some("nope"), &conf),
                         Err(ConfigError::UnknownTls(_))));
        reg.register_listener("d", "loopback", 4003, Protocol::WebSocket, Some("main"), &conf).unwrap();

        let defs: Vec<&ListenerDef> = reg.listeners().collect();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "d");
        assert_eq!(defs[0].host, "127.0.0.1");
        assert_eq!(defs[0].tls.as_deref(), Some("main"));
    }

    #[test]
    fn telnet_waits_for_grace_window_then_reports_ready() {
        let mut reg = ConnectionRegistry::new();
        let t0 = Instant::now();
        let (id, _rx) = accept(&mut reg, Protocol::Telnet, t0);

        assert!(events(reg.tick(t0 + Duration::from_millis(100))).is_empty());
        assert!(!reg.get(&id).unwrap().started);

        let evs = events(reg.tick(t0 + Duration::from_millis(301)));
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].client_id, id);
        match &evs[0].msg {
            ConnectionIn::Ready(d) => {
                assert_eq!(d.width, 78);
                assert_eq!(d.height, 24);
                assert_eq!(d.client_id, id);
            },
            other => panic!("expected READY, got {:?}", other)
        }
        assert!(reg.get(&id).unwrap().started);
    }

    #[test]
    fn negotiation_before_start_lands_in_ready() {
        let mut reg = ConnectionRegistry::new();
        let t0 = Instant::now();
        let (id, _rx) = accept(&mut reg, Protocol::Telnet, t0);

        let mut details = reg.get(&id).unwrap().details.clone();
        details.width = 120;
        details.naws = true;
        reg.client_update(&id, details);
        reg.client_event(&id, line("look"));

        assert!(events(reg.tick(t0 + Duration::from_millis(50))).is_empty());
        let evs = events(reg.tick(t0 + Duration::from_millis(350)));
        assert_eq!(evs.len(), 2);
        match &evs[0].msg {
            ConnectionIn::Ready(d) => assert_eq!(d.width, 120),
            other => panic!("expected READY, got {:?}", other)
        }
        assert_eq!(evs[1].msg, line("look"));
    }

    #[test]
    fn websocket_is_ready_immediately() {
        let mut reg = ConnectionRegistry::new();
        let t0 = Instant::now();
        let (id, _rx) = accept(&mut reg, Protocol::WebSocket, t0);
        assert!(reg.get(&id).unwrap().started);
        let evs = events(reg.tick(t0));
        assert!(matches!(evs[0].msg, ConnectionIn::Ready(_)));
    }

    #[test]
    fn events_keep_producer_order_per_client() {
        let mut reg = ConnectionRegistry::new();
        let t0 = Instant::now();
        let (a, _ra) = accept(&mut reg, Protocol::WebSocket, t0);
        let (b, _rb) = accept(&mut reg, Protocol::WebSocket, t0);
        reg.tick(t0);

        reg.client_event(&a, line("a1"));
        reg.client_event(&b, line("b1"));
        reg.client_event(&a, line("a2"));
        reg.client_event(&b, line("b2"));
        reg.client_event(&a, line("a3"));

        let evs = events(reg.tick(t0));
        let for_a: Vec<&ConnectionIn> = evs.iter().filter(|e| e.client_id == a).map(|e| &e.msg).collect();
        let for_b: Vec<&ConnectionIn> = evs.iter().filter(|e| e.client_id == b).map(|e| &e.msg).collect();
        assert_eq!(for_a, vec![&line("a1"), &line("a2"), &line("a3")]);
        assert_eq!(for_b, vec![&line("b1"), &line("b2")]);
        assert!(reg.tick(t0).is_none());
    }

    #[test]
    fn live_client_ids_are_distinct() {
        let mut reg = ConnectionRegistry::new();
        let t0 = Instant::now();
        let mut live: Vec<String> = Vec::new();
        for round in 0..50 {
            let (id, _rx) = accept(&mut reg, Protocol::Telnet, t0);
            live.push(id);
            if round % 3 == 0 {
                let gone = live.remove(0);
                reg.client_disconnected(&gone, "quit");
                reg.tick(t0);
            }
            let unique: HashSet<&String> = live.iter().collect();
            assert_eq!(unique.len(), live.len());
            assert_eq!(reg.len(), live.len());
        }
    }

    #[test]
    fn disconnect_is_swept_on_tick() {
        let mut reg = ConnectionRegistry::new();
        let t0 = Instant::now();
        let (id, _rx) = accept(&mut reg, Protocol::WebSocket, t0);
        reg.tick(t0);

        reg.client_disconnected(&id, "closed");
        assert!(reg.get(&id).unwrap().ended);
        let evs = events(reg.tick(t0));
        assert_eq!(evs, vec![ConnectionInMessage::new(&id, ConnectionIn::Disconnect("closed".into()))]);
        assert!(reg.get(&id).is_none());
    }

    #[test]
    fn unstarted_disconnect_is_never_announced() {
        let mut reg = ConnectionRegistry::new();
        let t0 = Instant::now();
        let (id, _rx) = accept(&mut reg, Protocol::Telnet, t0);
        reg.client_event(&id, line("early"));
        reg.client_disconnected(&id, "closed");
        assert!(reg.tick(t0 + Duration::from_secs(1)).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn dispatch_routes_to_connection() {
        let mut reg = ConnectionRegistry::new();
        let t0 = Instant::now();
        let (id, mut rx) = accept(&mut reg, Protocol::WebSocket, t0);
        reg.tick(t0);

        reg.dispatch(vec![
            ConnectionOutMessage::new(&id, ConnectionOut::GameData(vec![GameData::line("hi")])),
            ConnectionOutMessage::new(&id, ConnectionOut::Mssp(vec![("NAME".into(), "x".into())])),
        ]);
        assert_eq!(rx.try_recv().unwrap(), Msg2MudProtocol::Data(vec![GameData::line("hi")]));
        assert_eq!(rx.try_recv().unwrap(), Msg2MudProtocol::ServerStatus(vec![("NAME".into(), "x".into())]));
    }

    #[test]
    fn dispatch_to_unknown_client_is_dropped() {
        let mut reg = ConnectionRegistry::new();
        reg.dispatch(vec![ConnectionOutMessage::new("c1", ConnectionOut::Disconnect("bye".into()))]);
        assert!(reg.is_empty());
        assert!(reg.tick(Instant::now()).is_none());
    }

    #[test]
    fn server_disconnect_delivers_then_removes() {
        let mut reg = ConnectionRegistry::new();
        let t0 = Instant::now();
        let (id, mut rx) = accept(&mut reg, Protocol::WebSocket, t0);
        reg.tick(t0);

        reg.dispatch(vec![ConnectionOutMessage::new(&id, ConnectionOut::Disconnect("kicked".into()))]);
        assert_eq!(rx.try_recv().unwrap(), Msg2MudProtocol::Disconnect("kicked".into()));
        assert!(reg.snapshot().is_empty());

        let evs = events(reg.tick(t0));
        assert_eq!(evs, vec![ConnectionInMessage::new(&id, ConnectionIn::Disconnect("kicked".into()))]);
        assert!(reg.get(&id).is_none());
    }

    #[test]
    fn snapshot_only_lists_started_connections() {
        let mut reg = ConnectionRegistry::new();
        let t0 = Instant::now();
        let (ws, _r1) = accept(&mut reg, Protocol::WebSocket, t0);
        let (_tel, _r2) = accept(&mut reg, Protocol::Telnet, t0);
        let snap = reg.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].client_id, ws);
        reg.tick(t0 + TELNET_READY_DELAY);
        assert_eq!(reg.snapshot().len(), 2);
    }

    #[test]
    fn update_after_start_is_forwarded() {
        let mut reg = ConnectionRegistry::new();
        let t0 = Instant::now();
        let (id, _rx) = accept(&mut reg, Protocol::WebSocket, t0);
        reg.tick(t0);

        let mut details = reg.get(&id).unwrap().details.clone();
        details.height = 60;
        reg.client_update(&id, details.clone());
        let evs = events(reg.tick(t0));
        assert_eq!(evs, vec![ConnectionInMessage::new(&id, ConnectionIn::Update(details))]);
    }

    #[test]
    fn late_handshake_of_older_link_is_ignored() {
        let mut portal = Portal::new(ConnectionRegistry::new());
        let (newer, mut rx_newer) = LinkStub::detached(2);
        let (older, _rx_older) = LinkStub::detached(1);

        portal.process_link_event(LinkEvent::Connected(newer));
        portal.process_link_event(LinkEvent::Connected(older.clone()));
        assert_eq!(portal.link.as_ref().map(|l| l.link_id), Some(2));
        assert!(older.send(ServerInMessage::new(ServerIn::Hello(Vec::new()))).is_err());

        // Messages on the older link are stale; the newer link still answers HELLO.
        portal.process_link_event(LinkEvent::Message(1, PortalOutMessage::new(PortalOut::Hello)));
        assert!(rx_newer.try_recv().is_err());
        portal.process_link_event(LinkEvent::Message(2, PortalOutMessage::new(PortalOut::Hello)));
        match rx_newer.try_recv().map(|m| m.msg) {
            Ok(ServerIn::Hello(snapshot)) => assert!(snapshot.is_empty()),
            other => panic!("expected a snapshot, got {:?}", other)
        }
    }

    #[test]
    fn newer_link_replaces_current() {
        let mut portal = Portal::new(ConnectionRegistry::new());
        let (first, _rx_first) = LinkStub::detached(1);
        let (second, _rx_second) = LinkStub::detached(2);

        portal.process_link_event(LinkEvent::Connected(first.clone()));
        portal.process_link_event(LinkEvent::Connected(second));
        assert_eq!(portal.link.as_ref().map(|l| l.link_id), Some(2));
        assert!(first.send(ServerInMessage::new(ServerIn::Hello(Vec::new()))).is_err());
    }
}
