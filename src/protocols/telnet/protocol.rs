use std::collections::HashMap;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc::{Sender, UnboundedReceiver}
};

use tokio_util::codec::Framed;

use bytes::{BytesMut, Bytes, BufMut, Buf};

use futures::{
    sink::SinkExt,
    stream::StreamExt
};

use serde_json::Value as JsonValue;

use once_cell::sync::Lazy;

use tracing::{debug, trace};

use crate::{
    msg::{Msg2MudProtocol, Msg2Portal, ProtocolLink},
    protocols::{
        Color, ConnectionDetails, GameData,
        link::ConnectionIn,
        telnet::{
            codec::{TelnetCodec, TelnetEvent},
            codes as tc
        }
    },
    util::ensure_crlf
};


#[derive(Default, Clone, Debug)]
pub struct TelnetOptionPerspective {
    pub enabled: bool,
    // Negotiating is true if WE have sent a request.
    pub negotiating: bool
}

#[derive(Default, Clone, Debug)]
pub struct TelnetOptionState {
    pub remote: TelnetOptionPerspective,
    pub local: TelnetOptionPerspective,
}

#[derive(Default, Clone)]
pub struct TelnetOption {
    pub allow_local: bool,
    pub allow_remote: bool,
    pub start_local: bool,
    pub start_remote: bool,
}

static TELNET_OPTIONS: Lazy<HashMap<u8, TelnetOption>> = Lazy::new( || {
    let mut map: HashMap<u8, TelnetOption> = Default::default();

    map.insert(tc::SGA, TelnetOption {allow_local: true, allow_remote: false, start_remote: false, start_local: true});
    map.insert(tc::NAWS, TelnetOption {allow_local: false, allow_remote: true, start_remote: true, start_local: false});
    map.insert(tc::MTTS, TelnetOption {allow_local: false, allow_remote: true, start_remote: true, start_local: false});
    map.insert(tc::MSSP, TelnetOption {allow_local: true, allow_remote: false, start_remote: false, start_local: true});
    map.insert(tc::GMCP, TelnetOption {allow_local: true, allow_remote: false, start_remote: false, start_local: true});
    map.insert(tc::MSDP, TelnetOption {allow_local: true, allow_remote: false, start_remote: false, start_local: false});
    map.insert(tc::MNES, TelnetOption {allow_local: false, allow_remote: true, start_remote: false, start_local: false});
    map.insert(tc::LINEMODE, TelnetOption {allow_local: false, allow_remote: true, start_remote: true, start_local: false});
    map.insert(tc::TELOPT_EOR, TelnetOption {allow_local: true, allow_remote: false, start_remote: false, start_local: true});
    map
});

/// Longest line a client may send before it is disconnected.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

// Clients that are known to render xterm 256 colors even if they never say so.
const XTERM256_CLIENTS: &[&str] = &[
    "ATLANTIS", "CMUD", "KILDCLIENT", "MUDLET", "MUSHCLIENT", "PUTTY", "BEIP", "POTATO", "TINYFUGUE"
];


/// One telnet client. Negotiation results are folded into `details` and reported to the portal
/// whenever they change; everything typed by the user goes to the portal as line GAMEDATA.
pub struct TelnetProtocol<T> {
    client_id: String,
    op_state: HashMap<u8, TelnetOptionState>,
    details: ConnectionDetails,
    // The details the portal was last told about.
    reported: ConnectionDetails,
    ttype_count: u8,
    ttype_last: Option<String>,
    conn: Framed<T, TelnetCodec>,
    tx_portal: Sender<Msg2Portal>,
    rx_protocol: UnboundedReceiver<Msg2MudProtocol>,
    running: bool,
    reason: String,
    app_buffer: BytesMut
}


impl<T> TelnetProtocol<T> where T: AsyncRead + AsyncWrite + Send + 'static + Unpin {
    pub fn new(link: ProtocolLink, conn: Framed<T, TelnetCodec>, tx_portal: Sender<Msg2Portal>) -> Self {
        let ProtocolLink { client_id, details, rx_protocol } = link;
        Self {
            client_id,
            op_state: Default::default(),
            reported: details.clone(),
            details,
            ttype_count: 0,
            ttype_last: None,
            conn,
            tx_portal,
            rx_protocol,
            running: true,
            reason: String::from("connection closed"),
            app_buffer: BytesMut::with_capacity(1024)
        }
    }

    pub async fn run(&mut self) {
        // Initialize Telnet Op handlers.
        for (code, tel_op) in TELNET_OPTIONS.iter() {
            let mut state = TelnetOptionState::default();
            if tel_op.start_local {
                state.local.negotiating = true;
                let _ = self.conn.feed(TelnetEvent::Negotiate(tc::WILL, *code)).await;
            }
            if tel_op.start_remote {
                state.remote.negotiating = true;
                let _ = self.conn.feed(TelnetEvent::Negotiate(tc::DO, *code)).await;
            }
            self.op_state.insert(*code, state);
        }
        if let Err(e) = self.conn.flush().await {
            self.reason = e.to_string();
            self.running = false;
        }

        while self.running {
            tokio::select! {
                t_msg = self.conn.next() => {
                    match t_msg {
                        Some(Ok(msg)) => self.process_telnet_event(msg).await,
                        Some(Err(e)) => {
                            self.reason = e.to_string();
                            self.running = false;
                        },
                        None => self.running = false
                    }
                },
                p_msg = self.rx_protocol.recv() => {
                    match p_msg {
                        Some(msg) => self.process_protocol_message(msg).await,
                        None => {
                            self.reason = String::from("portal shut down");
                            self.running = false;
                        }
                    }
                }
            }

            if self.details != self.reported {
                self.reported = self.details.clone();
                let _ = self.tx_portal.send(Msg2Portal::ClientUpdate(self.client_id.clone(), self.details.clone())).await;
            }
        }

        let _ = self.conn.close().await;
        debug!(client_id = %self.client_id, reason = %self.reason, "telnet connection finished");
        let _ = self.tx_portal.send(Msg2Portal::ClientDisconnected(self.client_id.clone(), self.reason.clone())).await;
    }

    async fn send_event(&mut self, ev: TelnetEvent) {
        if let Err(e) = self.conn.send(ev).await {
            self.reason = e.to_string();
            self.running = false;
        }
    }

    async fn to_portal(&mut self, ev: ConnectionIn) {
        let _ = self.tx_portal.send(Msg2Portal::FromClient(self.client_id.clone(), ev)).await;
    }

    async fn process_telnet_event(&mut self, msg: TelnetEvent) {
        match msg {
            TelnetEvent::SubNegotiate(op, data) => self.receive_sub(op, data).await,
            TelnetEvent::Negotiate(comm, op) => self.receive_negotiate(comm, op).await,
            TelnetEvent::Command(byte) => {
                trace!(client_id = %self.client_id, command = byte, "telnet command");
            },
            TelnetEvent::Data(data) => {
                self.app_buffer.put(data);
                self.process_app_buffer().await;
            }
        }
    }

    async fn process_app_buffer(&mut self) {
        while let Some(ipos) = self.app_buffer.as_ref().iter().position(|b| b == &tc::LF) {
            let mut cmd = self.app_buffer.split_to(ipos);
            self.app_buffer.advance(1);
            if cmd.last() == Some(&tc::CR) {
                cmd.truncate(cmd.len() - 1);
            }
            let line = String::from_utf8_lossy(&cmd).into_owned();
            self.to_portal(ConnectionIn::GameData(vec![GameData::line(&line)])).await;
        }
        if self.app_buffer.len() > MAX_LINE_LENGTH {
            self.app_buffer.clear();
            self.reason = String::from("line too long");
            self.running = false;
        }
    }

    async fn process_protocol_message(&mut self, msg: Msg2MudProtocol) {
        match msg {
            Msg2MudProtocol::Disconnect(reason) => {
                self.reason = reason;
                self.running = false;
            },
            Msg2MudProtocol::Data(v) => {
                for d in v {
                    self.process_protocol_message_data(d).await;
                }
            },
            Msg2MudProtocol::ServerStatus(status) => {
                let mut data = BytesMut::new();
                for (k, v) in status {
                    data.put_u8(tc::MSSP_VAR);
                    data.put(k.as_bytes());
                    data.put_u8(tc::MSSP_VAL);
                    data.put(v.as_bytes());
                }
                self.send_event(TelnetEvent::SubNegotiate(tc::MSSP, data.freeze())).await;
            }
        }
    }

    async fn process_protocol_message_data(&mut self, d: GameData) {
        let text = d.args.first().and_then(|v| v.as_str()).map(String::from);

        match d.cmd.trim().to_lowercase().as_str() {
            "line" => {
                if let Some(s) = text {
                    let mut out = ensure_crlf(&s);
                    out.push_str("\r\n");
                    self.send_event(TelnetEvent::Data(Bytes::from(out))).await;
                }
            },
            "text" => {
                if let Some(s) = text {
                    self.send_event(TelnetEvent::Data(Bytes::from(ensure_crlf(&s)))).await;
                }
            },
            "prompt" => {
                if let Some(s) = text {
                    self.send_event(TelnetEvent::Data(Bytes::from(ensure_crlf(&s)))).await;
                    self.send_event(TelnetEvent::Command(tc::GA)).await;
                }
            },
            _ => {
                // Anything else goes out as GMCP: IAC SB GMCP <cmd> [args, kwargs] IAC SE.
                if !self.details.gmcp {
                    trace!(client_id = %self.client_id, cmd = %d.cmd, "client has no GMCP, dropping");
                    return;
                }
                let json_data = JsonValue::Array(vec![JsonValue::Array(d.args), JsonValue::Object(d.kwargs)]);
                let gmcp_out = format!("{} {}", d.cmd, json_data);
                self.send_event(TelnetEvent::SubNegotiate(tc::GMCP, Bytes::from(gmcp_out))).await;
            }
        }
    }

    async fn receive_negotiate(&mut self, command: u8, op: u8) {
        // This means we received an IAC will/wont/do/dont...
        let mut enable_local = false;
        let mut disable_local = false;
        let mut enable_remote = false;
        let mut disable_remote = false;
        let mut respond: u8 = 0;

        if let (Some(state), Some(opt)) = (self.op_state.get_mut(&op), TELNET_OPTIONS.get(&op)) {
            // We DO have a handler for this option... that means we support it!
            match command {
                tc::WILL => {
                    // The remote host has sent a WILL. They either want to Locally-Enable op, or are
                    // doing so at our request.
                    if !opt.allow_remote {
                        respond = tc::DONT;
                    } else if !state.remote.enabled {
                        if state.remote.negotiating {
                            state.remote.negotiating = false;
                        } else {
                            respond = tc::DO;
                        }
                        enable_remote = true;
                        state.remote.enabled = true;
                    }
                },
                tc::WONT => {
                    // The client has refused an option we wanted to enable. Alternatively, it has
                    // disabled an option that was on.
                    state.remote.negotiating = false;
                    if state.remote.enabled {
                        disable_remote = true;
                        state.remote.enabled = false;
                    }
                },
                tc::DO => {
                    // The client wants the Server to enable Option, or they are acknowledging our
                    // desire to do so.
                    if !opt.allow_local {
                        respond = tc::WONT;
                    } else if !state.local.enabled {
                        if state.local.negotiating {
                            state.local.negotiating = false;
                        } else {
                            respond = tc::WILL;
                        }
                        enable_local = true;
                        state.local.enabled = true;
                    }
                },
                tc::DONT => {
                    // The client wants the server to disable Option, or are they are refusing our
                    // desire to do so.
                    state.local.negotiating = false;
                    if state.local.enabled {
                        disable_local = true;
                        state.local.enabled = false
                    }
                },
                _ => {}
            }
        } else {
            // We do not have a handler for this option, whatever it is... do not support.
            respond = match command {
                tc::WILL => tc::DONT,
                tc::DO => tc::WONT,
                _ => 0
            };
        }

        if respond > 0 {
            self.send_event(TelnetEvent::Negotiate(respond, op)).await;
        }
        if enable_local {
            self.enable_local(op).await;
        }
        if disable_local {
            self.disable_local(op);
        }
        if enable_remote {
            self.enable_remote(op).await;
        }
        if disable_remote {
            self.disable_remote(op);
        }
    }

    async fn enable_remote(&mut self, op: u8) {
        match op {
            tc::NAWS => self.details.naws = true,
            tc::MTTS => {
                self.details.ttype = true;
                self.request_ttype().await;
            },
            tc::LINEMODE => self.details.linemode = true,
            tc::MNES => self.details.mnes = true,
            _ => {}
        }
    }

    fn disable_remote(&mut self, op: u8) {
        match op {
            tc::NAWS => {
                self.details.naws = false;
                self.details.width = 78;
                self.details.height = 24;
            }
            tc::MTTS => {
                self.details.ttype = false;
                self.ttype_last = None;
            },
            tc::LINEMODE => self.details.linemode = false,
            tc::MNES => self.details.mnes = false,
            _ => {}
        }
    }

    async fn enable_local(&mut self, op: u8) {
        match op {
            tc::SGA => self.details.suppress_ga = true,
            tc::GMCP => {
                self.details.gmcp = true;
                self.details.oob = true;
            },
            tc::MSDP => {
                self.details.msdp = true;
                self.details.oob = true;
            },
            tc::MSSP => {
                self.details.mssp = true;
                self.to_portal(ConnectionIn::ReqStatus).await;
            },
            _ => {}
        }
    }

    fn disable_local(&mut self, op: u8) {
        match op {
            tc::SGA => self.details.suppress_ga = false,
            tc::GMCP => self.details.gmcp = false,
            tc::MSDP => self.details.msdp = false,
            tc::MSSP => self.details.mssp = false,
            _ => {}
        }
        self.details.oob = self.details.gmcp || self.details.msdp;
    }

    async fn receive_sub(&mut self, op: u8, data: Bytes) {
        if !self.op_state.contains_key(&op) {
            // Only if we can get a handler, do we want to care about this.
            // All other sub-data is ignored.
            return;
        }

        match op {
            tc::NAWS => self.receive_naws(data),
            tc::MTTS => self.receive_ttype(data).await,
            tc::GMCP => {
                if let Some(d) = parse_gmcp(&data) {
                    self.to_portal(ConnectionIn::GameData(vec![d])).await;
                }
            },
            _ => {}
        }
    }

    async fn request_ttype(&mut self) {
        self.send_event(TelnetEvent::SubNegotiate(tc::MTTS, Bytes::from_static(&[tc::TTYPE_SEND]))).await;
    }

    async fn receive_ttype(&mut self, mut data: Bytes) {
        if data.len() < 2 || data[0] != tc::TTYPE_IS || !self.details.ttype || self.ttype_count > 2 {
            return;
        }
        data.advance(1);

        let upper = String::from_utf8_lossy(&data).trim().to_uppercase();

        // Clients without MTTS repeat the same answer; that ends the cycle.
        if self.ttype_last.as_deref() == Some(upper.as_str()) {
            self.ttype_count = 3;
            self.ttype_last = None;
            return;
        }

        match self.ttype_count {
            0 => self.receive_ttype_0(&upper),
            1 => self.receive_ttype_1(&upper),
            _ => self.receive_ttype_2(&upper)
        }
        self.ttype_count += 1;
        self.ttype_last = Some(upper);
        if self.ttype_count < 3 {
            self.request_ttype().await;
        }
    }

    fn receive_ttype_0(&mut self, data: &str) {
        // The first TTYPE receives the name of the client.
        // version might also be in here as a second word.
        match data.split_once(' ') {
            Some((name, version)) => {
                self.details.client_name = name.to_string();
                self.details.client_version = version.to_string();
            },
            None => self.details.client_name = data.to_string()
        }

        // Now that the name and version (may be UNKNOWN) are set... we can deduce capabilities.
        let name = self.details.client_name.as_str();
        if XTERM256_CLIENTS.contains(&name) || name.starts_with("XTERM") || name.ends_with("-256COLOR") {
            self.details.color = self.details.color.max(Color::Xterm256);
        }
    }

    fn receive_ttype_1(&mut self, data: &str) {
        if data.starts_with("XTERM") || data.ends_with("-256COLOR") {
            self.details.color = self.details.color.max(Color::Xterm256);
        }
    }

    fn receive_ttype_2(&mut self, data: &str) {
        let Some(value) = data.strip_prefix("MTTS ") else {
            return;
        };
        let mtts: usize = value.trim().parse().unwrap_or(0);
        if mtts == 0 {
            return;
        }
        self.details.mtts = true;

        if (1 & mtts) == 1 {
            self.details.color = self.details.color.max(Color::Standard);
        }
        if (2 & mtts) == 2 {
            self.details.vt100 = true;
        }
        if (4 & mtts) == 4 {
            self.details.utf8 = true;
        }
        if (8 & mtts) == 8 {
            self.details.color = self.details.color.max(Color::Xterm256);
        }
        if (16 & mtts) == 16 {
            self.details.mouse_tracking = true;
        }
        if (32 & mtts) == 32 {
            self.details.osc_color_palette = true;
        }
        if (64 & mtts) == 64 {
            self.details.screen_reader = true;
        }
        if (128 & mtts) == 128 {
            self.details.proxy = true;
        }
        if (256 & mtts) == 256 {
            self.details.color = self.details.color.max(Color::TrueColor);
        }
        if (512 & mtts) == 512 {
            self.details.mnes = true;
        }
    }

    fn receive_naws(&mut self, mut data: Bytes) {
        if data.len() >= 4 {
            self.details.width = data.get_u16();
            self.details.height = data.get_u16();
        }
    }
}

// `<package>[ <json>]`. A body that is not valid json is passed along as a string.
fn parse_gmcp(data: &[u8]) -> Option<GameData> {
    let s = String::from_utf8_lossy(data);
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    match s.split_once(' ') {
        Some((cmd, body)) => {
            let value = serde_json::from_str(body).unwrap_or_else(|_| JsonValue::from(body));
            Some(GameData::new(cmd, vec![value]))
        },
        None => Some(GameData::new(s, Vec::new()))
    }
}
