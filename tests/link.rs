use std::{net::SocketAddr, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::{
    net::TcpStream,
    sync::{mpsc::Sender, oneshot},
    task::JoinHandle,
    time::{sleep, timeout}
};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::protocol::Message;

use mudbridge::{
    msg::{ConnectRequest, Msg2Portal, Msg2Server, ProtocolLink},
    networking::{LinkAcceptor, LinkConnector},
    portal::{ConnectionRegistry, Portal},
    protocols::{
        ConnectionDetails, Protocol,
        link::{Envelope, PortalOut, PortalOutMessage, ServerIn, ServerInMessage}
    },
    server::{Server, SessionRegistry},
    session::StatusHandler
};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_portal() -> (Sender<Msg2Portal>, SocketAddr) {
    start_portal_on(0).await
}

async fn start_portal_on(port: u16) -> (Sender<Msg2Portal>, SocketAddr) {
    let mut portal = Portal::new(ConnectionRegistry::new());
    let tx_portal = portal.tx_portal.clone();
    let mut acceptor = LinkAcceptor::bind("127.0.0.1", port, tx_portal.clone()).await.unwrap();
    let addr = acceptor.local_addr().unwrap();
    tokio::spawn(async move { acceptor.run().await });
    tokio::spawn(async move { portal.run().await });
    (tx_portal, addr)
}

async fn say_hello(ws: &mut Ws) -> Vec<ConnectionDetails> {
    let hello = PortalOutMessage::new(PortalOut::Hello).encode().unwrap();
    ws.send(Message::Text(hello)).await.unwrap();
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next()).await
            .expect("no reply to hello")
            .expect("link closed")
            .unwrap();
        if let Message::Text(text) = frame {
            let msg = ServerInMessage::decode(text.as_bytes()).unwrap();
            if let ServerIn::Hello(snapshot) = msg.msg {
                return snapshot;
            }
        }
    }
}

async fn add_websocket_client(tx_portal: &Sender<Msg2Portal>, port: u16) -> ProtocolLink {
    let (tx_response, rx_response) = oneshot::channel();
    tx_portal.send(Msg2Portal::ClientAccepted(ConnectRequest {
        listener: String::from("web"),
        protocol: Protocol::WebSocket,
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
        tls: false,
        tx_response
    })).await.unwrap();
    rx_response.await.unwrap()
}

async fn wait_for_sessions(tx_server: &Sender<Msg2Server>, want: usize) -> Vec<ConnectionDetails> {
    let mut last = Vec::new();
    for _ in 0..100 {
        let (tx, rx) = oneshot::channel();
        tx_server.send(Msg2Server::ListSessions(tx)).await.unwrap();
        last = rx.await.unwrap();
        if last.len() == want {
            return last;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("expected {} sessions, have {}", want, last.len());
}

async fn list_connections(tx_portal: &Sender<Msg2Portal>) -> Vec<ConnectionDetails> {
    let (tx, rx) = oneshot::channel();
    tx_portal.send(Msg2Portal::ListConnections(tx)).await.unwrap();
    rx.await.unwrap()
}

fn start_server(link: SocketAddr) -> (Sender<Msg2Server>, JoinHandle<()>) {
    let mut server = Server::new(SessionRegistry::new(StatusHandler::default()));
    let tx_server = server.tx_server.clone();
    let mut connector = LinkConnector::new("127.0.0.1", link.port(), tx_server.clone());
    tokio::spawn(async move { server.run().await });
    let handle = tokio::spawn(async move { connector.run().await });
    (tx_server, handle)
}

#[tokio::test]
async fn newer_link_supersedes_older() {
    let (_tx_portal, addr) = start_portal().await;
    let url = format!("ws://{}", addr);

    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    assert!(say_hello(&mut first).await.is_empty());

    let (mut second, _) = connect_async(url.as_str()).await.unwrap();
    assert!(say_hello(&mut second).await.is_empty());

    // The portal drops the first link once the second one shows up.
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue
            }
        }
    }).await;
    assert!(closed.is_ok(), "first link was never closed");

    // And the second keeps working.
    assert!(say_hello(&mut second).await.is_empty());
}

#[tokio::test]
async fn hello_rebuilds_sessions_after_reconnect() {
    let (tx_portal, addr) = start_portal().await;

    let mut links = Vec::new();
    for port in 0..5 {
        links.push(add_websocket_client(&tx_portal, 40000 + port).await);
    }
    let mut ids: Vec<String> = links.iter().map(|l| l.client_id.clone()).collect();
    ids.sort();

    let (tx_server, connector) = start_server(addr);
    let mut seen: Vec<String> = wait_for_sessions(&tx_server, 5).await.into_iter().map(|d| d.client_id).collect();
    seen.sort();
    assert_eq!(seen, ids);

    // Drop the server's link and bring up a brand new server with no sessions at all.
    connector.abort();
    let _ = tx_server.send(Msg2Server::Kill).await;

    let (tx_server, _connector) = start_server(addr);
    let restored = wait_for_sessions(&tx_server, 5).await;
    let mut seen: Vec<String> = restored.iter().map(|d| d.client_id.clone()).collect();
    seen.sort();
    assert_eq!(seen, ids);
    assert!(restored.iter().all(|d| d.protocol == Protocol::WebSocket));
}

#[tokio::test]
async fn malformed_frame_leaves_link_open() {
    let (_tx_portal, addr) = start_portal().await;
    let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

    ws.send(Message::Text(String::from("garbage{"))).await.unwrap();
    ws.send(Message::Text(String::from(r#"{"process_id":1,"msg":{"type":"BOGUS"}}"#))).await.unwrap();
    assert!(say_hello(&mut ws).await.is_empty());
}

#[tokio::test]
async fn server_keeps_retrying_and_reconnects() {
    // Reserve a port, then start the server before anything listens on it.
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let link = SocketAddr::from(([127, 0, 0, 1], port));
    let (tx_server, _connector) = start_server(link);
    sleep(Duration::from_millis(350)).await;

    let (tx_portal, addr) = start_portal_on(port).await;
    assert_eq!(addr.port(), port);
    let mut links = Vec::new();
    for p in 0..3 {
        links.push(add_websocket_client(&tx_portal, 41000 + p).await);
    }
    wait_for_sessions(&tx_server, 3).await;

    // Take the link away from the server. It has to notice and dial back in by itself.
    let (mut intruder, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    assert_eq!(say_hello(&mut intruder).await.len(), 3);
    let dropped = timeout(Duration::from_secs(5), async {
        loop {
            match intruder.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue
            }
        }
    }).await;
    assert!(dropped.is_ok(), "server never reclaimed the link");

    links.push(add_websocket_client(&tx_portal, 41003).await);
    let sessions = wait_for_sessions(&tx_server, 4).await;
    let mut seen: Vec<String> = sessions.into_iter().map(|d| d.client_id).collect();
    seen.sort();
    let mut ids: Vec<String> = links.iter().map(|l| l.client_id.clone()).collect();
    ids.sort();
    assert_eq!(seen, ids);
    assert_eq!(list_connections(&tx_portal).await.len(), 4);

    // Killing the portal stops its actor; its mailbox closes behind it.
    tx_portal.send(Msg2Portal::Kill).await.unwrap();
    let stopped = timeout(Duration::from_secs(5), async {
        loop {
            let (tx, _rx) = oneshot::channel();
            if tx_portal.send(Msg2Portal::ListConnections(tx)).await.is_err() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
    }).await;
    assert!(stopped.is_ok(), "portal kept running after Kill");
}
