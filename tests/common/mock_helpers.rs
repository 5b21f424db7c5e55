//! Local WebSocket producer for subscription tests

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

/// What the server does once a client has received the scripted frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterScript {
    /// Keep the connection open, echoing binary messages back
    Echo,
    /// Close the connection
    Close,
}

/// Producer that sends a fixed list of binary messages to every client
pub struct TestServer {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn spawn(script: Vec<Vec<u8>>, after: AfterScript) -> Self {
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();

        let conn_count = Arc::clone(&connections);
        let inbox = Arc::clone(&received);
        let handle = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("test runtime");
            runtime.block_on(async move {
                let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
                addr_tx.send(listener.local_addr().expect("addr")).expect("addr channel");

                let accept_loop = async {
                    loop {
                        let Ok((stream, _)) = listener.accept().await else {
                            return;
                        };
                        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                            continue;
                        };
                        conn_count.fetch_add(1, Ordering::SeqCst);

                        for msg in &script {
                            if ws.send(Message::Binary(msg.clone().into())).await.is_err() {
                                break;
                            }
                        }

                        if after == AfterScript::Close {
                            let _ = ws.close(None).await;
                            continue;
                        }

                        while let Some(Ok(msg)) = ws.next().await {
                            match msg {
                                Message::Binary(data) => {
                                    inbox.lock().expect("inbox").push(data.to_vec());
                                    if ws.send(Message::Binary(data)).await.is_err() {
                                        break;
                                    }
                                }
                                Message::Close(_) => break,
                                _ => {}
                            }
                        }
                    }
                };

                tokio::select! {
                    _ = shutdown_rx => {}
                    _ = accept_loop => {}
                }
            });
        });

        let addr = addr_rx.recv().expect("server address");
        Self {
            addr,
            connections,
            received,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Device base URL the subscription derives its stream URL from
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of completed WebSocket handshakes
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Binary messages the clients sent
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().expect("inbox").clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A local address nothing is listening on
pub fn unused_local_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr")
}
