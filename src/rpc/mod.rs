//! Remote control over TCP
//!
//! Clients send one JSON request per line and get one JSON response per
//! line:
//!
//! ```text
//! {"method":"play","note":{"note":60,"velocity":100}}
//! {"method":"control","ctrl":{"num":106,"value":64}}
//! {"method":"load_preset","name":"rom1a#3"}
//! {"method":"algorithm","index":5}
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::dx7::{Ctrl, Dx7, Note};

/// A remote control request
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    Play {
        #[serde(default)]
        note: Option<Note>,
    },
    Control {
        #[serde(default)]
        ctrl: Option<Ctrl>,
    },
    LoadPreset {
        name: String,
    },
    Algorithm {
        index: u8,
    },
}

/// Reply to a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// For control requests: whether the controller is routed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routed: Option<bool>,
}

impl Response {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
            routed: None,
        }
    }

    fn error(e: impl ToString) -> Self {
        Self {
            ok: false,
            error: Some(e.to_string()),
            routed: None,
        }
    }
}

/// Run a request against the session
pub fn handle(dx7: &Dx7, request: Request) -> Response {
    let result = match request {
        Request::Play { note } => dx7.on_note(note).map(|_| None),
        Request::Control { ctrl } => dx7.on_control(ctrl).map(Some),
        Request::LoadPreset { name } => dx7.load_preset(&name).map(|_| None),
        Request::Algorithm { index } => dx7.select_algorithm(index).map(|_| None),
    };
    match result {
        Ok(routed) => Response { routed, ..Response::ok() },
        Err(e) => {
            log::warn!("rpc request failed: {}", e);
            Response::error(e)
        }
    }
}

/// Decode and run one request line
pub fn handle_line(dx7: &Dx7, line: &str) -> Response {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => {
            log::debug!("rpc {:?}", request);
            handle(dx7, request)
        }
        Err(e) => Response::error(format!("bad request: {}", e)),
    }
}

/// Bind the listening socket
pub async fn bind(addr: &str) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("serving rpc on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept clients until the listener fails
pub async fn serve(listener: TcpListener, dx7: Arc<Dx7>) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let dx7 = dx7.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_client(stream, peer, dx7).await {
                log::warn!("rpc client {}: {}", peer, e);
            }
        });
    }
}

async fn serve_client(stream: TcpStream, peer: SocketAddr, dx7: Arc<Dx7>) -> io::Result<()> {
    log::debug!("rpc client {} connected", peer);
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let dx7 = dx7.clone();
        // Session calls block on locks and engine round trips
        let response = tokio::task::spawn_blocking(move || handle_line(&dx7, &line))
            .await
            .unwrap_or_else(|e| Response::error(format!("request panicked: {}", e)));

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
    }
    log::debug!("rpc client {} disconnected", peer);
    Ok(())
}
