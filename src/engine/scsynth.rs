//! UDP client for SuperCollider's `scsynth`

use std::collections::HashSet;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::osc::OscMessage;
use super::{EngineError, ParamMap, SynthEngine, VoiceHandle};
use crate::config::EngineConfig;
use crate::synthdef::SynthDef;

/// `/s_new` add action: add to the tail of the target group
const ADD_TO_TAIL: i32 = 1;

/// `/g_new` add action and target: head of the root node
const ADD_TO_HEAD: i32 = 0;
const ROOT_NODE: i32 = 0;

const MAX_PACKET: usize = 65536;

/// How often the reader thread checks for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Connection to a running `scsynth`
pub struct ScsynthClient {
    socket: UdpSocket,
    server: SocketAddr,
    group: i32,
    timeout: Duration,
    replies: Mutex<Receiver<OscMessage>>,
    voice_ends: Mutex<Option<Receiver<i32>>>,
    definitions: Mutex<HashSet<String>>,
    running: Arc<AtomicBool>,
}

impl ScsynthClient {
    /// Connect, register for notifications and create the voice group
    pub fn connect(config: &EngineConfig) -> Result<Self, EngineError> {
        let server: SocketAddr = config
            .scsynth_addr
            .parse()
            .map_err(|_| invalid_addr(&config.scsynth_addr))?;
        let local: SocketAddr = config
            .local_addr
            .parse()
            .map_err(|_| invalid_addr(&config.local_addr))?;

        let socket = UdpSocket::bind(local)?;
        let reader = socket.try_clone()?;
        reader.set_read_timeout(Some(POLL_INTERVAL))?;

        let (reply_tx, reply_rx) = mpsc::channel();
        let (end_tx, end_rx) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        thread::Builder::new()
            .name("scsynth-reader".to_string())
            .spawn(move || read_loop(reader, flag, reply_tx, end_tx))?;

        let client = Self {
            socket,
            server,
            group: config.group,
            timeout: Duration::from_millis(config.timeout_ms),
            replies: Mutex::new(reply_rx),
            voice_ends: Mutex::new(Some(end_rx)),
            definitions: Mutex::new(HashSet::new()),
            running,
        };

        client.send(&OscMessage::new("/notify").arg(1))?;
        client.wait_done("/notify")?;
        if config.dump_osc {
            client.send(&OscMessage::new("/dumpOSC").arg(1))?;
        }
        client.send(
            &OscMessage::new("/g_new")
                .arg(config.group)
                .arg(ADD_TO_HEAD)
                .arg(ROOT_NODE),
        )?;

        log::info!("connected to scsynth at {}", server);
        Ok(client)
    }

    /// Receiver for ids of voices the server has freed
    ///
    /// Returns `None` after the first call.
    pub fn voice_ends(&self) -> Option<Receiver<i32>> {
        self.voice_ends.lock().ok().and_then(|mut ends| ends.take())
    }

    fn send(&self, msg: &OscMessage) -> Result<(), EngineError> {
        log::trace!("-> {} {:?}", msg.addr, msg.args);
        self.socket.send_to(&msg.encode(), self.server)?;
        Ok(())
    }

    /// Wait for `/done` or `/fail` naming `command`
    fn wait_done(&self, command: &str) -> Result<(), EngineError> {
        let replies = self.replies.lock().map_err(|_| EngineError::Disconnected)?;
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let reply = match replies.recv_timeout(remaining) {
                Ok(reply) => reply,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(EngineError::Timeout {
                        command: command.to_string(),
                        timeout: self.timeout,
                    })
                }
                Err(RecvTimeoutError::Disconnected) => return Err(EngineError::Disconnected),
            };
            if reply.args.first().and_then(|a| a.as_str()) != Some(command) {
                log::debug!("ignoring reply {} {:?}", reply.addr, reply.args);
                continue;
            }
            return match reply.addr.as_str() {
                "/done" => Ok(()),
                _ => Err(EngineError::Failed {
                    command: command.to_string(),
                    reason: reply
                        .args
                        .get(1)
                        .and_then(|a| a.as_str())
                        .unwrap_or("unknown error")
                        .to_string(),
                }),
            };
        }
    }
}

impl SynthEngine for ScsynthClient {
    fn send_definition(&self, def: &SynthDef) -> Result<(), EngineError> {
        let mut sent = self.definitions.lock().map_err(|_| EngineError::Disconnected)?;
        if sent.contains(def.name()) {
            log::debug!("definition {} already sent", def.name());
            return Ok(());
        }
        self.send(&OscMessage::new("/d_recv").arg(def.to_bytes()?))?;
        self.wait_done("/d_recv")?;
        sent.insert(def.name().to_string());
        log::info!("sent definition {}", def.name());
        Ok(())
    }

    fn start_voice(
        &self,
        def_name: &str,
        voice_id: i32,
        params: &ParamMap,
    ) -> Result<VoiceHandle, EngineError> {
        let msg = with_params(
            OscMessage::new("/s_new")
                .arg(def_name)
                .arg(voice_id)
                .arg(ADD_TO_TAIL)
                .arg(self.group),
            params,
        );
        self.send(&msg)?;
        Ok(VoiceHandle { id: voice_id })
    }

    fn set_voice_params(&self, voice: &VoiceHandle, params: &ParamMap) -> Result<(), EngineError> {
        self.send(&with_params(OscMessage::new("/n_set").arg(voice.id), params))
    }
}

impl Drop for ScsynthClient {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

fn with_params(msg: OscMessage, params: &ParamMap) -> OscMessage {
    params
        .iter()
        .fold(msg, |msg, (name, value)| msg.arg(name.as_str()).arg(*value))
}

fn invalid_addr(addr: &str) -> EngineError {
    EngineError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("invalid address '{}'", addr),
    ))
}

/// Route server messages until the client is dropped
fn read_loop(
    socket: UdpSocket,
    running: Arc<AtomicBool>,
    replies: Sender<OscMessage>,
    ends: Sender<i32>,
) {
    let mut buf = vec![0u8; MAX_PACKET];
    while running.load(Ordering::Relaxed) {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _)) => len,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue
            }
            Err(e) => {
                log::error!("scsynth socket error: {}", e);
                break;
            }
        };
        let msg = match OscMessage::decode(&buf[..len]) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("dropping packet from scsynth: {}", e);
                continue;
            }
        };
        log::trace!("<- {} {:?}", msg.addr, msg.args);

        match msg.addr.as_str() {
            "/done" | "/fail" => {
                let _ = replies.send(msg);
            }
            "/n_end" => {
                if let Some(id) = msg.args.first().and_then(|a| a.as_int()) {
                    let _ = ends.send(id);
                }
            }
            _ => {}
        }
    }
    log::debug!("scsynth reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::algorithm;

    /// A fake server on loopback that answers like scsynth
    fn fake_server() -> (UdpSocket, EngineConfig) {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let config = EngineConfig {
            scsynth_addr: server.local_addr().unwrap().to_string(),
            timeout_ms: 500,
            ..EngineConfig::default()
        };
        (server, config)
    }

    fn recv(server: &UdpSocket) -> (OscMessage, SocketAddr) {
        let mut buf = vec![0u8; MAX_PACKET];
        let (len, from) = server.recv_from(&mut buf).unwrap();
        (OscMessage::decode(&buf[..len]).unwrap(), from)
    }

    fn connect(server: &UdpSocket, config: &EngineConfig) -> ScsynthClient {
        let config = config.clone();
        let handle = thread::spawn(move || ScsynthClient::connect(&config).unwrap());

        let (notify, from) = recv(server);
        assert_eq!(notify.addr, "/notify");
        let done = OscMessage::new("/done").arg("/notify").arg(0);
        server.send_to(&done.encode(), from).unwrap();

        let (group, _) = recv(server);
        assert_eq!(group.addr, "/g_new");
        assert_eq!(group.args[0].as_int(), Some(1));

        handle.join().unwrap()
    }

    #[test]
    fn test_connect_and_start_voice() {
        let (server, config) = fake_server();
        let client = connect(&server, &config);

        let mut params = ParamMap::new();
        params.insert("gate".to_string(), 1.0);
        params.insert("op1freq".to_string(), 261.63);
        let handle = client.start_voice("dx7_algo1", 1000, &params).unwrap();
        assert_eq!(handle.id, 1000);

        let (msg, _) = recv(&server);
        assert_eq!(msg.addr, "/s_new");
        assert_eq!(msg.args[0].as_str(), Some("dx7_algo1"));
        assert_eq!(msg.args[1].as_int(), Some(1000));
        assert_eq!(msg.args[4].as_str(), Some("gate"));
        assert_eq!(msg.args[6].as_str(), Some("op1freq"));
    }

    #[test]
    fn test_definition_sent_once() {
        let (server, config) = fake_server();
        let client = Arc::new(connect(&server, &config));
        let def = algorithm::compile(1, 6).unwrap().synthdef;

        let worker = {
            let client = client.clone();
            let def = def.clone();
            thread::spawn(move || client.send_definition(&def))
        };
        let (msg, from) = recv(&server);
        assert_eq!(msg.addr, "/d_recv");
        server
            .send_to(&OscMessage::new("/done").arg("/d_recv").encode(), from)
            .unwrap();
        worker.join().unwrap().unwrap();

        // second send is a no-op and needs no reply
        client.send_definition(&def).unwrap();
    }

    #[test]
    fn test_definition_failure() {
        let (server, config) = fake_server();
        let client = Arc::new(connect(&server, &config));
        let def = algorithm::compile(5, 6).unwrap().synthdef;

        let worker = {
            let client = client.clone();
            thread::spawn(move || client.send_definition(&def))
        };
        let (_, from) = recv(&server);
        let fail = OscMessage::new("/fail").arg("/d_recv").arg("bad definition");
        server.send_to(&fail.encode(), from).unwrap();

        match worker.join().unwrap() {
            Err(EngineError::Failed { command, reason }) => {
                assert_eq!(command, "/d_recv");
                assert_eq!(reason, "bad definition");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_notify_timeout() {
        let (server, config) = fake_server();
        let result = ScsynthClient::connect(&config);
        assert!(matches!(result, Err(EngineError::Timeout { .. })));
        drop(server);
    }

    #[test]
    fn test_voice_end_notifications() {
        let (server, config) = fake_server();
        let client = connect(&server, &config);
        let ends = client.voice_ends().unwrap();
        assert!(client.voice_ends().is_none());

        client.set_voice_params(&VoiceHandle { id: 1001 }, &ParamMap::new()).unwrap();
        let (msg, from) = recv(&server);
        assert_eq!(msg.addr, "/n_set");

        let end = OscMessage::new("/n_end").arg(1001).arg(1).arg(-1).arg(-1).arg(0);
        server.send_to(&end.encode(), from).unwrap();
        assert_eq!(ends.recv_timeout(Duration::from_secs(5)).unwrap(), 1001);
    }
}
