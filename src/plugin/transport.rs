//! Handshake validation and the RPC server
//!
//! ```text
//! Host                                   Plugin
//!  │── spawn (TITANIUM_PLUGIN=titanium) ──>│ check_environment
//!  │<── stdout: 1|1|tcp|127.0.0.1:PORT|json│ Server::bind
//!  │── connect ──────────────────────────>│
//!  │── {"magic_cookie_key": ...} ────────>│ HandshakeConfig::verify
//!  │<── {"accepted": true} ───────────────│
//!  │── {"id":1,"service":"plugin",...} ──>│ Broker::dispatch
//!  │<── {"id":1,"result":{...}} ──────────│
//! ```

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use super::protocol::{
    Handshake, HandshakeConfig, HandshakeLine, HandshakeReply, RpcRequest, RpcResponse,
    CORE_PROTOCOL_VERSION, WIRE_PROTOCOL,
};

/// Environment variable a host uses to list the protocol versions it speaks
pub const PROTOCOL_VERSIONS_ENV: &str = "PLUGIN_PROTOCOL_VERSIONS";

/// Largest frame accepted on a connection, newline included
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(
        "This binary is a plugin. These are not meant to be executed directly. \
         Please execute the program that consumes these plugins, which will load \
         any plugins automatically (missing or wrong {key})"
    )]
    NotLaunchedByHost { key: String },

    #[error("host protocol versions {requested:?} do not include {supported}")]
    UnsupportedProtocol { requested: String, supported: u32 },

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("invalid handshake line: {0}")]
    BadHandshakeLine(String),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("remote error: {0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Failure of a single call inside an accepted connection
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// A named set of remotely callable methods
pub trait RpcService: Send + Sync {
    fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, RpcError>;
}

/// Routes requests on a connection to the registered services by name
#[derive(Default, Clone)]
pub struct Broker {
    services: HashMap<String, Arc<dyn RpcService>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, service: Arc<dyn RpcService>) {
        self.services.insert(name.into(), service);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RpcService>> {
        self.services.get(name)
    }

    /// Names of the registered services, sorted
    pub fn services(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let result = self
            .get(&request.service)
            .ok_or_else(|| RpcError::UnknownService(request.service.clone()))
            .and_then(|service| service.call(&request.method, request.params));

        match result {
            Ok(value) => RpcResponse::success(request.id, value),
            Err(err) => {
                warn!(id = request.id, %err, "rpc call failed");
                RpcResponse::error(request.id, err.to_string())
            }
        }
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("services", &self.services())
            .finish()
    }
}

/// Verifies the process was launched by a host that knows the cookie and
/// speaks our protocol version
pub fn check_environment<F>(handshake: &HandshakeConfig, lookup: F) -> Result<(), TransportError>
where
    F: Fn(&str) -> Option<String>,
{
    if lookup(&handshake.magic_cookie_key).as_deref() != Some(handshake.magic_cookie_value.as_str()) {
        return Err(TransportError::NotLaunchedByHost {
            key: handshake.magic_cookie_key.clone(),
        });
    }

    if let Some(requested) = lookup(PROTOCOL_VERSIONS_ENV).filter(|v| !v.trim().is_empty()) {
        let supported = requested
            .split(',')
            .filter_map(|v| v.trim().parse::<u32>().ok())
            .any(|v| v == handshake.protocol_version);

        if !supported {
            return Err(TransportError::UnsupportedProtocol {
                requested,
                supported: handshake.protocol_version,
            });
        }
    }

    Ok(())
}

/// Loopback RPC server publishing a [`Broker`]
pub struct Server {
    listener: TcpListener,
    broker: Arc<Broker>,
    handshake: Arc<HandshakeConfig>,
}

impl Server {
    /// Binds an ephemeral port on 127.0.0.1
    pub fn bind(handshake: HandshakeConfig, broker: Broker) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        Ok(Self {
            listener,
            broker: Arc::new(broker),
            handshake: Arc::new(handshake),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// The line the host reads from stdout to find this server
    pub fn handshake_line(&self) -> Result<HandshakeLine, TransportError> {
        Ok(HandshakeLine {
            core_version: CORE_PROTOCOL_VERSION,
            app_version: self.handshake.protocol_version,
            network: "tcp".to_string(),
            address: self.local_addr()?.to_string(),
            protocol: WIRE_PROTOCOL.to_string(),
        })
    }

    /// Accepts connections until the listener fails, one thread each
    pub fn serve(self) -> Result<(), TransportError> {
        info!(addr = %self.local_addr()?, services = ?self.broker.services(), "serving plugin");

        let mut backoff = AcceptBackoff::default();
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(s) => {
                    backoff.reset();
                    s
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(error = %e, ?delay, "failed to accept connection");
                    thread::sleep(delay);
                    continue;
                }
            };

            let broker = Arc::clone(&self.broker);
            let handshake = Arc::clone(&self.handshake);
            thread::spawn(move || {
                let peer = stream
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                let _span = info_span!("connection", %peer).entered();

                match handle_connection(stream, &broker, &handshake) {
                    Ok(()) => debug!("connection closed"),
                    Err(e) => warn!(error = %e, "connection ended with error"),
                }
            });
        }

        Ok(())
    }

    /// Runs [`serve`](Self::serve) on a background thread
    pub fn spawn(self) -> thread::JoinHandle<Result<(), TransportError>> {
        thread::spawn(move || self.serve())
    }
}

/// Delay between failed accepts, doubling up to a ceiling
#[derive(Debug, Default)]
struct AcceptBackoff {
    current: Option<Duration>,
}

impl AcceptBackoff {
    fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => ACCEPT_BACKOFF_MIN,
            Some(d) => (d * 2).min(ACCEPT_BACKOFF_MAX),
        };
        self.current = Some(delay);
        delay
    }

    fn reset(&mut self) {
        self.current = None;
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.listener.local_addr().ok())
            .field("broker", &self.broker)
            .finish()
    }
}

/// Full plugin startup: environment check, bind, announce, serve
///
/// The handshake line is the only thing ever written to stdout.
pub fn serve(handshake: HandshakeConfig, broker: Broker) -> Result<(), TransportError> {
    check_environment(&handshake, |key| std::env::var(key).ok())?;

    let server = Server::bind(handshake, broker)?;
    let line = server.handshake_line()?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    stdout.flush()?;
    drop(stdout);

    server.serve()
}

fn handle_connection(
    stream: TcpStream,
    broker: &Broker,
    handshake: &HandshakeConfig,
) -> Result<(), TransportError> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let line = match read_line(&mut reader) {
        Ok(Some(line)) => line,
        Ok(None) => return Ok(()),
        Err(err @ TransportError::FrameTooLarge { .. }) => {
            warn!(error = %err, "refusing connection");
            write_frame(&mut writer, &HandshakeReply::rejected("frame too large"))?;
            return Err(err);
        }
        Err(err) => return Err(err),
    };

    let verdict = serde_json::from_str::<Handshake>(&line)
        .map_err(|e| format!("malformed handshake: {}", e))
        .and_then(|frame| handshake.verify(&frame));

    if let Err(reason) = verdict {
        warn!(%reason, "refusing connection");
        write_frame(&mut writer, &HandshakeReply::rejected(reason.clone()))?;
        return Err(TransportError::HandshakeRejected(reason));
    }
    write_frame(&mut writer, &HandshakeReply::accepted())?;
    debug!("handshake accepted");

    loop {
        let line = match read_line(&mut reader) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err @ TransportError::FrameTooLarge { .. }) => {
                write_frame(&mut writer, &RpcResponse::error(0, "frame too large"))?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => {
                debug!(id = request.id, service = %request.service, method = %request.method, "rpc call");
                broker.dispatch(request)
            }
            // Without a parsable request there is no id to answer to
            Err(e) => RpcResponse::error(0, format!("malformed request: {}", e)),
        };
        write_frame(&mut writer, &response)?;
    }

    Ok(())
}

/// Reads one non-empty line of at most [`MAX_FRAME_BYTES`]; `None` at end
/// of stream
pub(crate) fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>, TransportError> {
    let limit = MAX_FRAME_BYTES as u64 + 1;
    loop {
        let mut buf = Vec::new();
        let read = reader.by_ref().take(limit).read_until(b'\n', &mut buf)?;
        if read == 0 {
            return Ok(None);
        }
        if read > MAX_FRAME_BYTES {
            return Err(TransportError::FrameTooLarge {
                limit: MAX_FRAME_BYTES,
            });
        }

        let line = String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if !line.trim().is_empty() {
            return Ok(Some(line));
        }
    }
}

pub(crate) fn write_frame<W: Write, T: Serialize>(writer: &mut W, frame: &T) -> Result<(), TransportError> {
    let json = serde_json::to_string(frame)?;
    writeln!(writer, "{}", json)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl RpcService for Echo {
        fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
            match method {
                "Echo" => Ok(params),
                other => Err(RpcError::UnknownMethod(other.to_string())),
            }
        }
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    #[test]
    fn environment_requires_cookie() {
        let handshake = HandshakeConfig::titanium();

        let err = check_environment(&handshake, env(&[])).unwrap_err();
        assert!(matches!(err, TransportError::NotLaunchedByHost { .. }));
        assert!(err.to_string().contains("This binary is a plugin"));

        let err = check_environment(&handshake, env(&[("TITANIUM_PLUGIN", "wrong")])).unwrap_err();
        assert!(matches!(err, TransportError::NotLaunchedByHost { .. }));

        check_environment(&handshake, env(&[("TITANIUM_PLUGIN", "titanium")])).unwrap();
    }

    #[test]
    fn environment_protocol_versions() {
        let handshake = HandshakeConfig::titanium();

        check_environment(
            &handshake,
            env(&[("TITANIUM_PLUGIN", "titanium"), (PROTOCOL_VERSIONS_ENV, "2, 1")]),
        )
        .unwrap();

        let err = check_environment(
            &handshake,
            env(&[("TITANIUM_PLUGIN", "titanium"), (PROTOCOL_VERSIONS_ENV, "2,3")]),
        )
        .unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedProtocol { supported: 1, .. }));
    }

    #[test]
    fn broker_routes_by_service() {
        let mut broker = Broker::new();
        broker.register("echo", Arc::new(Echo));

        let response = broker.dispatch(RpcRequest::new(1, "echo", "Echo", json!({"x": 1})));
        assert_eq!(response.result, Some(json!({"x": 1})));

        let response = broker.dispatch(RpcRequest::new(2, "missing", "Echo", json!(null)));
        assert_eq!(response.error.as_deref(), Some("unknown service: missing"));

        let response = broker.dispatch(RpcRequest::new(3, "echo", "Shout", json!(null)));
        assert_eq!(response.error.as_deref(), Some("unknown method: Shout"));
    }

    #[test]
    fn server_refuses_wrong_cookie() {
        let server = Server::bind(HandshakeConfig::titanium(), Broker::new()).unwrap();
        let addr = server.local_addr().unwrap();
        server.spawn();

        let stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;

        let mut frame = HandshakeConfig::titanium().frame();
        frame.magic_cookie_value = "wrong".to_string();
        write_frame(&mut writer, &frame).unwrap();

        let reply: HandshakeReply =
            serde_json::from_str(&read_line(&mut reader).unwrap().unwrap()).unwrap();
        assert!(!reply.accepted);

        // The server closes the connection; later requests get no answer
        let _ = write_frame(&mut writer, &RpcRequest::new(1, "plugin", "Name", json!(null)));
        assert!(read_line(&mut reader).unwrap_or(None).is_none());
    }

    #[test]
    fn read_line_enforces_frame_limit() {
        let mut ok = io::Cursor::new(b"\n{\"a\":1}\n".to_vec());
        assert_eq!(read_line(&mut ok).unwrap().as_deref(), Some("{\"a\":1}\n"));
        assert!(read_line(&mut ok).unwrap().is_none());

        let mut big = io::Cursor::new(vec![b'a'; MAX_FRAME_BYTES + 1]);
        let err = read_line(&mut big).unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { .. }));
    }

    #[test]
    fn server_refuses_oversized_handshake() {
        let server = Server::bind(HandshakeConfig::titanium(), Broker::new()).unwrap();
        let addr = server.local_addr().unwrap();
        server.spawn();

        let stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;

        // Exactly one byte over the limit, so nothing is left unread
        writer.write_all(&vec![b'a'; MAX_FRAME_BYTES + 1]).unwrap();
        writer.flush().unwrap();

        let reply: HandshakeReply =
            serde_json::from_str(&read_line(&mut reader).unwrap().unwrap()).unwrap();
        assert!(!reply.accepted);
        assert_eq!(reply.error.as_deref(), Some("frame too large"));
        assert!(read_line(&mut reader).unwrap_or(None).is_none());
    }

    #[test]
    fn accept_backoff_doubles_and_resets() {
        let mut backoff = AcceptBackoff::default();
        assert_eq!(backoff.next_delay(), ACCEPT_BACKOFF_MIN);
        assert_eq!(backoff.next_delay(), ACCEPT_BACKOFF_MIN * 2);

        for _ in 0..20 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), ACCEPT_BACKOFF_MAX);

        backoff.reset();
        assert_eq!(backoff.next_delay(), ACCEPT_BACKOFF_MIN);
    }

    #[test]
    fn server_answers_after_handshake() {
        let mut broker = Broker::new();
        broker.register("echo", Arc::new(Echo));
        let server = Server::bind(HandshakeConfig::titanium(), broker).unwrap();
        let addr = server.local_addr().unwrap();
        assert_eq!(
            server.handshake_line().unwrap().to_string(),
            format!("1|1|tcp|{}|json", addr)
        );
        server.spawn();

        let stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;

        write_frame(&mut writer, &HandshakeConfig::titanium().frame()).unwrap();
        let reply: HandshakeReply =
            serde_json::from_str(&read_line(&mut reader).unwrap().unwrap()).unwrap();
        assert!(reply.accepted);

        write_frame(&mut writer, &RpcRequest::new(9, "echo", "Echo", json!("hi"))).unwrap();
        let response: RpcResponse =
            serde_json::from_str(&read_line(&mut reader).unwrap().unwrap()).unwrap();
        assert_eq!(response.id, 9);
        assert_eq!(response.result, Some(json!("hi")));
    }
}
