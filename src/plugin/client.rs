//! Client side of the plugin service
//!
//! [`PluginClient`] talks to a running plugin over an accepted connection.
//! [`PluginProcess`] launches a plugin binary the way a host does and
//! connects to it.

use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpStream};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use super::protocol::{
    ExecuteRequest, ExecuteResponse, HandshakeConfig, HandshakeLine, HandshakeReply, NameResponse,
    RpcRequest, RpcResponse, VersionResponse, CORE_PROTOCOL_VERSION, METHOD_EXECUTE, METHOD_NAME,
    METHOD_VERSION, PLUGIN_SERVICE,
};
use super::service::Plugin;
use super::transport::{read_line, write_frame, TransportError, PROTOCOL_VERSIONS_ENV};

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    // Set once a frame could not be matched to its request
    broken: bool,
}

impl Connection {
    fn round_trip(&mut self, request: &RpcRequest) -> Result<RpcResponse, TransportError> {
        write_frame(&mut self.writer, request)?;
        let response: RpcResponse = read_frame(&mut self.reader)?;
        if response.id != request.id {
            return Err(TransportError::Remote(format!(
                "response id {} does not match request id {}",
                response.id, request.id
            )));
        }
        Ok(response)
    }
}

/// Remote handle to a plugin service
pub struct PluginClient {
    conn: Mutex<Connection>,
    next_id: AtomicU64,
}

impl PluginClient {
    /// Connects and performs the handshake
    pub fn connect(addr: SocketAddr, handshake: &HandshakeConfig) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;

        write_frame(&mut writer, &handshake.frame())?;
        let reply: HandshakeReply = read_frame(&mut reader)?;
        if !reply.accepted {
            return Err(TransportError::HandshakeRejected(
                reply.error.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        debug!(%addr, "connected to plugin");

        Ok(Self {
            conn: Mutex::new(Connection {
                reader,
                writer,
                broken: false,
            }),
            next_id: AtomicU64::new(1),
        })
    }

    /// Calls `method` on the named service and decodes the result
    ///
    /// A transport failure leaves the stream out of step with its requests,
    /// so every later call fails with [`TransportError::ConnectionClosed`].
    pub fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, service, method, params);

        let response: RpcResponse = {
            let mut conn = self
                .conn
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if conn.broken {
                return Err(TransportError::ConnectionClosed);
            }
            match conn.round_trip(&request) {
                Ok(response) => response,
                Err(err) => {
                    conn.broken = true;
                    return Err(err);
                }
            }
        };

        if let Some(error) = response.error {
            return Err(TransportError::Remote(error));
        }

        let value = response.result.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    /// Full `Execute` response, including the failure indicator
    pub fn execute_detailed(&self, args: &[String]) -> Result<ExecuteResponse, TransportError> {
        let request = ExecuteRequest {
            args: args.to_vec(),
        };
        self.call(PLUGIN_SERVICE, METHOD_EXECUTE, serde_json::to_value(&request)?)
    }

    fn try_name(&self) -> Result<String, TransportError> {
        let response: NameResponse = self.call(PLUGIN_SERVICE, METHOD_NAME, json!({}))?;
        Ok(response.name)
    }

    fn try_version(&self) -> Result<String, TransportError> {
        let response: VersionResponse = self.call(PLUGIN_SERVICE, METHOD_VERSION, json!({}))?;
        Ok(response.version)
    }
}

impl Plugin for PluginClient {
    fn name(&self) -> String {
        self.try_name().unwrap_or_else(|e| {
            warn!(error = %e, "Name call failed");
            String::new()
        })
    }

    fn version(&self) -> String {
        self.try_version().unwrap_or_else(|e| {
            warn!(error = %e, "Version call failed");
            String::new()
        })
    }

    fn execute(&self, args: &[String]) -> Result<String, TransportError> {
        self.execute_detailed(args)
            .map(|response| response.result)
            .inspect_err(|e| warn!(error = %e, "Execute call failed"))
    }
}

impl std::fmt::Debug for PluginClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginClient")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

/// A plugin binary running as a child process
pub struct PluginProcess {
    child: Child,
    client: PluginClient,
    line: HandshakeLine,
    // Held open so the child never writes into a closed pipe
    _stdout: BufReader<ChildStdout>,
}

impl PluginProcess {
    /// Spawns `command` with the handshake in its environment, reads the
    /// handshake line from its stdout and connects
    pub fn launch(mut command: Command, handshake: &HandshakeConfig) -> Result<Self, TransportError> {
        command
            .env(&handshake.magic_cookie_key, &handshake.magic_cookie_value)
            .env(PROTOCOL_VERSIONS_ENV, handshake.protocol_version.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped());

        let mut child = command.spawn()?;
        let result = child
            .stdout
            .take()
            .ok_or(TransportError::ConnectionClosed)
            .and_then(|stdout| connect_child(stdout, handshake));

        match result {
            Ok((client, line, stdout)) => Ok(Self {
                child,
                client,
                line,
                _stdout: stdout,
            }),
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(err)
            }
        }
    }

    pub fn client(&self) -> &PluginClient {
        &self.client
    }

    pub fn handshake_line(&self) -> &HandshakeLine {
        &self.line
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for PluginProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl std::fmt::Debug for PluginProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginProcess")
            .field("pid", &self.child.id())
            .field("line", &self.line)
            .finish_non_exhaustive()
    }
}

fn connect_child(
    stdout: ChildStdout,
    handshake: &HandshakeConfig,
) -> Result<(PluginClient, HandshakeLine, BufReader<ChildStdout>), TransportError> {
    let mut stdout = BufReader::new(stdout);
    let mut raw = String::new();
    if stdout.read_line(&mut raw)? == 0 {
        return Err(TransportError::BadHandshakeLine(
            "plugin exited before printing a handshake line".to_string(),
        ));
    }

    let line: HandshakeLine = raw.parse().map_err(TransportError::BadHandshakeLine)?;
    if line.core_version != CORE_PROTOCOL_VERSION {
        return Err(TransportError::BadHandshakeLine(format!(
            "unsupported core protocol version {}",
            line.core_version
        )));
    }
    if line.app_version != handshake.protocol_version {
        return Err(TransportError::BadHandshakeLine(format!(
            "plugin speaks protocol version {}, expected {}",
            line.app_version, handshake.protocol_version
        )));
    }
    if line.network != "tcp" {
        return Err(TransportError::BadHandshakeLine(format!(
            "unsupported network {}",
            line.network
        )));
    }

    let addr: SocketAddr = line
        .address
        .parse()
        .map_err(|_| TransportError::BadHandshakeLine(format!("invalid address {}", line.address)))?;
    let client = PluginClient::connect(addr, handshake)?;

    Ok((client, line, stdout))
}

fn read_frame<T: DeserializeOwned>(reader: &mut BufReader<TcpStream>) -> Result<T, TransportError> {
    let line = read_line(reader)?.ok_or(TransportError::ConnectionClosed)?;
    Ok(serde_json::from_str(&line)?)
}
