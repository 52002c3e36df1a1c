//! Plugin protocol types
//!
//! The host and the plugin exchange newline-delimited JSON over a loopback
//! TCP connection. The first frame on every connection is a [`Handshake`];
//! after it is accepted, each [`RpcRequest`] is answered by exactly one
//! [`RpcResponse`] with the same `id`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Version of the handshake-line format itself
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Name of the service exposing `Name`, `Version` and `Execute`
pub const PLUGIN_SERVICE: &str = "plugin";

pub const METHOD_NAME: &str = "Name";
pub const METHOD_VERSION: &str = "Version";
pub const METHOD_EXECUTE: &str = "Execute";

/// Wire protocol announced in the handshake line
pub const WIRE_PROTOCOL: &str = "json";

/// Shared secret and protocol version both sides must agree on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    pub protocol_version: u32,
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
}

impl HandshakeConfig {
    /// Handshake expected by the Titanium host
    pub fn titanium() -> Self {
        Self {
            protocol_version: 1,
            magic_cookie_key: "TITANIUM_PLUGIN".to_string(),
            magic_cookie_value: "titanium".to_string(),
        }
    }

    /// The frame a client sends to open a connection
    pub fn frame(&self) -> Handshake {
        Handshake {
            magic_cookie_key: self.magic_cookie_key.clone(),
            magic_cookie_value: self.magic_cookie_value.clone(),
            protocol_version: self.protocol_version,
        }
    }

    /// Checks a client frame; mismatches are refused with a reason
    pub fn verify(&self, frame: &Handshake) -> Result<(), String> {
        if frame.magic_cookie_key != self.magic_cookie_key
            || frame.magic_cookie_value != self.magic_cookie_value
        {
            return Err("magic cookie mismatch".to_string());
        }

        if frame.protocol_version != self.protocol_version {
            return Err(format!(
                "unsupported protocol version {} (expected {})",
                frame.protocol_version, self.protocol_version
            ));
        }

        Ok(())
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self::titanium()
    }
}

/// First frame sent by the client on a new connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
    pub protocol_version: u32,
}

/// Server answer to a [`Handshake`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeReply {
    pub accepted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandshakeReply {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            error: Some(reason.into()),
        }
    }
}

/// A call routed to a named service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub service: String,
    pub method: String,

    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(
        id: u64,
        service: impl Into<String>,
        method: impl Into<String>,
        params: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            id,
            service: service.into(),
            method: method.into(),
            params: params.into(),
        }
    }
}

/// Answer to an [`RpcRequest`]; `error` is set only for RPC-level faults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn success(id: u64, result: impl Into<serde_json::Value>) -> Self {
        Self {
            id,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameResponse {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
}

/// Arguments of an `Execute` call, without the program name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub args: Vec<String>,
}

/// Outcome of an `Execute` call
///
/// `result` is the human-readable outcome. Scaffold failures do not fail the
/// RPC; they are reported here with `success = false` and an `error_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub result: String,

    #[serde(default = "default_success")]
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

fn default_success() -> bool {
    true
}

impl ExecuteResponse {
    pub const SUCCESS_MESSAGE: &'static str = "Plugin executed successfully";

    pub fn success() -> Self {
        Self {
            result: Self::SUCCESS_MESSAGE.to_string(),
            success: true,
            error_code: None,
        }
    }

    pub fn failure(message: impl fmt::Display, code: impl Into<String>) -> Self {
        Self {
            result: format!("Error executing plugin: {}", message),
            success: false,
            error_code: Some(code.into()),
        }
    }
}

/// Line printed on stdout telling the host where to connect:
/// `core-version|app-version|network|address|protocol`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    pub core_version: u32,
    pub app_version: u32,
    pub network: String,
    pub address: String,
    pub protocol: String,
}

impl fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.core_version, self.app_version, self.network, self.address, self.protocol
        )
    }
}

impl FromStr for HandshakeLine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('|').collect();
        let [core, app, network, address, protocol] = parts.as_slice() else {
            return Err(format!("expected 5 fields, got {}: {:?}", parts.len(), s.trim()));
        };

        let core_version = core
            .parse()
            .map_err(|_| format!("invalid core protocol version: {}", core))?;
        let app_version = app
            .parse()
            .map_err(|_| format!("invalid app protocol version: {}", app))?;

        Ok(Self {
            core_version,
            app_version,
            network: network.to_string(),
            address: address.to_string(),
            protocol: protocol.to_string(),
        })
    }
}
