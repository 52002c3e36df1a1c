//! # Plugin Bridge
//!
//! Exposes the scaffold as a plugin that a Titanium host launches as a
//! subprocess and drives over RPC.
//!
//! ## Lifecycle
//!
//! 1. The host spawns the binary with `TITANIUM_PLUGIN=titanium` set
//! 2. The plugin checks the cookie, binds a loopback port and prints
//!    `1|1|tcp|127.0.0.1:PORT|json` on stdout
//! 3. The host connects and sends a handshake frame (cookie + protocol
//!    version); a mismatch closes the connection
//! 4. The host calls `plugin.Name`, `plugin.Version` and `plugin.Execute`
//!
//! ## Operations
//!
//! | Method | Params | Result |
//! |--------|--------|--------|
//! | `Name` | - | `{"name": "ti-scaffold"}` |
//! | `Version` | - | `{"version": "1.0.0"}` |
//! | `Execute` | `{"args": [..]}` | `{"result": "..", "success": true}` |
//!
//! `Execute` never fails at the RPC level because of a scaffold error; the
//! failure is described in `result` and flagged by `success: false`.
//!
//! ## Key Types
//!
//! - [`Plugin`] - Capabilities shared by the local service and the proxy
//! - [`PluginService`] - Local implementation backed by the dispatcher
//! - [`PluginClient`] - Proxy to a remote plugin
//! - [`PluginProcess`] - Launches a plugin binary and connects to it
//! - [`Server`] / [`Broker`] - Transport and service routing

mod client;
mod protocol;
mod service;
mod transport;

pub use client::{PluginClient, PluginProcess};
pub use protocol::{
    ExecuteRequest, ExecuteResponse, Handshake, HandshakeConfig, HandshakeLine, HandshakeReply,
    NameResponse, RpcRequest, RpcResponse, VersionResponse, CORE_PROTOCOL_VERSION, METHOD_EXECUTE,
    METHOD_NAME, METHOD_VERSION, PLUGIN_SERVICE,
};
pub use service::{Plugin, PluginService};
pub use transport::{
    check_environment, serve, Broker, RpcError, RpcService, Server, TransportError,
    PROTOCOL_VERSIONS_ENV,
};
