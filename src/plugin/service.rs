//! Server side of the plugin service

use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::domain::PluginIdentity;
use crate::scaffold::{DispatchContext, Dispatcher};

use super::protocol::{
    ExecuteRequest, ExecuteResponse, NameResponse, VersionResponse, METHOD_EXECUTE, METHOD_NAME,
    METHOD_VERSION,
};
use super::transport::{RpcError, RpcService, TransportError};

/// Capabilities a plugin offers, whether local or behind a connection
pub trait Plugin: Send + Sync {
    fn name(&self) -> String;

    fn version(&self) -> String;

    /// Runs the plugin with CLI-style arguments and returns its result string
    fn execute(&self, args: &[String]) -> Result<String, TransportError>;
}

/// Serves `Name`, `Version` and `Execute` from this process
pub struct PluginService {
    identity: PluginIdentity,
    dispatcher: Dispatcher,
    context: DispatchContext,
    // Execute calls share one output directory; run them one at a time
    dispatch_lock: Mutex<()>,
}

impl PluginService {
    pub fn new(dispatcher: Dispatcher, context: DispatchContext) -> Self {
        Self {
            identity: PluginIdentity::current(),
            dispatcher,
            context,
            dispatch_lock: Mutex::new(()),
        }
    }

    pub fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    /// Runs the dispatcher and folds any failure into the response
    pub fn execute_detailed(&self, request: &ExecuteRequest) -> ExecuteResponse {
        let _span = info_span!("execute", args = ?request.args).entered();
        info!("Execute called");

        let _guard = self
            .dispatch_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match self.dispatcher.dispatch(&self.context, &request.args) {
            Ok(outcome) => {
                info!(files = outcome.files.len(), "plugin executed successfully");
                ExecuteResponse::success()
            }
            Err(err) => {
                warn!(code = err.code(), error = %err, "plugin execution failed");
                ExecuteResponse::failure(&err, err.code())
            }
        }
    }
}

impl Plugin for PluginService {
    fn name(&self) -> String {
        info!("Name called");
        self.identity.name.clone()
    }

    fn version(&self) -> String {
        info!("Version called");
        self.identity.version.clone()
    }

    fn execute(&self, args: &[String]) -> Result<String, TransportError> {
        let request = ExecuteRequest {
            args: args.to_vec(),
        };
        Ok(self.execute_detailed(&request).result)
    }
}

impl RpcService for PluginService {
    fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        match method {
            METHOD_NAME => to_value(NameResponse { name: self.name() }),
            METHOD_VERSION => to_value(VersionResponse {
                version: self.version(),
            }),
            METHOD_EXECUTE => {
                let request: ExecuteRequest = serde_json::from_value(params)
                    .map_err(|e| RpcError::InvalidParams(e.to_string()))?;
                to_value(self.execute_detailed(&request))
            }
            other => Err(RpcError::UnknownMethod(other.to_string())),
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::Internal(e.to_string()))
}

impl std::fmt::Debug for PluginService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginService")
            .field("identity", &self.identity)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PLUGIN_NAME, PLUGIN_VERSION};
    use crate::storage::EnvLayer;
    use std::sync::Arc;
    use std::thread;
    use serde_json::json;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> PluginService {
        PluginService::new(
            Dispatcher::new(),
            DispatchContext::new(dir.path(), EnvLayer::default()),
        )
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identity_is_compiled_in() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        assert_eq!(service.name(), PLUGIN_NAME);
        assert_eq!(service.version(), PLUGIN_VERSION);
    }

    #[test]
    fn execute_success_message() {
        let dir = TempDir::new().unwrap();
        let result = service(&dir)
            .execute(&args(&["--name", "foo", "--package", "bar"]))
            .unwrap();

        assert_eq!(result, "Plugin executed successfully");
        assert!(dir.path().join("output/base.go").is_file());
    }

    #[test]
    fn execute_folds_errors_into_result() {
        let dir = TempDir::new().unwrap();
        let response = service(&dir).execute_detailed(&ExecuteRequest {
            args: args(&["--package", "bar"]),
        });

        assert_eq!(response.result, "Error executing plugin: plugin name is required");
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("missing_name"));
    }

    #[test]
    fn rpc_methods() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let name = service.call(METHOD_NAME, json!(null)).unwrap();
        assert_eq!(name, json!({"name": PLUGIN_NAME}));

        let err = service.call(METHOD_EXECUTE, json!({"args": 5})).unwrap_err();
        assert!(matches!(err, RpcError::InvalidParams(_)));

        let err = service.call("Destroy", json!(null)).unwrap_err();
        assert_eq!(err, RpcError::UnknownMethod("Destroy".to_string()));
    }

    #[test]
    fn concurrent_execute_calls_all_succeed() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(service(&dir));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    service.execute_detailed(&ExecuteRequest {
                        args: args(&["--name", "foo", "--package", "bar"]),
                    })
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().success);
        }
    }
}
