//! MCP session management and tool-name translation for the completions
//! proxy.
//!
//! [`session`] owns the JSON-RPC handshake and per-server session lifecycle
//! (component C2 of the design); [`registry`] turns discovered tools into
//! synthetic `function` tools the upstream LLM can call, and resolves a
//! model-issued call back to its origin server (component C3).

pub mod error;
pub mod registry;
pub mod session;

pub use error::{McpError, McpResult};
pub use registry::{build_registry, synthetic_name, McpServerSpec, SyntheticToolEntry, ToolRegistry};
pub use session::{hostname_of, ClientInfo, SessionManager, ToolRecord};
