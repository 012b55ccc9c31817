pub mod dispatch;
pub mod protocol;
pub mod registry;
mod routes;
mod server;
mod state;
mod static_files;

pub use dispatch::Dispatcher;
pub use protocol::{RequestId, RpcError, RpcRequest, RpcResponse};
pub use registry::{Delivery, Frame, SessionRegistry, SessionStream};
pub use routes::{ascii_json, CONNECTION_HEADER, METADATA_HEADER};
pub use server::GatewayServer;
pub use state::{server_tools, AppState};
