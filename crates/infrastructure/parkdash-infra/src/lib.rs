pub mod endpoint;
pub mod http;
pub mod ws;

pub use endpoint::{action_url, derive_endpoint, resolve_endpoint};
pub use http::{ActionError, ActionRequest, HttpActionClient};
pub use ws::{TransportError, WsSink, WsStream, WsTransport};
