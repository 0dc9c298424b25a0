//! Gateway: HTTP surface of the chat relay.
//!
//! Single port serves the chat dispatcher, the automation webhook's callback, the client's
//! poll endpoint, and lead notifications.

mod protocol;
mod server;

pub use protocol::{Ack, ChatResponse, ErrorBody, SessionQuery};
pub use server::{router, run_gateway, GatewayState};
