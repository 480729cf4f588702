mod http;
mod inbound;

pub use http::{broadcast_message, hi, BroadcastAcceptedResponse, BroadcastMessageRequest};
pub use inbound::{BroadcastWorker, InboundTrigger, TriggerError};
