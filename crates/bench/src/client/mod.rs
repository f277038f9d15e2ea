//! Network clients for Solana nodes.
//!
//! - [`NodeRpc`]: HTTP JSON-RPC (`getLatestBlockhash`, `getBalance`,
//!   `sendTransaction`)
//! - [`LogsPubsub`]: WebSocket `logsSubscribe`

mod pubsub;
mod rpc;

pub use pubsub::{LogsPubsub, PubsubLogStream};
pub use rpc::{send_config, NodeRpc};
