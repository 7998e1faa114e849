//! Chain gateways.

pub mod rpc;

pub use rpc::JsonRpcChain;
