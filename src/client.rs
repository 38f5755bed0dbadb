//! Host-side driver: talks to the dev chain and the rollup node

pub mod artifacts;
pub mod contracts;
pub mod graphql;
pub mod inspect;
pub mod payloads;
pub mod rpc;

pub use artifacts::ArtifactStore;
pub use graphql::{GraphQlClient, Voucher};
pub use inspect::InspectClient;
pub use payloads::InputSender;
pub use rpc::{RpcClient, TransactionReceipt, TransactionRequest};
