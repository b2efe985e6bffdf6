//! Client side of BACnet confirmed services.
//!
//! A [`ClientTransaction`] drives one request from device resolution to its
//! final outcome, including retries and reassembly of segmented replies.
//! [`TransactionManager`] routes inbound replies to it, and
//! [`BacnetClient`] wires both to a datalink.

pub mod client;
pub mod complex_ack;
pub mod config;
pub mod directory;
pub mod error;
pub mod handle;
pub mod manager;
pub mod simple_ack;
pub mod transaction;
pub mod transport;
pub mod window;

pub use bactsm_core::services::read_property::{PropertyValue, ReadPropertyAck};
pub use bactsm_core::services::reinitialize_device::ReinitializeState;
pub use client::BacnetClient;
pub use complex_ack::ComplexAckHandle;
pub use config::TransactionConfig;
pub use directory::{
    DeviceDirectory, DeviceLookup, DeviceTable, DeviceTableEntry, LookupCallback, Recipient,
};
pub use error::ClientError;
pub use handle::{ClientTransactionHandle, Response, TransactionBinding};
pub use manager::TransactionManager;
pub use simple_ack::SimpleAckHandle;
pub use transaction::{ClientState, ClientTransaction};
pub use transport::{DataLinkTransport, OutgoingApdu, Transport};
