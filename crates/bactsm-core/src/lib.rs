//! BACnet wire layer for the bactsm client transaction engine.
//!
//! `bactsm-core` encodes and decodes the APDU headers exchanged during a
//! confirmed-service transaction (requests, simple/complex acks, segment
//! acks, errors, rejects and aborts), the NPDU that frames them, and the
//! tagged primitives service payloads are built from. It is `no_std`
//! compatible; allocating service decoders sit behind the `alloc` feature.
//!
//! # Feature flags
//!
//! - **`std`** (default): enables `std::error::Error` implementations.
//! - **`alloc`** (default): enables owned service acks (e.g. ReadProperty).
//! - **`serde`**: derives `Serialize`/`Deserialize` on core types.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

/// APDU headers for the confirmed-service exchange and their reason codes.
pub mod apdu;
/// Binary encoding primitives, tag system, and zero-copy reader/writer.
pub mod encoding;
/// Error types for encoding and decoding operations.
pub mod error;
/// NPDU (Network Protocol Data Unit) encoding and decoding.
pub mod npdu;
/// Service codec contract and the concrete services shipped with bactsm.
pub mod services;
/// Object identifiers, property identifiers and protocol enumerations.
pub mod types;

pub use error::{DecodeError, EncodeError};
