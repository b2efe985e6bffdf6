//! Tagged-value encoding shared by APDU headers and service payloads.

/// Unsigned/signed integers and the tagged helpers built on them.
pub mod primitives;
/// Borrowing cursor for decoding.
pub mod reader;
/// Application, context, opening and closing tags.
pub mod tag;
/// Bounded cursor for encoding into a caller-owned buffer.
pub mod writer;
