pub mod address;
pub mod bip;
pub mod traits;

pub use address::DataLinkAddress;
pub use bip::BacnetIpTransport;
pub use traits::{DataLink, DataLinkError};
