use bactsm_client::{BacnetClient, ClientError, Recipient};
use bactsm_core::types::{MaxApdu, ObjectType};
use bactsm_datalink::{BacnetIpTransport, DataLinkAddress};
use clap::{Args, ValueEnum};
use std::net::IpAddr;
use std::time::Duration;

/// CLI-friendly enum for selecting BACnet object types.
///
/// Maps human-readable names to [`ObjectType`] variants for use with clap argument parsing.
#[derive(Debug, Clone, ValueEnum)]
pub enum ObjectTypeArg {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    Device,
    File,
    TrendLog,
    MultiStateInput,
    MultiStateOutput,
    MultiStateValue,
}

impl ObjectTypeArg {
    /// Convert to the core [`ObjectType`] representation.
    pub const fn into_object_type(self) -> ObjectType {
        match self {
            Self::AnalogInput => ObjectType::AnalogInput,
            Self::AnalogOutput => ObjectType::AnalogOutput,
            Self::AnalogValue => ObjectType::AnalogValue,
            Self::BinaryInput => ObjectType::BinaryInput,
            Self::BinaryOutput => ObjectType::BinaryOutput,
            Self::BinaryValue => ObjectType::BinaryValue,
            Self::Device => ObjectType::Device,
            Self::File => ObjectType::File,
            Self::TrendLog => ObjectType::TrendLog,
            Self::MultiStateInput => ObjectType::MultiStateInput,
            Self::MultiStateOutput => ObjectType::MultiStateOutput,
            Self::MultiStateValue => ObjectType::MultiStateValue,
        }
    }
}

/// Peer and transaction settings shared by every tool.
#[derive(Args, Debug)]
pub struct TransactionArgs {
    #[arg(long)]
    pub ip: IpAddr,
    #[arg(long, default_value_t = 47808)]
    pub port: u16,
    /// Device instance of the peer.
    #[arg(long, default_value_t = 0)]
    pub instance: u32,
    /// Per-attempt request timeout.
    #[arg(long, default_value_t = 3000)]
    pub timeout_ms: u64,
    /// Attempts before the request is abandoned.
    #[arg(long, default_value_t = 3)]
    pub retries: u8,
}

impl TransactionArgs {
    /// Binds BACnet/IP and registers the peer under `--instance`.
    pub async fn connect(&self) -> Result<BacnetClient<BacnetIpTransport>, ClientError> {
        let client = BacnetClient::new()
            .await?
            .with_response_timeout(Duration::from_millis(self.timeout_ms))
            .with_retries(self.retries);
        client.add_device(
            self.instance,
            DataLinkAddress::Ip((self.ip, self.port).into()),
            MaxApdu::UpTo1476,
        );
        Ok(client)
    }

    pub fn recipient(&self) -> Recipient {
        Recipient::Device(self.instance)
    }
}
