/// Maximum APDU length accepted by a device, as the 4-bit code carried in
/// confirmed requests and I-Am.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MaxApdu {
    UpTo50 = 0,
    UpTo128 = 1,
    UpTo206 = 2,
    UpTo480 = 3,
    UpTo1024 = 4,
    UpTo1476 = 5,
}

impl MaxApdu {
    const ALL: [Self; 6] = [
        Self::UpTo50,
        Self::UpTo128,
        Self::UpTo206,
        Self::UpTo480,
        Self::UpTo1024,
        Self::UpTo1476,
    ];

    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::UpTo50),
            1 => Some(Self::UpTo128),
            2 => Some(Self::UpTo206),
            3 => Some(Self::UpTo480),
            4 => Some(Self::UpTo1024),
            5 => Some(Self::UpTo1476),
            _ => None,
        }
    }

    pub const fn octets(self) -> usize {
        match self {
            Self::UpTo50 => 50,
            Self::UpTo128 => 128,
            Self::UpTo206 => 206,
            Self::UpTo480 => 480,
            Self::UpTo1024 => 1024,
            Self::UpTo1476 => 1476,
        }
    }

    /// Largest code not exceeding `len` octets; never smaller than `UpTo50`.
    pub fn for_octets(len: usize) -> Self {
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|m| m.octets() <= len)
            .unwrap_or(Self::UpTo50)
    }
}

/// Number of response segments a client will accept (3-bit code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MaxSegments {
    Unspecified = 0,
    Two = 1,
    Four = 2,
    Eight = 3,
    Sixteen = 4,
    ThirtyTwo = 5,
    SixtyFour = 6,
    MoreThanSixtyFour = 7,
}

impl MaxSegments {
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(code: u8) -> Self {
        match code & 0x07 {
            1 => Self::Two,
            2 => Self::Four,
            3 => Self::Eight,
            4 => Self::Sixteen,
            5 => Self::ThirtyTwo,
            6 => Self::SixtyFour,
            7 => Self::MoreThanSixtyFour,
            _ => Self::Unspecified,
        }
    }
}

/// BACnet error class reported in Error PDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ErrorClass {
    Device = 0,
    Object = 1,
    Property = 2,
    Resources = 3,
    Security = 4,
    Services = 5,
    Vt = 6,
    Communication = 7,
}

impl ErrorClass {
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Device),
            1 => Some(Self::Object),
            2 => Some(Self::Property),
            3 => Some(Self::Resources),
            4 => Some(Self::Security),
            5 => Some(Self::Services),
            6 => Some(Self::Vt),
            7 => Some(Self::Communication),
            _ => None,
        }
    }
}

/// BACnet error codes the client reports by name; the raw value is always
/// preserved alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum ErrorCode {
    Other = 0,
    ConfigurationInProgress = 2,
    DeviceBusy = 3,
    PasswordFailure = 26,
    UnknownObject = 31,
    UnknownProperty = 32,
    ServiceRequestDenied = 29,
    ValueOutOfRange = 37,
    WriteAccessDenied = 40,
    ReadAccessDenied = 27,
}

impl ErrorCode {
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Other),
            2 => Some(Self::ConfigurationInProgress),
            3 => Some(Self::DeviceBusy),
            26 => Some(Self::PasswordFailure),
            27 => Some(Self::ReadAccessDenied),
            29 => Some(Self::ServiceRequestDenied),
            31 => Some(Self::UnknownObject),
            32 => Some(Self::UnknownProperty),
            37 => Some(Self::ValueOutOfRange),
            40 => Some(Self::WriteAccessDenied),
            _ => None,
        }
    }
}
