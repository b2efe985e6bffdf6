use core::str::FromStr;

/// BACnet property identifiers.
///
/// Common standard properties are named variants; vendor-specific or
/// unrecognised identifiers use [`Proprietary`](Self::Proprietary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PropertyId {
    Description,
    ObjectIdentifier,
    ObjectList,
    ObjectName,
    ObjectType,
    PresentValue,
    StatusFlags,
    Units,
    VendorName,
    Proprietary(u32),
}

impl PropertyId {
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::Description => 28,
            Self::ObjectIdentifier => 75,
            Self::ObjectList => 76,
            Self::ObjectName => 77,
            Self::ObjectType => 79,
            Self::PresentValue => 85,
            Self::StatusFlags => 111,
            Self::Units => 117,
            Self::VendorName => 121,
            Self::Proprietary(v) => v,
        }
    }

    pub const fn from_u32(value: u32) -> Self {
        match value {
            28 => Self::Description,
            75 => Self::ObjectIdentifier,
            76 => Self::ObjectList,
            77 => Self::ObjectName,
            79 => Self::ObjectType,
            85 => Self::PresentValue,
            111 => Self::StatusFlags,
            117 => Self::Units,
            121 => Self::VendorName,
            v => Self::Proprietary(v),
        }
    }
}

impl FromStr for PropertyId {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = match s {
            "description" => Self::Description,
            "object-identifier" => Self::ObjectIdentifier,
            "object-list" => Self::ObjectList,
            "object-name" => Self::ObjectName,
            "object-type" => Self::ObjectType,
            "present-value" => Self::PresentValue,
            "status-flags" => Self::StatusFlags,
            "units" => Self::Units,
            "vendor-name" => Self::VendorName,
            other => Self::from_u32(other.parse().map_err(|_| "unknown property")?),
        };
        Ok(id)
    }
}
