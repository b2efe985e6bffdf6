use core::str::FromStr;

/// BACnet object types.
///
/// The types the client commonly addresses are named; every other value,
/// standard or vendor-specific, is carried in [`Other`](Self::Other).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectType {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    Device,
    File,
    MultiStateInput,
    MultiStateOutput,
    MultiStateValue,
    TrendLog,
    Other(u16),
}

impl ObjectType {
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::AnalogInput => 0,
            Self::AnalogOutput => 1,
            Self::AnalogValue => 2,
            Self::BinaryInput => 3,
            Self::BinaryOutput => 4,
            Self::BinaryValue => 5,
            Self::Device => 8,
            Self::File => 10,
            Self::MultiStateInput => 13,
            Self::MultiStateOutput => 14,
            Self::MultiStateValue => 19,
            Self::TrendLog => 20,
            Self::Other(v) => v,
        }
    }

    pub const fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::AnalogInput,
            1 => Self::AnalogOutput,
            2 => Self::AnalogValue,
            3 => Self::BinaryInput,
            4 => Self::BinaryOutput,
            5 => Self::BinaryValue,
            8 => Self::Device,
            10 => Self::File,
            13 => Self::MultiStateInput,
            14 => Self::MultiStateOutput,
            19 => Self::MultiStateValue,
            20 => Self::TrendLog,
            v => Self::Other(v),
        }
    }
}

/// Parses kebab-case names (`analog-input`) or a bare number.
impl FromStr for ObjectType {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s {
            "analog-input" => Self::AnalogInput,
            "analog-output" => Self::AnalogOutput,
            "analog-value" => Self::AnalogValue,
            "binary-input" => Self::BinaryInput,
            "binary-output" => Self::BinaryOutput,
            "binary-value" => Self::BinaryValue,
            "device" => Self::Device,
            "file" => Self::File,
            "multi-state-input" => Self::MultiStateInput,
            "multi-state-output" => Self::MultiStateOutput,
            "multi-state-value" => Self::MultiStateValue,
            "trend-log" => Self::TrendLog,
            other => {
                let raw: u16 = other.parse().map_err(|_| "unknown object type")?;
                if raw > 0x03FF {
                    return Err("object type out of range");
                }
                Self::from_u16(raw)
            }
        };
        Ok(ty)
    }
}
