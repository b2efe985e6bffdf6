use crate::encoding::{
    primitives::{encode_ctx_character_string, encode_ctx_unsigned},
    writer::Writer,
};
use crate::services::ConfirmedService;
use crate::EncodeError;

pub const SERVICE_REINITIALIZE_DEVICE: u8 = 0x14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum ReinitializeState {
    Coldstart = 0,
    Warmstart = 1,
    StartBackup = 2,
    EndBackup = 3,
    StartRestore = 4,
    EndRestore = 5,
    AbortRestore = 6,
    ActivateChanges = 7,
}

impl ReinitializeState {
    pub const fn to_u32(self) -> u32 {
        self as u32
    }
}

/// ReinitializeDevice-Request. Answered with a simple ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReinitializeDeviceRequest<'a> {
    pub state: ReinitializeState,
    pub password: Option<&'a str>,
}

impl ConfirmedService for ReinitializeDeviceRequest<'_> {
    const SERVICE_CHOICE: u8 = SERVICE_REINITIALIZE_DEVICE;

    fn encode_service(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        encode_ctx_unsigned(w, 0, self.state.to_u32())?;
        if let Some(password) = self.password {
            if password.is_empty() || password.len() > 20 {
                return Err(EncodeError::InvalidLength);
            }
            encode_ctx_character_string(w, 1, password)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ReinitializeDeviceRequest, ReinitializeState};
    use crate::encoding::writer::Writer;
    use crate::services::ConfirmedService;
    use crate::EncodeError;

    #[test]
    fn encodes_state_and_password() {
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        ReinitializeDeviceRequest {
            state: ReinitializeState::Warmstart,
            password: Some("abc"),
        }
        .encode_service(&mut w)
        .unwrap();
        assert_eq!(w.as_written(), &[0x09, 0x01, 0x1C, 0x00, b'a', b'b', b'c']);
    }

    #[test]
    fn refuses_overlong_password() {
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        let err = ReinitializeDeviceRequest {
            state: ReinitializeState::Coldstart,
            password: Some("this-password-is-way-too-long"),
        }
        .encode_service(&mut w)
        .unwrap_err();
        assert_eq!(err, EncodeError::InvalidLength);
    }
}
