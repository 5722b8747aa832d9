//! ADC handles

use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use super::peripheral::fixed_reply;
use crate::error::Result;
use crate::network::Session;
use crate::protocol::CommandId;

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum AdcOp {
    ChannelCount = 0,
    GetValue = 1,
    SetValue = 2,
}

/// Handle to an analog-to-digital converter
#[derive(Debug)]
pub struct Adc {
    session: Arc<Session>,
    descriptor: i32,
    path: String,
}

impl Adc {
    pub(crate) fn new(session: Arc<Session>, descriptor: i32, path: &str) -> Self {
        Self {
            session,
            descriptor,
            path: path.to_string(),
        }
    }

    pub fn descriptor(&self) -> i32 {
        self.descriptor
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn request(&self, op: AdcOp, channel: u32, value: u32) -> Result<Vec<u8>> {
        let mut payload = BytesMut::with_capacity(13);
        payload.put_i32_le(self.descriptor);
        payload.put_u8(op as u8);
        payload.put_u32_le(channel);
        payload.put_u32_le(value);
        Ok(self.session.dispatch(CommandId::Adc, &payload)?)
    }

    /// Number of channels
    pub fn channel_count(&self) -> Result<u32> {
        let reply = self.request(AdcOp::ChannelCount, 0, 0)?;
        Ok(u32::from_le_bytes(fixed_reply::<4>(CommandId::Adc, &reply)?))
    }

    /// Value of `channel`
    pub fn get_channel_value(&self, channel: u32) -> Result<u32> {
        let reply = self.request(AdcOp::GetValue, channel, 0)?;
        Ok(u32::from_le_bytes(fixed_reply::<4>(CommandId::Adc, &reply)?))
    }

    /// Set the value fed to `channel`
    pub fn set_channel_value(&self, channel: u32, value: u32) -> Result<()> {
        self.request(AdcOp::SetValue, channel, value)?;
        Ok(())
    }
}
