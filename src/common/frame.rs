use std::time::Duration;

use crate::common::buffer::ReadBuffer;
use crate::common::phys::PhysLayer;
use crate::decode::PhysDecodeLevel;
use crate::error::RequestError;
use crate::types::UnitId;

pub(crate) mod constants {
    /// Maximum length of the PDU carried by a frame
    pub(crate) const MAX_ADU_LENGTH: usize = 253;
}

/// Transaction identifier used to pair requests and responses on TCP
#[derive(PartialEq, Copy, Clone, Debug)]
pub(crate) struct TxId {
    value: u16,
}

impl TxId {
    pub(crate) fn new(value: u16) -> Self {
        TxId { value }
    }

    pub(crate) fn to_u16(self) -> u16 {
        self.value
    }

    pub(crate) fn next(&mut self) -> TxId {
        if self.value == u16::MAX {
            self.value = 0;
            TxId::new(u16::MAX)
        } else {
            let ret = self.value;
            self.value += 1;
            TxId::new(ret)
        }
    }
}

impl Default for TxId {
    fn default() -> Self {
        TxId::new(0)
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.value)
    }
}

#[derive(Copy, Clone, PartialEq, Debug)]
pub(crate) struct FrameHeader {
    pub(crate) unit_id: UnitId,
    pub(crate) tx_id: TxId,
}

impl FrameHeader {
    pub(crate) fn new(unit_id: UnitId, tx_id: TxId) -> Self {
        FrameHeader { unit_id, tx_id }
    }
}

pub(crate) struct Frame {
    pub(crate) header: FrameHeader,
    length: usize,
    pdu: [u8; constants::MAX_ADU_LENGTH],
}

impl Frame {
    pub(crate) fn new(header: FrameHeader) -> Frame {
        Frame {
            header,
            length: 0,
            pdu: [0; constants::MAX_ADU_LENGTH],
        }
    }

    pub(crate) fn set(&mut self, src: &[u8]) -> bool {
        if src.len() > self.pdu.len() {
            return false;
        }

        self.pdu[0..src.len()].copy_from_slice(src);
        self.length = src.len();
        true
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.pdu[0..self.length]
    }
}

/// Defines an interface for reading complete frames off a stream
pub(crate) trait FrameParser {
    fn max_frame_size(&self) -> usize;

    /// Parse bytes using the provided buffer. Advancing the buffer always
    /// implies that the bytes are consumed and can be discarded.
    ///
    /// `Err` implies the input data is invalid
    /// `Ok(None)` implies that more data is required to complete parsing
    /// `Ok(Some(..))` will contain a fully parsed frame and will advance the buffer appropriately
    fn parse(&mut self, buffer: &mut ReadBuffer) -> Result<Option<Frame>, RequestError>;
}

pub(crate) struct FramedReader<T>
where
    T: FrameParser,
{
    parser: T,
    buffer: ReadBuffer,
}

impl<T: FrameParser> FramedReader<T> {
    pub(crate) fn new(parser: T) -> Self {
        let size = parser.max_frame_size();
        Self {
            parser,
            buffer: ReadBuffer::new(size),
        }
    }

    pub(crate) async fn next_frame(
        &mut self,
        io: &mut PhysLayer,
        decode: PhysDecodeLevel,
    ) -> Result<Frame, RequestError> {
        loop {
            match self.parser.parse(&mut self.buffer)? {
                Some(frame) => return Ok(frame),
                None => {
                    self.buffer.read_some(io, decode).await?;
                }
            }
        }
    }

    /// Like [`next_frame`], but once any partial frame data is present, the
    /// remainder must arrive within `timeout`. Waiting for the *start* of a
    /// frame is unbounded so idle connections are never torn down.
    ///
    /// [`next_frame`]: Self::next_frame
    pub(crate) async fn next_frame_within(
        &mut self,
        io: &mut PhysLayer,
        decode: PhysDecodeLevel,
        timeout: Duration,
    ) -> Result<Frame, RequestError> {
        if self.buffer.is_empty() {
            self.buffer.read_some(io, decode).await?;
        }

        loop {
            if let Some(frame) = self.parser.parse(&mut self.buffer)? {
                return Ok(frame);
            }
            match tokio::time::timeout(timeout, self.buffer.read_some(io, decode)).await {
                Ok(result) => {
                    result?;
                }
                Err(_) => return Err(RequestError::ResponseTimeout),
            }
        }
    }
}
