use crate::common::buffer::ReadBuffer;
use crate::common::cursor::WriteCursor;
use crate::common::frame::{Frame, FrameHeader, FrameParser, TxId};
use crate::common::phys::format_bytes;
use crate::common::traits::Serialize;
use crate::decode::FrameDecodeLevel;
use crate::error::{FrameParseError, InternalError, RequestError};
use crate::types::UnitId;

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 7;
    pub(crate) const MAX_FRAME_LENGTH: usize =
        HEADER_LENGTH + crate::common::frame::constants::MAX_ADU_LENGTH;
    // the length field includes the 1-byte unit id, so it cannot be zero
    pub(crate) const MAX_LENGTH_FIELD: usize =
        crate::common::frame::constants::MAX_ADU_LENGTH + 1;
}

#[derive(Clone, Copy)]
struct MbapHeader {
    tx_id: TxId,
    adu_length: usize,
    unit_id: UnitId,
}

#[derive(Clone, Copy)]
enum ParseState {
    Begin,
    Header(MbapHeader),
}

pub(crate) struct MbapParser {
    state: ParseState,
    decode: FrameDecodeLevel,
}

pub(crate) struct MbapFormatter {
    buffer: [u8; constants::MAX_FRAME_LENGTH],
    decode: FrameDecodeLevel,
}

impl MbapParser {
    pub(crate) fn new(decode: FrameDecodeLevel) -> Self {
        Self {
            state: ParseState::Begin,
            decode,
        }
    }

    fn parse_header(buffer: &mut ReadBuffer) -> Result<MbapHeader, RequestError> {
        let tx_id = TxId::new(buffer.read_u16_be()?);
        let protocol_id = buffer.read_u16_be()?;
        let length = buffer.read_u16_be()? as usize;
        let unit_id = UnitId::new(buffer.read_u8()?);

        if protocol_id != 0 {
            return Err(FrameParseError::UnknownProtocolId(protocol_id).into());
        }

        if length > constants::MAX_LENGTH_FIELD {
            return Err(
                FrameParseError::MbapLengthTooBig(length, constants::MAX_LENGTH_FIELD).into(),
            );
        }

        // must be > 0 b/c the 1-byte unit identifier counts towards the length
        if length == 0 {
            return Err(FrameParseError::MbapLengthZero.into());
        }

        Ok(MbapHeader {
            tx_id,
            adu_length: length - 1,
            unit_id,
        })
    }

    fn parse_body(&self, header: &MbapHeader, buffer: &mut ReadBuffer) -> Result<Frame, RequestError> {
        let mut frame = Frame::new(FrameHeader::new(header.unit_id, header.tx_id));
        frame.set(buffer.read(header.adu_length)?);

        if self.decode.enabled() {
            tracing::info!(
                "FRAME RX - {}",
                MbapDisplay::new(self.decode, header.tx_id, header.unit_id, frame.payload())
            );
        }

        Ok(frame)
    }
}

impl FrameParser for MbapParser {
    fn max_frame_size(&self) -> usize {
        constants::MAX_FRAME_LENGTH
    }

    fn parse(&mut self, buffer: &mut ReadBuffer) -> Result<Option<Frame>, RequestError> {
        match self.state {
            ParseState::Header(header) => {
                if buffer.len() < header.adu_length {
                    return Ok(None);
                }

                let ret = self.parse_body(&header, buffer)?;
                self.state = ParseState::Begin;
                Ok(Some(ret))
            }
            ParseState::Begin => {
                if buffer.len() < constants::HEADER_LENGTH {
                    return Ok(None);
                }

                self.state = ParseState::Header(Self::parse_header(buffer)?);
                self.parse(buffer)
            }
        }
    }
}

impl MbapFormatter {
    pub(crate) fn new(decode: FrameDecodeLevel) -> Self {
        Self {
            buffer: [0; constants::MAX_FRAME_LENGTH],
            decode,
        }
    }

    pub(crate) fn format(
        &mut self,
        header: FrameHeader,
        function: u8,
        msg: &dyn Serialize,
    ) -> Result<&[u8], RequestError> {
        let mut cursor = WriteCursor::new(self.buffer.as_mut());
        cursor.write_u16_be(header.tx_id.to_u16())?;
        cursor.write_u16_be(0)?;
        cursor.seek_from_current(2)?; // the length is written afterwards
        cursor.write_u8(header.unit_id.value)?;

        let adu_length: usize = {
            let start = cursor.position();
            cursor.write_u8(function)?;
            msg.serialize(&mut cursor)?;
            cursor.position() - start
        };

        {
            let length_field = adu_length + 1; // includes the unit id
            if length_field > constants::MAX_LENGTH_FIELD {
                return Err(InternalError::AduTooBig(adu_length).into());
            }
            cursor.seek_from_start(4)?;
            cursor.write_u16_be(length_field as u16)?;
        }

        let total_length = constants::HEADER_LENGTH + adu_length;

        if self.decode.enabled() {
            tracing::info!(
                "FRAME TX - {}",
                MbapDisplay::new(
                    self.decode,
                    header.tx_id,
                    header.unit_id,
                    &self.buffer[constants::HEADER_LENGTH..total_length]
                )
            );
        }

        Ok(&self.buffer[..total_length])
    }
}

struct MbapDisplay<'a> {
    level: FrameDecodeLevel,
    tx_id: TxId,
    unit_id: UnitId,
    payload: &'a [u8],
}

impl<'a> MbapDisplay<'a> {
    fn new(level: FrameDecodeLevel, tx_id: TxId, unit_id: UnitId, payload: &'a [u8]) -> Self {
        MbapDisplay {
            level,
            tx_id,
            unit_id,
            payload,
        }
    }
}

impl std::fmt::Display for MbapDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "tx_id: {} unit: {} (len = {})",
            self.tx_id,
            self.unit_id,
            self.payload.len()
        )?;
        if self.level.payload_enabled() {
            format_bytes(f, self.payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::block_on;

    use crate::common::cursor::WriteCursor;
    use crate::common::frame::FramedReader;
    use crate::common::phys::PhysLayer;
    use crate::decode::PhysDecodeLevel;

    use super::*;

    //                            |   tx id  |  proto id |  length  | unit |  payload   |
    const SIMPLE_FRAME: &[u8] = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x2A, 0x03, 0x04];

    struct MockMessage {
        a: u8,
    }

    impl Serialize for MockMessage {
        fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
            cursor.write_u8(self.a)?;
            Ok(())
        }
    }

    fn reader() -> FramedReader<MbapParser> {
        FramedReader::new(MbapParser::new(FrameDecodeLevel::Nothing))
    }

    fn assert_equals_simple_frame(frame: &Frame) {
        assert_eq!(frame.header.tx_id, TxId::new(0x0007));
        assert_eq!(frame.header.unit_id, UnitId::new(0x2A));
        assert_eq!(frame.payload(), &[0x03, 0x04]);
    }

    fn test_segmented_parse(split_at: usize) {
        let (f1, f2) = SIMPLE_FRAME.split_at(split_at);
        let mut io = PhysLayer::new_mock(tokio_test::io::Builder::new().read(f1).read(f2).build());
        let mut reader = reader();
        let frame = block_on(reader.next_frame(&mut io, PhysDecodeLevel::Nothing)).unwrap();

        assert_equals_simple_frame(&frame);
    }

    fn test_error(input: &[u8]) -> RequestError {
        let mut io = PhysLayer::new_mock(tokio_test::io::Builder::new().read(input).build());
        let mut reader = reader();
        block_on(reader.next_frame(&mut io, PhysDecodeLevel::Nothing))
            .err()
            .unwrap()
    }

    #[test]
    fn correctly_formats_frame() {
        let mut formatter = MbapFormatter::new(FrameDecodeLevel::Nothing);
        let msg = MockMessage { a: 0x04 };
        let header = FrameHeader::new(UnitId::new(42), TxId::new(7));
        let output = formatter.format(header, 0x03, &msg).unwrap();

        assert_eq!(output, SIMPLE_FRAME)
    }

    #[test]
    fn can_parse_frame_from_stream() {
        let mut io =
            PhysLayer::new_mock(tokio_test::io::Builder::new().read(SIMPLE_FRAME).build());
        let mut reader = reader();
        let frame = block_on(reader.next_frame(&mut io, PhysDecodeLevel::Nothing)).unwrap();

        assert_equals_simple_frame(&frame);
    }

    #[test]
    fn can_parse_maximum_size_frame() {
        // maximum ADU length is 253, so the max MBAP length value is 254 which is 0xFE
        let header = &[0x00, 0x07, 0x00, 0x00, 0x00, 0xFE, 0x2A];
        let payload = &[0xCC; 253];

        let mut io = PhysLayer::new_mock(
            tokio_test::io::Builder::new()
                .read(header)
                .read(payload)
                .build(),
        );
        let mut reader = reader();
        let frame = block_on(reader.next_frame(&mut io, PhysDecodeLevel::Nothing)).unwrap();

        assert_eq!(frame.payload(), payload.as_ref());
    }

    #[test]
    fn can_parse_frame_if_segmented_in_header() {
        test_segmented_parse(4);
    }

    #[test]
    fn can_parse_frame_if_segmented_in_payload() {
        test_segmented_parse(8);
    }

    #[test]
    fn errors_on_bad_protocol_id() {
        let frame = &[0x00, 0x07, 0xCA, 0xFE, 0x00, 0x01, 0x2A];
        assert_eq!(
            test_error(frame),
            FrameParseError::UnknownProtocolId(0xCAFE).into()
        );
    }

    #[test]
    fn errors_on_length_of_zero() {
        let frame = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0x2A];
        assert_eq!(test_error(frame), FrameParseError::MbapLengthZero.into());
    }

    #[test]
    fn errors_when_mbap_length_too_big() {
        let frame = &[0x00, 0x07, 0x00, 0x00, 0x00, 0xFF, 0x2A];
        assert_eq!(
            test_error(frame),
            FrameParseError::MbapLengthTooBig(0xFF, constants::MAX_LENGTH_FIELD).into()
        );
    }
}
