use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::common::cursor::ReadCursor;
use crate::common::frame::{Frame, FrameHeader, FramedReader, TxId};
use crate::common::function::FunctionCode;
use crate::common::phys::PhysLayer;
use crate::common::traits::Serialize;
use crate::constants::limits;
use crate::decode::DecodeLevel;
use crate::endpoint::Endpoint;
use crate::error::{AduParseError, RequestError};
use crate::exception::ExceptionCode;
use crate::tcp::frame::{MbapFormatter, MbapParser};
use crate::types::{AddressRange, Indexed, UnitId};

mod sync;

pub use sync::SyncClient;

/// A Modbus TCP client ("master") that polls a single remote device
///
/// The connection is established lazily on the first request and torn down
/// on any error, so the next request reconnects. Reads larger than the
/// wire-imposed limit of 125 registers are split into multiple requests
/// transparently.
///
/// Movable, not copyable: the client exclusively owns its socket.
pub struct Client {
    endpoint: Endpoint,
    unit_id: UnitId,
    response_timeout: Duration,
    decode: DecodeLevel,
    connection: Option<Connection>,
}

struct Connection {
    phys: PhysLayer,
    reader: FramedReader<MbapParser>,
    writer: MbapFormatter,
    tx_id: TxId,
}

impl Connection {
    fn new(socket: TcpStream, decode: DecodeLevel) -> Self {
        Self {
            phys: PhysLayer::new_tcp(socket),
            reader: FramedReader::new(MbapParser::new(decode.frame)),
            writer: MbapFormatter::new(decode.frame),
            tx_id: TxId::default(),
        }
    }

    /// write one request and wait for the matching response or the deadline
    async fn transact(
        &mut self,
        unit_id: UnitId,
        response_timeout: Duration,
        function: FunctionCode,
        msg: &(dyn Serialize + Sync),
        decode: DecodeLevel,
    ) -> Result<Frame, RequestError> {
        let tx_id = self.tx_id.next();
        let bytes = self
            .writer
            .format(FrameHeader::new(unit_id, tx_id), function.get_value(), msg)?;
        self.phys.write(bytes, decode.phys).await?;

        let deadline = Instant::now() + response_timeout;

        loop {
            let frame = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(RequestError::ResponseTimeout);
                }
                frame = self.reader.next_frame(&mut self.phys, decode.phys) => {
                    frame?
                }
            };

            // responses to stale transactions may still be in flight, skip them
            if frame.header.tx_id != tx_id {
                tracing::warn!(
                    "received response {} while expecting {}",
                    frame.header.tx_id,
                    tx_id
                );
                continue;
            }

            return Ok(frame);
        }
    }
}

impl Client {
    /// Create a client for the endpoint. No I/O occurs until the first request.
    pub fn new(endpoint: Endpoint) -> Self {
        let response_timeout = endpoint.timeout();
        Self {
            endpoint,
            unit_id: UnitId::default(),
            response_timeout,
            decode: DecodeLevel::nothing(),
            connection: None,
        }
    }

    /// Address requests to a specific unit id instead of the default `0xFF`
    pub fn with_unit_id(mut self, unit_id: UnitId) -> Self {
        self.unit_id = unit_id;
        self
    }

    /// Enable decode logging of protocol traffic
    pub fn with_decode_level(mut self, decode: DecodeLevel) -> Self {
        self.decode = decode;
        self
    }

    /// Whether a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Read `count` holding registers starting at `start`
    ///
    /// Counts above 125 are split into multiple requests; the values are
    /// returned in address order as if a single request had been made. On
    /// any failure the connection is closed and partial results are
    /// discarded.
    pub async fn read_registers(
        &mut self,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, RequestError> {
        let range = AddressRange::try_from(start, count)?;
        match self.read_chunked(range).await {
            Ok(values) => Ok(values),
            Err(err) => {
                self.close();
                Err(err)
            }
        }
    }

    /// Write a single holding register
    ///
    /// On any failure the connection is closed and the next request reconnects.
    pub async fn write_register(&mut self, address: u16, value: u16) -> Result<(), RequestError> {
        let request = Indexed::new(address, value);
        let result = self.write_single(request).await;
        if result.is_err() {
            self.close();
        }
        result
    }

    /// Release the connection if one is held. Idempotent.
    pub fn close(&mut self) {
        if self.connection.take().is_some() {
            tracing::info!(
                "closed connection to {}:{}",
                self.endpoint.host(),
                self.endpoint.port()
            );
        }
    }

    async fn read_chunked(&mut self, range: AddressRange) -> Result<Vec<u16>, RequestError> {
        let mut values = Vec::with_capacity(range.count as usize);
        for chunk in range.chunks(limits::MAX_READ_REGISTERS_COUNT) {
            let frame = self
                .transact(FunctionCode::ReadHoldingRegisters, &chunk)
                .await?;
            values.extend(parse_read_response(frame.payload(), chunk)?);
        }
        Ok(values)
    }

    async fn write_single(&mut self, request: Indexed<u16>) -> Result<(), RequestError> {
        let frame = self
            .transact(FunctionCode::WriteSingleRegister, &request)
            .await?;
        parse_write_response(frame.payload(), request)
    }

    async fn transact(
        &mut self,
        function: FunctionCode,
        msg: &(dyn Serialize + Sync),
    ) -> Result<Frame, RequestError> {
        let unit_id = self.unit_id;
        let response_timeout = self.response_timeout;
        let decode = self.decode;
        if decode.app.enabled() {
            tracing::info!("PDU TX - {}", function);
        }
        let connection = self.acquire().await?;
        connection
            .transact(unit_id, response_timeout, function, msg, decode)
            .await
    }

    async fn acquire(&mut self) -> Result<&mut Connection, RequestError> {
        if self.connection.is_none() {
            let socket =
                TcpStream::connect((self.endpoint.host(), self.endpoint.port())).await?;
            tracing::info!(
                "connected to {}:{}",
                self.endpoint.host(),
                self.endpoint.port()
            );
            self.connection = Some(Connection::new(socket, self.decode));
        }
        match self.connection.as_mut() {
            Some(connection) => Ok(connection),
            None => Err(RequestError::NoConnection),
        }
    }
}

fn expect_function(cursor: &mut ReadCursor, function: FunctionCode) -> Result<(), RequestError> {
    let received = cursor.read_u8()?;

    if received == function.as_error() {
        let ex = ExceptionCode::from(cursor.read_u8()?);
        cursor.expect_empty()?;
        return Err(ex.into());
    }

    if received != function.get_value() {
        return Err(AduParseError::UnknownResponseFunction(
            received,
            function.get_value(),
            function.as_error(),
        )
        .into());
    }

    Ok(())
}

fn parse_read_response(payload: &[u8], request: AddressRange) -> Result<Vec<u16>, RequestError> {
    let mut cursor = ReadCursor::new(payload);
    expect_function(&mut cursor, FunctionCode::ReadHoldingRegisters)?;

    let byte_count = cursor.read_u8()? as usize;
    let expected = 2 * request.count as usize;
    if byte_count != expected {
        return Err(AduParseError::RequestByteCountMismatch(expected, byte_count).into());
    }

    let mut values = Vec::with_capacity(request.count as usize);
    for _ in 0..request.count {
        values.push(cursor.read_u16_be()?);
    }
    cursor.expect_empty()?;
    Ok(values)
}

fn parse_write_response(payload: &[u8], request: Indexed<u16>) -> Result<(), RequestError> {
    let mut cursor = ReadCursor::new(payload);
    expect_function(&mut cursor, FunctionCode::WriteSingleRegister)?;

    let index = cursor.read_u16_be()?;
    let value = cursor.read_u16_be()?;
    cursor.expect_empty()?;

    if Indexed::new(index, value) != request {
        return Err(AduParseError::ReplyEchoMismatch.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_read_response() {
        let payload = &[0x03, 0x04, 0xCA, 0xFE, 0x00, 0x2A];
        let values =
            parse_read_response(payload, AddressRange::try_from(0, 2).unwrap()).unwrap();
        assert_eq!(values, vec![0xCAFE, 0x002A]);
    }

    #[test]
    fn read_response_with_wrong_byte_count_is_rejected() {
        let payload = &[0x03, 0x02, 0xCA, 0xFE];
        let err = parse_read_response(payload, AddressRange::try_from(0, 2).unwrap())
            .err()
            .unwrap();
        assert_eq!(err, AduParseError::RequestByteCountMismatch(4, 2).into());
    }

    #[test]
    fn read_response_with_trailing_bytes_is_rejected() {
        let payload = &[0x03, 0x02, 0xCA, 0xFE, 0xFF];
        let err = parse_read_response(payload, AddressRange::try_from(0, 1).unwrap())
            .err()
            .unwrap();
        assert_eq!(err, AduParseError::TrailingBytes(1).into());
    }

    #[test]
    fn exception_response_surfaces_the_exception_code() {
        let payload = &[0x83, 0x02];
        let err = parse_read_response(payload, AddressRange::try_from(0, 1).unwrap())
            .err()
            .unwrap();
        assert_eq!(err, RequestError::Exception(ExceptionCode::IllegalDataAddress));
    }

    #[test]
    fn unknown_response_function_is_rejected() {
        let payload = &[0x04, 0x02, 0xCA, 0xFE];
        let err = parse_read_response(payload, AddressRange::try_from(0, 1).unwrap())
            .err()
            .unwrap();
        assert_eq!(
            err,
            AduParseError::UnknownResponseFunction(0x04, 0x03, 0x83).into()
        );
    }

    #[test]
    fn write_response_must_echo_the_request() {
        let payload = &[0x06, 0x00, 0x01, 0xCA, 0xFE];
        assert_eq!(
            parse_write_response(payload, Indexed::new(0x0001, 0xCAFE)),
            Ok(())
        );
        assert_eq!(
            parse_write_response(payload, Indexed::new(0x0001, 0xCAFF))
                .err()
                .unwrap(),
            AduParseError::ReplyEchoMismatch.into()
        );
    }
}
