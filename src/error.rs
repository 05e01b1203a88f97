use crate::exception::ExceptionCode;

/// Top-level error for any request made through a client or applied by a server session
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RequestError {
    /// An I/O error occurred on the underlying stream
    Io(std::io::ErrorKind),
    /// A response ADU could not be interpreted
    BadResponse(AduParseError),
    /// A frame could not be parsed off the stream
    BadFrame(FrameParseError),
    /// The request parameters are invalid
    BadRequest(InvalidRange),
    /// The remote device responded with a Modbus exception
    Exception(ExceptionCode),
    /// A bug in the library prevented serialization
    Internal(InternalError),
    /// The timeout elapsed before the operation could complete
    ResponseTimeout,
    /// No connection exists to the remote device
    NoConnection,
    /// The owning task was shut down
    Shutdown,
}

impl std::error::Error for RequestError {}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RequestError::Io(kind) => write!(f, "I/O error: {kind}"),
            RequestError::BadResponse(err) => write!(f, "bad response: {err}"),
            RequestError::BadFrame(err) => write!(f, "bad frame: {err}"),
            RequestError::BadRequest(err) => write!(f, "bad request: {err}"),
            RequestError::Exception(ex) => write!(f, "device exception: {ex}"),
            RequestError::Internal(err) => write!(f, "internal error: {err}"),
            RequestError::ResponseTimeout => {
                f.write_str("timeout elapsed before the operation could complete")
            }
            RequestError::NoConnection => f.write_str("no connection exists to the remote device"),
            RequestError::Shutdown => f.write_str("the owning task was shut down"),
        }
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io(err.kind())
    }
}

impl From<AduParseError> for RequestError {
    fn from(err: AduParseError) -> Self {
        RequestError::BadResponse(err)
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::BadFrame(err)
    }
}

impl From<InvalidRange> for RequestError {
    fn from(err: InvalidRange) -> Self {
        RequestError::BadRequest(err)
    }
}

impl From<ExceptionCode> for RequestError {
    fn from(ex: ExceptionCode) -> Self {
        RequestError::Exception(ex)
    }
}

impl From<InternalError> for RequestError {
    fn from(err: InternalError) -> Self {
        RequestError::Internal(err)
    }
}

/// Errors that occur while parsing requests and responses
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AduParseError {
    /// The ADU is too short to be valid
    InsufficientBytes,
    /// The byte count doesn't match what is expected based on the request (expected, actual)
    RequestByteCountMismatch(usize, usize),
    /// The ADU contains extra trailing bytes
    TrailingBytes(usize),
    /// A parameter expected to be echoed in the reply did not match
    ReplyEchoMismatch,
    /// An unknown response function code was received (actual, expected, expected error)
    UnknownResponseFunction(u8, u8, u8),
}

impl std::error::Error for AduParseError {}

impl std::fmt::Display for AduParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AduParseError::InsufficientBytes => f.write_str("ADU is too short to be valid"),
            AduParseError::RequestByteCountMismatch(expected, actual) => write!(
                f,
                "byte count ({actual}) doesn't match what is expected based on the request ({expected})"
            ),
            AduParseError::TrailingBytes(remaining) => {
                write!(f, "ADU contains {remaining} extra trailing bytes")
            }
            AduParseError::ReplyEchoMismatch => {
                f.write_str("a parameter expected to be echoed in the reply did not match")
            }
            AduParseError::UnknownResponseFunction(actual, expected, error) => write!(
                f,
                "received unknown response function code: {actual}. Expected {expected} or {error}"
            ),
        }
    }
}

/// Errors that occur while parsing a frame off the stream
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FrameParseError {
    /// Received a frame with the MBAP length field set to zero
    MbapLengthZero,
    /// Received a frame with an MBAP length that exceeds the maximum allowed size (actual, maximum)
    MbapLengthTooBig(usize, usize),
    /// Received a frame with a non-Modbus protocol id
    UnknownProtocolId(u16),
}

impl std::error::Error for FrameParseError {}

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameParseError::MbapLengthZero => {
                f.write_str("received a frame with the MBAP length field set to zero")
            }
            FrameParseError::MbapLengthTooBig(size, max) => write!(
                f,
                "received a frame with length ({size}) that exceeds the maximum allowed size ({max})"
            ),
            FrameParseError::UnknownProtocolId(id) => {
                write!(f, "received a frame with non-Modbus protocol id: {id}")
            }
        }
    }
}

/// Errors that result from bad request parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InvalidRange {
    /// Count of zero is not allowed
    CountOfZero,
    /// Start and count would overflow the u16 address space (start, count)
    AddressOverflow(u16, u16),
    /// Count is too large for the request type (count, maximum)
    CountTooLargeForType(u16, u16),
}

impl std::error::Error for InvalidRange {}

impl std::fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InvalidRange::CountOfZero => f.write_str("range contains a count of zero"),
            InvalidRange::AddressOverflow(start, count) => write!(
                f,
                "start == {start} and count == {count} would overflow the u16 address space"
            ),
            InvalidRange::CountTooLargeForType(count, max) => write!(
                f,
                "the count of {count} exceeds the maximum allowed count of {max} for this request"
            ),
        }
    }
}

/// Errors that indicate bugs in the library itself, e.g. while writing values to buffers
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InternalError {
    /// Attempted to write more bytes than space remaining (requested, remaining)
    InsufficientWriteSpace(usize, usize),
    /// The calculated ADU size exceeds what is allowed by the specification
    AduTooBig(usize),
    /// Attempted to read more bytes than present (requested, remaining)
    InsufficientBytesForRead(usize, usize),
    /// A cursor seek exceeded the bounds of the underlying buffer
    BadSeekOperation,
    /// The byte count would exceed the maximum size of a u8
    BadByteCount(usize),
}

impl std::error::Error for InternalError {}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InternalError::InsufficientWriteSpace(requested, remaining) => write!(
                f,
                "attempted to write {requested} bytes with {remaining} bytes remaining"
            ),
            InternalError::AduTooBig(size) => write!(
                f,
                "ADU length of {size} exceeds the maximum allowed length"
            ),
            InternalError::InsufficientBytesForRead(requested, remaining) => write!(
                f,
                "attempted to read {requested} bytes with only {remaining} remaining"
            ),
            InternalError::BadSeekOperation => {
                f.write_str("cursor seek operation exceeded the bounds of the underlying buffer")
            }
            InternalError::BadByteCount(count) => {
                write!(f, "byte count would exceed the maximum size of a u8: {count}")
            }
        }
    }
}
