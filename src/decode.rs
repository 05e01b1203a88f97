/// Controls how much of the protocol traffic is logged via `tracing`
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DecodeLevel {
    /// Controls decoding of requests and responses at the application layer
    pub app: AppDecodeLevel,
    /// Controls decoding of the MBAP frame header and raw payload
    pub frame: FrameDecodeLevel,
    /// Controls logging of the bytes read from and written to the socket
    pub phys: PhysDecodeLevel,
}

/// Decoding of requests and responses at the application layer
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AppDecodeLevel {
    /// Decode nothing
    Nothing,
    /// Decode the function code only
    FunctionCode,
    /// Decode the function code and the address/count/value headers
    DataHeaders,
}

/// Decoding of the MBAP frame
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FrameDecodeLevel {
    /// Decode nothing
    Nothing,
    /// Decode the header (transaction id, unit id, length)
    Header,
    /// Decode the header and the raw payload as hexadecimal
    Payload,
}

/// Logging of data at the physical layer
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PhysDecodeLevel {
    /// Log nothing
    Nothing,
    /// Log only the length of data that is sent and received
    Length,
    /// Log the length and the actual data that is sent and received
    Data,
}

impl DecodeLevel {
    /// construct a `DecodeLevel` with nothing enabled
    pub fn nothing() -> Self {
        Self::default()
    }

    /// construct a `DecodeLevel` from its fields
    pub fn new(app: AppDecodeLevel, frame: FrameDecodeLevel, phys: PhysDecodeLevel) -> Self {
        DecodeLevel { app, frame, phys }
    }

    /// construct a `DecodeLevel` with only application decoding enabled
    pub fn application(app: AppDecodeLevel) -> Self {
        DecodeLevel {
            app,
            frame: FrameDecodeLevel::Nothing,
            phys: PhysDecodeLevel::Nothing,
        }
    }
}

impl Default for DecodeLevel {
    fn default() -> Self {
        Self {
            app: AppDecodeLevel::Nothing,
            frame: FrameDecodeLevel::Nothing,
            phys: PhysDecodeLevel::Nothing,
        }
    }
}

impl AppDecodeLevel {
    pub(crate) fn enabled(&self) -> bool {
        !matches!(self, AppDecodeLevel::Nothing)
    }

    pub(crate) fn data_headers(&self) -> bool {
        matches!(self, AppDecodeLevel::DataHeaders)
    }
}

impl FrameDecodeLevel {
    pub(crate) fn enabled(&self) -> bool {
        !matches!(self, FrameDecodeLevel::Nothing)
    }

    pub(crate) fn payload_enabled(&self) -> bool {
        matches!(self, FrameDecodeLevel::Payload)
    }
}

impl PhysDecodeLevel {
    pub(crate) fn enabled(&self) -> bool {
        !matches!(self, PhysDecodeLevel::Nothing)
    }

    pub(crate) fn data_enabled(&self) -> bool {
        matches!(self, PhysDecodeLevel::Data)
    }
}
