use crate::common::cursor::ReadCursor;
use crate::common::frame::FrameHeader;
use crate::common::function::FunctionCode;
use crate::common::traits::Parse;
use crate::constants::limits;
use crate::decode::AppDecodeLevel;
use crate::error::RequestError;
use crate::server::map::SharedRegisterMap;
use crate::server::response::RegisterValues;
use crate::tcp::frame::MbapFormatter;
use crate::types::{AddressRange, Indexed};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Request {
    ReadRegisters(AddressRange),
    WriteRegister(Indexed<u16>),
}

impl Request {
    pub(crate) fn function(&self) -> FunctionCode {
        match self {
            Request::ReadRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Request::WriteRegister(_) => FunctionCode::WriteSingleRegister,
        }
    }

    pub(crate) fn parse(
        function: FunctionCode,
        cursor: &mut ReadCursor,
    ) -> Result<Self, RequestError> {
        match function {
            FunctionCode::ReadHoldingRegisters => {
                let range = AddressRange::parse(cursor)?
                    .limited_to(limits::MAX_READ_REGISTERS_COUNT)?;
                cursor.expect_empty()?;
                Ok(Request::ReadRegisters(range))
            }
            FunctionCode::WriteSingleRegister => {
                let value = Indexed::<u16>::parse(cursor)?;
                cursor.expect_empty()?;
                Ok(Request::WriteRegister(value))
            }
        }
    }

    /// Apply the request to the shared map and format the reply, successful
    /// or exception, into the writer's buffer
    pub(crate) fn get_reply<'a>(
        &self,
        header: FrameHeader,
        map: &SharedRegisterMap,
        writer: &'a mut MbapFormatter,
    ) -> Result<&'a [u8], RequestError> {
        let function = self.function();
        match self {
            Request::ReadRegisters(range) => {
                let result = map.lock().unwrap().try_read(*range);
                match result {
                    Ok(values) => writer.format(
                        header,
                        function.get_value(),
                        &RegisterValues::new(&values),
                    ),
                    Err(ex) => writer.format(header, function.as_error(), &ex),
                }
            }
            Request::WriteRegister(request) => {
                let result = map.lock().unwrap().set(request.index, request.value);
                match result {
                    Ok(()) => writer.format(header, function.get_value(), request),
                    Err(ex) => writer.format(header, function.as_error(), &ex),
                }
            }
        }
    }
}

pub(crate) struct RequestDisplay<'a> {
    request: &'a Request,
    level: AppDecodeLevel,
}

impl<'a> RequestDisplay<'a> {
    pub(crate) fn new(level: AppDecodeLevel, request: &'a Request) -> Self {
        Self { request, level }
    }
}

impl std::fmt::Display for RequestDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.request.function())?;

        if self.level.data_headers() {
            match self.request {
                Request::ReadRegisters(range) => write!(f, " {range}")?,
                Request::WriteRegister(request) => write!(f, " {request}")?,
            }
        }

        Ok(())
    }
}
