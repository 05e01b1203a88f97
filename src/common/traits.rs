use crate::common::cursor::{ReadCursor, WriteCursor};
use crate::error::RequestError;

/// Serialize a PDU body after the function code
pub(crate) trait Serialize {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError>;
}

/// Parse a PDU body after the function code
pub(crate) trait Parse: Sized {
    fn parse(cursor: &mut ReadCursor) -> Result<Self, RequestError>;
}
