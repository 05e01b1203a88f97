use crate::common::cursor::WriteCursor;
use crate::common::traits::Serialize;
use crate::error::{InternalError, RequestError};

/// Body of a read holding registers response: byte count followed by the values
pub(crate) struct RegisterValues<'a> {
    values: &'a [u16],
}

impl<'a> RegisterValues<'a> {
    pub(crate) fn new(values: &'a [u16]) -> Self {
        Self { values }
    }
}

impl Serialize for RegisterValues<'_> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        let byte_count = 2 * self.values.len();
        let byte_count = u8::try_from(byte_count)
            .map_err(|_| InternalError::BadByteCount(byte_count))?;
        cursor.write_u8(byte_count)?;
        for value in self.values {
            cursor.write_u16_be(*value)?;
        }
        Ok(())
    }
}
