use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::exception::ExceptionCode;
use crate::types::AddressRange;

/// The shared address space of 16-bit holding registers served by a server
///
/// Application-facing accessors ([`read`] / [`write`]) treat an out-of-range
/// access as a programming error in the owning application and panic.
/// Network-facing accessors used by sessions return
/// [`ExceptionCode::IllegalDataAddress`] instead, so a remote peer can never
/// crash the server.
///
/// Every successful mutation bumps a change counter observable through the
/// owning [`ServerHandle`](crate::server::ServerHandle).
///
/// [`read`]: Self::read
/// [`write`]: Self::write
pub struct RegisterMap {
    registers: Vec<u16>,
    version: u64,
    changes: watch::Sender<u64>,
}

pub(crate) type SharedRegisterMap = Arc<Mutex<RegisterMap>>;

impl RegisterMap {
    /// Create a map of `size` registers, all initialized to zero
    pub fn new(size: usize) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            registers: vec![0; size],
            version: 0,
            changes,
        }
    }

    /// Number of registers in the map
    pub fn size(&self) -> usize {
        self.registers.len()
    }

    /// Copy out the registers covered by `range`
    ///
    /// # Panics
    ///
    /// Panics if the range extends past the end of the map.
    pub fn read(&self, range: AddressRange) -> Vec<u16> {
        let std_range = range.to_std_range();
        assert!(
            std_range.end <= self.registers.len(),
            "register range out of bounds: {} with size {}",
            range,
            self.registers.len()
        );
        self.registers[std_range].to_vec()
    }

    /// Copy `values` into the map starting at `start`
    ///
    /// # Panics
    ///
    /// Panics if the values extend past the end of the map.
    pub fn write(&mut self, start: u16, values: &[u16]) {
        let begin = start as usize;
        let end = begin + values.len();
        assert!(
            end <= self.registers.len(),
            "register range out of bounds: start {:#06X} qty {} with size {}",
            start,
            values.len(),
            self.registers.len()
        );
        self.registers[begin..end].copy_from_slice(values);
        self.touch();
    }

    pub(crate) fn try_read(&self, range: AddressRange) -> Result<Vec<u16>, ExceptionCode> {
        let std_range = range.to_std_range();
        match self.registers.get(std_range) {
            Some(slice) => Ok(slice.to_vec()),
            None => Err(ExceptionCode::IllegalDataAddress),
        }
    }

    pub(crate) fn set(&mut self, address: u16, value: u16) -> Result<(), ExceptionCode> {
        match self.registers.get_mut(address as usize) {
            Some(x) => {
                *x = value;
                self.touch();
                Ok(())
            }
            None => Err(ExceptionCode::IllegalDataAddress),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub(crate) fn wrap(self) -> SharedRegisterMap {
        Arc::new(Mutex::new(self))
    }

    fn touch(&mut self) {
        self.version += 1;
        let _ = self.changes.send(self.version);
    }
}
