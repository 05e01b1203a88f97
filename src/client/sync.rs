use crate::client::Client;
use crate::endpoint::Endpoint;
use crate::error::RequestError;

/// A blocking wrapper around [`Client`] for callers outside any async context
///
/// Owns a private current-thread Tokio runtime, so each call drives the
/// underlying request to completion before returning. Do not use from within
/// an async context; use [`Client`] directly there.
pub struct SyncClient {
    inner: Client,
    runtime: tokio::runtime::Runtime,
}

impl SyncClient {
    /// Create a blocking client for the endpoint
    pub fn new(endpoint: Endpoint) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            inner: Client::new(endpoint),
            runtime,
        })
    }

    /// Blocking variant of [`Client::read_registers`]
    pub fn read_registers(&mut self, start: u16, count: u16) -> Result<Vec<u16>, RequestError> {
        self.runtime
            .block_on(self.inner.read_registers(start, count))
    }

    /// Blocking variant of [`Client::write_register`]
    pub fn write_register(&mut self, address: u16, value: u16) -> Result<(), RequestError> {
        self.runtime.block_on(self.inner.write_register(address, value))
    }

    /// Release the connection if one is held. Idempotent.
    pub fn close(&mut self) {
        self.inner.close();
    }
}
