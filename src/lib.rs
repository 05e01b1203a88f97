//! An implementation of the [Modbus](http://modbus.org/) TCP protocol for
//! register polling using [Tokio](https://docs.rs/tokio) and Rust's
//! `async/await` syntax.
//!
//! # Features
//!
//! * TCP client with connect-on-demand and transparent request chunking
//! * TCP server backed by a shared in-process register map
//! * Panic-free parsing of network input
//! * Configurable decoding of protocol traffic via `tracing`
//!
//! # Supported functions
//!
//! * Read Holding Registers (`0x03`)
//! * Write Single Register (`0x06`)
//!
//! # Examples
//!
//! A server sharing sixteen registers with a client that polls them:
//!
//! ```no_run
//! use regbus::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint: Endpoint = "modbus-tcp://127.0.0.1:502?size=16".parse()?;
//!     let server = spawn_server_task(&endpoint, UnitId::default(), DecodeLevel::nothing()).await?;
//!
//!     let mut client = Client::new("modbus-tcp://127.0.0.1:502?res_timeout_ms=1000".parse()?);
//!     client.write_register(7, 42).await?;
//!     assert_eq!(client.read_registers(7, 1).await?, vec![42]);
//!
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

/// client API
pub mod client;
/// server API
pub mod server;

mod common;
mod constants;
mod decode;
mod endpoint;
mod error;
mod exception;
mod tcp;
mod timer;
mod types;

pub use crate::client::{Client, SyncClient};
pub use crate::decode::*;
pub use crate::endpoint::*;
pub use crate::error::*;
pub use crate::exception::ExceptionCode;
pub use crate::server::{spawn_server_task, RegisterMap, ServerHandle};
pub use crate::timer::Timer;
pub use crate::types::*;
