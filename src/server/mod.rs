use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::decode::DecodeLevel;
use crate::endpoint::Endpoint;
use crate::server::map::SharedRegisterMap;
use crate::server::task::ServerTask;
use crate::types::{AddressRange, UnitId};

mod map;
mod request;
mod response;
mod task;

pub use map::RegisterMap;

/// A handle to a running server task and to the register map it serves
///
/// The server runs from the moment [`spawn_server_task`] returns until
/// [`stop`] is called or the handle is dropped; either one shuts down the
/// accept loop and every session.
///
/// [`stop`]: Self::stop
pub struct ServerHandle {
    tx: mpsc::Sender<()>,
    map: SharedRegisterMap,
    changes: watch::Receiver<u64>,
    local_addr: SocketAddr,
}

/// Spawns a TCP server task onto the runtime. This method can only be called
/// from within the runtime context.
///
/// Resolves and binds the listen socket before returning; a server that
/// cannot bind cannot run, so bind errors are construction errors. The
/// register map is created here from the endpoint's `size` parameter and
/// lives as long as the returned handle. Each incoming connection spawns a
/// new session task serving requests addressed to `unit_id`.
pub async fn spawn_server_task(
    endpoint: &Endpoint,
    unit_id: UnitId,
    decode: DecodeLevel,
) -> Result<ServerHandle, std::io::Error> {
    let listener = TcpListener::bind((endpoint.host(), endpoint.port())).await?;
    let local_addr = listener.local_addr()?;

    let map = RegisterMap::new(endpoint.size()).wrap();
    let changes = map.lock().unwrap().subscribe();

    let (tx, rx) = mpsc::channel(1);
    let mut task = ServerTask::new(
        listener,
        map.clone(),
        unit_id,
        endpoint.timeout(),
        decode,
    );
    tokio::spawn(
        async move { task.run(rx).await }
            .instrument(tracing::info_span!("Modbus-Server-TCP", "listen" = ?local_addr)),
    );

    Ok(ServerHandle {
        tx,
        map,
        changes,
        local_addr,
    })
}

impl ServerHandle {
    /// Address the server is listening on, useful when binding to port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Copy `count` registers starting at `start` out of the shared map
    ///
    /// # Panics
    ///
    /// Panics if the range is invalid or extends past the end of the map.
    pub fn read_registers(&self, start: u16, count: u16) -> Vec<u16> {
        let range = match AddressRange::try_from(start, count) {
            Ok(range) => range,
            Err(err) => panic!("invalid register range: {err}"),
        };
        self.map.lock().unwrap().read(range)
    }

    /// Copy `values` into the shared map starting at `start`
    ///
    /// # Panics
    ///
    /// Panics if the values extend past the end of the map.
    pub fn write_registers(&self, start: u16, values: &[u16]) {
        self.map.lock().unwrap().write(start, values);
    }

    /// Wait until at least one register has been mutated since the last call
    /// to [`changed`] or [`has_changed`]
    ///
    /// [`changed`]: Self::changed
    /// [`has_changed`]: Self::has_changed
    pub async fn changed(&mut self) {
        let _ = self.changes.changed().await;
    }

    /// Non-blocking variant of [`changed`]: reports whether any register has
    /// been mutated since the last call, and marks the change observed
    ///
    /// [`changed`]: Self::changed
    pub fn has_changed(&mut self) -> bool {
        let changed = self.changes.has_changed().unwrap_or(false);
        if changed {
            self.changes.borrow_and_update();
        }
        changed
    }

    /// Shut down the accept loop and every session. Dropping the handle has
    /// the same effect.
    pub async fn stop(&self) {
        let _ = self.tx.send(()).await;
    }
}
