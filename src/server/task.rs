use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::common::cursor::ReadCursor;
use crate::common::frame::{Frame, FramedReader};
use crate::common::function::FunctionCode;
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::RequestError;
use crate::exception::ExceptionCode;
use crate::server::map::SharedRegisterMap;
use crate::server::request::{Request, RequestDisplay};
use crate::tcp::frame::{MbapFormatter, MbapParser};
use crate::types::UnitId;

struct SessionTracker {
    id: u64,
    sessions: BTreeMap<u64, mpsc::Sender<()>>,
}

type SessionTrackerWrapper = Arc<Mutex<SessionTracker>>;

impl SessionTracker {
    fn new() -> SessionTracker {
        Self {
            id: 0,
            sessions: BTreeMap::new(),
        }
    }

    fn wrapped() -> SessionTrackerWrapper {
        Arc::new(Mutex::new(Self::new()))
    }

    fn add(&mut self, sender: mpsc::Sender<()>) -> u64 {
        let id = self.id;
        self.id += 1;
        self.sessions.insert(id, sender);
        id
    }

    fn remove(&mut self, id: u64) {
        self.sessions.remove(&id);
    }
}

pub(crate) struct ServerTask {
    listener: TcpListener,
    map: SharedRegisterMap,
    unit_id: UnitId,
    request_timeout: Duration,
    tracker: SessionTrackerWrapper,
    decode: DecodeLevel,
}

impl ServerTask {
    pub(crate) fn new(
        listener: TcpListener,
        map: SharedRegisterMap,
        unit_id: UnitId,
        request_timeout: Duration,
        decode: DecodeLevel,
    ) -> Self {
        Self {
            listener,
            map,
            unit_id,
            request_timeout,
            tracker: SessionTracker::wrapped(),
            decode,
        }
    }

    pub(crate) async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("server shutdown");
                    return;
                }
                result = self.listener.accept() => {
                    match result {
                        Err(err) => {
                            tracing::error!("error accepting connection: {}", err);
                            return;
                        }
                        Ok((socket, addr)) => self.handle(socket, addr),
                    }
                }
            }
        }
    }

    fn handle(&self, socket: TcpStream, addr: SocketAddr) {
        let phys = PhysLayer::new_tcp(socket);
        let decode = self.decode;
        let map = self.map.clone();
        let unit_id = self.unit_id;
        let request_timeout = self.request_timeout;
        let tracker = self.tracker.clone();
        let (tx, rx) = mpsc::channel(1);

        let id = self.tracker.lock().unwrap().add(tx);

        tracing::info!("accepted connection {} from: {}", id, addr);

        tokio::spawn(async move {
            SessionTask::new(phys, map, unit_id, request_timeout, rx, decode)
                .run()
                .await
                .ok();
            tracing::info!("shutdown session: {}", id);
            tracker.lock().unwrap().remove(id);
        });
    }
}

/// Serves one accepted connection until the peer disconnects, a frame-level
/// error occurs, or the server shuts down
pub(crate) struct SessionTask {
    phys: PhysLayer,
    map: SharedRegisterMap,
    unit_id: UnitId,
    request_timeout: Duration,
    reader: FramedReader<MbapParser>,
    writer: MbapFormatter,
    shutdown: mpsc::Receiver<()>,
    decode: DecodeLevel,
}

impl SessionTask {
    pub(crate) fn new(
        phys: PhysLayer,
        map: SharedRegisterMap,
        unit_id: UnitId,
        request_timeout: Duration,
        shutdown: mpsc::Receiver<()>,
        decode: DecodeLevel,
    ) -> Self {
        Self {
            phys,
            map,
            unit_id,
            request_timeout,
            reader: FramedReader::new(MbapParser::new(decode.frame)),
            writer: MbapFormatter::new(decode.frame),
            shutdown,
            decode,
        }
    }

    pub(crate) async fn run(&mut self) -> Result<(), RequestError> {
        loop {
            if let Err(err) = self.run_one().await {
                if err != RequestError::Shutdown {
                    tracing::warn!("ending session: {}", err);
                }
                return Err(err);
            }
        }
    }

    // a request is only read after the previous reply has been fully
    // written, so there is exactly one request in flight per connection
    async fn run_one(&mut self) -> Result<(), RequestError> {
        let frame = tokio::select! {
            biased;
            _ = self.shutdown.recv() => return Err(RequestError::Shutdown),
            frame = self.reader.next_frame_within(
                &mut self.phys,
                self.decode.phys,
                self.request_timeout,
            ) => frame?,
        };
        self.reply_to(frame).await
    }

    async fn reply_to(&mut self, frame: Frame) -> Result<(), RequestError> {
        // a request for an unrelated node sharing the transport gets no
        // reply, but the session keeps serving
        if frame.header.unit_id != self.unit_id {
            tracing::warn!(
                "ignoring frame for unmapped unit id: {}",
                frame.header.unit_id
            );
            return Ok(());
        }

        let mut cursor = ReadCursor::new(frame.payload());

        let function = match cursor.read_u8() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("received request without a function code");
                return Ok(());
            }
        };

        match FunctionCode::get(function) {
            None => {
                tracing::warn!("received unknown function code: {:#04X}", function);
                let bytes = self.writer.format(
                    frame.header,
                    function | 0x80,
                    &ExceptionCode::IllegalFunction,
                )?;
                self.phys.write(bytes, self.decode.phys).await?;
                Ok(())
            }
            Some(function) => match Request::parse(function, &mut cursor) {
                Ok(request) => {
                    if self.decode.app.enabled() {
                        tracing::info!(
                            "PDU RX - {}",
                            RequestDisplay::new(self.decode.app, &request)
                        );
                    }
                    let bytes = request.get_reply(frame.header, &self.map, &mut self.writer)?;
                    self.phys.write(bytes, self.decode.phys).await?;
                    Ok(())
                }
                Err(err) => {
                    tracing::warn!("error parsing {} request: {}", function, err);
                    let bytes = self.writer.format(
                        frame.header,
                        function.as_error(),
                        &ExceptionCode::IllegalDataValue,
                    )?;
                    self.phys.write(bytes, self.decode.phys).await?;
                    Ok(())
                }
            },
        }
    }
}
