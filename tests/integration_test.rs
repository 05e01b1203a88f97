use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use regbus::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn spawn_server(params: &str, unit_id: UnitId) -> ServerHandle {
    let endpoint: Endpoint = format!("modbus-tcp://127.0.0.1:0{params}").parse().unwrap();
    spawn_server_task(&endpoint, unit_id, DecodeLevel::nothing())
        .await
        .unwrap()
}

fn client_for(server: &ServerHandle, params: &str) -> Client {
    let endpoint: Endpoint = format!("modbus-tcp://{}{}", server.local_addr(), params)
        .parse()
        .unwrap();
    Client::new(endpoint)
}

#[tokio::test]
async fn written_registers_are_visible_to_other_clients() {
    init_tracing();
    let mut server = spawn_server("?size=16", UnitId::default()).await;

    let mut writer = client_for(&server, "");
    for i in 0..16u16 {
        writer.write_register(i, 1000 + i).await.unwrap();
    }

    let mut reader = client_for(&server, "");
    let values = reader.read_registers(0, 16).await.unwrap();
    let expected: Vec<u16> = (1000..1016).collect();
    assert_eq!(values, expected);

    // the application sees the same registers directly
    assert_eq!(server.read_registers(0, 16), expected);

    // the writes were observable through the change signal
    assert!(server.has_changed());
    assert!(!server.has_changed());
}

#[tokio::test]
async fn round_trips_a_single_register() {
    init_tracing();
    let server = spawn_server("?size=16", UnitId::default()).await;

    let mut client = client_for(&server, "");
    client.write_register(7, 0xCAFE).await.unwrap();
    assert_eq!(client.read_registers(7, 1).await.unwrap(), vec![0xCAFE]);
}

#[tokio::test]
async fn reads_larger_than_one_request_are_chunked() {
    init_tracing();
    let server = spawn_server("?size=300", UnitId::default()).await;

    let values: Vec<u16> = (0..300u16).map(|i| i.wrapping_mul(3)).collect();
    server.write_registers(0, &values);

    let mut client = client_for(&server, "");
    assert_eq!(client.read_registers(0, 300).await.unwrap(), values);
}

#[tokio::test]
async fn out_of_range_read_returns_an_exception() {
    init_tracing();
    let server = spawn_server("?size=16", UnitId::default()).await;

    let mut client = client_for(&server, "");
    let err = client.read_registers(0, 100).await.err().unwrap();
    assert_eq!(
        err,
        RequestError::Exception(ExceptionCode::IllegalDataAddress)
    );
}

#[tokio::test]
async fn out_of_range_write_returns_an_exception() {
    init_tracing();
    let server = spawn_server("?size=16", UnitId::default()).await;

    let mut client = client_for(&server, "");
    let err = client.write_register(16, 1).await.err().unwrap();
    assert_eq!(
        err,
        RequestError::Exception(ExceptionCode::IllegalDataAddress)
    );
}

#[tokio::test]
async fn garbage_frame_closes_the_session_without_corrupting_the_map() {
    init_tracing();
    let server = spawn_server("?size=16", UnitId::default()).await;
    server.write_registers(0, &[0xAAAA, 0xBBBB]);

    // a frame with a non-Modbus protocol id kills this session only
    let mut raw = tokio::net::TcpStream::connect(server.local_addr())
        .await
        .unwrap();
    raw.write_all(&[0x00, 0x01, 0xCA, 0xFE, 0x00, 0x02, 0xFF, 0x03])
        .await
        .unwrap();

    let mut buf = [0u8; 16];
    match raw.read(&mut buf).await {
        Ok(0) | Err(_) => {}
        Ok(n) => panic!("expected the session to close, read {n} bytes"),
    }

    // other connections and the register map are unaffected
    let mut client = client_for(&server, "");
    assert_eq!(
        client.read_registers(0, 2).await.unwrap(),
        vec![0xAAAA, 0xBBBB]
    );
}

#[tokio::test]
async fn silent_server_times_out_and_the_client_reconnects() {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        let mut sockets = Vec::new();
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(x) => x,
                Err(_) => return,
            };
            counter.fetch_add(1, Ordering::SeqCst);
            // keep the socket open but never respond
            sockets.push(socket);
        }
    });

    let endpoint: Endpoint = format!("modbus-tcp://{addr}?res_timeout_ms=50").parse().unwrap();
    let mut client = Client::new(endpoint);

    let started = Instant::now();
    let err = client.read_registers(0, 1).await.err().unwrap();
    assert_eq!(err, RequestError::ResponseTimeout);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!client.is_connected());

    // the next request establishes a fresh connection
    let err = client.read_registers(0, 1).await.err().unwrap();
    assert_eq!(err, RequestError::ResponseTimeout);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn requests_for_another_unit_id_get_no_response() {
    init_tracing();
    let server = spawn_server("?size=16", UnitId::new(0x01)).await;

    // the default unit id does not match the server's
    let mut wrong = client_for(&server, "?res_timeout_ms=50");
    assert_eq!(
        wrong.read_registers(0, 1).await.err().unwrap(),
        RequestError::ResponseTimeout
    );

    let mut right = client_for(&server, "").with_unit_id(UnitId::new(0x01));
    assert_eq!(right.read_registers(0, 1).await.unwrap(), vec![0]);
}

#[tokio::test]
async fn close_is_idempotent_and_the_client_reconnects_afterwards() {
    init_tracing();
    let server = spawn_server("?size=16", UnitId::default()).await;

    let mut client = client_for(&server, "");
    client.write_register(3, 17).await.unwrap();
    assert!(client.is_connected());

    client.close();
    client.close();
    assert!(!client.is_connected());

    assert_eq!(client.read_registers(3, 1).await.unwrap(), vec![17]);
}

#[tokio::test]
async fn an_application_can_await_register_changes() {
    init_tracing();
    let mut server = spawn_server("?size=16", UnitId::default()).await;
    let addr = server.local_addr();

    tokio::spawn(async move {
        let endpoint: Endpoint = format!("modbus-tcp://{addr}").parse().unwrap();
        let mut client = Client::new(endpoint);
        client.write_register(0, 123).await.unwrap();
    });

    tokio::time::timeout(Duration::from_secs(5), server.changed())
        .await
        .unwrap();
    assert_eq!(server.read_registers(0, 1), vec![123]);
}

#[tokio::test]
async fn stopping_the_server_refuses_new_connections() {
    init_tracing();
    let server = spawn_server("?size=16", UnitId::default()).await;
    let addr = server.local_addr();

    let mut client = client_for(&server, "");
    client.write_register(0, 1).await.unwrap();

    server.stop().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let endpoint: Endpoint = format!("modbus-tcp://{addr}?res_timeout_ms=100").parse().unwrap();
    let mut late = Client::new(endpoint);
    assert!(late.read_registers(0, 1).await.is_err());
}
