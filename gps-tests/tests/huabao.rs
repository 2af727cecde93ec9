use std::time::Duration;

use gps_protocol::huabao::HuabaoDecoder;
use gps_server::server::Builder;
use gps_tests::{PATIENCE, TestServer, read_hex, send_hex};

const REGISTER: &str = "7e0100002d01917569023200070022044e37303434344d4c3530305f45445f47543235480000000000003536393032333202d4c1423537313931f27e";
const AUTH: &str = "7e0102000c0191756902320009303139313735363930323332bd7e";
const HEARTBEAT: &str = "7e000200000191756902320001bf7e";
const LOCATION: &str = "7e0200005601917569023200b90000000000000004029cfaee081d812c00000000000024060401282301040000006530010f31010051020000570800000000000000009f173530352c30312c373030642c30386362346132392c3135e10164e2020000f47e";

async fn start() -> TestServer {
    TestServer::start::<HuabaoDecoder>(
        Builder::new().track_connections(true),
        |device: &str| device == "019175690232",
    )
    .await
}

#[tokio::test]
async fn register_auth_heartbeat_location() {
    let mut server = start().await;
    let mut device = server.connect().await;

    send_hex(&mut device, REGISTER).await;
    assert_eq!(
        read_hex(&mut device, 30).await,
        "7e8100000f0191756902320000000700303139313735363930323332327e"
    );

    send_hex(&mut device, AUTH).await;
    assert_eq!(
        read_hex(&mut device, 20).await,
        "7e8001000501917569023200000009010200327e"
    );

    send_hex(&mut device, HEARTBEAT).await;
    assert_eq!(
        read_hex(&mut device, 20).await,
        "7e80010005019175690232000000010002003b7e"
    );

    send_hex(&mut device, LOCATION).await;
    assert_eq!(
        read_hex(&mut device, 20).await,
        "7e80010005019175690232000000b9020000837e"
    );

    let report = server.next_report().await;
    assert_eq!(report.protocol(), "huabao");
    assert_eq!(report.device(), "019175690232");
    let record = report.record().unwrap();
    assert_eq!(record.latitude(), -43.842286);
    assert_eq!(record.longitude(), 136.15134);
    assert_eq!(record.signal(), Some(15.0));
    assert_eq!(record.battery(), Some(100.0));
    assert_eq!(
        record.timestamp().to_rfc3339(),
        "2024-06-04T01:28:23+08:00"
    );
    assert_eq!(report.attributes().get("manufacturer").unwrap(), "70444");
}

#[tokio::test]
async fn connection_table_follows_sessions() {
    let mut server = start().await;
    let connections = server.connections.clone().unwrap();

    let mut device = server.connect().await;
    send_hex(&mut device, LOCATION).await;
    read_hex(&mut device, 20).await;
    server.next_report().await;

    let snapshot = connections.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].remote, device.local_addr().unwrap());
    let last = snapshot[0].last_report.as_ref().unwrap();
    assert_eq!(last.device(), "019175690232");

    drop(device);
    tokio::time::timeout(PATIENCE, async {
        while !connections.is_empty().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection was not removed");
}
