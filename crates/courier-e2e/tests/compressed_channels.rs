//! Full client/server exchanges under gzip, over sockets and HTTP.

#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clarity and assertions"
)]

use std::sync::Arc;

use rstest::rstest;
use serde_json::json;

use courier_client::{ClientCommunication, HttpCommunication, SocketCommunication};
use courier_config::{ClientConnectionInfo, ClientLoginInfo};
use courier_core::{CommandSpec, DirectExecutor, ExecutionEnvironment, ServiceRegistry};
use courier_e2e::{TestServer, demo_dispatcher, http_channel, socket_channel, valid_credentials};
use courier_protocol::{
    CommunicationId, CompressionSettings, Kind, Protocol, ServiceDefinition,
};

fn environment() -> ExecutionEnvironment {
    ExecutionEnvironment::new(Arc::new(ServiceRegistry::new()))
}

fn login_info(id: CommunicationId, server: &TestServer) -> ClientLoginInfo {
    let endpoint = server.endpoint(&id).expect("bound endpoint");
    let connection = ClientConnectionInfo::builder(id)
        .endpoint(endpoint)
        .build()
        .expect("connection info");
    ClientLoginInfo::new(connection, valid_credentials(), "e2e".to_owned())
}

#[rstest]
#[case::plain(CompressionSettings::None)]
#[case::gzip(CompressionSettings::Gzip)]
fn socket_channel_round_trips_under_compression(#[case] compression: CompressionSettings) {
    let id = CommunicationId::new(Protocol::Socket, Kind::ClientServer, "default");
    let server = TestServer::start(
        vec![socket_channel("default", compression)],
        demo_dispatcher(),
    )
    .expect("start server");
    let endpoint = server.endpoint(&id).expect("bound endpoint");

    let communication = SocketCommunication::new(id.clone(), endpoint, compression);
    communication.start();
    let session = communication
        .connect(&login_info(id, &server))
        .expect("connect");

    let proxy = communication
        .create_stateful_proxy(
            Arc::new(DirectExecutor),
            environment(),
            ServiceDefinition::new("order-book"),
            &session,
        )
        .expect("proxy");
    assert_eq!(
        proxy.invoke("add", vec![json!("bolts")]).expect("add"),
        json!(1)
    );
    assert_eq!(
        proxy.invoke("list", Vec::new()).expect("list"),
        json!(["bolts"])
    );
    assert!(communication.disconnect(&session).expect("logout"));
}

#[rstest]
#[case::plain(CompressionSettings::None)]
#[case::gzip(CompressionSettings::Gzip)]
fn http_channel_round_trips_under_compression(#[case] compression: CompressionSettings) {
    let id = CommunicationId::new(Protocol::Http, Kind::ClientServer, "default");
    let server = TestServer::start(
        vec![http_channel("default", compression)],
        demo_dispatcher(),
    )
    .expect("start server");
    let endpoint = server.endpoint(&id).expect("bound endpoint");

    let communication = HttpCommunication::new(id.clone(), endpoint, compression);
    communication.start();
    let session = communication
        .connect(&login_info(id, &server))
        .expect("connect");

    let proxy = communication
        .create_stateful_proxy(
            Arc::new(DirectExecutor),
            environment(),
            ServiceDefinition::new("order-book"),
            &session,
        )
        .expect("proxy");
    assert_eq!(
        proxy.invoke("add", vec![json!("nuts")]).expect("add"),
        json!(1)
    );
    assert!(communication.disconnect(&session).expect("logout"));
}

#[rstest]
fn stateless_bridge_works_over_a_gzip_socket() {
    let id = CommunicationId::new(Protocol::Socket, Kind::ClientServer, "default");
    let server = TestServer::start(
        vec![socket_channel("default", CompressionSettings::Gzip)],
        demo_dispatcher(),
    )
    .expect("start server");
    let endpoint = server.endpoint(&id).expect("bound endpoint");

    let communication = SocketCommunication::new(id, endpoint, CompressionSettings::Gzip);
    communication.start();
    let mut bridge = communication
        .create_stateless_proxy(
            Arc::new(DirectExecutor),
            environment(),
            ServiceDefinition::new("drafts"),
        )
        .expect("bridge");
    bridge
        .init_provider(json!({"rows": ["a", "b"]}))
        .expect("init");
    let peeked = bridge
        .execute_command(&CommandSpec::new("peek-draft"), None)
        .expect("execute");
    assert_eq!(peeked, json!({"rows": ["a", "b"]}));
}
