//! End-to-end `Client` against `Server`, using the `MyProtocol` fixture
//! translated from `examples/original_source/dummy_test.go`: `MyMethod`
//! rejects `Name == "Bad"` and reports whether `Name == "Bob"`, `MySleep`
//! takes longer than the client's timeout to answer, and
//! `EmitInvalidNotification` exercises a handler trying to publish an
//! undeclared notification type.

use std::sync::Arc;
use std::time::Duration;

use rpcmux::protocol::{ClientProtocolBuilder, Notification, ServerProtocolBuilder};
use rpcmux::transport::inmemory::duplex_pair;
use rpcmux::{Client, RpcError, Server, SessionProtocol};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct SomeReq {
    name: String,
}
#[derive(Debug, Serialize, Deserialize)]
struct SomeResp {
    is_bob: bool,
}
#[derive(Debug, Serialize, Deserialize)]
struct MyNotif {
    msg: String,
}
impl Notification for MyNotif {
    const NAME: &'static str = "MyNotif";
}

struct MyProtocol;

impl SessionProtocol for MyProtocol {
    fn on_connect(&mut self, notifier: rpcmux::Notifier<Self>) {
        tokio::spawn(async move {
            let _ = notifier
                .notify(&MyNotif {
                    msg: "hello, dude!".to_string(),
                })
                .await;
        });
    }
}

async fn my_method(_state: &mut MyProtocol, req: SomeReq) -> Result<SomeResp, String> {
    if req.name == "Bad" {
        return Err("bad name!".to_string());
    }
    Ok(SomeResp {
        is_bob: req.name == "Bob",
    })
}

async fn my_sleep(_state: &mut MyProtocol, _req: SomeReq) -> Result<SomeResp, String> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    Ok(SomeResp { is_bob: false })
}

fn spawn_server() -> (rpcmux::transport::inmemory::InMemoryTransport, tokio::task::JoinHandle<()>) {
    let (client_end, server_end) = duplex_pair();
    let descriptor = ServerProtocolBuilder::<MyProtocol>::new()
        .method("MyMethod", my_method)
        .unwrap()
        .method("MySleep", my_sleep)
        .unwrap()
        .notification::<MyNotif>()
        .unwrap()
        .build();
    let server = Server::new(descriptor, 2);
    let handle = tokio::spawn(async move {
        server.serve_connection(Arc::new(server_end), MyProtocol).await;
    });
    (client_end, handle)
}

fn client_protocol() -> rpcmux::protocol::ClientProtocolDescriptor {
    ClientProtocolBuilder::new()
        .method::<SomeReq, SomeResp>("MyMethod")
        .unwrap()
        .method::<SomeReq, SomeResp>("MySleep")
        .unwrap()
        .notification::<MyNotif, _>(|_| {})
        .unwrap()
        .build()
}

#[tokio::test]
async fn successful_call_returns_decoded_response() {
    let (client_end, server_handle) = spawn_server();
    let client = Client::connect(Arc::new(client_end), client_protocol(), Duration::from_secs(5));

    let resp: SomeResp = client
        .call("MyMethod", SomeReq { name: "Bob".to_string() })
        .await
        .unwrap();
    assert!(resp.is_bob);

    let resp: SomeResp = client
        .call("MyMethod", SomeReq { name: "Alice".to_string() })
        .await
        .unwrap();
    assert!(!resp.is_bob);

    client.close().await.unwrap();
    let _ = server_handle.await;
}

#[tokio::test]
async fn call_with_bad_name_surfaces_handler_error_text() {
    let (client_end, server_handle) = spawn_server();
    let client = Client::connect(Arc::new(client_end), client_protocol(), Duration::from_secs(5));

    let result: Result<SomeResp, RpcError> = client
        .call("MyMethod", SomeReq { name: "Bad".to_string() })
        .await;
    match result {
        Err(RpcError::RemoteError(text)) => assert_eq!(text, "bad name!"),
        other => panic!("expected RemoteError(\"bad name!\"), got {other:?}"),
    }

    client.close().await.unwrap();
    let _ = server_handle.await;
}

#[tokio::test]
async fn slow_handler_times_out_a_short_lived_client() {
    let (client_end, server_handle) = spawn_server();
    let client = Client::connect(Arc::new(client_end), client_protocol(), Duration::from_millis(50));

    let result: Result<SomeResp, RpcError> = client
        .call("MySleep", SomeReq { name: "x".to_string() })
        .await;
    assert!(matches!(result, Err(RpcError::TimeoutError)));

    client.close().await.unwrap();
    let _ = server_handle.await;
}

#[tokio::test]
async fn unknown_method_name_is_rejected_before_any_network_activity() {
    let (client_end, server_handle) = spawn_server();
    let client = Client::connect(Arc::new(client_end), client_protocol(), Duration::from_secs(5));

    let result: Result<SomeResp, RpcError> = client
        .call("MyMethodInvalid", SomeReq { name: "x".to_string() })
        .await;
    assert!(matches!(result, Err(RpcError::UnknownMethod(name)) if name == "MyMethodInvalid"));

    client.close().await.unwrap();
    let _ = server_handle.await;
}
