//! The "sum" example protocol, reconstructed from
//! `examples/original_source/examples/simple/protocol/protocol.go`: a
//! single `Sum` method rejecting non-positive operands, and a notification
//! sent once per connection advertising the API.

use rpcmux::{
    ClientProtocolBuilder, ClientProtocolDescriptor, Notification, Notifier, ServerProtocolBuilder,
    ServerProtocolDescriptor, SessionProtocol,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SumReq {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SumResp {
    pub sum: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleNotif {
    pub msg: String,
    pub descr: String,
}

impl Notification for ExampleNotif {
    const NAME: &'static str = "ExampleNotif";
}

/// Per-connection state on the server side. Holds nothing beyond what
/// `SessionProtocol` needs; the original's struct is likewise empty data,
/// just a vessel for the two lifecycle methods.
#[derive(Default)]
pub struct SumProtocol;

impl SessionProtocol for SumProtocol {
    fn on_connect(&mut self, notifier: Notifier<Self>) {
        tracing::info!("some client connected ...");
        tokio::spawn(async move {
            let result = notifier
                .notify(&ExampleNotif {
                    msg: "hello, dude!".to_string(),
                    descr: "you can sum any two natural numbers using this API".to_string(),
                })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "send notification error");
            }
        });
    }

    fn on_disconnect(&mut self, reason: Option<String>) {
        tracing::info!(reason = ?reason, "client is disconnected");
    }
}

async fn sum(_state: &mut SumProtocol, req: SumReq) -> Result<SumResp, String> {
    if req.a <= 0 || req.b <= 0 {
        return Err("A and B must be natural numbers!".to_string());
    }
    Ok(SumResp { sum: req.a + req.b })
}

/// Build the server-side descriptor for this protocol.
pub fn server_descriptor() -> ServerProtocolDescriptor<SumProtocol> {
    ServerProtocolBuilder::<SumProtocol>::new()
        .method("Sum", sum)
        .expect("Sum registered exactly once")
        .notification::<ExampleNotif>()
        .expect("ExampleNotif registered exactly once")
        .build()
}

/// Build the client-side descriptor for this protocol. `on_notification`
/// is invoked for every decoded `ExampleNotif`, mirroring the original's
/// `onNotifFunc` callback.
pub fn client_descriptor(
    on_notification: impl Fn(Result<ExampleNotif, rpcmux::RpcError>) + Send + Sync + 'static,
) -> ClientProtocolDescriptor {
    ClientProtocolBuilder::new()
        .method::<SumReq, SumResp>("Sum")
        .expect("Sum registered exactly once")
        .notification::<ExampleNotif, _>(on_notification)
        .expect("ExampleNotif registered exactly once")
        .build()
}
