//! Protocol descriptor.
//!
//! The Go original enumerates handler methods and notification payload
//! types via runtime reflection over a user-supplied protocol value. This
//! crate takes a static-registration replacement instead: the application
//! builds a descriptor by explicitly registering
//! `(name, handler, input deserializer, output serializer)` tuples through
//! a builder. No reflection; shape errors that the Go reflection pass
//! catches at runtime (wrong arity, non-struct input, non-pointer output)
//! are instead enforced by the builder's generic signature at compile
//! time — see DESIGN.md for the full accounting.
//!
//! Two builders exist because the client and the server need different
//! things from the same declaration: the server needs to *invoke* handlers,
//! the client only needs to *validate and (de)serialize* against the same
//! names and types. [`ServerProtocolDescriptor`] carries handler closures;
//! [`ClientProtocolDescriptor`] carries only type signatures.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtocolShapeError, RpcError};

/// Marker trait for a notification payload: a plain data type with a fixed
/// wire name. The blanket name is the Rust type name by default; most
/// applications will just derive `Serialize`/`Deserialize` and implement
/// this with `const NAME` set to the struct's name, matching the Go
/// original's convention of using the pointed-to struct's type name as the
/// notification name on the wire.
pub trait Notification: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The wire name; becomes both the notification's `method_name -> type`
    /// key in the descriptor and the `method` field of `NOTIFICATION`
    /// packets carrying this payload.
    const NAME: &'static str;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A registered method's signature: what's needed to validate and
/// (de)serialize a call without invoking it. Shared structure between
/// [`ServerProtocol`] and [`ClientProtocol`].
#[derive(Clone, Copy)]
pub struct MethodSignature {
    pub(crate) input_type_id: TypeId,
    pub(crate) input_type_name: &'static str,
    pub(crate) output_type_name: &'static str,
}

/// A registered notification's signature.
#[derive(Clone, Copy)]
pub struct NotificationSignature {
    pub(crate) payload_type_id: TypeId,
    pub(crate) payload_type_name: &'static str,
}

/// Per-method dynamic invoker: decode `body` against the registered input
/// schema, call the handler with `&mut P`, encode the result. Errors from
/// the handler are carried as `Err(String)`; the text becomes an `ERROR`
/// packet's body.
type Invoker<P> =
    Arc<dyn for<'a> Fn(&'a mut P, &'a [u8]) -> BoxFuture<'a, Result<Vec<u8>, String>> + Send + Sync>;

struct MethodEntry<P> {
    signature: MethodSignature,
    invoke: Invoker<P>,
}

/// The server-side descriptor: method name -> handler + input/output
/// schema, notification name -> payload schema. Built once per listener at
/// construction time; read-only thereafter.
pub struct ServerProtocolDescriptor<P> {
    methods: HashMap<String, MethodEntry<P>>,
    notifications: HashMap<String, NotificationSignature>,
}

impl<P> ServerProtocolDescriptor<P> {
    pub fn method(&self, name: &str) -> Option<(&MethodSignature, &Invoker<P>)> {
        self.methods.get(name).map(|e| (&e.signature, &e.invoke))
    }

    pub fn notification_names(&self) -> impl Iterator<Item = &str> {
        self.notifications.keys().map(String::as_str)
    }

    pub fn notification(&self, name: &str) -> Option<&NotificationSignature> {
        self.notifications.get(name)
    }

    /// For building the lightweight client-side view from the same
    /// registration, without handler invokers.
    pub fn signatures(&self) -> ClientProtocolSignatures {
        ClientProtocolSignatures {
            methods: self
                .methods
                .iter()
                .map(|(k, v)| (k.clone(), v.signature))
                .collect(),
            notifications: self.notifications.clone(),
        }
    }
}

/// Plain signature tables, handy when a client wants to share a single
/// declaration with a server in the same process (tests, same-binary demos)
/// without re-registering notification callbacks.
pub struct ClientProtocolSignatures {
    pub methods: HashMap<String, MethodSignature>,
    pub notifications: HashMap<String, NotificationSignature>,
}

/// Builds a [`ServerProtocolDescriptor`]. `P` is the per-connection protocol
/// state type; handlers close over `&mut P`.
pub struct ServerProtocolBuilder<P> {
    methods: HashMap<String, MethodEntry<P>>,
    notifications: HashMap<String, NotificationSignature>,
}

impl<P: 'static> Default for ServerProtocolBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: 'static> ServerProtocolBuilder<P> {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
            notifications: HashMap::new(),
        }
    }

    /// Register a request handler. `handler` receives `&mut P` and the
    /// decoded request, returning the response or an error string.
    pub fn method<Req, Resp, F, Fut>(
        mut self,
        name: impl Into<String>,
        handler: F,
    ) -> Result<Self, ProtocolShapeError>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(&mut P, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, String>> + Send,
    {
        let name = name.into();
        if self.methods.contains_key(&name) {
            return Err(ProtocolShapeError::DuplicateMethod(name));
        }

        let handler = Arc::new(handler);
        let invoke: Invoker<P> = Arc::new(move |state: &mut P, body: &[u8]| {
            let handler = handler.clone();
            let decoded = serde_json::from_slice::<Req>(body);
            Box::pin(async move {
                let req = decoded.map_err(|e| e.to_string())?;
                let resp = handler(state, req).await?;
                serde_json::to_vec(&resp).map_err(|e| e.to_string())
            })
        });

        self.methods.insert(
            name,
            MethodEntry {
                signature: MethodSignature {
                    input_type_id: TypeId::of::<Req>(),
                    input_type_name: std::any::type_name::<Req>(),
                    output_type_name: std::any::type_name::<Resp>(),
                },
                invoke,
            },
        );
        Ok(self)
    }

    /// Declare a notification payload type the server may publish on this
    /// connection. The set of declared notifications is closed.
    pub fn notification<N: Notification>(mut self) -> Result<Self, ProtocolShapeError> {
        if self.notifications.contains_key(N::NAME) {
            return Err(ProtocolShapeError::DuplicateNotification(
                N::NAME.to_string(),
            ));
        }
        self.notifications.insert(
            N::NAME.to_string(),
            NotificationSignature {
                payload_type_id: TypeId::of::<N>(),
                payload_type_name: std::any::type_name::<N>(),
            },
        );
        Ok(self)
    }

    pub fn build(self) -> ServerProtocolDescriptor<P> {
        ServerProtocolDescriptor {
            methods: self.methods,
            notifications: self.notifications,
        }
    }
}

/// Per-notification dispatcher: decode `body` against `N` and hand it to
/// the registered callback, or report a deserialize failure as `RpcError`.
type NotificationDispatcher = Arc<dyn Fn(&[u8]) -> Result<(), RpcError> + Send + Sync>;

/// The client-side descriptor: method signatures for `call` validation plus
/// per-notification decode-and-dispatch closures, built once at client
/// construction time.
pub struct ClientProtocolDescriptor {
    methods: HashMap<String, MethodSignature>,
    notifications: HashMap<String, NotificationDispatcher>,
    on_unexpected: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl ClientProtocolDescriptor {
    pub fn method(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.get(name)
    }

    /// Decode and dispatch a notification packet's body. Unknown names
    /// invoke the registered "unexpected notification" hook, if any.
    pub fn dispatch_notification(&self, name: &str, body: &[u8]) {
        match self.notifications.get(name) {
            Some(dispatch) => {
                if let Err(e) = dispatch(body) {
                    tracing::warn!(notification = name, error = %e, "notification dispatch failed");
                }
            }
            None => {
                if let Some(hook) = &self.on_unexpected {
                    hook(name);
                } else {
                    tracing::warn!(notification = name, "unexpected notification with no handler registered");
                }
            }
        }
    }
}

/// Builds a [`ClientProtocolDescriptor`].
pub struct ClientProtocolBuilder {
    methods: HashMap<String, MethodSignature>,
    notifications: HashMap<String, NotificationDispatcher>,
    on_unexpected: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl Default for ClientProtocolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientProtocolBuilder {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
            notifications: HashMap::new(),
            on_unexpected: None,
        }
    }

    /// Declare a method this client may call, with its request/response
    /// types. Must match the server's registration for `name` exactly or
    /// `call` will fail with [`RpcError::InvalidRequestType`].
    pub fn method<Req, Resp>(mut self, name: impl Into<String>) -> Result<Self, ProtocolShapeError>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let name = name.into();
        if self.methods.contains_key(&name) {
            return Err(ProtocolShapeError::DuplicateMethod(name));
        }
        self.methods.insert(
            name,
            MethodSignature {
                input_type_id: TypeId::of::<Req>(),
                input_type_name: std::any::type_name::<Req>(),
                output_type_name: std::any::type_name::<Resp>(),
            },
        );
        Ok(self)
    }

    /// Register a typed callback for notification `N`. `handler` receives
    /// `Ok(payload)` on successful decode, `Err(RpcError::Serialization)` if
    /// the body doesn't decode against `N`.
    pub fn notification<N, F>(mut self, handler: F) -> Result<Self, ProtocolShapeError>
    where
        N: Notification,
        F: Fn(Result<N, RpcError>) + Send + Sync + 'static,
    {
        if self.notifications.contains_key(N::NAME) {
            return Err(ProtocolShapeError::DuplicateNotification(
                N::NAME.to_string(),
            ));
        }
        let dispatch: NotificationDispatcher = Arc::new(move |body: &[u8]| {
            let decoded = serde_json::from_slice::<N>(body)
                .map_err(|e| RpcError::Serialization(e.to_string()));
            handler(decoded);
            Ok(())
        });
        self.notifications.insert(N::NAME.to_string(), dispatch);
        Ok(self)
    }

    /// Register a fallback invoked for notifications whose name isn't
    /// declared.
    pub fn on_unexpected_notification<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_unexpected = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> ClientProtocolDescriptor {
        ClientProtocolDescriptor {
            methods: self.methods,
            notifications: self.notifications,
            on_unexpected: self.on_unexpected,
        }
    }
}

/// Marker for types usable as a `call` request: `'static` so we can compare
/// `TypeId`s at the call site, per the static-registration replacement for
/// runtime reflection described above.
pub trait Typed: Any + Send + 'static {}
impl<T: Any + Send + 'static> Typed for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Req {
        name: String,
    }
    #[derive(Serialize, Deserialize)]
    struct Resp {
        is_bob: bool,
    }
    struct State;

    struct Notif {
        msg: String,
    }
    impl Serialize for Notif {
        fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            use serde::ser::SerializeStruct;
            let mut st = s.serialize_struct("Notif", 1)?;
            st.serialize_field("msg", &self.msg)?;
            st.end()
        }
    }
    impl<'de> Deserialize<'de> for Notif {
        fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            #[derive(Deserialize)]
            struct Shadow {
                msg: String,
            }
            Ok(Notif {
                msg: Shadow::deserialize(d)?.msg,
            })
        }
    }
    impl Notification for Notif {
        const NAME: &'static str = "Notif";
    }

    #[tokio::test]
    async fn server_descriptor_invokes_registered_handler() {
        let descriptor = ServerProtocolBuilder::<State>::new()
            .method("Sum", |_state: &mut State, req: Req| async move {
                Ok::<_, String>(Resp {
                    is_bob: req.name == "Bob",
                })
            })
            .unwrap()
            .build();

        let (_, invoke) = descriptor.method("Sum").unwrap();
        let mut state = State;
        let body = invoke(&mut state, br#"{"name":"Bob"}"#).await.unwrap();
        let resp: Resp = serde_json::from_slice(&body).unwrap();
        assert!(resp.is_bob);
    }

    #[test]
    fn duplicate_method_registration_is_an_error() {
        let builder = ServerProtocolBuilder::<State>::new()
            .method("Sum", |_: &mut State, _: Req| async move {
                Ok::<_, String>(Resp { is_bob: false })
            })
            .unwrap();
        let err = builder.method("Sum", |_: &mut State, _: Req| async move {
            Ok::<_, String>(Resp { is_bob: false })
        });
        assert!(matches!(err, Err(ProtocolShapeError::DuplicateMethod(_))));
    }

    #[test]
    fn client_descriptor_rejects_mismatched_request_type() {
        let descriptor = ClientProtocolBuilder::new()
            .method::<Req, Resp>("Sum")
            .unwrap()
            .build();
        let sig = descriptor.method("Sum").unwrap();
        assert_ne!(sig.input_type_id, TypeId::of::<Resp>());
        assert_eq!(sig.input_type_id, TypeId::of::<Req>());
    }

    #[test]
    fn unknown_notification_invokes_fallback() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        let descriptor = ClientProtocolBuilder::new()
            .on_unexpected_notification(move |_name| called2.store(true, Ordering::SeqCst))
            .build();
        descriptor.dispatch_notification("SomethingElse", b"{}");
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn known_notification_decodes_and_dispatches() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let seen = Arc::new(AtomicBool::new(false));
        let seen2 = seen.clone();
        let descriptor = ClientProtocolBuilder::new()
            .notification::<Notif, _>(move |res| {
                let notif = res.unwrap();
                assert_eq!(notif.msg, "hello, dude!");
                seen2.store(true, Ordering::SeqCst);
            })
            .unwrap()
            .build();
        descriptor.dispatch_notification("Notif", br#"{"msg":"hello, dude!"}"#);
        assert!(seen.load(Ordering::SeqCst));
    }
}
