// MIT License
// Copyright 2017--present xhal developers

//! Blocking Cap'n Proto client for the board `RpcService`.
//!
//! One TCP connection per [`CapnpTransport::connect`]; the `RpcSystem` for
//! it is spawned on the transport's `LocalSet` (it is `!Send`) and makes
//! progress whenever a later call blocks on that set.

use capnp::Error as CapnpError;
use capnp_rpc::{rpc_twoparty_capnp, twoparty, Disconnector, RpcSystem};
use futures::AsyncReadExt;
use tokio::runtime::Runtime;
use tokio::task::LocalSet;

use crate::error::{TransportError, XhalError};
use crate::message::{RpcMessage, Value};
use crate::rpc::schema::{field, message, rpc_service};
use crate::transport::Transport;

/// [`Transport`] speaking `schema/xhal.capnp` to `<host>:<port>`.
pub struct CapnpTransport {
    client: Option<rpc_service::Client>,
    disconnector: Option<Disconnector<rpc_twoparty_capnp::Side>>,
    // dropped before the runtime so spawned RPC tasks go first
    local: LocalSet,
    runtime: Runtime,
    port: u16,
}

fn rpc_error(e: CapnpError) -> TransportError {
    TransportError::Rpc(e.to_string())
}

fn not_connected() -> TransportError {
    TransportError::NotConnected("no open RPC connection".into())
}

impl CapnpTransport {
    /// Create an unconnected transport that will dial `port` on the host
    /// passed to `connect`.
    pub fn new(port: u16) -> Result<Self, XhalError> {
        let runtime = Runtime::new()
            .map_err(|e| XhalError::Rpc(format!("failed to create tokio runtime: {e}")))?;
        Ok(Self {
            client: None,
            disconnector: None,
            local: LocalSet::new(),
            runtime,
            port,
        })
    }

    fn client(&self) -> Result<rpc_service::Client, TransportError> {
        self.client.clone().ok_or_else(not_connected)
    }
}

impl Transport for CapnpTransport {
    fn connect(&mut self, host: &str) -> Result<(), TransportError> {
        let addr = format!("{host}:{}", self.port);
        let (client, disconnector) = self.local.block_on(&self.runtime, async {
            let stream = tokio::net::TcpStream::connect(&addr)
                .await
                .map_err(|e| TransportError::ConnectionFailed(format!("{addr}: {e}")))?;
            stream
                .set_nodelay(true)
                .map_err(|e| TransportError::ConnectionFailed(format!("set_nodelay failed: {e}")))?;

            let (reader, writer) =
                tokio_util::compat::TokioAsyncReadCompatExt::compat(stream).split();

            let network = twoparty::VatNetwork::new(
                futures::io::BufReader::new(reader),
                futures::io::BufWriter::new(writer),
                rpc_twoparty_capnp::Side::Client,
                Default::default(),
            );

            let mut rpc_system = RpcSystem::new(Box::new(network), None);
            let client: rpc_service::Client =
                rpc_system.bootstrap(rpc_twoparty_capnp::Side::Server);
            let disconnector = rpc_system.get_disconnector();

            tokio::task::spawn_local(rpc_system);
            Ok::<_, TransportError>((client, disconnector))
        })?;
        self.client = Some(client);
        self.disconnector = Some(disconnector);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        let disconnector = self.disconnector.take().ok_or_else(not_connected)?;
        self.client = None;
        self.local
            .block_on(&self.runtime, disconnector)
            .map_err(|e| TransportError::Rpc(format!("disconnect failed: {e}")))
    }

    fn load_module(&mut self, name: &str, version: &str) -> Result<bool, TransportError> {
        let client = self.client()?;
        self.local.block_on(&self.runtime, async move {
            let mut request = client.load_module_request();
            {
                let mut params = request.get();
                params.set_name(name);
                params.set_version(version);
            }
            let response = request.send().promise.await.map_err(rpc_error)?;
            Ok(response.get().map_err(rpc_error)?.get_loaded())
        })
    }

    fn call_method(&mut self, request: &RpcMessage) -> Result<RpcMessage, TransportError> {
        let client = self.client()?;
        self.local.block_on(&self.runtime, async move {
            let mut call = client.call_method_request();
            encode(request, call.get().init_request());
            let response = call.send().promise.await.map_err(rpc_error)?;
            let reader = response
                .get()
                .and_then(|r| r.get_response())
                .map_err(rpc_error)?;
            decode(reader).map_err(rpc_error)
        })
    }
}

fn encode(msg: &RpcMessage, mut builder: message::Builder<'_>) {
    builder.set_method(msg.method());
    let mut fields = builder.init_fields(msg.len() as u32);
    for (i, (key, value)) in msg.fields().enumerate() {
        let mut f = fields.reborrow().get(i as u32);
        f.set_key(key);
        match value {
            Value::Word(w) => f.set_word(*w),
            Value::WordArray(words) => {
                let mut list = f.init_word_array(words.len() as u32);
                for (j, &w) in words.iter().enumerate() {
                    list.set(j as u32, w);
                }
            }
            Value::String(s) => f.set_str(s.as_str()),
            Value::StringArray(strings) => {
                let mut list = f.init_str_array(strings.len() as u32);
                for (j, s) in strings.iter().enumerate() {
                    list.set(j as u32, s.as_str());
                }
            }
        }
    }
}

fn text(reader: capnp::text::Reader<'_>) -> capnp::Result<String> {
    reader
        .to_str()
        .map(str::to_owned)
        .map_err(|e| CapnpError::failed(format!("invalid UTF-8 in message: {e}")))
}

fn decode(reader: message::Reader<'_>) -> capnp::Result<RpcMessage> {
    let mut msg = RpcMessage::new(text(reader.get_method()?)?);
    for f in reader.get_fields()?.iter() {
        let key = text(f.get_key()?)?;
        let value = match f
            .which()
            .map_err(|e| CapnpError::failed(format!("unknown field kind: {e}")))?
        {
            field::Which::Word(w) => Value::Word(w),
            field::Which::WordArray(list) => Value::WordArray(list?.iter().collect()),
            field::Which::Str(s) => Value::String(text(s?)?),
            field::Which::StrArray(list) => Value::StringArray(
                list?
                    .iter()
                    .map(|s| s.and_then(text))
                    .collect::<capnp::Result<_>>()?,
            ),
        };
        msg.set(key, value);
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: &RpcMessage) -> RpcMessage {
        let mut storage = capnp::message::Builder::new_default();
        encode(msg, storage.init_root::<message::Builder<'_>>());
        let reader = storage.get_root_as_reader::<message::Reader<'_>>().unwrap();
        decode(reader).unwrap()
    }

    #[test]
    fn every_value_kind_survives_the_wire_form() {
        let mut msg = RpcMessage::new("gbt.scanGBTPhases");
        msg.set_word("ohN", 2)
            .set_word_array("results", vec![0, 1, 0xffff_ffff])
            .set_string("reg_name", "CFG_VALUE")
            .set_string_array("names", vec!["a".into(), "".into()]);
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn calls_without_connection_fail_fast() {
        let mut transport = CapnpTransport::new(87).unwrap();
        assert!(matches!(
            transport.call_method(&RpcMessage::new("m")),
            Err(TransportError::NotConnected(_))
        ));
        assert!(matches!(
            transport.disconnect(),
            Err(TransportError::NotConnected(_))
        ));
        assert!(matches!(
            transport.load_module("optohybrid", "v1"),
            Err(TransportError::NotConnected(_))
        ));
    }

    #[test]
    fn unreachable_host_is_a_connection_failure() {
        let mut transport = CapnpTransport::new(1).unwrap();
        assert!(matches!(
            transport.connect("127.0.0.1"),
            Err(TransportError::ConnectionFailed(_))
        ));
    }
}
