//! Per-connection session wiring and the host embedding interface
//!
//! One `Session` owns one handle table, one callback registry, and one
//! channel adapter; nothing is shared across sessions and inbound
//! messages run one at a time to completion, so no locking is needed.

use std::collections::BTreeMap;

use marionette_protocol::{encode_report, HandleId, Value};
use marionette_script_host::{
    run_script, CapabilityHost, HostError, HostRequest, HostResponse, ScriptConfig, ScriptError,
};

use crate::{
    CallbackRegistry, ChannelAdapter, ChannelState, CheckOutcome, Continuation, HandleTable,
    MessageSink, TransportError,
};

/// A remote-drivable execution context.
///
/// The remote peer sends scripts; this session runs each one in the
/// sandbox with the capability surface as its only access point, and
/// hands outbound report frames to the channel adapter.
pub struct Session<S> {
    config: ScriptConfig,
    // Everything scripts can reach lives here, apart from the config, so
    // `handle_incoming` can lend it out as the host while the config is
    // borrowed separately.
    state: SessionState<S>,
}

struct SessionState<S> {
    table: HandleTable,
    callbacks: CallbackRegistry,
    extensions: BTreeMap<String, Value>,
    channel: ChannelAdapter<S>,
}

impl<S: MessageSink> Session<S> {
    pub fn new(sink: S) -> Self {
        Self::with_config(sink, ScriptConfig::default())
    }

    pub fn with_config(sink: S, config: ScriptConfig) -> Self {
        Self {
            config,
            state: SessionState {
                table: HandleTable::new(),
                callbacks: CallbackRegistry::new(),
                extensions: BTreeMap::new(),
                channel: ChannelAdapter::new(sink),
            },
        }
    }

    /// Add an entry to the extension bag exposed to scripts as `x`.
    ///
    /// The bag is fixed by the host before traffic flows; scripts can
    /// read it but never write it.
    #[must_use]
    pub fn extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state.extensions.insert(key.into(), value);
        self
    }

    /// Run one inbound message through the sandbox.
    ///
    /// Failures are isolated per message: the error is logged and
    /// returned, prior table contents stay intact, and subsequent
    /// messages keep processing.
    pub fn handle_incoming(&mut self, text: &str) -> Result<(), ScriptError> {
        match run_script(text, &self.config, &mut self.state) {
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "inbound script failed");
                Err(err)
            }
        }
    }

    /// Register a continuation invoked when the remote peer resolves `id`.
    pub fn register_callback(&mut self, id: HandleId, continuation: Continuation) {
        self.state.callbacks.register(id, continuation);
    }

    /// The underlying channel became ready; queued frames flush in order.
    pub fn channel_open(&mut self) -> Result<(), TransportError> {
        self.state.channel.open()
    }

    /// The underlying channel went away; outbound frames queue until it
    /// becomes ready again.
    pub fn channel_close(&mut self) {
        self.state.channel.close();
    }

    #[must_use]
    pub fn channel_state(&self) -> ChannelState {
        self.state.channel.state()
    }

    /// Number of live handles, for diagnostics.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.state.table.len()
    }
}

impl<S: MessageSink> CapabilityHost for SessionState<S> {
    fn request(&mut self, request: HostRequest) -> HostResponse {
        match request {
            HostRequest::Allocate(value) => HostResponse::Id(self.table.allocate(value)),
            HostRequest::Get(id) => match self.table.get(id) {
                Ok(Some(value)) => HostResponse::Value(value.clone()),
                Ok(None) => HostResponse::Value(Value::Undefined),
                Err(err) => HostResponse::Raise(err.0),
            },
            HostRequest::Set(id, value) => {
                self.table.set(id, value);
                HostResponse::Ok
            }
            HostRequest::Delete(id) => {
                self.table.remove(id);
                HostResponse::Ok
            }
            HostRequest::Report(id, value) => match encode_report(id, &value) {
                Ok(frame) => {
                    if let Err(err) = self.channel.send(frame) {
                        // Transport trouble is the embedder's problem, not
                        // the script's; log it and move on.
                        tracing::warn!(id = %id, error = %err, "report frame not sent");
                    }
                    HostResponse::Ok
                }
                Err(err) => HostResponse::Error(HostError::Serialize(err.to_string())),
            },
            HostRequest::ResolveCallback(id, value) => {
                self.callbacks.resolve(id, value);
                HostResponse::Ok
            }
            HostRequest::CheckAndMove(id) => match self.table.check_and_move(id) {
                CheckOutcome::Value(value) => HostResponse::Value(value),
                CheckOutcome::Slot(slot) => HostResponse::Slot(slot),
            },
            HostRequest::MarkErrored(id, value) => {
                self.table.mark_errored(id, value);
                HostResponse::Ok
            }
            HostRequest::ExtensionBag => HostResponse::Value(Value::Object(self.extensions.clone())),
        }
    }
}
