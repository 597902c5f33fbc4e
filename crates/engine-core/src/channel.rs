//! Channel adapter - outbound queueing against the underlying transport
//!
//! The engine only needs `send(text)` from the transport, plus knowledge
//! of whether it is currently ready. While the channel is not open,
//! outbound frames queue in arrival order and flush FIFO on readiness.

use std::collections::VecDeque;

use thiserror::Error;

/// Transport errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("channel closed")]
    Closed,
    #[error("sink error: {0}")]
    Sink(String),
}

/// Readiness of the underlying channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// Outbound half of the underlying transport.
///
/// Implemented by whatever carries frames to the remote peer.
pub trait MessageSink {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;
}

/// Adapter turning an infallible `send(text)` function into a sink.
pub struct FnSink<F>(pub F);

impl<F: FnMut(&str)> MessageSink for FnSink<F> {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        (self.0)(text);
        Ok(())
    }
}

/// Boundary component between the session and the transport.
///
/// Starts in `Connecting`. Sends while not open append to a FIFO queue;
/// `open()` flushes the queue in original order and switches to direct
/// sending. Sends after `close()` queue indefinitely — reconnection is
/// the embedder's business, but queued-then-flushed order is preserved
/// whenever the channel becomes ready again.
pub struct ChannelAdapter<S> {
    sink: S,
    state: ChannelState,
    queue: VecDeque<String>,
}

impl<S: MessageSink> ChannelAdapter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: ChannelState::Connecting,
            queue: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Number of frames waiting for the channel to become ready.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Send a frame, or queue it while the channel is not open.
    pub fn send(&mut self, text: String) -> Result<(), TransportError> {
        match self.state {
            ChannelState::Open => self.sink.send_text(&text),
            ChannelState::Connecting | ChannelState::Closed => {
                self.queue.push_back(text);
                Ok(())
            }
        }
    }

    /// The channel became ready: flush queued frames in FIFO order, then
    /// switch to direct sending.
    ///
    /// If the sink fails mid-flush, the failed frame and the unsent tail
    /// stay queued and the adapter drops back to `Connecting`.
    pub fn open(&mut self) -> Result<(), TransportError> {
        while let Some(text) = self.queue.pop_front() {
            if let Err(err) = self.sink.send_text(&text) {
                self.queue.push_front(text);
                self.state = ChannelState::Connecting;
                return Err(err);
            }
        }
        self.state = ChannelState::Open;
        Ok(())
    }

    /// The channel went away; subsequent sends queue.
    pub fn close(&mut self) {
        self.state = ChannelState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_sink() -> (Rc<RefCell<Vec<String>>>, FnSink<impl FnMut(&str)>) {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let inner = sent.clone();
        (
            sent,
            FnSink(move |text: &str| inner.borrow_mut().push(text.to_string())),
        )
    }

    #[test]
    fn queues_until_open_then_flushes_in_order() {
        let (sent, sink) = recording_sink();
        let mut channel = ChannelAdapter::new(sink);
        assert_eq!(channel.state(), ChannelState::Connecting);

        channel.send("first".into()).unwrap();
        channel.send("second".into()).unwrap();
        assert!(sent.borrow().is_empty());
        assert_eq!(channel.queued(), 2);

        channel.open().unwrap();
        channel.send("third".into()).unwrap();
        assert_eq!(*sent.borrow(), vec!["first", "second", "third"]);
        assert_eq!(channel.queued(), 0);
    }

    #[test]
    fn sends_directly_while_open() {
        let (sent, sink) = recording_sink();
        let mut channel = ChannelAdapter::new(sink);
        channel.open().unwrap();
        channel.send("now".into()).unwrap();
        assert_eq!(*sent.borrow(), vec!["now"]);
    }

    #[test]
    fn queues_after_close_and_flushes_on_reopen() {
        let (sent, sink) = recording_sink();
        let mut channel = ChannelAdapter::new(sink);
        channel.open().unwrap();
        channel.close();

        channel.send("while-down".into()).unwrap();
        assert!(sent.borrow().is_empty());

        channel.open().unwrap();
        assert_eq!(*sent.borrow(), vec!["while-down"]);
    }

    #[test]
    fn failed_flush_keeps_the_tail_queued() {
        struct FlakySink {
            fail_next: bool,
            sent: Vec<String>,
        }
        impl MessageSink for FlakySink {
            fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
                if self.fail_next {
                    self.fail_next = false;
                    return Err(TransportError::Sink("down".into()));
                }
                self.sent.push(text.to_string());
                Ok(())
            }
        }

        let mut channel = ChannelAdapter::new(FlakySink {
            fail_next: true,
            sent: Vec::new(),
        });
        channel.send("a".into()).unwrap();
        channel.send("b".into()).unwrap();

        assert!(channel.open().is_err());
        assert_eq!(channel.state(), ChannelState::Connecting);
        assert_eq!(channel.queued(), 2);

        channel.open().unwrap();
        assert_eq!(channel.queued(), 0);
        assert_eq!(channel.state(), ChannelState::Open);
    }
}
