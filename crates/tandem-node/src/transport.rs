//! Transport abstraction and an in-process implementation.
//!
//! A transport is a reliable, ordered, message-oriented link to the one
//! other peer. The host polls it for [`TransportEvent`]s once per frame and
//! pushes outgoing messages through [`Transport::send`]. Real deployments
//! plug in a network data channel; [`ChannelTransport`] links two hosts in
//! the same process.
//!
//! The therapist end listens and the patient end dials. A listener whose
//! peer is gone keeps waiting; a dialer reports `ConnectFailed` so the
//! patient backs off and retries.

use std::{collections::VecDeque, future::Future};

use bytes::Bytes;
use tandem_core::SessionEvent;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use crate::error::{NodeError, Result};

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link to the peer is up.
    Connected,
    /// A complete message arrived.
    Message(Bytes),
    /// The link went down.
    Disconnected {
        /// Human-readable cause
        reason: String,
    },
    /// A connection attempt failed.
    ConnectFailed {
        /// Human-readable cause
        reason: String,
    },
}

impl TransportEvent {
    /// The matching router event.
    pub fn into_session_event<I>(self) -> SessionEvent<I> {
        match self {
            Self::Connected => SessionEvent::Connected,
            Self::Message(bytes) => SessionEvent::MessageReceived(bytes),
            Self::Disconnected { reason } => SessionEvent::Disconnected { reason },
            Self::ConnectFailed { reason } => SessionEvent::ConnectFailed { reason },
        }
    }
}

/// Link to the other peer.
pub trait Transport: Send {
    /// Start connecting. The outcome arrives later as `Connected` or
    /// `ConnectFailed`; an `Err` means the transport cannot be used at all.
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Send one message.
    ///
    /// # Errors
    ///
    /// - `NodeError::NotConnected` before `Connected`
    /// - `NodeError::TransportClosed` if the peer went away
    fn send(&mut self, bytes: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Next pending event, without waiting.
    fn poll_event(&mut self) -> Option<TransportEvent>;
}

/// One end of an in-process link built by [`ChannelTransport::pair`].
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    events: VecDeque<TransportEvent>,
    connected: bool,
    listening: bool,
}

impl ChannelTransport {
    /// Two linked ends: the listening (therapist) end, then the dialing
    /// (patient) end.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx, true), Self::new(b_tx, a_rx, false))
    }

    fn new(
        outbound: mpsc::UnboundedSender<Bytes>,
        inbound: mpsc::UnboundedReceiver<Bytes>,
        listening: bool,
    ) -> Self {
        Self { outbound, inbound, events: VecDeque::new(), connected: false, listening }
    }

    /// Whether this end considers the link up.
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Transport for ChannelTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }
        if self.outbound.is_closed() {
            if self.listening {
                debug!("peer is gone, still listening");
            } else {
                let reason = "peer is gone".into();
                self.events.push_back(TransportEvent::ConnectFailed { reason });
            }
        } else {
            self.connected = true;
            self.events.push_back(TransportEvent::Connected);
        }
        Ok(())
    }

    async fn send(&mut self, bytes: Bytes) -> Result<()> {
        if !self.connected {
            return Err(NodeError::NotConnected);
        }
        self.outbound
            .send(bytes)
            .map_err(|_| NodeError::TransportClosed("peer dropped its end".into()))
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        if !self.connected {
            return None;
        }
        match self.inbound.try_recv() {
            Ok(bytes) => Some(TransportEvent::Message(bytes)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.connected = false;
                Some(TransportEvent::Disconnected { reason: "peer closed the link".into() })
            },
        }
    }
}
