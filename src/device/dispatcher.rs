use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::{debug, info, warn};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::device::link::RadioLink;
use crate::device::machine::ConnectionStateMachine;
use crate::device::sink::{Observer, Registration};
use crate::device::types::LinkEvent;
use crate::error::DispatchError;

enum HostRequest {
    StartScan,
    StopScan,
    Register(Box<dyn Observer>, oneshot::Sender<Registration>),
    Shutdown,
}

enum Message<D> {
    Link(LinkEvent<D>),
    Host(HostRequest),
}

/// Posts radio callbacks and host requests onto the serial dispatch queue. Cheap to clone, never
/// blocks, and may be used from any thread.
pub struct DispatchSender<D> {
    tx: UnboundedSender<Message<D>>,
}

impl<D> Clone for DispatchSender<D> {
    fn clone(&self) -> Self {
        DispatchSender { tx: self.tx.clone() }
    }
}

impl<D> DispatchSender<D> {
    fn send(&self, message: Message<D>) {
        if self.tx.unbounded_send(message).is_err() {
            debug!("Dispatcher has stopped, dropping message");
        }
    }

    pub fn post(&self, event: LinkEvent<D>) {
        self.send(Message::Link(event));
    }

    pub fn start_scan(&self) {
        self.send(Message::Host(HostRequest::StartScan));
    }

    pub fn stop_scan(&self) {
        self.send(Message::Host(HostRequest::StopScan));
    }

    /// Stop the dispatch task once every message posted before this one has been handled.
    pub fn shutdown(&self) {
        self.send(Message::Host(HostRequest::Shutdown));
    }

    pub async fn register(&self, observer: Box<dyn Observer>) -> Result<Registration, DispatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx.unbounded_send(Message::Host(HostRequest::Register(observer, reply_tx)))
            .map_err(|_| DispatchError::Stopped)?;

        reply_rx.await.map_err(|_| DispatchError::Stopped)
    }
}

pub struct DispatchQueue<D> {
    rx: UnboundedReceiver<Message<D>>,
}

pub fn channel<D>() -> (DispatchSender<D>, DispatchQueue<D>) {
    let (tx, rx) = unbounded();
    (DispatchSender { tx }, DispatchQueue { rx })
}

impl<D> DispatchQueue<D> {
    /// Own `machine` and feed it every posted message, one at a time, in arrival order. Returns the
    /// machine after a shutdown request, after `cancel` fires, or once all senders are dropped.
    pub async fn run<L>(mut self, mut machine: ConnectionStateMachine<L>, cancel: CancellationToken) -> ConnectionStateMachine<L>
    where
        L: RadioLink<Device = D>,
    {
        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                message = self.rx.next() => {
                    match message {
                        None => {
                            debug!("All dispatch senders are gone");
                            break 'mainloop;
                        },
                        Some(Message::Link(event)) => machine.handle(event),
                        Some(Message::Host(HostRequest::StartScan)) => machine.start_scan(),
                        Some(Message::Host(HostRequest::StopScan)) => machine.stop_scan(),
                        Some(Message::Host(HostRequest::Register(observer, reply))) => {
                            let registration = machine.register_observer(observer);
                            if reply.send(registration).is_err() {
                                warn!("Observer registration was abandoned");
                            }
                        },
                        Some(Message::Host(HostRequest::Shutdown)) => {
                            info!("Dispatcher shutting down");
                            break 'mainloop;
                        },
                    }
                },
            }
        }

        machine
    }
}
