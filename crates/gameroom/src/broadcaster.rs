use super::protocol::Frame;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::unbounded_channel;

/// A broadcast listener. Implementations bridge to WebSocket sessions,
/// test recorders, or anything else that can consume frames.
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync {
    async fn deliver(&self, frame: &Frame) -> anyhow::Result<()>;
}

struct Seat {
    subscriber: Arc<dyn Subscriber>,
    tx: UnboundedSender<Frame>,
}

/// Fan-out registry. Every subscriber drains a private unbounded queue
/// in its own task, so broadcasting is a non-blocking enqueue and the
/// engine never awaits subscriber I/O. A subscriber whose delivery
/// fails is evicted; the others are untouched.
#[derive(Default)]
pub struct Broadcaster {
    seats: Mutex<Vec<Seat>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and queues greeting frames ahead of any
    /// broadcast traffic.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>, greetings: Vec<Frame>) {
        let (tx, mut rx) = unbounded_channel::<Frame>();
        for frame in greetings {
            let _ = tx.send(frame);
        }
        {
            let forwarded = subscriber.clone();
            tokio::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    if forwarded.deliver(&frame).await.is_err() {
                        log::warn!("[broadcast] subscriber failed, evicting");
                        break;
                    }
                }
            });
        }
        self.seats.lock().expect("seats").push(Seat { subscriber, tx });
    }

    pub fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>) {
        self.seats
            .lock()
            .expect("seats")
            .retain(|seat| !Arc::ptr_eq(&seat.subscriber, subscriber));
    }

    pub fn len(&self) -> usize {
        self.seats.lock().expect("seats").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues a frame for every live subscriber. Seats whose
    /// forwarding task has exited (failed delivery) are dropped here.
    pub fn broadcast(&self, frame: &Frame) {
        self.seats
            .lock()
            .expect("seats")
            .retain(|seat| seat.tx.send(frame.clone()).is_ok());
    }
}
