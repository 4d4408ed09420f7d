//! Sample subscribers

use obd_protocol::Sample;
use tokio::sync::broadcast;

/// Receives every published sample, synchronously, in registration order.
///
/// Implementations must not block: the poll loop waits for them before the
/// next cycle.
pub trait SampleSubscriber: Send {
    fn on_sample(&mut self, sample: Sample);
}

/// Forwards samples to a broadcast channel; slow receivers lag and lose old samples
#[derive(Debug, Clone)]
pub struct BroadcastSubscriber {
    tx: broadcast::Sender<Sample>,
}

impl BroadcastSubscriber {
    pub fn new(tx: broadcast::Sender<Sample>) -> Self {
        Self { tx }
    }
}

impl SampleSubscriber for BroadcastSubscriber {
    fn on_sample(&mut self, sample: Sample) {
        // No receivers is fine
        let _ = self.tx.send(sample);
    }
}
