use crossbeam::channel::{unbounded, Receiver, Sender};

/// Cap on how many not-yet-fulfilled items a downstream stage may have
/// requested from a given upstream at once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxDemand {
    /// No cap on outstanding demand
    Unbounded,
    /// At most this many unfulfilled items; must be positive
    Limit(usize),
}

/// An ordered batch of events answering a specific quantity of demand
#[derive(Debug)]
pub struct EventBatch<T> {
    /// Items in production order
    pub items: Vec<T>,
    /// Demand units this batch fulfills. A filtering stage may carry fewer
    /// items than it fulfills; it never carries more.
    pub fulfilled: usize,
}

impl<T> EventBatch<T> {
    /// Create a batch that fulfills exactly as much demand as it carries items
    pub fn exact(items: Vec<T>) -> Self {
        let fulfilled = items.len();
        Self { items, fulfilled }
    }
}

/// The other end of the subscription has been dropped.
/// Runners treat this as normal termination, never as a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeClosed;

/// Upstream half of a subscription: waits for demand, delivers event batches
pub struct ProducerEnd<T> {
    demand_rx: Receiver<usize>,
    event_tx: Sender<EventBatch<T>>,
}

/// Downstream half of a subscription: issues demand, awaits event batches
///
/// Owned exclusively by the downstream stage's thread; the outstanding-demand
/// counter is plain state, not shared.
pub struct ConsumerEnd<T> {
    demand_tx: Sender<usize>,
    event_rx: Receiver<EventBatch<T>>,
    max_demand: MaxDemand,
    outstanding: usize,
}

/// Create a subscription edge with the given maximum outstanding demand.
/// Returns the upstream (producer) end and the downstream (consumer) end.
pub fn connect<T>(max_demand: MaxDemand) -> (ProducerEnd<T>, ConsumerEnd<T>) {
    let (demand_tx, demand_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    (
        ProducerEnd {
            demand_rx,
            event_tx,
        },
        ConsumerEnd {
            demand_tx,
            event_rx,
            max_demand,
            outstanding: 0,
        },
    )
}

impl<T> ProducerEnd<T> {
    /// Block until the downstream requests items, and return the amount
    pub fn await_demand(&self) -> Result<usize, EdgeClosed> {
        self.demand_rx.recv().map_err(|_| EdgeClosed)
    }

    /// Deliver a batch downstream
    pub fn deliver(&self, batch: EventBatch<T>) -> Result<(), EdgeClosed> {
        self.event_tx.send(batch).map_err(|_| EdgeClosed)
    }
}

impl<T> ConsumerEnd<T> {
    /// Request up to `amount` items from the upstream, clamped so outstanding
    /// demand never exceeds the subscription's maximum.
    ///
    /// Returns the amount actually requested; 0 when the edge has no headroom
    /// left (nothing is sent in that case).
    pub fn request(&mut self, amount: usize) -> Result<usize, EdgeClosed> {
        let granted = match self.max_demand {
            MaxDemand::Unbounded => amount,
            MaxDemand::Limit(max) => amount.min(max.saturating_sub(self.outstanding)),
        };
        if granted == 0 {
            return Ok(0);
        }
        self.demand_tx.send(granted).map_err(|_| EdgeClosed)?;
        self.outstanding += granted;
        Ok(granted)
    }

    /// Block until the upstream delivers a batch, and settle the demand it
    /// fulfills
    pub fn await_events(&mut self) -> Result<EventBatch<T>, EdgeClosed> {
        let batch = self.event_rx.recv().map_err(|_| EdgeClosed)?;
        self.outstanding = self.outstanding.saturating_sub(batch.fulfilled);
        Ok(batch)
    }

    /// Demand issued but not yet fulfilled on this edge
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// The negotiated maximum outstanding demand
    pub fn max_demand(&self) -> MaxDemand {
        self.max_demand
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deliver_roundtrip() {
        let (up, mut down) = connect::<u32>(MaxDemand::Unbounded);
        assert_eq!(down.request(3), Ok(3));
        assert_eq!(up.await_demand(), Ok(3));
        up.deliver(EventBatch::exact(vec![1, 2, 3])).unwrap();
        let batch = down.await_events().unwrap();
        assert_eq!(batch.items, vec![1, 2, 3]);
        assert_eq!(down.outstanding(), 0);
    }

    #[test]
    fn test_max_demand_clamp() {
        let (up, mut down) = connect::<u32>(MaxDemand::Limit(1));
        assert_eq!(down.request(5), Ok(1));
        assert_eq!(down.outstanding(), 1);
        // No headroom left until the first request is fulfilled
        assert_eq!(down.request(5), Ok(0));
        assert_eq!(up.await_demand(), Ok(1));
        up.deliver(EventBatch::exact(vec![7])).unwrap();
        down.await_events().unwrap();
        assert_eq!(down.outstanding(), 0);
        assert_eq!(down.request(5), Ok(1));
    }

    #[test]
    fn test_fulfilled_settles_more_than_delivered() {
        let (up, mut down) = connect::<u32>(MaxDemand::Limit(2));
        assert_eq!(down.request(2), Ok(2));
        assert_eq!(up.await_demand(), Ok(2));
        // A filter answered both demand units but kept one item
        up.deliver(EventBatch {
            items: vec![4],
            fulfilled: 2,
        })
        .unwrap();
        let batch = down.await_events().unwrap();
        assert_eq!(batch.items, vec![4]);
        assert_eq!(down.outstanding(), 0);
    }

    #[test]
    fn test_batches_arrive_in_order() {
        let (up, mut down) = connect::<u32>(MaxDemand::Unbounded);
        down.request(4).unwrap();
        up.deliver(EventBatch::exact(vec![1, 2])).unwrap();
        up.deliver(EventBatch::exact(vec![3, 4])).unwrap();
        assert_eq!(down.await_events().unwrap().items, vec![1, 2]);
        assert_eq!(down.await_events().unwrap().items, vec![3, 4]);
    }

    #[test]
    fn test_closed_edge() {
        let (up, down) = connect::<u32>(MaxDemand::Unbounded);
        drop(down);
        assert_eq!(up.await_demand(), Err(EdgeClosed));
        assert_eq!(up.deliver(EventBatch::exact(vec![1])), Err(EdgeClosed));

        let (up, mut down) = connect::<u32>(MaxDemand::Unbounded);
        drop(up);
        assert_eq!(down.request(1), Err(EdgeClosed));
        assert!(down.await_events().is_err());
    }
}
