//! Sample observers.
//!
//! Record decoding does not interpret channel values itself. Each decoded
//! record is handed to the observers registered on the data group, which
//! pick out the channels they care about.

/// Receives raw records as they are decoded.
pub trait SampleObserver {
    /// Called once per decoded record with the sample index, the record id
    /// of the owning channel group and the raw record bytes.
    fn on_sample(&mut self, sample: u64, record_id: u64, record: &[u8]);
}

impl<F> SampleObserver for F
where
    F: FnMut(u64, u64, &[u8]),
{
    fn on_sample(&mut self, sample: u64, record_id: u64, record: &[u8]) {
        self(sample, record_id, record)
    }
}

/// Dispatches decoded records to registered observers.
pub trait SampleNotifier {
    fn notify_sample_observers(&mut self, sample: u64, record_id: u64, record: &[u8]);
}

/// Handle returned by [`SampleObservers::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// The observer list of one data group.
#[derive(Default)]
pub struct SampleObservers<'a> {
    observers: Vec<(ObserverId, Box<dyn SampleObserver + 'a>)>,
    next_id: u64,
}

impl<'a> SampleObservers<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach<O: SampleObserver + 'a>(&mut self, observer: O) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Removes the observer; returns false if it was not attached.
    pub fn detach(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(other, _)| *other != id);
        self.observers.len() != before
    }

    pub fn detach_all(&mut self) {
        self.observers.clear();
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl SampleNotifier for SampleObservers<'_> {
    fn notify_sample_observers(&mut self, sample: u64, record_id: u64, record: &[u8]) {
        for (_, observer) in &mut self.observers {
            observer.on_sample(sample, record_id, record);
        }
    }
}

impl core::fmt::Debug for SampleObservers<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SampleObservers")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_observer_is_not_called() {
        let mut first = 0;
        let mut second = 0;
        {
            let mut observers = SampleObservers::new();
            let a = observers.attach(|_: u64, _: u64, _: &[u8]| first += 1);
            observers.attach(|_: u64, _: u64, _: &[u8]| second += 1);

            observers.notify_sample_observers(0, 1, &[]);
            assert!(observers.detach(a));
            assert!(!observers.detach(a));
            observers.notify_sample_observers(1, 1, &[]);
        }
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }
}
