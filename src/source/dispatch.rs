//! Priority-ordered subscriber chains and the emit pipeline
//!
//! Each chain is a copy-on-write list: subscribing clones the list, inserts
//! and re-sorts, then swaps it in. Emitting snapshots the current list and
//! releases the lock before any callback runs, so callbacks may subscribe
//! further handlers without deadlocking; those take effect on the next emit.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::DataSource;
use crate::error::{BoxError, DispatchStage};
use crate::types::{Data, DataArray, Packet, SourceKind};
use crate::{DataSourceError, Result};

/// Result of one subscriber invocation.
#[derive(Debug)]
pub enum Outcome {
    /// Pass the record on to the next subscriber
    Continue,
    /// Drop the record (or packet) silently
    Discard,
    /// Abort the dispatch pass with an error
    Fail(BoxError),
}

impl Outcome {
    pub fn fail(error: impl Into<BoxError>) -> Self {
        Outcome::Fail(error.into())
    }
}

impl<E: Into<BoxError>> From<std::result::Result<(), E>> for Outcome {
    fn from(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => Outcome::Continue,
            Err(e) => Outcome::Fail(e.into()),
        }
    }
}

pub(crate) type DataCallback = dyn Fn(&DataSource, &mut Data) -> Outcome + Send + Sync;
pub(crate) type ArrayCallback = dyn Fn(&DataSource, &mut DataArray) -> Outcome + Send + Sync;
pub(crate) type PacketCallback = dyn Fn(&DataSource, &Packet) -> Outcome + Send + Sync;

pub(crate) struct Subscription<F: ?Sized> {
    priority: i32,
    callback: Box<F>,
}

pub(crate) struct Chain<F: ?Sized> {
    entries: RwLock<Arc<Vec<Arc<Subscription<F>>>>>,
}

impl<F: ?Sized> Default for Chain<F> {
    fn default() -> Self {
        Self { entries: RwLock::new(Arc::new(Vec::new())) }
    }
}

impl<F: ?Sized> Chain<F> {
    pub(crate) fn insert(&self, priority: i32, callback: Box<F>) -> usize {
        let mut entries = self.entries.write();
        let mut next: Vec<_> = entries.iter().cloned().collect();
        next.push(Arc::new(Subscription { priority, callback }));
        // Stable: equal priorities keep registration order.
        next.sort_by_key(|s| s.priority);
        let len = next.len();
        *entries = Arc::new(next);
        len
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<Subscription<F>>>> {
        Arc::clone(&self.entries.read())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[derive(Default)]
pub(crate) struct Subscribers {
    pub(crate) data: Chain<DataCallback>,
    pub(crate) array: Chain<ArrayCallback>,
    pub(crate) packet: Chain<PacketCallback>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("data", &self.data.len())
            .field("array", &self.array.len())
            .field("packet", &self.packet.len())
            .finish()
    }
}

/// How a dispatch pass ended.
enum Pass {
    Continue,
    Discarded,
}

fn subscriber_error(stage: DispatchStage, priority: i32, source: BoxError) -> DataSourceError {
    DataSourceError::Subscriber { stage, priority, source }
}

impl DataSource {
    /// Registers a per-record subscriber. Lower priorities run first.
    ///
    /// On array sources the callback runs once per element; returning
    /// [`Outcome::Discard`] removes that element from the batch.
    pub fn subscribe<F>(&self, callback: F, priority: i32) -> Result<()>
    where
        F: Fn(&DataSource, &mut Data) -> Outcome + Send + Sync + 'static,
    {
        let count = self.subscribers.data.insert(priority, Box::new(callback));
        debug!(source = %self.name, priority, count, "Added data subscriber");
        Ok(())
    }

    /// Registers a whole-batch subscriber. Array sources only.
    pub fn subscribe_array<F>(&self, callback: F, priority: i32) -> Result<()>
    where
        F: Fn(&DataSource, &mut DataArray) -> Outcome + Send + Sync + 'static,
    {
        if self.kind != SourceKind::Array {
            return Err(DataSourceError::CardinalityMismatch {
                expected: SourceKind::Array,
                operation: "subscribe to arrays",
            });
        }
        let count = self.subscribers.array.insert(priority, Box::new(callback));
        debug!(source = %self.name, priority, count, "Added array subscriber");
        Ok(())
    }

    /// Registers a subscriber that sees the final packet, read-only.
    pub fn subscribe_packet<F>(&self, callback: F, priority: i32) -> Result<()>
    where
        F: Fn(&DataSource, &Packet) -> Outcome + Send + Sync + 'static,
    {
        let count = self.subscribers.packet.insert(priority, Box::new(callback));
        debug!(source = %self.name, priority, count, "Added packet subscriber");
        Ok(())
    }

    /// Runs `packet` through every subscriber chain, then releases it.
    ///
    /// The first emit seals the schema. Data subscribers run first; on array
    /// sources discarded elements are compacted out before array subscribers
    /// run. A discard at the data stage of a single source, or at the array
    /// stage, ends the pass silently. Packet subscribers run last; a discard
    /// there skips the remaining packet subscribers. A failing subscriber
    /// aborts the pass and its error is returned unchanged as the source of
    /// [`DataSourceError::Subscriber`].
    pub fn emit_and_release(&self, mut packet: Packet) -> Result<()> {
        self.seal();
        let result = self.dispatch(&mut packet);
        self.release(packet);
        result
    }

    fn dispatch(&self, packet: &mut Packet) -> Result<()> {
        let pass = match (self.kind, &mut *packet) {
            (SourceKind::Single, Packet::Single(data)) => self.dispatch_single(data)?,
            (SourceKind::Array, Packet::Array(array)) => self.dispatch_array(array)?,
            (expected, _) => {
                return Err(DataSourceError::CardinalityMismatch {
                    expected,
                    operation: "emit packets of their own kind",
                });
            }
        };

        if let Pass::Discarded = pass {
            trace!(source = %self.name, seq = packet.seq(), "Packet discarded");
            return Ok(());
        }

        for sub in self.subscribers.packet.snapshot().iter() {
            match (sub.callback)(self, packet) {
                Outcome::Continue => {}
                Outcome::Discard => break,
                Outcome::Fail(e) => return Err(subscriber_error(DispatchStage::Packet, sub.priority, e)),
            }
        }
        Ok(())
    }

    fn dispatch_single(&self, data: &mut Data) -> Result<Pass> {
        for sub in self.subscribers.data.snapshot().iter() {
            match (sub.callback)(self, data) {
                Outcome::Continue => {}
                Outcome::Discard => return Ok(Pass::Discarded),
                Outcome::Fail(e) => return Err(subscriber_error(DispatchStage::Data, sub.priority, e)),
            }
        }
        Ok(Pass::Continue)
    }

    fn dispatch_array(&self, array: &mut DataArray) -> Result<Pass> {
        for sub in self.subscribers.data.snapshot().iter() {
            let records = &mut array.records;
            let mut kept = 0;
            for i in 0..records.len() {
                match (sub.callback)(self, &mut records[i]) {
                    Outcome::Continue => {
                        records.swap(kept, i);
                        kept += 1;
                    }
                    Outcome::Discard => {}
                    Outcome::Fail(e) => {
                        return Err(subscriber_error(DispatchStage::Data, sub.priority, e));
                    }
                }
            }
            if kept < records.len() {
                trace!(source = %self.name, dropped = records.len() - kept, "Discarded records");
                records.truncate(kept);
            }
        }

        for sub in self.subscribers.array.snapshot().iter() {
            match (sub.callback)(self, array) {
                Outcome::Continue => {}
                Outcome::Discard => return Ok(Pass::Discarded),
                Outcome::Fail(e) => return Err(subscriber_error(DispatchStage::Array, sub.priority, e)),
            }
        }
        Ok(Pass::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldOptions, Kind};
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn source(kind: SourceKind) -> (DataSource, crate::FieldAccessor) {
        let source = DataSource::new("test", kind);
        let n = source.add_field("n", Kind::Uint32, FieldOptions::new()).unwrap();
        (source, n)
    }

    fn array_of(source: &DataSource, n: &crate::FieldAccessor, values: &[u32]) -> Packet {
        let mut packet = source.new_packet_array().unwrap();
        if let Packet::Array(array) = &mut packet {
            for &v in values {
                let mut data = source.new_data();
                n.set(&mut data, v).unwrap();
                array.push(data);
            }
        }
        packet
    }

    proptest! {
        #[test]
        fn prop_subscribers_run_in_stable_priority_order(
            priorities in prop::collection::vec(-5i32..5, 1..20)
        ) {
            let (source, _) = source(SourceKind::Single);
            let order = Arc::new(Mutex::new(Vec::new()));
            for (id, &priority) in priorities.iter().enumerate() {
                let order = Arc::clone(&order);
                source.subscribe(move |_, _| {
                    order.lock().unwrap().push(id);
                    Outcome::Continue
                }, priority).unwrap();
            }

            source.emit_and_release(source.new_packet_single().unwrap()).unwrap();

            let mut expected: Vec<usize> = (0..priorities.len()).collect();
            expected.sort_by_key(|&id| priorities[id]);
            prop_assert_eq!(order.lock().unwrap().clone(), expected);
        }
    }

    #[test]
    fn single_discard_skips_packet_subscribers() {
        let (source, _) = source(SourceKind::Single);
        let seen = Arc::new(Mutex::new(0));
        source.subscribe(|_, _| Outcome::Discard, 0).unwrap();
        let counter = Arc::clone(&seen);
        source
            .subscribe_packet(
                move |_, _| {
                    *counter.lock().unwrap() += 1;
                    Outcome::Continue
                },
                0,
            )
            .unwrap();

        source.emit_and_release(source.new_packet_single().unwrap()).unwrap();
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn array_discard_compacts_in_order() {
        let (source, n) = source(SourceKind::Array);
        let reader = n.clone();
        source
            .subscribe(move |_, data| match reader.get::<u32>(data) {
                Ok(v) if v % 2 == 0 => Outcome::Discard,
                _ => Outcome::Continue,
            }, 0)
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reader = n.clone();
        source
            .subscribe_array(
                move |_, array| {
                    let values = array.iter().map(|d| reader.get::<u32>(d).unwrap()).collect();
                    *sink.lock().unwrap() = values;
                    Outcome::Continue
                },
                0,
            )
            .unwrap();

        source.emit_and_release(array_of(&source, &n, &[1, 2, 3, 4, 5, 6])).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 3, 5]);
    }

    #[test]
    fn array_discard_skips_later_stages() {
        let (source, n) = source(SourceKind::Array);
        let reached = Arc::new(Mutex::new(Vec::new()));

        source.subscribe_array(|_, _| Outcome::Discard, 0).unwrap();
        let later = Arc::clone(&reached);
        source
            .subscribe_array(
                move |_, _| {
                    later.lock().unwrap().push("array");
                    Outcome::Continue
                },
                1,
            )
            .unwrap();
        let packet_stage = Arc::clone(&reached);
        source
            .subscribe_packet(
                move |_, _| {
                    packet_stage.lock().unwrap().push("packet");
                    Outcome::Continue
                },
                0,
            )
            .unwrap();

        source.emit_and_release(array_of(&source, &n, &[1])).unwrap();
        assert!(reached.lock().unwrap().is_empty());
    }

    #[test]
    fn packet_discard_stops_later_packet_subscribers() {
        let (source, _) = source(SourceKind::Single);
        let reached = Arc::new(Mutex::new(false));
        source.subscribe_packet(|_, _| Outcome::Discard, 0).unwrap();
        let flag = Arc::clone(&reached);
        source
            .subscribe_packet(
                move |_, _| {
                    *flag.lock().unwrap() = true;
                    Outcome::Continue
                },
                1,
            )
            .unwrap();

        source.emit_and_release(source.new_packet_single().unwrap()).unwrap();
        assert!(!*reached.lock().unwrap());
    }

    #[test]
    fn failure_aborts_with_subscriber_error() {
        let (source, _) = source(SourceKind::Single);
        source
            .subscribe(|_, _| Outcome::fail(std::io::Error::other("disk full")), 7)
            .unwrap();

        let err = source.emit_and_release(source.new_packet_single().unwrap()).unwrap_err();
        match err {
            DataSourceError::Subscriber { stage, priority, source } => {
                assert_eq!(stage, DispatchStage::Data);
                assert_eq!(priority, 7);
                assert_eq!(source.to_string(), "disk full");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn mismatched_packet_kind_is_rejected() {
        let (single, _) = source(SourceKind::Single);
        let (array, n) = source(SourceKind::Array);
        let err = single.emit_and_release(array_of(&array, &n, &[1])).unwrap_err();
        assert!(matches!(err, DataSourceError::CardinalityMismatch { .. }));
        assert!(single.subscribe_array(|_, _| Outcome::Continue, 0).is_err());
    }

    #[test]
    fn callbacks_may_subscribe_during_dispatch() {
        let source = Arc::new(DataSource::new("reentrant", SourceKind::Single));
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        source
            .subscribe(
                move |src, _| {
                    let counter = Arc::clone(&counter);
                    src.subscribe(
                        move |_, _| {
                            *counter.lock().unwrap() += 1;
                            Outcome::Continue
                        },
                        1,
                    )
                    .into()
                },
                0,
            )
            .unwrap();

        source.emit_and_release(source.new_packet_single().unwrap()).unwrap();
        assert_eq!(*calls.lock().unwrap(), 0);
        source.emit_and_release(source.new_packet_single().unwrap()).unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn result_converts_to_outcome() {
        let ok: std::result::Result<(), std::io::Error> = Ok(());
        assert!(matches!(Outcome::from(ok), Outcome::Continue));
        let err: std::result::Result<(), std::io::Error> = Err(std::io::Error::other("x"));
        assert!(matches!(Outcome::from(err), Outcome::Fail(_)));
    }
}
