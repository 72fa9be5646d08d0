//! Мост событий между потоком захвата и задачей приложения.
//!
//! Ограниченное lock-free SPSC кольцо на `pool_size` слотов `PositionSample`.
//! Поток захвата публикует без блокировок, при переполнении отсчёт отбрасывается
//! и считается. Задача приложения просыпается по `Notify` и забирает пакет целиком.

use crate::events::{PositionSample, Vector2D};
use crate::trace_if_enabled;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use serde::Serialize;
use smallvec::SmallVec;
use std::future::Future;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Пакет отсчётов одного слива; типичный пакет помещается без аллокации
pub type SampleBatch = SmallVec<[PositionSample; 16]>;

#[derive(Debug, Default)]
pub struct BridgeCounters {
    events_processed: AtomicU64,
    events_batched: AtomicU64,
    events_dropped: AtomicU64,
    batches_delivered: AtomicU64,
    last_x: AtomicI32,
    last_y: AtomicI32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BridgeStats {
    pub events_processed: u64,
    pub events_batched: u64,
    pub events_dropped: u64,
    pub batches_delivered: u64,
    pub batching_efficiency: f64,
    pub currently_tracking: bool,
    pub last_position: Vector2D,
}

impl BridgeCounters {
    /// `pending` - сколько отсчётов сейчас лежит в кольце
    pub fn snapshot(&self, pending: usize) -> BridgeStats {
        let processed = self.events_processed.load(Ordering::Relaxed);
        let batched = self.events_batched.load(Ordering::Relaxed);
        BridgeStats {
            events_processed: processed,
            events_batched: batched,
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            batching_efficiency: if processed == 0 {
                0.0
            } else {
                batched as f64 / processed as f64
            },
            currently_tracking: pending > 0,
            last_position: Vector2D::new(
                self.last_x.load(Ordering::Relaxed),
                self.last_y.load(Ordering::Relaxed),
            ),
        }
    }
}

pub struct EventBridge;

impl EventBridge {
    /// Создать пару концов моста. Размер пула округляется вверх до степени двойки.
    pub fn new(pool_size: usize) -> (BridgePublisher, BridgeReceiver) {
        let capacity = pool_size.max(1).next_power_of_two();
        let (producer, consumer) = HeapRb::<PositionSample>::new(capacity).split();
        let counters = Arc::new(BridgeCounters::default());
        let notify = Arc::new(Notify::new());

        (
            BridgePublisher {
                producer,
                counters: counters.clone(),
                notify: notify.clone(),
                last_timestamp_ms: 0,
            },
            BridgeReceiver {
                consumer,
                counters,
                notify,
                capacity,
            },
        )
    }
}

/// Конец потока захвата. Единственный производитель.
pub struct BridgePublisher {
    producer: HeapProd<PositionSample>,
    counters: Arc<BridgeCounters>,
    notify: Arc<Notify>,
    last_timestamp_ms: u64,
}

impl BridgePublisher {
    /// Неблокирующая публикация. `false` - пул исчерпан, отсчёт отброшен.
    pub fn publish(&mut self, sample: PositionSample) -> bool {
        self.counters.events_processed.fetch_add(1, Ordering::Relaxed);

        // Время на границе моста не идёт назад
        let timestamp_ms = sample.timestamp_ms.max(self.last_timestamp_ms);
        let sample = sample.with_timestamp(timestamp_ms);

        if self.producer.try_push(sample).is_err() {
            self.counters.events_dropped.fetch_add(1, Ordering::Relaxed);
            trace_if_enabled!("Пул моста исчерпан, отсчёт {} отброшен", sample);
            return false;
        }

        self.last_timestamp_ms = timestamp_ms;
        self.counters.last_x.store(sample.x, Ordering::Relaxed);
        self.counters.last_y.store(sample.y, Ordering::Relaxed);
        self.notify.notify_one();
        true
    }

    pub fn counters(&self) -> Arc<BridgeCounters> {
        self.counters.clone()
    }
}

/// Конец задачи приложения. Единственный потребитель.
pub struct BridgeReceiver {
    consumer: HeapCons<PositionSample>,
    counters: Arc<BridgeCounters>,
    notify: Arc<Notify>,
    capacity: usize,
}

impl BridgeReceiver {
    /// Ждать публикации. Уведомление, пришедшее до ожидания, не теряется.
    /// Будущее не держит ссылку на приёмник: потребитель кольца не `Sync`.
    pub fn notified(&self) -> impl Future<Output = ()> + Send + 'static {
        let notify = self.notify.clone();
        async move { notify.notified().await }
    }

    /// Забрать все накопленные отсчёты в порядке поступления
    pub fn drain_batch(&mut self) -> SampleBatch {
        let mut batch = SampleBatch::new();
        while let Some(sample) = self.consumer.try_pop() {
            batch.push(sample);
        }

        if !batch.is_empty() {
            self.counters
                .events_batched
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
            self.counters.batches_delivered.fetch_add(1, Ordering::Relaxed);
            trace_if_enabled!("Слив моста: {} отсчётов", batch.len());
        }

        batch
    }

    pub fn pending(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn counters(&self) -> Arc<BridgeCounters> {
        self.counters.clone()
    }

    pub fn stats(&self) -> BridgeStats {
        self.counters.snapshot(self.pending())
    }
}
