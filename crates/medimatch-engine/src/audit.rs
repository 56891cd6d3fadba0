//! Background audit logging.
//!
//! Queries hand their records to [`AuditLogger::record`], which only ever
//! does a `try_send` into a bounded queue. A single worker task drains the
//! queue in arrival order and appends to the [`AuditSink`], bounding every
//! append by a timeout. Full queues, sink errors and timeouts are counted and
//! traced under the `medimatch::audit` target; none of them reach the caller.

use std::{
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use medimatch_core::{
  audit::{AuditPayload, AuditRecord},
  store::AuditSink,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{
  mpsc::{self, error::TrySendError},
  oneshot,
};

const TARGET: &str = "medimatch::audit";

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
  /// Records waiting for the worker beyond this are dropped.
  pub queue_capacity:    usize,
  pub append_timeout_ms: u64,
}

impl Default for AuditConfig {
  fn default() -> Self { Self { queue_capacity: 1024, append_timeout_ms: 2000 } }
}

// ─── Counters ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Counters {
  enqueued:  AtomicU64,
  appended:  AtomicU64,
  dropped:   AtomicU64,
  failed:    AtomicU64,
  timed_out: AtomicU64,
}

impl Counters {
  fn bump(counter: &AtomicU64) { counter.fetch_add(1, Ordering::Relaxed); }
}

/// A point-in-time copy of the logger's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
  /// Accepted into the queue.
  pub enqueued:  u64,
  /// Durably appended by the sink.
  pub appended:  u64,
  /// Rejected because the queue was full or the worker had stopped.
  pub dropped:   u64,
  /// The sink returned an error.
  pub failed:    u64,
  /// The sink did not answer within the append timeout.
  pub timed_out: u64,
}

// ─── AuditLogger ─────────────────────────────────────────────────────────────

enum Message {
  Record(AuditRecord),
  Flush(oneshot::Sender<()>),
  Shutdown(oneshot::Sender<()>),
}

/// Handle to the audit worker. Cloning is cheap; all clones feed the same
/// queue.
#[derive(Clone)]
pub struct AuditLogger {
  tx:       mpsc::Sender<Message>,
  counters: Arc<Counters>,
}

impl AuditLogger {
  /// Start the worker on the current tokio runtime.
  pub fn spawn<K>(sink: Arc<K>, config: &AuditConfig) -> Self
  where
    K: AuditSink + 'static,
  {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let counters = Arc::new(Counters::default());
    let timeout = Duration::from_millis(config.append_timeout_ms);

    tokio::spawn(run_worker(sink, rx, Arc::clone(&counters), timeout));

    Self { tx, counters }
  }

  /// Queue one record. Never blocks and never fails; a record that does not
  /// fit is dropped and counted.
  pub fn record(&self, input_text: impl Into<String>, payload: AuditPayload) {
    let record = AuditRecord::new(input_text, payload);
    let query_type = record.query_type();

    match self.tx.try_send(Message::Record(record)) {
      Ok(()) => Counters::bump(&self.counters.enqueued),
      Err(TrySendError::Full(_)) => {
        Counters::bump(&self.counters.dropped);
        tracing::warn!(target: TARGET, query_type, "audit queue full, record dropped");
      }
      Err(TrySendError::Closed(_)) => {
        Counters::bump(&self.counters.dropped);
        tracing::warn!(target: TARGET, query_type, "audit worker stopped, record dropped");
      }
    }
  }

  pub fn stats(&self) -> AuditStats {
    let c = &self.counters;
    AuditStats {
      enqueued:  c.enqueued.load(Ordering::Relaxed),
      appended:  c.appended.load(Ordering::Relaxed),
      dropped:   c.dropped.load(Ordering::Relaxed),
      failed:    c.failed.load(Ordering::Relaxed),
      timed_out: c.timed_out.load(Ordering::Relaxed),
    }
  }

  /// Wait until every record queued before this call has been handled
  /// (appended, failed or timed out). Returns at once if the worker is gone.
  pub async fn flush(&self) {
    let (done, wait) = oneshot::channel();
    if self.tx.send(Message::Flush(done)).await.is_ok() {
      let _ = wait.await;
    }
  }

  /// Drain the queue and stop the worker. Records offered afterwards are
  /// dropped.
  pub async fn shutdown(&self) {
    let (done, wait) = oneshot::channel();
    if self.tx.send(Message::Shutdown(done)).await.is_ok() {
      let _ = wait.await;
    }
  }
}

async fn run_worker<K: AuditSink>(
  sink: Arc<K>,
  mut rx: mpsc::Receiver<Message>,
  counters: Arc<Counters>,
  timeout: Duration,
) {
  let mut stopping = Vec::new();

  while let Some(message) = rx.recv().await {
    match message {
      Message::Record(record) => append(sink.as_ref(), record, &counters, timeout).await,
      Message::Flush(done) => {
        let _ = done.send(());
      }
      Message::Shutdown(done) => {
        // Closing lets `recv` hand out what is already queued, then end.
        rx.close();
        stopping.push(done);
      }
    }
  }

  tracing::debug!(target: TARGET, "audit worker stopped");
  for done in stopping {
    let _ = done.send(());
  }
}

async fn append<K: AuditSink>(
  sink: &K,
  record: AuditRecord,
  counters: &Counters,
  timeout: Duration,
) {
  let audit_id = record.audit_id;
  let query_type = record.query_type();

  match tokio::time::timeout(timeout, sink.append(record)).await {
    Ok(Ok(())) => Counters::bump(&counters.appended),
    Ok(Err(e)) => {
      Counters::bump(&counters.failed);
      tracing::error!(target: TARGET, %audit_id, query_type, error = %e, "audit append failed");
    }
    Err(_) => {
      Counters::bump(&counters.timed_out);
      tracing::error!(
        target: TARGET,
        %audit_id,
        query_type,
        timeout_ms = timeout.as_millis() as u64,
        "audit append timed out"
      );
    }
  }
}
