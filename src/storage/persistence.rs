//! Best-effort persistence in front of a [`KeyValueStore`].
//!
//! Reads and writes never fail from the caller's point of view: store errors
//! are logged and swallowed, and a failed read yields the default. In
//! write-behind mode puts are queued to a dedicated worker thread so callers
//! holding engine locks never wait on disk.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::KeyValueStore;

enum WriteOp {
    Int(String, i32),
    Long(String, i64),
    Flush(Sender<()>),
}

pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
    queue: Option<Sender<WriteOp>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Persistence {
    /// Writes go straight to the store on the calling thread.
    pub fn inline(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            queue: None,
            worker: Mutex::new(None),
        }
    }

    /// Writes are queued and applied in order by a background thread.
    ///
    /// Falls back to inline writes if the worker thread cannot be spawned.
    pub fn write_behind(store: Arc<dyn KeyValueStore>) -> Self {
        let (tx, rx) = unbounded();
        let worker_store = Arc::clone(&store);
        let spawned = std::thread::Builder::new()
            .name("adgate-persist".to_string())
            .spawn(move || drain(worker_store.as_ref(), &rx));

        match spawned {
            Ok(handle) => Self {
                store,
                queue: Some(tx),
                worker: Mutex::new(Some(handle)),
            },
            Err(err) => {
                warn!(error = %err, "failed to spawn persistence worker; writing inline");
                Self::inline(store)
            }
        }
    }

    pub const fn is_write_behind(&self) -> bool {
        self.queue.is_some()
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.flush();
        self.store.get_int(key, default).unwrap_or_else(|err| {
            warn!(key, error = %err, "state read failed; using default");
            default
        })
    }

    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.flush();
        self.store.get_long(key, default).unwrap_or_else(|err| {
            warn!(key, error = %err, "state read failed; using default");
            default
        })
    }

    pub fn put_int(&self, key: &str, value: i32) {
        match &self.queue {
            Some(queue) => {
                if queue.send(WriteOp::Int(key.to_string(), value)).is_err() {
                    self.write_int(key, value);
                }
            }
            None => self.write_int(key, value),
        }
    }

    pub fn put_long(&self, key: &str, value: i64) {
        match &self.queue {
            Some(queue) => {
                if queue.send(WriteOp::Long(key.to_string(), value)).is_err() {
                    self.write_long(key, value);
                }
            }
            None => self.write_long(key, value),
        }
    }

    /// Block until every queued write has reached the store.
    pub fn flush(&self) {
        let Some(queue) = &self.queue else {
            return;
        };
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        if queue.send(WriteOp::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }

    fn write_int(&self, key: &str, value: i32) {
        if let Err(err) = self.store.put_int(key, value) {
            warn!(key, value, error = %err, "state write failed");
        }
    }

    fn write_long(&self, key: &str, value: i64) {
        if let Err(err) = self.store.put_long(key, value) {
            warn!(key, value, error = %err, "state write failed");
        }
    }
}

fn drain(store: &dyn KeyValueStore, rx: &Receiver<WriteOp>) {
    for op in rx {
        match op {
            WriteOp::Int(key, value) => {
                if let Err(err) = store.put_int(&key, value) {
                    warn!(key, value, error = %err, "queued state write failed");
                }
            }
            WriteOp::Long(key, value) => {
                if let Err(err) = store.put_long(&key, value) {
                    warn!(key, value, error = %err, "queued state write failed");
                }
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("persistence worker stopped");
}

impl Drop for Persistence {
    fn drop(&mut self) {
        // Closing the queue lets the worker drain what is left and exit.
        self.queue = None;
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::test_utils::FailingStore;

    #[test]
    fn write_behind_reads_see_queued_writes() {
        let store = Arc::new(MemoryStore::new());
        let persistence = Persistence::write_behind(store.clone());
        assert!(persistence.is_write_behind());
        for value in 0..50 {
            persistence.put_int("counter", value);
        }
        assert_eq!(persistence.get_int("counter", -1), 49);
        persistence.put_long("stamp", 42);
        persistence.flush();
        assert_eq!(store.raw("stamp"), Some(42));
    }

    #[test]
    fn drop_drains_pending_writes() {
        let store = Arc::new(MemoryStore::new());
        {
            let persistence = Persistence::write_behind(store.clone());
            persistence.put_long("stamp", 7);
        }
        assert_eq!(store.raw("stamp"), Some(7));
    }

    #[test]
    fn store_failures_are_swallowed() {
        let persistence = Persistence::inline(Arc::new(FailingStore));
        persistence.put_int("counter", 1);
        persistence.put_long("stamp", 1);
        assert_eq!(persistence.get_int("counter", 5), 5);
        assert_eq!(persistence.get_long("stamp", 9), 9);
    }
}
