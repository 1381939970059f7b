use crate::alignment::Aligner;
use crate::error::{HapError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// FIFO of pending jobs shared by the worker threads. Dequeue is the only
/// synchronisation point of the parallel phase.
#[derive(Debug)]
pub struct LockableQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> LockableQueue<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: Mutex::new(items.into_iter().collect()),
        }
    }

    /// Next item, or `None` once the queue is exhausted
    pub fn pop(&self) -> Option<T> {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed set of alignment engines, one handed to each worker for its lifetime.
#[derive(Debug)]
pub struct AlignerPool {
    aligners: Mutex<Vec<Aligner>>,
}

impl AlignerPool {
    pub fn new(template: &Aligner, size: usize) -> Self {
        Self {
            aligners: Mutex::new((0..size).map(|_| template.clone()).collect()),
        }
    }

    pub fn available(&self) -> usize {
        self.aligners.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn pop_aligner(&self) -> Result<Aligner> {
        self.aligners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .ok_or_else(|| HapError::config("alignment engine pool exhausted"))
    }

    pub fn push_aligner(&self, aligner: Aligner) {
        self.aligners.lock().unwrap_or_else(|e| e.into_inner()).push(aligner);
    }

    /// Alignments computed by every engine currently in the pool
    pub fn alignments_done(&self) -> u64 {
        self.aligners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|a| a.alignments_done)
            .sum()
    }
}

/// Drain `queue` with `threads` scoped workers, each holding one engine from
/// `pool`. Returns after every worker has joined. The first failure stops
/// the other workers from taking new jobs and is returned.
pub fn run_workers<T, F>(threads: usize, queue: &LockableQueue<T>, pool: &AlignerPool, job: F) -> Result<()>
where
    T: Send,
    F: Fn(T, &mut Aligner) -> Result<()> + Sync,
{
    if pool.available() < threads {
        return Err(HapError::config(format!(
            "alignment engine pool has {} engines for {} threads",
            pool.available(),
            threads
        )));
    }
    let failed = AtomicBool::new(false);
    let first_error: Mutex<Option<HapError>> = Mutex::new(None);
    let record = |err: HapError| {
        failed.store(true, Ordering::SeqCst);
        let mut slot = first_error.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
    };

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let job = &job;
                let failed = &failed;
                let record = &record;
                scope.spawn(move || {
                    let mut aligner = match pool.pop_aligner() {
                        Ok(a) => a,
                        Err(e) => {
                            record(e);
                            return;
                        }
                    };
                    while !failed.load(Ordering::SeqCst) {
                        let Some(item) = queue.pop() else {
                            break;
                        };
                        if let Err(e) = job(item, &mut aligner) {
                            log::error!("Worker {} failed: {}", t, e);
                            record(e);
                            break;
                        }
                    }
                    pool.push_aligner(aligner);
                })
            })
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                record(HapError::internal("a worker thread panicked"));
            }
        }
    });

    match first_error.into_inner().unwrap_or_else(|e| e.into_inner()) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::AlnCache;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn queue_yields_each_item_once() {
        let queue = LockableQueue::new(vec!["a", "b", "c"]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), Some("b"));
        assert_eq!(queue.pop(), Some("c"));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn workers_drain_queue() {
        let queue = LockableQueue::new(0..50usize);
        let pool = AlignerPool::new(&Aligner::new(AlnCache::default(), false), 4);
        let seen = AtomicUsize::new(0);
        run_workers(4, &queue, &pool, |item, _aligner| {
            seen.fetch_add(item, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), (0..50).sum::<usize>());
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn undersized_pool_is_a_config_error() {
        let queue = LockableQueue::new(vec![1, 2]);
        let pool = AlignerPool::new(&Aligner::new(AlnCache::default(), false), 1);
        let err = run_workers(2, &queue, &pool, |_, _| Ok(())).unwrap_err();
        assert!(matches!(err, HapError::Config { .. }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn first_failure_is_reported() {
        let queue = LockableQueue::new(0..10);
        let pool = AlignerPool::new(&Aligner::new(AlnCache::default(), false), 2);
        let err = run_workers(2, &queue, &pool, |item, _| {
            if item == 3 {
                Err(HapError::input_structure("bad layout"))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert!(matches!(err, HapError::InputStructure { .. }));
    }
}
