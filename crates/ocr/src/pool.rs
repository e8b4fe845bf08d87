//! Bounded OCR worker pool.
//!
//! A fixed set of worker threads pulls jobs from a bounded queue; callers
//! block on their own reply channel until the result arrives, the deadline
//! passes or the request is cancelled.

use image::DynamicImage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::engine::OcrEngine;
use crate::types::OcrWord;
use crate::OcrError;

const WAIT_SLICE: Duration = Duration::from_millis(25);
/// Slack for the engine to notice its own deadline before the caller gives up.
const DEADLINE_GRACE: Duration = Duration::from_millis(500);

type Reply = Result<Vec<OcrWord>, OcrError>;

struct Job {
    image: DynamicImage,
    deadline: Instant,
    cancel: Arc<AtomicBool>,
    reply: Sender<Reply>,
}

pub struct OcrPool {
    engine: Arc<dyn OcrEngine>,
    sender: Mutex<Option<SyncSender<Job>>>,
    workers: Vec<JoinHandle<()>>,
}

impl OcrPool {
    pub fn new(engine: Arc<dyn OcrEngine>, workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::sync_channel::<Job>(workers * 2);
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers)
            .filter_map(|i| {
                let engine = Arc::clone(&engine);
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("safedoc-ocr-{}", i))
                    .spawn(move || worker_loop(engine, receiver))
                    .map_err(|e| log::error!("[OCR] failed to spawn worker {}: {}", i, e))
                    .ok()
            })
            .collect::<Vec<_>>();

        log::info!(
            "[OCR] pool started: {} worker(s), engine {}",
            handles.len(),
            engine.name()
        );

        Self {
            engine,
            sender: Mutex::new(Some(sender)),
            workers: handles,
        }
    }

    pub fn engine(&self) -> &dyn OcrEngine {
        self.engine.as_ref()
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Runs OCR on `image`, waiting at most `timeout` (queueing included).
    pub fn recognize(
        &self,
        image: DynamicImage,
        timeout: Duration,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Vec<OcrWord>, OcrError> {
        let deadline = Instant::now() + timeout;
        let (reply_tx, reply_rx) = mpsc::channel();

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| OcrError::Unavailable("OCR pool is shut down".to_string()))?;

        let mut pending = Job {
            image,
            deadline,
            cancel: Arc::clone(cancel),
            reply: reply_tx,
        };
        loop {
            match sender.try_send(pending) {
                Ok(()) => break,
                Err(TrySendError::Full(job)) => {
                    check_wait(cancel, deadline, timeout)?;
                    thread::sleep(WAIT_SLICE);
                    pending = job;
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(OcrError::Unavailable("OCR workers stopped".to_string()));
                }
            }
        }

        loop {
            match reply_rx.recv_timeout(WAIT_SLICE) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {
                    check_wait(cancel, deadline + DEADLINE_GRACE, timeout)?;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(OcrError::Engine("OCR worker dropped the job".to_string()));
                }
            }
        }
    }
}

fn check_wait(cancel: &AtomicBool, deadline: Instant, timeout: Duration) -> Result<(), OcrError> {
    if cancel.load(Ordering::Relaxed) {
        return Err(OcrError::Cancelled);
    }
    if Instant::now() >= deadline {
        return Err(OcrError::Timeout(timeout.as_millis()));
    }
    Ok(())
}

fn worker_loop(engine: Arc<dyn OcrEngine>, receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let guard = receiver
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.recv()
        };
        let Ok(job) = job else {
            break;
        };

        let result = if job.cancel.load(Ordering::Relaxed) {
            Err(OcrError::Cancelled)
        } else if Instant::now() >= job.deadline {
            Err(OcrError::Timeout(0))
        } else {
            catch_unwind(AssertUnwindSafe(|| {
                engine.recognize(&job.image, job.deadline, &job.cancel)
            }))
            .unwrap_or_else(|_| Err(OcrError::Engine("OCR engine panicked".to_string())))
        };
        drop(job.image);
        // The caller may already have given up.
        let _ = job.reply.send(result);
    }
}

impl Drop for OcrPool {
    fn drop(&mut self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
