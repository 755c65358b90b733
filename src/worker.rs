//! Background filter pipeline — run heavy pure filters off the control
//! thread.
//!
//! A job captures an immutable snapshot of the layer it operates on and the
//! layer's generation counter at that moment. The filter runs on the rayon
//! pool and never touches shared state; its result comes back over an mpsc
//! channel and the owner of the [`crate::document::Document`] decides
//! whether it still applies (see
//! [`crate::document::Document::commit_filter_result`]). There is no
//! cancellation: a superseded job finishes and its stale result is dropped
//! at commit time.

use image::RgbaImage;
use std::sync::mpsc;

/// Result delivered from a background filter job.
pub struct FilterResult {
    /// Index of the layer that was processed.
    pub layer_index: usize,
    /// The layer's generation counter at snapshot time. A mismatch at
    /// commit time means the layer changed under the job.
    pub generation: u64,
    /// The snapshot the filter ran on (becomes the undo patch).
    pub original: RgbaImage,
    /// The processed pixels.
    pub result: RgbaImage,
    /// Human-readable label for the history entry.
    pub description: String,
}

/// Owner-side handle: spawns jobs, counts them, and drains completions.
pub struct FilterPipeline {
    sender: mpsc::Sender<FilterResult>,
    receiver: mpsc::Receiver<FilterResult>,
    pending: usize,
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterPipeline {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver, pending: 0 }
    }

    /// Number of jobs spawned but not yet drained.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Run `filter_fn` against `snapshot` on the rayon pool.
    ///
    /// A panicking filter is contained: the original snapshot is sent back
    /// as the result, so the job degrades to a no-op instead of poisoning
    /// the pipeline.
    pub fn spawn_job(
        &mut self,
        description: String,
        layer_index: usize,
        generation: u64,
        snapshot: RgbaImage,
        filter_fn: impl FnOnce(&RgbaImage) -> RgbaImage + Send + 'static,
    ) {
        let sender = self.sender.clone();
        self.pending += 1;
        rayon::spawn(move || {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                filter_fn(&snapshot)
            }));
            match outcome {
                Ok(result) => {
                    let _ = sender.send(FilterResult {
                        layer_index,
                        generation,
                        original: snapshot,
                        result,
                        description,
                    });
                }
                Err(panic_info) => {
                    let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic payload".to_string()
                    };
                    crate::log_err!("filter '{}' panicked: {}", description, msg);
                    let _ = sender.send(FilterResult {
                        layer_index,
                        generation,
                        original: snapshot.clone(),
                        result: snapshot,
                        description,
                    });
                }
            }
        });
    }

    /// Drain one completed job without blocking. The control loop calls
    /// this each tick.
    pub fn try_recv(&mut self) -> Option<FilterResult> {
        match self.receiver.try_recv() {
            Ok(result) => {
                self.pending = self.pending.saturating_sub(1);
                Some(result)
            }
            Err(_) => None,
        }
    }

    /// Block until the next job completes. Used by headless batch callers;
    /// returns `None` only if every sender is gone, which cannot happen
    /// while `self` holds one.
    pub fn recv(&mut self) -> Option<FilterResult> {
        match self.receiver.recv() {
            Ok(result) => {
                self.pending = self.pending.saturating_sub(1);
                Some(result)
            }
            Err(_) => None,
        }
    }
}
