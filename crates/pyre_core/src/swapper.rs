//! # Pipeline Swapper
//!
//! Renderer pipeline rebuilds run on one background worker so the
//! simulation frame never waits on pipeline compilation.
//!
//! ```text
//!  main thread                          worker "pyre-pipeline-rebuild"
//!  ───────────                          ──────────────────────────────
//!  submit_rebuild ──► jobs channel ───► factory.build()
//!                                            │
//!  poll_and_swap  ◄── bounded(1) reply ◄─────┘
//!     │
//!     ├─► active[effect] = new
//!     └─► old destroyed at frame + frames_in_flight
//! ```
//!
//! Only the main thread touches the active/pending/retired tables. The
//! worker owns nothing but the factory reference.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use pyre_shared::RendererConfig;

use crate::device::{PipelineFactory, PipelineHandle};
use crate::error::{VfxError, VfxResult};

/// Worker thread name.
pub const WORKER_THREAD_NAME: &str = "pyre-pipeline-rebuild";

type Completion = VfxResult<PipelineHandle>;

struct RebuildJob {
    effect_id: u32,
    renderer: RendererConfig,
    reply: Sender<Completion>,
}

/// A pipeline waiting for in-flight frames to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DeferredDestroy {
    destroy_at_frame: u64,
    pipeline: PipelineHandle,
}

/// Background rebuilds with deferred destruction of replaced pipelines.
pub struct PipelineSwapper {
    factory: Arc<dyn PipelineFactory>,
    frames_in_flight: u64,
    jobs: Option<Sender<RebuildJob>>,
    worker: Option<JoinHandle<()>>,
    pending: HashMap<u32, Receiver<Completion>>,
    /// Superseded or forgotten rebuilds that may still complete.
    orphans: Vec<Receiver<Completion>>,
    active: HashMap<u32, PipelineHandle>,
    retired: Vec<DeferredDestroy>,
}

impl std::fmt::Debug for PipelineSwapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSwapper")
            .field("frames_in_flight", &self.frames_in_flight)
            .field("pending", &self.pending.len())
            .field("orphans", &self.orphans.len())
            .field("active", &self.active)
            .field("retired", &self.retired.len())
            .finish_non_exhaustive()
    }
}

impl PipelineSwapper {
    /// Starts the worker.
    ///
    /// # Errors
    ///
    /// Returns [`VfxError::InvalidArgument`] if `frames_in_flight` is zero,
    /// or [`VfxError::WorkerUnavailable`] if the thread cannot be started.
    pub fn new(factory: Arc<dyn PipelineFactory>, frames_in_flight: u32) -> VfxResult<Self> {
        if frames_in_flight == 0 {
            return Err(VfxError::invalid_argument(
                "frames_in_flight",
                "must be greater than zero",
            ));
        }

        let (jobs_tx, jobs_rx) = unbounded::<RebuildJob>();
        let worker_factory = Arc::clone(&factory);
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || Self::worker_loop(&*worker_factory, &jobs_rx))
            .map_err(|e| {
                tracing::warn!("Failed to start pipeline rebuild worker: {}", e);
                VfxError::WorkerUnavailable
            })?;
        tracing::info!("Pipeline rebuild worker started");

        Ok(Self {
            factory,
            frames_in_flight: u64::from(frames_in_flight),
            jobs: Some(jobs_tx),
            worker: Some(worker),
            pending: HashMap::new(),
            orphans: Vec::new(),
            active: HashMap::new(),
            retired: Vec::new(),
        })
    }

    /// Worker main loop. Exits when the job sender is dropped.
    fn worker_loop(factory: &dyn PipelineFactory, jobs: &Receiver<RebuildJob>) {
        for job in jobs {
            let result = factory.build(&job.renderer);
            if let Err(e) = &result {
                tracing::warn!("Pipeline rebuild for effect {} failed: {}", job.effect_id, e);
            }
            // Receiver gone: superseded or forgotten. Nobody will ever swap it in.
            if let Err(unsent) = job.reply.send(result) {
                if let Ok(pipeline) = unsent.into_inner() {
                    factory.destroy(pipeline);
                }
            }
        }
        tracing::info!("Pipeline rebuild worker stopped");
    }

    /// Queues a rebuild, superseding any pending one for the effect.
    ///
    /// # Errors
    ///
    /// Returns [`VfxError::WorkerUnavailable`] if the worker has stopped.
    pub fn submit_rebuild(&mut self, effect_id: u32, renderer: RendererConfig) -> VfxResult<()> {
        let jobs = self.jobs.as_ref().ok_or(VfxError::WorkerUnavailable)?;
        let (reply, receiver) = bounded(1);
        jobs.send(RebuildJob {
            effect_id,
            renderer,
            reply,
        })
        .map_err(|_| VfxError::WorkerUnavailable)?;

        if let Some(superseded) = self.pending.insert(effect_id, receiver) {
            tracing::debug!("Rebuild for effect {} superseded", effect_id);
            self.orphans.push(superseded);
        }
        Ok(())
    }

    /// Destroys orphaned rebuilds that have finished.
    fn reap_orphans(&mut self) {
        let factory = &self.factory;
        self.orphans.retain(|receiver| match receiver.try_recv() {
            Ok(Ok(pipeline)) => {
                factory.destroy(pipeline);
                false
            }
            Ok(Err(_)) | Err(TryRecvError::Disconnected) => false,
            Err(TryRecvError::Empty) => true,
        });
    }

    fn retire(&mut self, pipeline: PipelineHandle, frame_index: u64) {
        self.retired.push(DeferredDestroy {
            destroy_at_frame: frame_index + self.frames_in_flight,
            pipeline,
        });
    }

    /// Destroys retired pipelines whose deadline has passed and finished
    /// orphaned rebuilds. Independent of any effect.
    pub fn destroy_due(&mut self, frame_index: u64) {
        let factory = &self.factory;
        self.retired.retain(|d| {
            if d.destroy_at_frame <= frame_index {
                factory.destroy(d.pipeline);
                false
            } else {
                true
            }
        });
        self.reap_orphans();
    }

    /// Swaps in a finished rebuild for `effect_id` and runs deferred
    /// destroys that are due. Never blocks.
    ///
    /// Returns the new pipeline if one was swapped in this call.
    pub fn poll_and_swap(&mut self, effect_id: u32, frame_index: u64) -> Option<PipelineHandle> {
        self.destroy_due(frame_index);

        let result = match self.pending.get(&effect_id)?.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                self.pending.remove(&effect_id);
                return None;
            }
        };
        self.pending.remove(&effect_id);

        let pipeline = result.ok()?;
        if let Some(old) = self.active.insert(effect_id, pipeline) {
            self.retire(old, frame_index);
        }
        tracing::debug!("Effect {} swapped to pipeline {:?}", effect_id, pipeline);
        Some(pipeline)
    }

    /// Current pipeline for `effect_id`, if a rebuild ever completed.
    #[must_use]
    pub fn active_pipeline(&self, effect_id: u32) -> Option<PipelineHandle> {
        self.active.get(&effect_id).copied()
    }

    /// Drops the effect's pending rebuild and schedules its active
    /// pipeline for destruction.
    pub fn forget(&mut self, effect_id: u32, frame_index: u64) {
        if let Some(pending) = self.pending.remove(&effect_id) {
            self.orphans.push(pending);
        }
        if let Some(active) = self.active.remove(&effect_id) {
            self.retire(active, frame_index);
        }
    }

    /// Rebuilds not yet swapped in.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Replaced pipelines still awaiting destruction.
    #[must_use]
    pub fn deferred_destroy_count(&self) -> usize {
        self.retired.len()
    }

    /// Whether `effect_id` has a rebuild in flight.
    #[must_use]
    pub fn has_pending(&self, effect_id: u32) -> bool {
        self.pending.contains_key(&effect_id)
    }
}

impl Drop for PipelineSwapper {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        let pending: Vec<_> = self.pending.drain().map(|(_, receiver)| receiver).collect();
        self.orphans.extend(pending);
        self.reap_orphans();
        for (_, pipeline) in self.active.drain() {
            self.factory.destroy(pipeline);
        }
        for deferred in self.retired.drain(..) {
            self.factory.destroy(deferred.pipeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessPipelineFactory;
    use pyre_shared::BlendMode;
    use std::time::{Duration, Instant};

    fn renderer() -> RendererConfig {
        RendererConfig::billboard(BlendMode::Additive)
    }

    /// Polls until the effect's rebuild lands.
    fn wait_swap(swapper: &mut PipelineSwapper, effect_id: u32, frame: u64) -> PipelineHandle {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(p) = swapper.poll_and_swap(effect_id, frame) {
                return p;
            }
            assert!(Instant::now() < deadline, "rebuild never completed");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_zero_frames_in_flight_rejected() {
        let factory = Arc::new(HeadlessPipelineFactory::new());
        assert!(PipelineSwapper::new(factory, 0).is_err());
    }

    #[test]
    fn test_old_pipeline_destroyed_after_frames_in_flight() {
        let factory = Arc::new(HeadlessPipelineFactory::new());
        let mut swapper = PipelineSwapper::new(factory.clone(), 3).expect("swapper");

        swapper.submit_rebuild(7, renderer()).expect("submit");
        let first = wait_swap(&mut swapper, 7, 10);
        assert_eq!(swapper.active_pipeline(7), Some(first));

        swapper.submit_rebuild(7, renderer()).expect("submit");
        let second = wait_swap(&mut swapper, 7, 20);
        assert_ne!(first, second);
        assert_eq!(swapper.deferred_destroy_count(), 1);

        swapper.poll_and_swap(7, 22);
        assert_eq!(factory.destroyed(), 0);
        swapper.poll_and_swap(7, 23);
        assert_eq!(factory.destroyed(), 1);
        assert_eq!(swapper.active_pipeline(7), Some(second));
    }

    #[test]
    fn test_drop_destroys_everything() {
        let factory = Arc::new(HeadlessPipelineFactory::new());
        {
            let mut swapper = PipelineSwapper::new(factory.clone(), 2).expect("swapper");
            swapper.submit_rebuild(1, renderer()).expect("submit");
            wait_swap(&mut swapper, 1, 0);
            swapper.submit_rebuild(2, renderer()).expect("submit");
        }
        assert_eq!(factory.built(), 2);
        assert_eq!(factory.destroyed(), 2);
    }

    #[test]
    fn test_forget_defers_active_destroy() {
        let factory = Arc::new(HeadlessPipelineFactory::new());
        let mut swapper = PipelineSwapper::new(factory.clone(), 3).expect("swapper");
        swapper.submit_rebuild(4, renderer()).expect("submit");
        wait_swap(&mut swapper, 4, 0);

        swapper.forget(4, 5);
        assert_eq!(swapper.active_pipeline(4), None);
        assert_eq!(factory.destroyed(), 0);
        swapper.poll_and_swap(4, 8);
        assert_eq!(factory.destroyed(), 1);
    }

    #[test]
    fn test_destroy_due_without_polling_any_effect() {
        let factory = Arc::new(HeadlessPipelineFactory::new());
        let mut swapper = PipelineSwapper::new(factory.clone(), 2).expect("swapper");
        swapper.submit_rebuild(9, renderer()).expect("submit");
        wait_swap(&mut swapper, 9, 0);

        swapper.forget(9, 1);
        swapper.destroy_due(2);
        assert_eq!(factory.destroyed(), 0);
        swapper.destroy_due(3);
        assert_eq!(factory.destroyed(), 1);
        assert_eq!(swapper.deferred_destroy_count(), 0);
    }
}
