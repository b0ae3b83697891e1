// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Render batch: one "project all requested view directions" operation.
//!
//! A batch fits a camera per direction, submits one job per direction to
//! the executor, and fires its own completion callback exactly once after
//! every constituent job finished. The recorded draw list is rebuilt only
//! when the tagged object set (or the target size) changed; unchanged
//! batches reuse it and only the per-view matrices move.
//!
//! One batch instance handles one execute at a time; the evaluator pools
//! instances for concurrent batches.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use aerovane_core::math::{Aabb, Mat4, Vec3};

use crate::camera::fit_camera;
use crate::device::RenderDevice;
use crate::error::RenderError;
use crate::executor::{FinalizeHook, JobCallback, JobExecutor, JobHandle, JobParams};
use crate::mesh::{DrawList, MeshStore};
use crate::tagger::ObjectTagger;

/// One requested view direction.
pub struct ViewRequest {
    /// Direction to look at the assembly from (world space; any length).
    pub look_dir: Vec3,
    /// Per-direction completion callback.
    pub callback: Option<JobCallback>,
    /// Opaque data handed to `callback`.
    pub user_data: u64,
}

/// Callback fired once when every direction of a batch completed.
pub type BatchCallback = Box<dyn FnOnce(u64)>;

/// Orchestrates one multi-direction render over the current object set.
pub struct RenderBatch {
    draws: DrawList,
    target_size: (u32, u32),
    active: Rc<Cell<usize>>,
}

impl RenderBatch {
    /// Creates an idle batch.
    pub fn new() -> Self {
        Self {
            draws: DrawList::default(),
            target_size: (0, 0),
            active: Rc::new(Cell::new(0)),
        }
    }

    /// Jobs of this batch still in flight.
    #[inline]
    pub fn active_jobs(&self) -> usize {
        self.active.get()
    }

    /// Submits one job per valid view direction.
    ///
    /// Rejected wholesale (logged, no-op) when the batch is mid-flight or
    /// nothing can be rendered; individual degenerate directions are
    /// dropped with a logged error and do not fail the rest.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &mut self,
        tagger: &ObjectTagger,
        store: &MeshStore,
        executor: &mut JobExecutor,
        device: &mut dyn RenderDevice,
        target_size: (u32, u32),
        requests: Vec<ViewRequest>,
        bounds: Aabb,
        world_transform: Mat4,
        on_completed: Option<BatchCallback>,
        user_data: u64,
    ) -> Result<Vec<JobHandle>, RenderError> {
        if self.active.get() > 0 {
            let err = RenderError::BatchBusy {
                active_jobs: self.active.get(),
            };
            log::error!("RenderBatch: {err}");
            return Err(err);
        }

        // Lazy re-record: only when the object set or target size moved.
        if self.draws.generation != tagger.generation() || self.target_size != target_size {
            self.draws.rebuild(tagger, store);
            self.target_size = target_size;
        }
        if self.draws.commands.is_empty() {
            log::error!("RenderBatch: {}", RenderError::EmptyScene);
            return Err(RenderError::EmptyScene);
        }

        let corners = bounds.transformed_corners(&world_transform);
        let object_count = tagger.object_count();
        let (width, height) = target_size;

        // Fit all cameras first so the job count is known before any
        // submission; a degenerate direction only costs its own slot.
        let mut accepted = Vec::new();
        for request in requests {
            match fit_camera(&corners, request.look_dir) {
                Some(fit) => accepted.push((request, fit)),
                None => {
                    log::error!(
                        "RenderBatch: degenerate look direction {:?} dropped",
                        request.look_dir
                    );
                }
            }
        }
        if accepted.is_empty() {
            log::error!("RenderBatch: {}", RenderError::NoValidRequests);
            return Err(RenderError::NoValidRequests);
        }

        self.active.set(accepted.len());
        let batch_done: Rc<RefCell<Option<BatchCallback>>> = Rc::new(RefCell::new(on_completed));

        let mut handles = Vec::with_capacity(accepted.len());
        for (request, fit) in accepted {
            let readback = device.render_view(
                &self.draws,
                &world_transform,
                &fit,
                width,
                height,
                object_count + 1,
            );

            // The finalize hook runs on every terminal transition — also
            // for cancelled or failed directions whose result callback is
            // suppressed — so the batch count always reaches zero and the
            // batch callback fires exactly once.
            let active = Rc::clone(&self.active);
            let batch_done = Rc::clone(&batch_done);
            let finalize: FinalizeHook = Box::new(move || {
                finish_one(&active, &batch_done, user_data);
            });

            handles.push(executor.submit(JobParams {
                readback,
                callback: request.callback,
                finalize: Some(finalize),
                user_data: request.user_data,
                object_count,
                camera_position: fit.position,
                forward: fit.forward,
                area_per_pixel: fit.area_per_pixel(width, height),
            }));
        }

        Ok(handles)
    }
}

impl Default for RenderBatch {
    fn default() -> Self {
        Self::new()
    }
}

fn finish_one(active: &Cell<usize>, batch_done: &RefCell<Option<BatchCallback>>, user_data: u64) {
    let remaining = active.get().saturating_sub(1);
    active.set(remaining);
    if remaining == 0 {
        if let Some(callback) = batch_done.borrow_mut().take() {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(user_data)));
            if outcome.is_err() {
                log::error!("RenderBatch: batch completion callback panicked");
            }
        }
    }
}

impl std::fmt::Debug for RenderBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderBatch")
            .field("active_jobs", &self.active.get())
            .field("draws", &self.draws.commands.len())
            .finish()
    }
}
