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

//! The cooperative job executor.
//!
//! Advances every in-flight render job by at most one state transition per
//! [`JobExecutor::poll`] call. A job walks `Readback -> CountJob -> Done`
//! when its pixels are counted on the CPU, or `Readback -> Done` when the
//! device delivered finished counts. The poll never blocks and never
//! spin-waits; it only drains channels that already completed.
//!
//! Job records are owned exclusively by the executor. Requesters hold a
//! generational [`JobHandle`] good for `is_done` and best-effort `cancel`;
//! a cancelled job still finishes its in-flight async step (the underlying
//! GPU work cannot be revoked) before its callback is suppressed and its
//! resources are released — exactly once either way.

use std::panic::{catch_unwind, AssertUnwindSafe};

use aerovane_core::math::Vec3;
use aerovane_core::Pool;

use crate::counter::count_pixels;
use crate::device::{Readback, RenderDevice};
use crate::raster::PixelGrid;
use crate::resources::prepare_counts;

/// The lifecycle states of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting on the device's async readback primitive.
    Readback,
    /// Waiting on the CPU counting worker.
    CountJob,
    /// Terminal. Resources have been released.
    Done,
}

/// The payload delivered to a job's completion callback.
///
/// The borrow is only valid for the duration of the callback; the record
/// (and its vectors) is recycled for a later job immediately afterwards.
/// Callers copy out whatever they need to retain.
#[derive(Debug, Default)]
pub struct RenderResult {
    /// World-space camera position the view was rendered from.
    pub camera_position: Vec3,
    /// Unit look direction of the view.
    pub forward: Vec3,
    /// World-space area covered by one pixel of this view.
    pub area_per_pixel: f32,
    /// Pixel tally per tag index; slot 0 is the background.
    pub counts: Vec<u32>,
    /// Exposed area per object, `areas[i]` belonging to tag `i + 1`.
    /// Sized exactly to the object count of the submitting batch.
    pub areas: Vec<f32>,
}

/// Completion callback: the result borrow plus the submitter's user data.
///
/// User data rides along explicitly so hot-path callers need not capture.
pub type JobCallback = Box<dyn FnOnce(&RenderResult, u64)>;

/// Bookkeeping hook run on *every* terminal transition, including the
/// cancelled and failed ones whose result callback is suppressed. Batches
/// rely on it to count their jobs down.
pub type FinalizeHook = Box<dyn FnOnce()>;

struct JobRecord {
    state: JobState,
    readback: Option<Readback>,
    counting: Option<flume::Receiver<(Vec<u32>, PixelGrid)>>,
    cancelled: bool,
    callback: Option<JobCallback>,
    finalize: Option<FinalizeHook>,
    user_data: u64,
    object_count: usize,
    result: RenderResult,
}

impl JobRecord {
    fn inert() -> Self {
        Self {
            state: JobState::Done,
            readback: None,
            counting: None,
            cancelled: false,
            callback: None,
            finalize: None,
            user_data: 0,
            object_count: 0,
            result: RenderResult::default(),
        }
    }

    fn recycle(record: &mut Self) {
        record.state = JobState::Done;
        record.readback = None;
        record.counting = None;
        record.cancelled = false;
        record.callback = None;
        record.finalize = None;
        record.user_data = 0;
        record.object_count = 0;
        // The result's vectors keep their capacity for the next job.
        record.result.counts.clear();
        record.result.areas.clear();
    }
}

struct Slot {
    generation: u32,
    record: Option<JobRecord>,
}

/// A generational handle to a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    index: u32,
    generation: u32,
}

/// Per-job parameters captured at submission.
pub struct JobParams {
    /// The device's async readback primitive for this job.
    pub readback: Readback,
    /// Completion callback; suppressed on cancellation or async failure.
    pub callback: Option<JobCallback>,
    /// Hook run on every terminal transition, suppressed or not.
    pub finalize: Option<FinalizeHook>,
    /// Opaque data handed back to the callback.
    pub user_data: u64,
    /// Object count at submission; sizes the result's area list.
    pub object_count: usize,
    /// Camera position of the rendered view.
    pub camera_position: Vec3,
    /// Look direction of the rendered view.
    pub forward: Vec3,
    /// Area of one pixel in this view's projection.
    pub area_per_pixel: f32,
}

/// Owns all in-flight jobs and advances them once per poll.
pub struct JobExecutor {
    slots: Vec<Slot>,
    free: Vec<u32>,
    record_pool: Pool<JobRecord>,
    in_flight: usize,
    completed: u64,
}

impl Default for JobExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl JobExecutor {
    /// Creates an idle executor.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            record_pool: Pool::new(JobRecord::inert, JobRecord::recycle),
            in_flight: 0,
            completed: 0,
        }
    }

    /// Number of jobs currently in flight.
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Total jobs completed (including cancelled and failed ones).
    #[inline]
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Submits a job and returns its handle.
    pub fn submit(&mut self, params: JobParams) -> JobHandle {
        let mut record = self.record_pool.acquire();
        record.state = JobState::Readback;
        record.readback = Some(params.readback);
        record.callback = params.callback;
        record.finalize = params.finalize;
        record.user_data = params.user_data;
        record.object_count = params.object_count;
        record.result.camera_position = params.camera_position;
        record.result.forward = params.forward;
        record.result.area_per_pixel = params.area_per_pixel;

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].record = Some(record);
                index
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(record),
                });
                index
            }
        };
        self.in_flight += 1;

        JobHandle {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// True once the job reached its terminal state (or the handle is stale).
    pub fn is_done(&self, handle: JobHandle) -> bool {
        match self.slots.get(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation => slot
                .record
                .as_ref()
                .map(|r| r.state == JobState::Done)
                .unwrap_or(true),
            _ => true,
        }
    }

    /// Requests cancellation. Best-effort: the in-flight async step still
    /// completes, after which the callback is suppressed and resources are
    /// released normally.
    pub fn cancel(&mut self, handle: JobHandle) {
        if let Some(slot) = self.slots.get_mut(handle.index as usize) {
            if slot.generation == handle.generation {
                if let Some(record) = slot.record.as_mut() {
                    record.cancelled = true;
                }
            }
        }
    }

    /// Advances every in-flight job by at most one state transition.
    ///
    /// Called once per scheduler tick by the evaluator's `update`.
    pub fn poll(&mut self, device: &mut dyn RenderDevice) {
        device.pump();

        for index in 0..self.slots.len() {
            let Some(record) = self.slots[index].record.as_mut() else {
                continue;
            };

            match record.state {
                JobState::Readback => self.poll_readback(index, device),
                JobState::CountJob => self.poll_counting(index, device),
                JobState::Done => {}
            }
        }
    }

    /// Blocks until no jobs remain in flight. Teardown-only: this is the
    /// single opt-in blocking entry point in the pipeline.
    pub fn wait_for_completion(&mut self, device: &mut dyn RenderDevice) {
        let started = std::time::Instant::now();
        while self.in_flight > 0 {
            self.poll(device);
            if self.in_flight == 0 {
                break;
            }
            if started.elapsed() > std::time::Duration::from_secs(10) {
                log::error!(
                    "JobExecutor: wait_for_completion timed out with {} job(s) stuck",
                    self.in_flight
                );
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    // --- Transition Steps ---

    fn poll_readback(&mut self, index: usize, device: &mut dyn RenderDevice) {
        let record = self.slots[index].record.as_mut().expect("checked by poll");
        let outcome = match record.readback.as_ref().expect("readback set in Readback") {
            Readback::Pixels(rx) => match rx.try_recv() {
                Err(flume::TryRecvError::Empty) => return,
                Ok(Ok(grid)) => ReadbackOutcome::Pixels(grid),
                Ok(Err(message)) => ReadbackOutcome::Failed(message),
                Err(flume::TryRecvError::Disconnected) => {
                    ReadbackOutcome::Failed("readback worker lost".into())
                }
            },
            Readback::Counts(rx) => match rx.try_recv() {
                Err(flume::TryRecvError::Empty) => return,
                Ok(Ok(counts)) => ReadbackOutcome::Counts(counts),
                Ok(Err(message)) => ReadbackOutcome::Failed(message),
                Err(flume::TryRecvError::Disconnected) => {
                    ReadbackOutcome::Failed("readback worker lost".into())
                }
            },
        };

        match outcome {
            ReadbackOutcome::Failed(message) => {
                // Async failure: terminate without the callback.
                log::error!("JobExecutor: readback failed, job dropped ({message})");
                self.finish(index, false);
            }
            ReadbackOutcome::Counts(counts) => {
                let fire = !self.slots[index].record.as_ref().unwrap().cancelled;
                let record = self.slots[index].record.as_mut().unwrap();
                record.result.counts.clear();
                record.result.counts.extend_from_slice(&counts);
                self.finish(index, fire);
            }
            ReadbackOutcome::Pixels(grid) => {
                let record = self.slots[index].record.as_mut().unwrap();
                if record.cancelled {
                    device.reclaim_grid(grid);
                    self.finish(index, false);
                    return;
                }

                // Hand the grid and the job's count buffer to a counting
                // worker; both come back through the channel.
                let mut counts = std::mem::take(&mut record.result.counts);
                prepare_counts(&mut counts, record.object_count + 1);
                let (tx, rx) = flume::bounded(1);
                record.counting = Some(rx);
                record.readback = None;
                record.state = JobState::CountJob;

                std::thread::spawn(move || {
                    count_pixels(grid.tags(), &mut counts);
                    let _ = tx.send((counts, grid));
                });
            }
        }
    }

    fn poll_counting(&mut self, index: usize, device: &mut dyn RenderDevice) {
        let record = self.slots[index].record.as_mut().expect("checked by poll");
        let received = record
            .counting
            .as_ref()
            .expect("counting set in CountJob")
            .try_recv();
        match received {
            Err(flume::TryRecvError::Empty) => {}
            Ok((counts, grid)) => {
                device.reclaim_grid(grid);
                let record = self.slots[index].record.as_mut().unwrap();
                record.result.counts = counts;
                let fire = !record.cancelled;
                self.finish(index, fire);
            }
            Err(flume::TryRecvError::Disconnected) => {
                log::error!("JobExecutor: counting worker lost, job dropped");
                self.finish(index, false);
            }
        }
    }

    /// Terminal transition: populate areas, fire the callback (unless
    /// suppressed), and release the record exactly once.
    fn finish(&mut self, index: usize, fire_callback: bool) {
        let slot = &mut self.slots[index];
        let Some(mut record) = slot.record.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index as u32);
        self.in_flight -= 1;
        self.completed += 1;

        record.state = JobState::Done;
        record.readback = None;
        record.counting = None;

        if fire_callback {
            // Swap the whole count array in at once before anyone reads it.
            let result = &mut record.result;
            result.areas.clear();
            result
                .areas
                .resize(record.object_count, 0.0);
            for tag in 1..=record.object_count {
                let count = result.counts.get(tag).copied().unwrap_or(0);
                result.areas[tag - 1] = count as f32 * result.area_per_pixel;
            }

            if let Some(callback) = record.callback.take() {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    callback(&record.result, record.user_data)
                }));
                if outcome.is_err() {
                    log::error!("JobExecutor: completion callback panicked; state unaffected");
                }
            }
        }

        if let Some(finalize) = record.finalize.take() {
            let outcome = catch_unwind(AssertUnwindSafe(finalize));
            if outcome.is_err() {
                log::error!("JobExecutor: finalize hook panicked; state unaffected");
            }
        }

        self.record_pool.release(record);
    }
}

enum ReadbackOutcome {
    Pixels(PixelGrid),
    Counts(Vec<u32>),
    Failed(String),
}

impl std::fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor")
            .field("in_flight", &self.in_flight)
            .field("completed", &self.completed)
            .finish()
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NullDevice;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counts_job(counts: Vec<u32>, callback: Option<JobCallback>) -> JobParams {
        let (tx, rx) = flume::bounded(1);
        tx.send(Ok(counts)).unwrap();
        JobParams {
            readback: Readback::Counts(rx),
            callback,
            finalize: None,
            user_data: 7,
            object_count: 2,
            camera_position: Vec3::ZERO,
            forward: Vec3::Z,
            area_per_pixel: 0.5,
        }
    }

    fn pending_counts_job() -> (flume::Sender<Result<Vec<u32>, String>>, JobParams) {
        let (tx, rx) = flume::bounded(1);
        let params = JobParams {
            readback: Readback::Counts(rx),
            callback: None,
            finalize: None,
            user_data: 0,
            object_count: 1,
            camera_position: Vec3::ZERO,
            forward: Vec3::Z,
            area_per_pixel: 1.0,
        };
        (tx, params)
    }

    #[test]
    fn test_job_completes_with_areas() {
        let mut executor = JobExecutor::new();
        let mut device = NullDevice;

        let fired = Rc::new(Cell::new(false));
        let fired_in_cb = fired.clone();
        let callback: JobCallback = Box::new(move |result, user_data| {
            assert_eq!(user_data, 7);
            assert_eq!(result.areas.len(), 2);
            // Tag 1 counted 10 pixels at 0.5 area each.
            assert_eq!(result.areas[0], 5.0);
            assert_eq!(result.areas[1], 1.0);
            fired_in_cb.set(true);
        });

        let handle = executor.submit(counts_job(vec![0, 10, 2], Some(callback)));
        assert!(!executor.is_done(handle));
        executor.poll(&mut device);
        assert!(executor.is_done(handle));
        assert!(fired.get());
        assert_eq!(executor.in_flight(), 0);
    }

    #[test]
    fn test_pending_job_stays_in_flight_until_readback() {
        let mut executor = JobExecutor::new();
        let mut device = NullDevice;
        let (tx, params) = pending_counts_job();

        let handle = executor.submit(params);
        executor.poll(&mut device);
        executor.poll(&mut device);
        assert!(!executor.is_done(handle));
        assert_eq!(executor.in_flight(), 1);

        tx.send(Ok(vec![0, 3])).unwrap();
        executor.poll(&mut device);
        assert!(executor.is_done(handle));
    }

    #[test]
    fn test_cancel_suppresses_callback_but_releases_once() {
        let mut executor = JobExecutor::new();
        let mut device = NullDevice;
        let (tx, mut params) = pending_counts_job();

        let fired = Rc::new(Cell::new(false));
        let fired_in_cb = fired.clone();
        params.callback = Some(Box::new(move |_, _| fired_in_cb.set(true)));

        let handle = executor.submit(params);
        executor.cancel(handle);
        executor.poll(&mut device);
        // The async step has not finished; the job must still be waiting.
        assert!(!executor.is_done(handle));

        tx.send(Ok(vec![0, 3])).unwrap();
        executor.poll(&mut device);
        assert!(executor.is_done(handle));
        assert!(!fired.get(), "cancelled job must not fire its callback");
        assert_eq!(executor.completed(), 1);

        // Cancelling again through the stale handle is harmless.
        executor.cancel(handle);
    }

    #[test]
    fn test_readback_error_swallowed_without_callback() {
        let mut executor = JobExecutor::new();
        let mut device = NullDevice;
        let (tx, mut params) = pending_counts_job();

        let fired = Rc::new(Cell::new(false));
        let fired_in_cb = fired.clone();
        params.callback = Some(Box::new(move |_, _| fired_in_cb.set(true)));

        let handle = executor.submit(params);
        tx.send(Err("simulated readback failure".into())).unwrap();
        executor.poll(&mut device);

        assert!(executor.is_done(handle));
        assert!(!fired.get());
        assert_eq!(executor.in_flight(), 0);
    }

    #[test]
    fn test_callback_panic_does_not_poison_executor() {
        let mut executor = JobExecutor::new();
        let mut device = NullDevice;

        let panicking: JobCallback = Box::new(|_, _| panic!("callback exploded"));
        executor.submit(counts_job(vec![0, 1, 1], Some(panicking)));

        let fired = Rc::new(Cell::new(false));
        let fired_in_cb = fired.clone();
        let benign: JobCallback = Box::new(move |_, _| fired_in_cb.set(true));
        let second = executor.submit(counts_job(vec![0, 1, 1], Some(benign)));

        executor.poll(&mut device);
        assert!(executor.is_done(second));
        assert!(fired.get(), "later jobs must complete despite the panic");
        assert_eq!(executor.in_flight(), 0);
    }

    #[test]
    fn test_handles_do_not_alias_across_reuse() {
        let mut executor = JobExecutor::new();
        let mut device = NullDevice;

        let first = executor.submit(counts_job(vec![0, 1, 1], None));
        executor.poll(&mut device);
        assert!(executor.is_done(first));

        // The slot is recycled; the old handle must stay terminal.
        let second = executor.submit(counts_job(vec![0, 1, 1], None));
        assert!(executor.is_done(first));
        assert!(!executor.is_done(second));
        executor.poll(&mut device);
        assert!(executor.is_done(second));
    }
}
