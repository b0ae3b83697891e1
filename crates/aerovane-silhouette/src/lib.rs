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

//! Exposed-surface evaluation.
//!
//! Projects a composite assembly onto an orthographic camera plane from
//! arbitrary directions, tags every part with an index color, counts
//! pixels per index and converts the counts to physical areas. Rendering
//! and counting run on a GPU (wgpu render + compute) or entirely on the
//! CPU (software rasterizer + scoped-thread tally); both backends deliver
//! through the same poll-driven asynchronous pipeline.

pub mod batch;
pub mod camera;
pub mod counter;
pub mod device;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod mesh;
pub mod raster;
pub mod resources;
pub mod tagger;

pub use batch::{BatchCallback, RenderBatch, ViewRequest};
pub use camera::{fit_camera, CameraFit};
pub use device::{DeviceKind, RenderDevice};
pub use error::RenderError;
pub use evaluator::{EvaluatorStats, ExposedSurfaceEvaluator};
pub use executor::{JobCallback, JobExecutor, JobHandle, JobState, RenderResult};
pub use mesh::{MeshId, MeshStore, RendererId, SurfaceMesh};
pub use tagger::{ObjectTagger, TagIndex};
