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

//! Error types for the exposed-surface pipeline.

use std::fmt;

/// An error raised at the pipeline's call boundaries.
///
/// Nothing in this module ever reaches a completion callback: async
/// failures inside a running job are swallowed (the job terminates without
/// its callback), and these errors only reject malformed submissions.
#[derive(Debug)]
pub enum RenderError {
    /// `execute` was called on a batch that still has jobs in flight.
    BatchBusy {
        /// Number of jobs still in flight.
        active_jobs: usize,
    },
    /// The request list was empty or every request was degenerate.
    NoValidRequests,
    /// No renderers have been registered, so there is nothing to project.
    EmptyScene,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::BatchBusy { active_jobs } => {
                write!(
                    f,
                    "batch already has {active_jobs} job(s) in flight; one execute per batch at a time"
                )
            }
            RenderError::NoValidRequests => {
                write!(f, "no valid view requests to render")
            }
            RenderError::EmptyScene => {
                write!(f, "no renderers registered; nothing to project")
            }
        }
    }
}

impl std::error::Error for RenderError {}
