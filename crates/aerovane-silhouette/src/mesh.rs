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

//! Render-primitive storage.
//!
//! A part's silhouette is the union of its renderers. Each renderer pairs a
//! (possibly shared) triangle mesh with a vessel-local transform and the tag
//! written per renderer by the object tagger — the per-renderer override
//! keeps shared mesh data untouched, the same way a material property block
//! overrides a shared material.

use std::sync::Arc;

use aerovane_core::math::{Aabb, Mat4, Vec3};

/// An immutable triangle mesh.
#[derive(Debug, Clone, Default)]
pub struct SurfaceMesh {
    /// Vertex positions in mesh space.
    pub vertices: Vec<Vec3>,
    /// Triangle list, three indices per triangle.
    pub indices: Vec<u32>,
}

impl SurfaceMesh {
    /// Builds a closed box mesh, a common collider/part approximation.
    pub fn cuboid(half_extents: Vec3) -> Self {
        let he = half_extents;
        let vertices = Aabb::from_center_half_extents(Vec3::ZERO, he)
            .corners()
            .to_vec();
        // Two triangles per face, indexing the Aabb corner order.
        let indices = vec![
            0, 2, 1, 0, 3, 2, // -Z
            4, 5, 6, 4, 6, 7, // +Z
            0, 1, 5, 0, 5, 4, // -Y
            3, 6, 2, 3, 7, 6, // +Y
            0, 4, 7, 0, 7, 3, // -X
            1, 2, 6, 1, 6, 5, // +X
        ];
        Self { vertices, indices }
    }

    /// The mesh-space bounding box, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(&self.vertices)
    }
}

/// A handle to a mesh registered in a [`MeshStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(u32);

/// A handle to one renderer (mesh instance) in a [`MeshStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererId(pub(crate) u32);

#[derive(Debug)]
pub(crate) struct RendererRecord {
    pub mesh: MeshId,
    /// Vessel-local transform of this renderer.
    pub transform: Mat4,
    /// Tag written by the object tagger; 0 until the renderer is tagged.
    pub tag: u32,
}

/// Owns meshes and renderer records for one vessel.
#[derive(Debug, Default)]
pub struct MeshStore {
    meshes: Vec<Arc<SurfaceMesh>>,
    renderers: Vec<RendererRecord>,
}

impl MeshStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mesh and returns its handle.
    pub fn add_mesh(&mut self, mesh: SurfaceMesh) -> MeshId {
        let id = MeshId(self.meshes.len() as u32);
        self.meshes.push(Arc::new(mesh));
        id
    }

    /// Creates a renderer instancing `mesh` at `transform` (vessel-local).
    pub fn add_renderer(&mut self, mesh: MeshId, transform: Mat4) -> RendererId {
        let id = RendererId(self.renderers.len() as u32);
        self.renderers.push(RendererRecord {
            mesh,
            transform,
            tag: 0,
        });
        id
    }

    /// Updates a renderer's vessel-local transform (part moved or re-attached).
    pub fn set_transform(&mut self, renderer: RendererId, transform: Mat4) {
        if let Some(record) = self.renderers.get_mut(renderer.0 as usize) {
            record.transform = transform;
        } else {
            log::warn!("MeshStore: set_transform on unknown renderer {renderer:?}");
        }
    }

    /// Number of renderers in the store.
    #[inline]
    pub fn renderer_count(&self) -> usize {
        self.renderers.len()
    }

    pub(crate) fn set_tag(&mut self, renderer: RendererId, tag: u32) {
        if let Some(record) = self.renderers.get_mut(renderer.0 as usize) {
            record.tag = tag;
        } else {
            log::warn!("MeshStore: set_tag on unknown renderer {renderer:?}");
        }
    }

    pub(crate) fn renderer(&self, renderer: RendererId) -> Option<&RendererRecord> {
        self.renderers.get(renderer.0 as usize)
    }

    pub(crate) fn mesh(&self, mesh: MeshId) -> &Arc<SurfaceMesh> {
        &self.meshes[mesh.0 as usize]
    }

    /// Vessel-local bounds of the given renderers.
    pub fn bounds_of(&self, renderers: impl IntoIterator<Item = RendererId>) -> Aabb {
        let mut bounds = Aabb::INVALID;
        for id in renderers {
            let Some(record) = self.renderers.get(id.0 as usize) else {
                continue;
            };
            let Some(mesh_bounds) = self.meshes[record.mesh.0 as usize].bounds() else {
                continue;
            };
            let corners = mesh_bounds.transformed_corners(&record.transform);
            if let Some(local) = Aabb::from_points(&corners) {
                bounds = bounds.merge(&local);
            }
        }
        bounds
    }
}

// --- Draw List ---

/// One renderer flattened for drawing: mesh, vessel-local transform, tag.
#[derive(Debug, Clone)]
pub struct DrawCommand {
    /// Shared mesh data.
    pub mesh: Arc<SurfaceMesh>,
    /// Vessel-local transform of the renderer.
    pub transform: Mat4,
    /// The renderer's tag color, written per covered pixel.
    pub tag: u32,
}

/// The flattened draw list a batch records from the tagger and store.
///
/// Rebuilt only when the tagger's generation moved; per-view matrices are
/// supplied separately at draw time, so an unchanged list is reused as-is.
#[derive(Debug, Clone, Default)]
pub struct DrawList {
    /// Commands in tag order.
    pub commands: Vec<DrawCommand>,
    /// Tagger generation this list was recorded against.
    pub generation: u64,
}

impl DrawList {
    /// Re-records the list from the current tagger/store state.
    pub fn rebuild(&mut self, tagger: &crate::tagger::ObjectTagger, store: &MeshStore) {
        self.commands.clear();
        for (_, tag, renderer) in tagger.iter_renderers() {
            let Some(record) = store.renderer(renderer) else {
                log::warn!("DrawList: tagged renderer {renderer:?} missing from store");
                continue;
            };
            self.commands.push(DrawCommand {
                mesh: store.mesh(record.mesh).clone(),
                transform: record.transform,
                tag,
            });
        }
        self.generation = tagger.generation();
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuboid_mesh_shape() {
        let mesh = SurfaceMesh::cuboid(Vec3::ONE * 0.5);
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.indices.len(), 36);
        let bounds = mesh.bounds().unwrap();
        assert_eq!(bounds.min, Vec3::ONE * -0.5);
        assert_eq!(bounds.max, Vec3::ONE * 0.5);
    }

    #[test]
    fn test_bounds_of_transformed_renderers() {
        let mut store = MeshStore::new();
        let mesh = store.add_mesh(SurfaceMesh::cuboid(Vec3::ONE * 0.5));
        let a = store.add_renderer(mesh, Mat4::IDENTITY);
        let b = store.add_renderer(mesh, Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)));

        let bounds = store.bounds_of([a, b]);
        assert_eq!(bounds.min, Vec3::new(-0.5, -0.5, -0.5));
        assert_eq!(bounds.max, Vec3::new(2.5, 0.5, 0.5));
    }
}
