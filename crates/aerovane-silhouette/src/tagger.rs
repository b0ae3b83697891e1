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

//! Object tagger: part ↔ tag-index mapping and renderer-set ownership.
//!
//! Every exposure-measured part gets a dense 1-based tag index, stable for
//! the session; the index encodes to the color id the renderer writes per
//! pixel. Index 0 is the background sentinel, so an untouched pixel always
//! decodes to "no object".

use aerovane_core::{PartId, Pool};

use crate::mesh::{MeshStore, RendererId};

/// A 1-based tag index. Zero is reserved for the background.
pub type TagIndex = u32;

/// Assigns tag indices to parts and owns their renderer sets.
pub struct ObjectTagger {
    /// `part.index() -> tag`, 0 meaning "not registered".
    tags_by_part: Vec<TagIndex>,
    /// `tag - 1 -> part`.
    parts_by_tag: Vec<PartId>,
    /// `part.index() -> renderer set`, parallel to `tags_by_part`.
    renderer_sets: Vec<Option<Vec<RendererId>>>,
    set_pool: Pool<Vec<RendererId>>,
    generation: u64,
}

impl Default for ObjectTagger {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectTagger {
    /// Creates an empty tagger.
    pub fn new() -> Self {
        Self {
            tags_by_part: Vec::new(),
            parts_by_tag: Vec::new(),
            renderer_sets: Vec::new(),
            set_pool: Pool::new(Vec::new, Vec::clear),
            generation: 0,
        }
    }

    /// Encodes a tag index as a little-endian RGBA color id.
    #[inline]
    pub fn encode(tag: TagIndex) -> [u8; 4] {
        tag.to_le_bytes()
    }

    /// Decodes a color id back to its tag index.
    #[inline]
    pub fn decode(color: [u8; 4]) -> TagIndex {
        u32::from_le_bytes(color)
    }

    /// Returns the part's tag index, assigning the next free one on first sight.
    pub fn get_or_create_index(&mut self, part: PartId) -> TagIndex {
        if let Some(&tag) = self.tags_by_part.get(part.index()) {
            if tag != 0 {
                return tag;
            }
        }

        if self.tags_by_part.len() <= part.index() {
            self.tags_by_part.resize(part.index() + 1, 0);
            self.renderer_sets.resize_with(part.index() + 1, || None);
        }

        self.parts_by_tag.push(part);
        let tag = self.parts_by_tag.len() as TagIndex;
        self.tags_by_part[part.index()] = tag;
        self.generation += 1;
        tag
    }

    /// Returns the part's tag index, if it has one.
    pub fn index_of(&self, part: PartId) -> Option<TagIndex> {
        match self.tags_by_part.get(part.index()) {
            Some(&tag) if tag != 0 => Some(tag),
            _ => None,
        }
    }

    /// Returns the part owning a tag index.
    pub fn part_of(&self, tag: TagIndex) -> Option<PartId> {
        if tag == 0 {
            return None;
        }
        self.parts_by_tag.get(tag as usize - 1).copied()
    }

    /// Number of registered parts.
    #[inline]
    pub fn object_count(&self) -> usize {
        self.parts_by_tag.len()
    }

    /// Monotonic counter bumped on every mutation; the batch compares it to
    /// decide whether its recorded draw list is stale.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Associates a renderer with `part`, writing the part's encoded tag
    /// into the renderer's per-instance override in `store`.
    pub fn setup_renderer(&mut self, part: PartId, renderer: RendererId, store: &mut MeshStore) {
        let tag = self.get_or_create_index(part);
        store.set_tag(renderer, tag);

        let set = self.renderer_sets[part.index()]
            .get_or_insert_with(|| self.set_pool.acquire());
        if !set.contains(&renderer) {
            set.push(renderer);
            self.generation += 1;
        }
    }

    /// Associates several renderers with `part` at once.
    pub fn setup_renderers(
        &mut self,
        part: PartId,
        renderers: impl IntoIterator<Item = RendererId>,
        store: &mut MeshStore,
    ) {
        for renderer in renderers {
            self.setup_renderer(part, renderer, store);
        }
    }

    /// The renderer set contributing to a part's silhouette.
    pub fn renderers_of(&self, part: PartId) -> &[RendererId] {
        self.renderer_sets
            .get(part.index())
            .and_then(|s| s.as_deref())
            .unwrap_or(&[])
    }

    /// Iterates `(part, tag, renderer)` over every association.
    pub fn iter_renderers(&self) -> impl Iterator<Item = (PartId, TagIndex, RendererId)> + '_ {
        self.parts_by_tag.iter().enumerate().flat_map(move |(i, &part)| {
            let tag = (i + 1) as TagIndex;
            self.renderers_of(part)
                .iter()
                .map(move |&renderer| (part, tag, renderer))
        })
    }

    /// Releases every renderer set back to the pool and clears the map.
    ///
    /// All previously returned indices become invalid. Safe to call twice;
    /// the second call is a no-op on an already-empty map.
    pub fn reset(&mut self) {
        for slot in &mut self.renderer_sets {
            if let Some(set) = slot.take() {
                self.set_pool.release(set);
            }
        }
        self.tags_by_part.clear();
        self.parts_by_tag.clear();
        self.renderer_sets.clear();
        self.generation += 1;
    }
}

impl std::fmt::Debug for ObjectTagger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTagger")
            .field("objects", &self.parts_by_tag.len())
            .field("generation", &self.generation)
            .finish()
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::SurfaceMesh;
    use aerovane_core::math::{Mat4, Vec3};

    #[test]
    fn test_encode_decode_bijective() {
        for tag in 1..=1024u32 {
            assert_eq!(ObjectTagger::decode(ObjectTagger::encode(tag)), tag);
        }
        // The background sentinel decodes to "no object".
        assert_eq!(ObjectTagger::decode([0; 4]), 0);
    }

    #[test]
    fn test_indices_dense_one_based_and_stable() {
        let mut tagger = ObjectTagger::new();
        // Sparse part handles still produce dense tags.
        let a = tagger.get_or_create_index(PartId(10));
        let b = tagger.get_or_create_index(PartId(3));
        let a_again = tagger.get_or_create_index(PartId(10));

        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(a_again, a);
        assert_eq!(tagger.part_of(1), Some(PartId(10)));
        assert_eq!(tagger.part_of(0), None);
        assert_eq!(tagger.object_count(), 2);
    }

    #[test]
    fn test_setup_renderer_writes_tag_override() {
        let mut store = MeshStore::new();
        let mesh = store.add_mesh(SurfaceMesh::cuboid(Vec3::ONE));
        let r0 = store.add_renderer(mesh, Mat4::IDENTITY);
        let r1 = store.add_renderer(mesh, Mat4::IDENTITY);

        let mut tagger = ObjectTagger::new();
        tagger.setup_renderers(PartId(0), [r0, r1], &mut store);

        assert_eq!(tagger.renderers_of(PartId(0)), &[r0, r1]);
        assert_eq!(store.renderer(r0).unwrap().tag, 1);
        assert_eq!(store.renderer(r1).unwrap().tag, 1);

        // Re-registering the same renderer neither duplicates nor re-tags.
        let gen = tagger.generation();
        tagger.setup_renderer(PartId(0), r0, &mut store);
        assert_eq!(tagger.renderers_of(PartId(0)).len(), 2);
        assert_eq!(tagger.generation(), gen);
    }

    #[test]
    fn test_reset_is_idempotent_and_recycles_sets() {
        let mut store = MeshStore::new();
        let mesh = store.add_mesh(SurfaceMesh::cuboid(Vec3::ONE));
        let r0 = store.add_renderer(mesh, Mat4::IDENTITY);

        let mut tagger = ObjectTagger::new();
        tagger.setup_renderer(PartId(0), r0, &mut store);
        assert_eq!(tagger.object_count(), 1);

        tagger.reset();
        assert_eq!(tagger.object_count(), 0);
        assert!(tagger.index_of(PartId(0)).is_none());

        tagger.reset();
        assert_eq!(tagger.object_count(), 0);

        // Indices restart from 1 after a reset.
        assert_eq!(tagger.get_or_create_index(PartId(5)), 1);
    }
}
