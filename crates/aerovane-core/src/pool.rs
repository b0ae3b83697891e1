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

//! A free-list object pool.
//!
//! Both renderer-set collections in the tagger and job records in the
//! executor are reused across frames to avoid allocation churn. The pool
//! hands out whole values; callers return them through [`Pool::release`],
//! which resets the value before it re-enters the free list.

/// A free-list pool of reusable values.
pub struct Pool<T> {
    free: Vec<T>,
    factory: fn() -> T,
    reset: fn(&mut T),
}

impl<T> Pool<T> {
    /// Creates a pool with a `factory` for cold acquires and a `reset`
    /// applied to every released value.
    pub fn new(factory: fn() -> T, reset: fn(&mut T)) -> Self {
        Self {
            free: Vec::new(),
            factory,
            reset,
        }
    }

    /// Takes a value from the free list, or builds a fresh one.
    pub fn acquire(&mut self) -> T {
        self.free.pop().unwrap_or_else(self.factory)
    }

    /// Resets `value` and returns it to the free list.
    pub fn release(&mut self, mut value: T) {
        (self.reset)(&mut value);
        self.free.push(value);
    }

    /// Number of values currently sitting in the free list.
    #[inline]
    pub fn idle(&self) -> usize {
        self.free.len()
    }
}

impl<T> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("idle", &self.free.len()).finish()
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_reuses_released_values() {
        let mut pool: Pool<Vec<u32>> = Pool::new(Vec::new, Vec::clear);

        let mut v = pool.acquire();
        v.extend([1, 2, 3]);
        let cap = v.capacity();
        pool.release(v);
        assert_eq!(pool.idle(), 1);

        // The recycled vector comes back cleared but with its capacity kept.
        let v = pool.acquire();
        assert!(v.is_empty());
        assert_eq!(v.capacity(), cap);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_cold_acquire_uses_factory() {
        let mut pool: Pool<Vec<u32>> = Pool::new(Vec::new, Vec::clear);
        assert_eq!(pool.idle(), 0);
        assert!(pool.acquire().is_empty());
    }
}
