//! Scope-bound ownership of host objects.
//!
//! Particles and vortices own host-side objects (effect anchors, looped
//! effects, map markers) but do not hold a reference to the host between
//! frames.  A [`HostObject`] therefore cannot delete its object directly when
//! dropped.  Instead it pushes a [`Release`] onto a shared [`ReleaseQueue`],
//! and the factory flushes that queue against the host at the end of every
//! tick (and after `remove_all`).  Every exit path that drops the owner
//! (disposal, eviction, a failed build, unwinding out of a panicking update)
//! ends with the object released.

use std::sync::{Arc, Mutex, PoisonError};

use bevy::log::debug;

use crate::host::{EntityHandle, FxHandle, MarkerHandle, WorldHost};

/// A host object waiting to be destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Anchor(EntityHandle),
    Fx(FxHandle),
    Marker(MarkerHandle),
}

/// Handle types that can be queued for release.
pub trait Releasable: Copy {
    fn into_release(self) -> Release;
}

impl Releasable for EntityHandle {
    fn into_release(self) -> Release {
        Release::Anchor(self)
    }
}

impl Releasable for FxHandle {
    fn into_release(self) -> Release {
        Release::Fx(self)
    }
}

impl Releasable for MarkerHandle {
    fn into_release(self) -> Release {
        Release::Marker(self)
    }
}

/// Shared queue of pending releases.  Cloning shares the same queue.
#[derive(Debug, Clone, Default)]
pub struct ReleaseQueue {
    pending: Arc<Mutex<Vec<Release>>>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, release: Release) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(release);
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroys every queued object, effects first so no effect outlives its
    /// anchor.  Returns the number of objects released.
    pub fn flush(&self, world: &mut impl WorldHost) -> usize {
        let mut drained: Vec<Release> = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if drained.is_empty() {
            return 0;
        }
        drained.sort_by_key(|r| match r {
            Release::Fx(_) => 0,
            Release::Marker(_) => 1,
            Release::Anchor(_) => 2,
        });
        for release in &drained {
            match *release {
                Release::Fx(fx) => world.stop_fx(fx),
                Release::Marker(marker) => world.remove_marker(marker),
                Release::Anchor(anchor) => world.delete_anchor(anchor),
            }
        }
        debug!("released {} host objects", drained.len());
        drained.len()
    }
}

/// Owns one host object; queues it for release on drop.
#[derive(Debug)]
pub struct HostObject<T: Releasable> {
    handle: T,
    queue: ReleaseQueue,
}

impl<T: Releasable> HostObject<T> {
    pub fn new(handle: T, queue: &ReleaseQueue) -> Self {
        Self {
            handle,
            queue: queue.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> T {
        self.handle
    }
}

impl<T: Releasable> Drop for HostObject<T> {
    fn drop(&mut self) {
        self.queue.push(self.handle.into_release());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockWorld;
    use bevy::math::Vec3;

    #[test]
    fn dropping_host_object_queues_release() {
        let queue = ReleaseQueue::new();
        {
            let _anchor = HostObject::new(EntityHandle(7), &queue);
            assert!(queue.is_empty());
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn flush_deletes_anchor_and_stops_fx() {
        let mut world = MockWorld::new();
        world.preload_all();
        let queue = ReleaseQueue::new();

        let anchor = world
            .create_anchor("prop", Vec3::ZERO)
            .expect("anchor should be created");
        let fx = world
            .start_looped_fx("core", "smoke", anchor, 1.0)
            .expect("fx should start");

        drop(HostObject::new(anchor, &queue));
        drop(HostObject::new(fx, &queue));

        assert_eq!(queue.flush(&mut world), 2);
        assert!(queue.is_empty());
        assert_eq!(world.anchor_count(), 0);
        assert_eq!(world.fx_count(), 0);
    }

    #[test]
    fn clones_share_the_same_queue() {
        let queue = ReleaseQueue::new();
        let other = queue.clone();
        other.push(Release::Marker(MarkerHandle(1)));
        assert_eq!(queue.len(), 1);
    }
}
