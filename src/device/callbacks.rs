//! Listener registration and isolated dispatch
//!
//! Listeners run on the capture thread; one misbehaving listener must not
//! break ingest or starve the listeners registered after it, so every call is
//! wrapped in its own unwind boundary.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::capture::frame::{InputAudioFrame, InputVideoFrame, SynchronizedAudioFrame};

pub type VideoFrameCallback = dyn Fn(&InputVideoFrame) + Send + Sync;
pub type AudioFrameCallback = dyn Fn(&InputAudioFrame) + Send + Sync;
pub type SynchronizedAudioCallback = dyn Fn(&SynchronizedAudioFrame) + Send + Sync;

/// Handle returned by callback registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// An ordered list of subscribers for one event kind.
pub struct CallbackList<F: ?Sized> {
    entries: Mutex<Vec<(CallbackId, Arc<F>)>>,
    next_id: AtomicU64,
}

impl<F: ?Sized> Default for CallbackList<F> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<F: ?Sized> CallbackList<F> {
    pub fn add(&self, callback: Arc<F>) -> CallbackId {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, callback));
        id
    }

    pub fn remove(&self, id: CallbackId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copies out the current subscribers so dispatch runs without the list
    /// lock held and listeners may re-register from inside a callback.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries.lock().iter().map(|(_, cb)| cb.clone()).collect()
    }
}

/// Invokes every subscriber, isolating panics per listener.
pub fn dispatch<F: ?Sized>(label: &'static str, list: &CallbackList<F>, mut call: impl FnMut(&F)) {
    for callback in list.snapshot() {
        if catch_unwind(AssertUnwindSafe(|| call(&*callback))).is_err() {
            error!(listener = label, "listener panicked, continuing with remaining listeners");
        }
    }
}

/// The listener lists owned by an input device.
#[derive(Default)]
pub struct Listeners {
    pub video: CallbackList<VideoFrameCallback>,
    pub audio: CallbackList<AudioFrameCallback>,
    pub synchronized_audio: CallbackList<SynchronizedAudioCallback>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type TestCallback = dyn Fn(&u32) + Send + Sync;

    #[test]
    fn remove_only_affects_the_given_id() {
        let list: CallbackList<TestCallback> = CallbackList::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_a = hits.clone();
        let a = list.add(Arc::new(move |_: &u32| {
            hits_a.fetch_add(1, Ordering::Relaxed);
        }));
        let hits_b = hits.clone();
        let _b = list.add(Arc::new(move |v: &u32| {
            hits_b.fetch_add(*v as usize, Ordering::Relaxed);
        }));

        assert!(list.remove(a));
        assert!(!list.remove(a));

        dispatch("test", &list, |cb| cb(&10));
        assert_eq!(hits.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn panicking_listener_does_not_stop_the_rest() {
        let list: CallbackList<TestCallback> = CallbackList::default();
        let hits = Arc::new(AtomicUsize::new(0));

        list.add(Arc::new(|_: &u32| panic!("listener failure")));
        let hits_b = hits.clone();
        list.add(Arc::new(move |_: &u32| {
            hits_b.fetch_add(1, Ordering::Relaxed);
        }));

        dispatch("test", &list, |cb| cb(&0));
        dispatch("test", &list, |cb| cb(&0));

        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }
}
