// src/redirector/lifecycle.rs
//
// Session lifecycle shared by the redirector activities.
//
// Idle -> Running -> Stopping -> Stopped, each step taken at most once.
// Alongside the state we track whether the writer loop (which runs on the
// thread that called start) is still inside its loop, so a stop() issued from
// another thread can wait for it.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug)]
struct Inner {
    state: Lifecycle,
    writer_active: bool,
}

#[derive(Debug)]
pub(crate) struct LifecycleCell {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl LifecycleCell {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: Lifecycle::Idle,
                writer_active: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> Lifecycle {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.get() == Lifecycle::Running
    }

    /// Idle -> Running, marking the writer loop as active.
    pub fn begin(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != Lifecycle::Idle {
            return false;
        }
        inner.state = Lifecycle::Running;
        inner.writer_active = true;
        true
    }

    /// Move from `from` to `to`. Returns false if the state was not `from`.
    pub fn transition(&self, from: Lifecycle, to: Lifecycle) -> bool {
        let mut inner = self.lock();
        if inner.state != from {
            return false;
        }
        inner.state = to;
        drop(inner);
        self.changed.notify_all();
        true
    }

    pub fn set(&self, to: Lifecycle) {
        self.lock().state = to;
        self.changed.notify_all();
    }

    pub fn writer_finished(&self) {
        self.lock().writer_active = false;
        self.changed.notify_all();
    }

    pub fn wait_writer_finished(&self) {
        let mut inner = self.lock();
        while inner.writer_active {
            inner = self
                .changed
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn wait_stopped(&self) {
        let mut inner = self.lock();
        while inner.state != Lifecycle::Stopped {
            inner = self
                .changed
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
