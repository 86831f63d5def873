//! Persistence hooks wrapped around every write the core performs.
//!
//! Pool files normally live on persistent memory, where a store is durable
//! only after the cache line is flushed and ordered by a fence. When the
//! core runs against a plain file these hooks have nothing to do, so the
//! default implementation is a no-op. [`TracingHooks`] reports each call
//! for debugging persistence ordering.

use crate::config::InspectConfig;
use tracing::trace;

pub trait PersistHooks {
    fn name(&self) -> &'static str;

    /// Announce that `[offset, offset + len)` is backed by persistent memory.
    fn register_pmem(&self, offset: u64, len: u64);

    fn flush(&self, offset: u64, len: u64);

    fn fence(&self);

    fn commit(&self);

    /// Flush a region and make it durable.
    fn persist(&self, offset: u64, len: u64) {
        self.flush(offset, len);
        self.fence();
        self.commit();
        self.fence();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl PersistHooks for NoopHooks {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn register_pmem(&self, _offset: u64, _len: u64) {}

    fn flush(&self, _offset: u64, _len: u64) {}

    fn fence(&self) {}

    fn commit(&self) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

impl PersistHooks for TracingHooks {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn register_pmem(&self, offset: u64, len: u64) {
        trace!(target: "pmp::instrument", offset, len, "register_pmem");
    }

    fn flush(&self, offset: u64, len: u64) {
        trace!(target: "pmp::instrument", offset, len, "flush");
    }

    fn fence(&self) {
        trace!(target: "pmp::instrument", "fence");
    }

    fn commit(&self) {
        trace!(target: "pmp::instrument", "commit");
    }
}

static NOOP_HOOKS: NoopHooks = NoopHooks;
static TRACING_HOOKS: TracingHooks = TracingHooks;

/// Hooks matching `config`: tracing when instrumentation is on, otherwise
/// no-ops.
#[must_use]
pub fn hooks_for(config: &InspectConfig) -> &'static dyn PersistHooks {
    if config.instrument {
        &TRACING_HOOKS
    } else {
        &NOOP_HOOKS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<String>>);

    impl PersistHooks for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn register_pmem(&self, offset: u64, len: u64) {
            self.0.borrow_mut().push(format!("register {offset}+{len}"));
        }

        fn flush(&self, offset: u64, len: u64) {
            self.0.borrow_mut().push(format!("flush {offset}+{len}"));
        }

        fn fence(&self) {
            self.0.borrow_mut().push("fence".to_owned());
        }

        fn commit(&self) {
            self.0.borrow_mut().push("commit".to_owned());
        }
    }

    #[test]
    fn persist_orders_flush_fence_commit_fence() {
        let hooks = Recorder::default();
        hooks.persist(4088, 8);
        assert_eq!(
            hooks.0.into_inner(),
            ["flush 4088+8", "fence", "commit", "fence"]
        );
    }

    #[test]
    fn selection_follows_config() {
        assert_eq!(hooks_for(&InspectConfig::default()).name(), "noop");
        assert_eq!(
            hooks_for(&InspectConfig::default().with_instrument(true)).name(),
            "tracing"
        );
    }

    #[test]
    fn noop_and_tracing_hooks_are_callable_without_subscriber() {
        for hooks in [&NoopHooks as &dyn PersistHooks, &TracingHooks] {
            hooks.register_pmem(0, 4096);
            hooks.persist(0, 64);
        }
    }
}
