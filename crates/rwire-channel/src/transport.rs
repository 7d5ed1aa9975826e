//! Process-wide transport lifetime.
//!
//! Library state shared by all channels is held behind an explicit
//! reference-counted handle instead of ambient globals: every channel
//! constructor takes a [`TransportHandle`], and the last handle dropped
//! tears the transport back down. Nested initializations must agree on the
//! locking options.

use std::sync::Mutex;

use tracing::debug;

use crate::error::{ChannelError, Result};

/// Options fixed at first initialization for the whole process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Serialize channel creation and teardown across all threads.
    pub global_locking: bool,
}

struct TransportState {
    refs: usize,
    options: InitOptions,
}

static STATE: Mutex<TransportState> = Mutex::new(TransportState {
    refs: 0,
    options: InitOptions {
        global_locking: false,
    },
});

/// Serializes channel creation/teardown when global locking is on. Never
/// held across I/O.
static CREATE_LOCK: Mutex<()> = Mutex::new(());

/// Proof of an initialized transport. Clone to share; the count drops to
/// zero only when every handle is gone.
#[derive(Debug)]
pub struct TransportHandle {
    options: InitOptions,
}

pub struct Transport;

impl Transport {
    /// Initialize the process-wide transport, or join an existing
    /// initialization. Joining with different options is an error.
    pub fn initialize(options: InitOptions) -> Result<TransportHandle> {
        let mut state = lock(&STATE);
        if state.refs > 0 && state.options != options {
            return Err(ChannelError::Config(format!(
                "transport already initialized with {:?}",
                state.options
            )));
        }
        if state.refs == 0 {
            state.options = options;
            debug!(?options, "transport initialized");
        }
        state.refs += 1;
        Ok(TransportHandle { options })
    }

    /// The options of the live initialization, if any.
    pub fn current_options() -> Result<InitOptions> {
        let state = lock(&STATE);
        if state.refs == 0 {
            return Err(ChannelError::NotInitialized);
        }
        Ok(state.options)
    }
}

impl TransportHandle {
    pub fn global_locking(&self) -> bool {
        self.options.global_locking
    }

    /// Run a channel creation/teardown section under the global lock when
    /// configured, or unguarded otherwise.
    pub(crate) fn with_create_lock<T>(&self, f: impl FnOnce() -> T) -> T {
        if self.options.global_locking {
            let _guard = lock(&CREATE_LOCK);
            f()
        } else {
            f()
        }
    }
}

impl Clone for TransportHandle {
    fn clone(&self) -> Self {
        let mut state = lock(&STATE);
        state.refs += 1;
        Self {
            options: self.options,
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        let mut state = lock(&STATE);
        state.refs -= 1;
        if state.refs == 0 {
            debug!("transport uninitialized");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    // the zero-reference lifecycle is exercised in its own integration
    // test binary; unit tests here share the process with other suites
    // that hold live handles
    #[test]
    fn joining_an_initialization_shares_options() {
        let first = Transport::initialize(InitOptions::default()).unwrap();
        let second = Transport::initialize(InitOptions::default()).unwrap();
        let third = first.clone();

        assert_eq!(
            Transport::current_options().unwrap(),
            InitOptions::default()
        );
        assert!(!third.global_locking());

        // joining with conflicting options is refused while handles live
        let conflicting = InitOptions {
            global_locking: true,
        };
        assert!(matches!(
            Transport::initialize(conflicting),
            Err(ChannelError::Config(_))
        ));

        drop(second);
        drop(third);
        assert!(Transport::current_options().is_ok());
    }
}
