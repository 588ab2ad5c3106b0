//! Runtime abstraction layer for async operations
//!
//! Provides a runtime-agnostic spawner so the sync controller can run its
//! network futures on Tokio natively or on the browser event loop under
//! WASM. Completions travel back to the engine over channels; nothing here
//! blocks the caller.

use crate::prelude::{Future, Pin};

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(
        &self,
        future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    ) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task
    fn cancel(&self);
}

/// Convenience function for spawning with type safety
pub fn spawn<F>(future: F) -> Box<dyn AsyncHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    runtime().spawn_boxed(Box::pin(future))
}

/// Default spawner implementations
pub mod spawners {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    pub mod tokio_impl {
        use super::*;
        use ::tokio::task::JoinHandle;

        /// Tokio-based async spawner
        pub struct TokioSpawner;

        impl AsyncSpawner for TokioSpawner {
            fn spawn_boxed(
                &self,
                future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
            ) -> Box<dyn AsyncHandle> {
                let handle = ::tokio::spawn(future);
                Box::new(TokioHandle(handle))
            }
        }

        struct TokioHandle(JoinHandle<()>);

        impl AsyncHandle for TokioHandle {
            fn is_finished(&self) -> bool {
                self.0.is_finished()
            }

            fn cancel(&self) {
                self.0.abort();
            }
        }
    }

    #[cfg(feature = "wasm")]
    pub mod wasm {
        use super::*;
        use std::sync::{Arc, Mutex};

        /// WASM-compatible async spawner
        pub struct WasmSpawner;

        impl AsyncSpawner for WasmSpawner {
            fn spawn_boxed(
                &self,
                future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
            ) -> Box<dyn AsyncHandle> {
                wasm_bindgen_futures::spawn_local(future);
                Box::new(WasmHandle {
                    finished: Arc::new(Mutex::new(false)),
                })
            }
        }

        struct WasmHandle {
            finished: Arc<Mutex<bool>>,
        }

        impl AsyncHandle for WasmHandle {
            fn is_finished(&self) -> bool {
                self.finished.lock().map(|f| *f).unwrap_or(true)
            }

            fn cancel(&self) {
                // WASM tasks can't be cancelled, just mark as finished;
                // stale completions are dropped by the engine's generation
                // check instead.
                if let Ok(mut finished) = self.finished.lock() {
                    *finished = true;
                }
            }
        }
    }
}

/// Global runtime instance
static RUNTIME: std::sync::OnceLock<Box<dyn AsyncSpawner>> = std::sync::OnceLock::new();

/// Initialize the runtime with a specific spawner
pub fn init_runtime(spawner: Box<dyn AsyncSpawner>) {
    let _ = RUNTIME.set(spawner);
}

/// Get the global runtime spawner
pub fn runtime() -> &'static dyn AsyncSpawner {
    RUNTIME
        .get_or_init(|| {
            #[cfg(feature = "tokio-runtime")]
            {
                Box::new(spawners::tokio_impl::TokioSpawner)
            }

            #[cfg(all(feature = "wasm", not(feature = "tokio-runtime")))]
            {
                Box::new(spawners::wasm::WasmSpawner)
            }

            #[cfg(not(any(feature = "tokio-runtime", feature = "wasm")))]
            {
                panic!("No async runtime available. Enable 'tokio-runtime' or 'wasm' feature.");
            }
        })
        .as_ref()
}
