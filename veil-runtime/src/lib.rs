//! Process-wide Tokio runtime plus the shutdown signal shared by the server,
//! the health probe and background sweepers.

use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct VeilHandle {
    inner: Handle,
    shutdown: CancellationToken,
}

pub struct VeilRuntime {
    runtime: Runtime,
    shutdown: CancellationToken,
}

impl VeilRuntime {
    /// Build the multi-threaded runtime every session and engine task runs on.
    ///
    /// ```
    /// use veil_runtime::VeilRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = VeilRuntime::build("veil-doctest", Some(1)).expect("runtime builds");
    /// assert_eq!(runtime.block_on(async { 2 + 2 }), 4);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn build(thread_name: &str, worker_threads: Option<usize>) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(thread_name);
        if let Some(workers) = worker_threads {
            builder.worker_threads(workers.max(1));
        }
        let runtime = builder.build().context("failed to build tokio runtime")?;
        Ok(Self {
            runtime,
            shutdown: CancellationToken::new(),
        })
    }

    /// Handle for spawning tasks and observing shutdown.
    ///
    /// ```
    /// use veil_runtime::VeilRuntime;
    ///
    /// let runtime = VeilRuntime::build("veil-handle", Some(1)).unwrap();
    /// assert!(!runtime.handle().shutdown_requested());
    /// ```
    pub fn handle(&self) -> VeilHandle {
        VeilHandle {
            inner: self.runtime.handle().clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Signal shutdown, then give in-flight tasks `graceful` to finish.
    pub fn shutdown(self, graceful: Duration) {
        self.shutdown.cancel();
        self.runtime.shutdown_timeout(graceful);
    }
}

impl VeilHandle {
    /// Spawn a future onto the shared runtime.
    ///
    /// ```
    /// use veil_runtime::VeilRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = VeilRuntime::build("veil-spawn", Some(1)).unwrap();
    /// let task = runtime.handle().spawn(async { 21 * 2 });
    /// assert_eq!(runtime.block_on(async move { task.await.unwrap() }), 42);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.spawn(fut)
    }

    /// Token cancelled once shutdown has been requested.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Request shutdown without tearing the runtime down.
    ///
    /// ```
    /// use veil_runtime::VeilRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = VeilRuntime::build("veil-cancel", Some(1)).unwrap();
    /// let handle = runtime.handle();
    /// handle.request_shutdown();
    /// assert!(handle.shutdown_token().is_cancelled());
    /// runtime.shutdown(Duration::from_millis(5));
    /// ```
    pub fn request_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("runtime.shutdown.requested");
            self.shutdown.cancel();
        }
    }

    /// Resolve on Ctrl-C or an explicit [`request_shutdown`](Self::request_shutdown).
    pub async fn wait_for_shutdown(&self) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => self.request_shutdown(),
                Err(err) => {
                    tracing::warn!(error = %err, "runtime.signal.failed");
                    self.shutdown.cancelled().await;
                }
            },
        }
    }
}
