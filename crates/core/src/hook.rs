//! Bridges an OS termination request into the shared shutdown flag.
//!
//! Installing the hook replaces the default "terminate immediately" action of
//! SIGTERM and SIGINT (Ctrl+C elsewhere). When a signal arrives the hook sets
//! the flag, waits for the main task to finish its teardown and then ends the
//! process itself with status 0.
//!
//! Signals are received on a dedicated thread that drives its own
//! current-thread tokio runtime, so the hook works whether or not the
//! application runs tokio.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use crate::errors::HookError;
use crate::exit::ProcessExit;
use crate::main_task::MainTask;
use crate::state::ShutdownState;

const HOOK_THREAD_NAME: &str = "shutdown-hook";

struct Inner {
    state: Arc<ShutdownState>,
    main: MainTask,
    main_task_timeout: Option<Duration>,
    fired: AtomicBool,
}

/// One-shot termination hook. Clones share the same "fired" state.
#[derive(Clone)]
pub struct TerminationSignalSource {
    inner: Arc<Inner>,
}

impl TerminationSignalSource {
    pub fn new(
        state: Arc<ShutdownState>,
        main: MainTask,
        main_task_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state,
                main,
                main_task_timeout,
                fired: AtomicBool::new(false),
            }),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Handle a termination request.
    ///
    /// Sets the flag and blocks until the main task completes (or the
    /// configured timeout passes). Only the first call does anything; later
    /// calls return `false` immediately.
    pub fn fire(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            debug!("termination hook already fired");
            return false;
        }

        self.inner.state.set_shutdown_requested(true);
        info!("set shutdown flag after termination signal");

        if !self.inner.main.wait(self.inner.main_task_timeout) {
            error!(
                main = self.inner.main.name(),
                "failed to gracefully wait for main task shutdown"
            );
        }
        true
    }

    /// Register the OS signal handlers and start the hook thread.
    ///
    /// Registration happens before this returns, so a signal delivered right
    /// after installation is not lost. The signal runtime is created, used
    /// and dropped on the hook thread only, which keeps `install` safe to
    /// call from inside an async context.
    pub fn install(&self, exit: Arc<dyn ProcessExit>) -> Result<JoinHandle<()>, HookError> {
        let hook = self.clone();
        let handle = spawn_after_setup(
            HOOK_THREAD_NAME,
            SignalListener::start,
            move |(runtime, listener)| hook.run(runtime, listener, exit),
        )?;

        info!("registered termination signal hook");
        Ok(handle)
    }

    fn run(self, runtime: Runtime, mut listener: SignalListener, exit: Arc<dyn ProcessExit>) {
        let Some(signal) = runtime.block_on(listener.recv()) else {
            warn!("termination signal stream closed; hook disabled");
            return;
        };
        info!(signal, "received termination signal");

        if self.fire() {
            exit.exit(0);
        }
    }
}

/// Spawn a named thread that runs `setup` and, if it succeeds, `run`.
///
/// Blocks until `setup` has finished and returns its error, if any. Whatever
/// `setup` creates stays on the new thread.
fn spawn_after_setup<T, S, R>(name: &str, setup: S, run: R) -> Result<JoinHandle<()>, HookError>
where
    S: FnOnce() -> Result<T, HookError> + Send + 'static,
    R: FnOnce(T) + Send + 'static,
{
    let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
    let handle = thread::Builder::new()
        .name(name.into())
        .spawn(move || match setup() {
            Ok(ready) => {
                let _ = ready_tx.send(Ok(()));
                run(ready);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        })
        .map_err(HookError::SpawnFailed)?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => Err(HookError::SetupAborted),
    }
}

fn signal_runtime() -> Result<Runtime, HookError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(HookError::RuntimeFailed)
}

#[cfg(unix)]
struct SignalListener {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    /// Build the signal runtime and register both handlers with it.
    fn start() -> Result<(Runtime, Self), HookError> {
        let runtime = signal_runtime()?;
        let listener = {
            let _enter = runtime.enter();
            Self::register()?
        };
        Ok((runtime, listener))
    }

    /// Must be called inside a runtime context.
    fn register() -> Result<Self, HookError> {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = signal(SignalKind::terminate()).map_err(|source| {
            HookError::SignalRegistration {
                signal: "SIGTERM",
                source,
            }
        })?;
        let sigint = signal(SignalKind::interrupt()).map_err(|source| {
            HookError::SignalRegistration {
                signal: "SIGINT",
                source,
            }
        })?;
        Ok(Self { sigterm, sigint })
    }

    async fn recv(&mut self) -> Option<&'static str> {
        tokio::select! {
            received = self.sigterm.recv() => received.map(|()| "SIGTERM"),
            received = self.sigint.recv() => received.map(|()| "SIGINT"),
        }
    }
}

#[cfg(not(unix))]
struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    fn start() -> Result<(Runtime, Self), HookError> {
        Ok((signal_runtime()?, Self))
    }

    async fn recv(&mut self) -> Option<&'static str> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some("Ctrl+C"),
            Err(e) => {
                error!(error = %e, "failed to listen for Ctrl+C");
                None
            }
        }
    }
}
