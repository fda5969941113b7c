//! Interrupt sources and the listener that latches them.

use crate::errors::SupervisorError;
use async_trait::async_trait;
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Why the supervisor was asked to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptReason {
    /// SIGINT (Ctrl-C).
    Sigint,
    /// SIGTERM.
    Sigterm,
    /// A programmatic request.
    Requested(String),
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sigint => write!(f, "SIGINT"),
            Self::Sigterm => write!(f, "SIGTERM"),
            Self::Requested(reason) => write!(f, "{reason}"),
        }
    }
}

/// Something that can deliver an interrupt request.
///
/// `interrupted` must be cancel-safe: it is raced against stage completion
/// and dropped whenever the stage finishes first.
#[async_trait]
pub trait InterruptSource: Send {
    /// Resolves when the next interrupt arrives.
    async fn interrupted(&mut self) -> InterruptReason;
}

/// Interrupts delivered by the operating system.
///
/// On unix both SIGINT and SIGTERM are handled; elsewhere only Ctrl-C.
#[cfg(unix)]
#[derive(Debug)]
pub struct SignalInterrupt {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalInterrupt {
    /// Installs the signal handlers.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn install() -> Result<Self, SupervisorError> {
        use tokio::signal::unix::{signal, SignalKind};

        let sigint = signal(SignalKind::interrupt()).map_err(SupervisorError::Interrupt)?;
        let sigterm = signal(SignalKind::terminate()).map_err(SupervisorError::Interrupt)?;
        debug!("Installed SIGINT and SIGTERM handlers");
        Ok(Self { sigint, sigterm })
    }
}

#[cfg(unix)]
#[async_trait]
impl InterruptSource for SignalInterrupt {
    async fn interrupted(&mut self) -> InterruptReason {
        tokio::select! {
            _ = self.sigint.recv() => InterruptReason::Sigint,
            _ = self.sigterm.recv() => InterruptReason::Sigterm,
        }
    }
}

/// Interrupts delivered by the operating system (Ctrl-C only).
#[cfg(not(unix))]
#[derive(Debug, Default)]
pub struct SignalInterrupt;

#[cfg(not(unix))]
impl SignalInterrupt {
    /// Creates the Ctrl-C listener.
    pub fn install() -> Result<Self, SupervisorError> {
        Ok(Self)
    }
}

#[cfg(not(unix))]
#[async_trait]
impl InterruptSource for SignalInterrupt {
    async fn interrupted(&mut self) -> InterruptReason {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl-C listener failed");
            std::future::pending::<()>().await;
        }
        InterruptReason::Sigint
    }
}

/// An interrupt source triggered through an [`InterruptHandle`].
#[derive(Debug)]
pub struct ManualInterrupt {
    rx: watch::Receiver<Option<InterruptReason>>,
}

/// Triggers a [`ManualInterrupt`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: Arc<watch::Sender<Option<InterruptReason>>>,
}

impl ManualInterrupt {
    /// Creates a source and the handle that triggers it.
    #[must_use]
    pub fn new() -> (Self, InterruptHandle) {
        let (tx, rx) = watch::channel(None);
        (Self { rx }, InterruptHandle { tx: Arc::new(tx) })
    }
}

impl InterruptHandle {
    /// Requests an interrupt.
    ///
    /// Only the first reason is kept. Returns true if this call was the one
    /// that triggered the interrupt.
    pub fn trigger(&self, reason: impl Into<String>) -> bool {
        let reason = InterruptReason::Requested(reason.into());
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    /// Returns whether an interrupt has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

#[async_trait]
impl InterruptSource for ManualInterrupt {
    async fn interrupted(&mut self) -> InterruptReason {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                // every handle is gone; nothing can trigger us any more
                let current = self.rx.borrow().clone();
                if let Some(reason) = current {
                    return reason;
                }
                std::future::pending::<()>().await;
            }
        }
    }
}

/// The supervisor's single interrupt listener.
///
/// The first interrupt is latched: once received, every later `wait` or
/// `check` reports it again, so an interrupt that lands between stages is
/// not lost.
pub struct InterruptListener {
    source: Box<dyn InterruptSource>,
    received: Option<InterruptReason>,
}

impl InterruptListener {
    /// Wraps an interrupt source.
    pub fn new(source: impl InterruptSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            received: None,
        }
    }

    /// Listens for SIGINT and SIGTERM.
    pub fn signals() -> Result<Self, SupervisorError> {
        Ok(Self::new(SignalInterrupt::install()?))
    }

    /// Creates a listener driven by an [`InterruptHandle`].
    #[must_use]
    pub fn manual() -> (Self, InterruptHandle) {
        let (source, handle) = ManualInterrupt::new();
        (Self::new(source), handle)
    }

    /// Waits for an interrupt. Cancel-safe.
    pub async fn wait(&mut self) -> InterruptReason {
        if let Some(reason) = &self.received {
            return reason.clone();
        }
        let reason = self.source.interrupted().await;
        debug!(reason = %reason, "Interrupt received");
        self.received = Some(reason.clone());
        reason
    }

    /// Returns the interrupt reason if one has arrived, without waiting.
    pub fn check(&mut self) -> Option<InterruptReason> {
        self.wait().now_or_never()
    }

    /// Returns the latched reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&InterruptReason> {
        self.received.as_ref()
    }
}

impl fmt::Debug for InterruptListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptListener")
            .field("received", &self.received)
            .finish_non_exhaustive()
    }
}
