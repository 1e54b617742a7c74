//! Wires the dispatcher to its producers.
//!
//! One [`Dispatcher`] is shared by an optional [`Tailer`] and an optional HTTP
//! ingest listener. Each producer has its own cancellation token: stopping the
//! tailer leaves the listener running and the other way round.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::dispatch::{
    DispatchConfig, DispatchError, DispatchReport, Dispatcher, MessageHandler, MessageSender,
};
use crate::tailer::Tailer;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("ingest server failed: {0}")]
    Server(#[source] io::Error),

    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    #[error("poll interval must be greater than zero")]
    InvalidInterval,
}

struct TailerTask {
    path: PathBuf,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct ServerTask {
    addr: SocketAddr,
    token: CancellationToken,
    handle: JoinHandle<io::Result<()>>,
}

/// A running dispatcher plus whichever producers were attached to it.
pub struct Pipeline {
    dispatcher: Dispatcher,
    tailer: Option<TailerTask>,
    server: Option<ServerTask>,
}

impl Pipeline {
    /// Start the worker pool. Producers are attached afterwards.
    pub fn start(
        config: DispatchConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            dispatcher: Dispatcher::spawn(config, handler)?,
            tailer: None,
            server: None,
        })
    }

    pub fn sender(&self) -> MessageSender {
        self.dispatcher.sender()
    }

    /// Start tailing `path` into the shared queue.
    pub fn tail(&mut self, path: impl Into<PathBuf>, interval: Duration) -> Result<(), PipelineError> {
        if self.tailer.is_some() {
            return Err(PipelineError::AlreadyRunning("tailer"));
        }
        if interval.is_zero() {
            return Err(PipelineError::InvalidInterval);
        }

        let path = path.into();
        let token = CancellationToken::new();
        let handle = Tailer::new(path.clone(), interval).spawn(self.sender(), token.clone());
        self.tailer = Some(TailerTask {
            path,
            token,
            handle,
        });
        Ok(())
    }

    /// Bind the ingest listener on `addr` and start serving.
    ///
    /// Returns the bound address, which differs from `addr` when port 0 was used.
    pub async fn serve(&mut self, addr: &str) -> Result<SocketAddr, PipelineError> {
        if self.server.is_some() {
            return Err(PipelineError::AlreadyRunning("ingest server"));
        }

        let bind_err = |source| PipelineError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let router = api::create_router(AppState::new(self.sender()));
        let token = CancellationToken::new();
        let handle = tokio::spawn(api::serve(listener, router, token.clone()));

        info!("Ingest endpoint listening on http://{}", local_addr);
        self.server = Some(ServerTask {
            addr: local_addr,
            token,
            handle,
        });
        Ok(local_addr)
    }

    /// Stop the tailer only. The listener, if any, keeps serving.
    pub async fn stop_tailing(&mut self) {
        if let Some(tailer) = self.tailer.take() {
            tailer.token.cancel();
            if let Err(e) = tailer.handle.await {
                warn!("tailer for {} ended abnormally: {}", tailer.path.display(), e);
            }
        }
    }

    /// Run until `signal` resolves or the listener dies, then shut everything down.
    pub async fn run_until<F>(mut self, signal: F) -> Result<DispatchReport, PipelineError>
    where
        F: Future<Output = ()>,
    {
        let server_exit = match self.server.as_mut() {
            Some(server) => tokio::select! {
                _ = signal => None,
                joined = &mut server.handle => Some(joined),
            },
            None => {
                signal.await;
                None
            }
        };

        let Some(joined) = server_exit else {
            return self.shutdown().await;
        };

        self.server = None;
        let failure = match joined {
            Ok(Ok(())) => {
                warn!("Ingest server stopped unexpectedly");
                None
            }
            Ok(Err(e)) => Some(PipelineError::Server(e)),
            Err(e) => Some(PipelineError::Server(io::Error::other(e))),
        };
        let report = self.shutdown().await?;
        match failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Stop both producers, then let the workers finish the queue.
    pub async fn shutdown(mut self) -> Result<DispatchReport, PipelineError> {
        let mut result = Ok(());

        if let Some(server) = self.server.take() {
            server.token.cancel();
            match server.handle.await {
                Ok(Ok(())) => info!("Ingest endpoint on {} stopped", server.addr),
                Ok(Err(e)) => {
                    error!("Ingest endpoint on {} failed: {}", server.addr, e);
                    result = Err(PipelineError::Server(e));
                }
                Err(e) => warn!("Ingest endpoint task ended abnormally: {}", e),
            }
        }

        self.stop_tailing().await;

        let report = self.dispatcher.shutdown().await;
        result.map(|()| report)
    }
}
