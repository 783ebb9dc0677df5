//! TCP fan-out: a fixed pool of workers, each owning one decoder per client

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::decoder::Decoder;
use crate::error::{DecoderError, Result};
use crate::protocol::Session;

/// Listening socket plus the worker pool that serves it
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
}

impl Server {
    /// Bind the listener. Port 0 picks a free port.
    pub fn bind(config: &ServerConfig, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((config.bind_address.as_str(), port))?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            config: config.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve clients until every worker has stopped.
    ///
    /// The first decoder of every worker is built here, so a decoder that
    /// cannot be created aborts before any connection is accepted. After
    /// each session a worker builds a fresh decoder before accepting again.
    pub fn serve<D, F>(self, factory: F) -> Result<()>
    where
        D: Decoder + Send + 'static,
        F: Fn() -> std::result::Result<D, DecoderError> + Send + Sync + 'static,
    {
        let mut decoders = Vec::with_capacity(self.config.workers);
        for _ in 0..self.config.workers {
            decoders.push(factory()?);
        }

        let factory = Arc::new(factory);
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(decoders.len());
        for (id, decoder) in decoders.into_iter().enumerate() {
            let worker = Worker {
                id,
                listener: self.listener.try_clone()?,
                max_frame: self.config.max_frame,
                factory: Arc::clone(&factory),
            };
            let handle = thread::Builder::new()
                .name(format!("session-worker-{}", id))
                .spawn(move || worker.run(decoder))?;
            handles.push(handle);
        }

        info!("Serving with {} workers", handles.len());
        for handle in handles {
            if handle.join().is_err() {
                error!("Session worker panicked");
            }
        }

        warn!("All session workers stopped");
        Ok(())
    }
}

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(50);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(2);

/// Pause after `failures` consecutive accept errors: doubling from 50ms,
/// capped at 2s
fn accept_backoff(failures: u32) -> Duration {
    let factor = 1u32 << failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_BASE
        .saturating_mul(factor)
        .min(ACCEPT_BACKOFF_MAX)
}

struct Worker<F> {
    id: usize,
    listener: TcpListener,
    max_frame: usize,
    factory: Arc<F>,
}

impl<F> Worker<F> {
    fn run<D>(self, first: D)
    where
        D: Decoder,
        F: Fn() -> std::result::Result<D, DecoderError>,
    {
        let mut next = Some(first);
        let mut accept_failures = 0u32;

        loop {
            let decoder = match next.take() {
                Some(decoder) => decoder,
                None => match (self.factory)() {
                    Ok(decoder) => decoder,
                    Err(e) => {
                        error!("Worker {}: unable to allocate decoder: {}", self.id, e);
                        return;
                    }
                },
            };

            debug!("Worker {} waiting on connection", self.id);
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) => {
                    accept_failures = accept_failures.saturating_add(1);
                    let pause = accept_backoff(accept_failures);
                    warn!(
                        "Worker {}: accept failed: {} (retrying in {:?})",
                        self.id, e, pause
                    );
                    thread::sleep(pause);
                    next = Some(decoder);
                    continue;
                }
            };
            accept_failures = 0;
            info!("Worker {} accepted connection from {}", self.id, peer);

            let session = Session::new(stream, decoder, self.max_frame).with_peer(peer.to_string());
            if let Err(e) = session.run() {
                warn!("Session with {} terminated: {}", peer, e);
            }
        }
    }
}
