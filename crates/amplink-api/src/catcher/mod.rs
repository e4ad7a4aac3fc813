// Push-notification listener
//
// Devices deliver subscribed events by POSTing one JSON envelope per
// connection to the callback URL registered at subscribe time. The
// listener accepts connections on one task and hands them to a fixed pool
// of workers through a shared queue. Anything that fails the TLS
// handshake, HTTP framing or JSON parsing is logged and dropped; the
// listener itself never stops because of a bad connection.
//
// Workers finish in no particular order, so consumers must order events
// by their sequence numbers, not by delivery order.

pub mod http;
pub mod tls;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;

pub use tls::CatcherTls;

const BROADCAST_CAPACITY: usize = 1024;

/// Default size of the worker pool.
pub const DEFAULT_WORKERS: usize = 10;

// ── Configuration ────────────────────────────────────────────────────

/// Listener settings.
#[derive(Debug, Clone)]
pub struct CatcherConfig {
    /// Socket address to bind.
    pub bind: SocketAddr,
    /// Externally reachable URL registered with devices. Derived from the
    /// bound address when unset.
    pub callback_url: Option<Url>,
    /// Number of worker tasks draining the connection queue.
    pub workers: usize,
    /// When set, connections must complete a mutually authenticated TLS
    /// handshake before anything is read.
    pub tls: Option<CatcherTls>,
    pub max_body_bytes: usize,
    /// Bound on handshake plus request read, per connection.
    pub read_timeout: Duration,
}

impl Default for CatcherConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5555)),
            callback_url: None,
            workers: DEFAULT_WORKERS,
            tls: None,
            max_body_bytes: 1024 * 1024,
            read_timeout: Duration::from_secs(10),
        }
    }
}

// ── Notification ─────────────────────────────────────────────────────

/// One accepted, parsed envelope. The body is not interpreted here.
#[derive(Debug, Clone)]
pub struct Notification {
    pub peer: SocketAddr,
    pub received_at: DateTime<Utc>,
    /// Position in accept order, starting at 1. For acknowledgement
    /// bookkeeping only.
    pub arrival: u64,
    pub body: serde_json::Value,
}

// ── Listener ─────────────────────────────────────────────────────────

struct Accepted {
    stream: TcpStream,
    peer: SocketAddr,
    arrival: u64,
}

/// Settings and channels shared by every worker.
struct Shared {
    acceptor: Option<TlsAcceptor>,
    events: broadcast::Sender<Arc<Notification>>,
    max_body_bytes: usize,
    read_timeout: Duration,
}

struct Running {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Passive listener for device push notifications.
///
/// Construct with [`new`](Self::new), then [`start`](Self::start).
/// [`stop`](Self::stop) stops accepting, drains the workers and releases
/// the listening socket before returning.
pub struct NotificationCatcher {
    config: CatcherConfig,
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl NotificationCatcher {
    /// Validate the configuration and load TLS material. Does not bind.
    pub fn new(config: CatcherConfig) -> Result<Self, Error> {
        if config.workers == 0 {
            return Err(Error::Listener("worker pool size must be at least 1".into()));
        }
        let acceptor = config.tls.as_ref().map(CatcherTls::acceptor).transpose()?;
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        let shared = Arc::new(Shared {
            acceptor,
            events,
            max_body_bytes: config.max_body_bytes,
            read_timeout: config.read_timeout,
        });
        Ok(Self {
            config,
            shared,
            running: Mutex::new(None),
        })
    }

    /// Bind the listening socket and spawn the accept loop and workers.
    ///
    /// Returns the bound address (useful when binding port 0).
    pub async fn start(&self) -> Result<SocketAddr, Error> {
        if self.is_running() {
            return Err(Error::Listener("already running".into()));
        }

        let listener = TcpListener::bind(self.config.bind).await?;
        let local_addr = listener.local_addr()?;
        let cancel = CancellationToken::new();

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));

        let mut tasks = Vec::with_capacity(self.config.workers + 1);
        tasks.push(tokio::spawn(accept_loop(listener, queue_tx, cancel.clone())));
        for id in 0..self.config.workers {
            tasks.push(tokio::spawn(worker_loop(
                id,
                Arc::clone(&queue_rx),
                Arc::clone(&self.shared),
                cancel.clone(),
            )));
        }

        info!(
            %local_addr,
            workers = self.config.workers,
            tls = self.shared.acceptor.is_some(),
            "notification listener started"
        );

        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            // Lost a start race; discard this instance.
            cancel.cancel();
            return Err(Error::Listener("already running".into()));
        }
        *running = Some(Running {
            local_addr,
            cancel,
            tasks,
        });
        Ok(local_addr)
    }

    /// Stop accepting, wait for workers to finish, release the socket.
    ///
    /// A no-op when not running.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return;
        };

        running.cancel.cancel();
        for task in running.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "listener task ended abnormally");
            }
        }
        info!(local_addr = %running.local_addr, "notification listener stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.local_addr)
    }

    /// URL to register with devices at subscribe time.
    ///
    /// The configured URL wins. Otherwise it is derived from the bound
    /// address, which only works when that address is routable.
    pub fn callback_url(&self) -> Result<Url, Error> {
        if let Some(url) = &self.config.callback_url {
            return Ok(url.clone());
        }
        let addr = self
            .local_addr()
            .unwrap_or(self.config.bind);
        if addr.ip().is_unspecified() || addr.port() == 0 {
            return Err(Error::Listener(format!(
                "no callback_url configured and {addr} is not an advertisable address"
            )));
        }
        let scheme = if self.shared.acceptor.is_some() {
            "https"
        } else {
            "http"
        };
        Ok(Url::parse(&format!("{scheme}://{addr}/"))?)
    }

    /// Subscribe to accepted notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Notification>> {
        self.shared.events.subscribe()
    }
}

async fn accept_loop(
    listener: TcpListener,
    queue: mpsc::UnboundedSender<Accepted>,
    cancel: CancellationToken,
) {
    let arrivals = AtomicU64::new(0);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let arrival = arrivals.fetch_add(1, Ordering::Relaxed) + 1;
                    trace!(%peer, arrival, "connection accepted");
                    if queue.send(Accepted { stream, peer, arrival }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            },
        }
    }
    debug!("accept loop exited");
}

async fn worker_loop(
    id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Accepted>>>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                item = rx.recv() => item,
            }
        };
        let Some(accepted) = next else {
            break;
        };
        shared.handle(accepted).await;
    }
    trace!(worker = id, "worker exited");
}

impl Shared {
    async fn handle(&self, accepted: Accepted) {
        let Accepted {
            stream,
            peer,
            arrival,
        } = accepted;

        match &self.acceptor {
            Some(acceptor) => {
                match tokio::time::timeout(self.read_timeout, acceptor.accept(stream)).await {
                    Ok(Ok(tls)) => self.serve(tls, peer, arrival).await,
                    Ok(Err(e)) => {
                        warn!(%peer, arrival, error = %e, "TLS handshake failed, dropping connection");
                    }
                    Err(_) => {
                        warn!(%peer, arrival, "TLS handshake timed out, dropping connection");
                    }
                }
            }
            None => self.serve(stream, peer, arrival).await,
        }
    }

    async fn serve<S>(&self, mut stream: S, peer: SocketAddr, arrival: u64)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request =
            match http::read_request(&mut stream, self.max_body_bytes, self.read_timeout).await {
                Ok(request) => request,
                Err(e) => {
                    warn!(%peer, arrival, error = %e, "unreadable request, dropping connection");
                    let _ = http::respond(&mut stream, 400, "Bad Request").await;
                    return;
                }
            };

        if request.method != "POST" {
            warn!(%peer, arrival, method = %request.method, "unexpected method, dropping connection");
            let _ = http::respond(&mut stream, 405, "Method Not Allowed").await;
            return;
        }

        let body: serde_json::Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(e) => {
                warn!(%peer, arrival, error = %e, "unparseable notification body, discarding");
                let _ = http::respond(&mut stream, 400, "Bad Request").await;
                return;
            }
        };

        // Acknowledge first; an unacknowledged delivery faults the
        // subscription on the device side.
        if let Err(e) = http::respond(&mut stream, 200, "OK").await {
            warn!(%peer, arrival, error = %e, "acknowledgement write failed");
        }

        let notification = Arc::new(Notification {
            peer,
            received_at: Utc::now(),
            arrival,
            body,
        });
        if self.events.send(notification).is_err() {
            trace!(arrival, "no notification subscribers");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn local_config() -> CatcherConfig {
        CatcherConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            workers: 2,
            ..CatcherConfig::default()
        }
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = CatcherConfig {
            workers: 0,
            ..local_config()
        };
        assert!(matches!(
            NotificationCatcher::new(config),
            Err(Error::Listener(_))
        ));
    }

    #[test]
    fn callback_url_prefers_configured_value() {
        let config = CatcherConfig {
            callback_url: Some(Url::parse("https://mgr.example.com:5555/").unwrap()),
            ..local_config()
        };
        let catcher = NotificationCatcher::new(config).unwrap();
        assert_eq!(
            catcher.callback_url().unwrap().as_str(),
            "https://mgr.example.com:5555/"
        );
    }

    #[test]
    fn unspecified_bind_cannot_be_advertised() {
        let catcher = NotificationCatcher::new(CatcherConfig::default()).unwrap();
        assert!(catcher.callback_url().is_err());
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let catcher = NotificationCatcher::new(local_config()).unwrap();
        catcher.start().await.unwrap();
        assert!(matches!(catcher.start().await, Err(Error::Listener(_))));
        catcher.stop().await;
        assert!(!catcher.is_running());
    }
}
