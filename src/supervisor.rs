//! Runs N identical accept workers on one shared listening socket.
//!
//! Every worker serves a clone of the same stateless router. A worker that
//! exits while the supervisor is not shutting down is restarted on a fresh
//! clone of the listener.

use std::any::Any;
use std::future::Future;
use std::io;
use std::net::TcpListener;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use axum::Router;
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const RESTART_DELAY: Duration = Duration::from_millis(500);
const GRACE_PERIOD: Duration = Duration::from_secs(10);

pub struct Supervisor {
    workers: usize,
    restart_delay: Duration,
    grace_period: Duration,
}

impl Supervisor {
    pub fn new(workers: usize) -> Self {
        Supervisor {
            workers: workers.max(1),
            restart_delay: RESTART_DELAY,
            grace_period: GRACE_PERIOD,
        }
    }

    pub fn with_restart_delay(mut self, restart_delay: Duration) -> Self {
        self.restart_delay = restart_delay;
        self
    }

    /// How long in-flight connections may keep draining after shutdown is
    /// requested before the workers are aborted.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Serves `app` on `listener` until `shutdown` is cancelled and every
    /// worker has drained, or the grace period has run out.
    ///
    /// Only fails if the listener cannot be cloned or registered with the
    /// runtime; individual worker failures are logged and restarted.
    ///
    /// Connections still open when the grace period ends are no longer
    /// tracked by any worker; they end when the runtime shuts down.
    pub async fn run(self, listener: TcpListener, app: Router, shutdown: CancellationToken) -> io::Result<()> {
        self.run_with(listener, shutdown, move |listener, shutdown| {
            let app = app.clone();
            async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown.cancelled_owned())
                    .await
            }
        })
        .await
    }

    /// Like [`Supervisor::run`], with `serve` standing in for one worker's
    /// accept loop.
    pub(crate) async fn run_with<F, Fut>(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
        serve: F,
    ) -> io::Result<()>
    where
        F: Fn(tokio::net::TcpListener, CancellationToken) -> Fut,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        listener.set_nonblocking(true)?;

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            spawn_worker(&mut workers, id, &listener, &serve, &shutdown)?;
        }

        loop {
            let joined = tokio::select! {
                joined = workers.join_next() => joined,
                _ = shutdown.cancelled() => break,
            };

            let (id, outcome) = match joined {
                Some(Ok(exit)) => exit,
                Some(Err(e)) => {
                    tracing::error!(error = %e, "worker task failed");
                    continue;
                }
                None => break,
            };
            log_exit(id, &outcome);
            if shutdown.is_cancelled() {
                break;
            }

            tracing::warn!(worker = id, delay = ?self.restart_delay, "restarting worker");
            tokio::select! {
                _ = tokio::time::sleep(self.restart_delay) => {}
                _ = shutdown.cancelled() => break,
            }
            spawn_worker(&mut workers, id, &listener, &serve, &shutdown)?;
        }

        self.drain(&mut workers).await;
        Ok(())
    }

    async fn drain(&self, workers: &mut JoinSet<WorkerExit>) {
        tracing::info!(workers = workers.len(), "draining workers");

        let drained = tokio::time::timeout(self.grace_period, async {
            while let Some(joined) = workers.join_next().await {
                if let Ok((id, outcome)) = joined {
                    log_exit(id, &outcome);
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                workers = workers.len(),
                grace = ?self.grace_period,
                "grace period elapsed, aborting workers"
            );
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        tracing::info!("all workers stopped");
    }
}

type WorkerExit = (usize, Result<io::Result<()>, Box<dyn Any + Send>>);

fn spawn_worker<F, Fut>(
    workers: &mut JoinSet<WorkerExit>,
    id: usize,
    listener: &TcpListener,
    serve: &F,
    shutdown: &CancellationToken,
) -> io::Result<()>
where
    F: Fn(tokio::net::TcpListener, CancellationToken) -> Fut,
    Fut: Future<Output = io::Result<()>> + Send + 'static,
{
    let listener = tokio::net::TcpListener::from_std(listener.try_clone()?)?;
    let addr = listener.local_addr()?;
    let worker = serve(listener, shutdown.clone());

    // a panic is caught here so the exit can still be attributed to `id`
    workers.spawn(async move { (id, AssertUnwindSafe(worker).catch_unwind().await) });

    tracing::info!(worker = id, "worker is online");
    tracing::info!(worker = id, %addr, "worker is listening");
    Ok(())
}

fn log_exit(id: usize, outcome: &Result<io::Result<()>, Box<dyn Any + Send>>) {
    match outcome {
        Ok(Ok(())) => tracing::info!(worker = id, "worker exited"),
        Ok(Err(e)) => tracing::warn!(worker = id, error = %e, "worker died"),
        Err(_) => tracing::warn!(worker = id, "worker panicked"),
    }
}
