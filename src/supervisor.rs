// ===============================
// src/supervisor.rs (stream supervisor: CONNECTING <-> STREAMING)
// ===============================
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::backoff::{RetryConfig, RetryPolicy};
use crate::gateway::{EventStream, GatewayError};
use crate::metrics::{STREAM_CONNECTED, STREAM_RESTARTS};
use crate::mirror::{Mirror, MirrorError};

/// The only ways out of the supervisor besides shutdown.
#[derive(Debug, Error)]
pub enum Fatal {
    #[error("initial login to destination failed: {0}")]
    InitialLogin(#[source] GatewayError),
    #[error("lost destination session mid-stream: {0}")]
    SessionLost(#[source] GatewayError),
}

impl Fatal {
    pub fn exit_code(&self) -> i32 {
        match self {
            Fatal::InitialLogin(_) => 1,
            Fatal::SessionLost(_) => 2,
        }
    }
}

#[derive(Debug, Error)]
enum ConnectError {
    #[error("destination login: {0}")]
    Login(#[source] GatewayError),
    #[error("source stream subscribe: {0}")]
    Subscribe(#[source] GatewayError),
    #[error("initial reconciliation: {0}")]
    Reconcile(#[source] GatewayError),
}

enum StreamExit {
    Ended,
    Shutdown,
}

/// Resolves once `true` has been sent. A dropped sender never stops us.
pub async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Login, subscribe, reconcile. Order matters: subscribing before the
/// reconciliation means fills that land during the pass are buffered.
async fn connect(mirror: &Mirror, ever_logged_in: &mut bool) -> Result<EventStream, ConnectError> {
    mirror.login().await.map_err(ConnectError::Login)?;
    *ever_logged_in = true;
    let events = mirror.source().stream_events().await.map_err(ConnectError::Subscribe)?;
    mirror.reconcile().await.map_err(ConnectError::Reconcile)?;
    mirror.list_open_trades().await;
    Ok(events)
}

async fn consume(
    mirror: &Mirror,
    mut events: EventStream,
    stop: &mut watch::Receiver<bool>,
) -> Result<StreamExit, MirrorError> {
    loop {
        let next = tokio::select! {
            _ = stop_requested(stop) => return Ok(StreamExit::Shutdown),
            next = events.next() => next,
        };
        match next {
            None => return Ok(StreamExit::Ended),
            Some(Err(e)) => return Err(MirrorError::Gateway(e)),
            Some(Ok(ev)) => mirror.on_event(&ev).await?,
        }
    }
}

/// Runs until shutdown or a fatal condition. No cap on restarts; pacing
/// comes from the retry policy.
pub async fn run(mirror: Mirror, retry: RetryConfig, mut stop: watch::Receiver<bool>) -> Result<(), Fatal> {
    let mut policy = RetryPolicy::new(retry);
    let mut ever_logged_in = false;

    loop {
        info!(state = "connecting", attempt = policy.attempt(), "stream supervisor");
        let connected = tokio::select! {
            _ = stop_requested(&mut stop) => return Ok(()),
            r = connect(&mirror, &mut ever_logged_in) => r,
        };

        match connected {
            Ok(events) => {
                info!(state = "streaming", "stream supervisor");
                STREAM_CONNECTED.set(1);
                let started = Instant::now();
                let outcome = consume(&mirror, events, &mut stop).await;
                STREAM_CONNECTED.set(0);
                match outcome {
                    Ok(StreamExit::Shutdown) => return Ok(()),
                    Ok(StreamExit::Ended) => warn!("source transaction stream terminated, restarting"),
                    Err(MirrorError::SessionLost(e)) => {
                        error!(severity = "critical", error = %e, "lost connection to destination, unable to re-connect");
                        return Err(Fatal::SessionLost(e));
                    }
                    Err(MirrorError::Gateway(e)) => {
                        error!(severity = "critical", error = %e, "unexpected error while streaming, restarting");
                    }
                }
                if started.elapsed() >= policy.stable_after() {
                    policy.reset();
                }
            }
            Err(ConnectError::Login(e)) if !ever_logged_in => {
                error!(severity = "critical", error = %e, "initial login to destination failed");
                return Err(Fatal::InitialLogin(e));
            }
            Err(e) => error!(error = %e, "connect failed, will retry"),
        }

        STREAM_RESTARTS.inc();
        let delay = policy.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "restart backoff");
        tokio::select! {
            _ = stop_requested(&mut stop) => return Ok(()),
            _ = sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, SourceEvent};
    use crate::testkit::{spos, FakeDestination, FakeSource};
    use tokio::time::{timeout, Duration};

    fn retry() -> RetryConfig {
        RetryConfig {
            base: Duration::from_secs(1),
            max: Duration::from_secs(8),
            jitter: 0.0,
            stable_after: Duration::from_secs(300),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restart_relogs_resubscribes_and_reconciles_once_per_cycle() {
        let source = FakeSource::new(100_000.0)
            .with_positions(vec![spos("EURUSD", Side::Long)])
            .with_stream(vec![SourceEvent::fill("MARKET_ORDER", "EUR_USD", 10_000.0)])
            .with_stream(vec![SourceEvent::fill("MARKET_ORDER_TRADE_CLOSE", "EUR_USD", -10_000.0)]);
        let dest = FakeDestination::new(25_000.0);
        let mirror = Mirror::new(source.handle(), dest.boxed(), 1000);
        let (_stop_tx, stop_rx) = watch::channel(false);

        // third subscription never yields; the timeout ends the test
        let r = timeout(Duration::from_secs(600), run(mirror.clone(), retry(), stop_rx)).await;
        assert!(r.is_err());

        assert_eq!(dest.logins(), 3);
        assert_eq!(source.stream_calls(), 3);
        assert_eq!(source.position_calls(), 3);
        assert_eq!(dest.opens().len(), 1);
        assert_eq!(dest.closes().len(), 1);
        assert!(mirror.open_trades().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_keeps_still_open_position_without_reopening() {
        let source = FakeSource::new(100_000.0)
            .with_positions(vec![spos("EURUSD", Side::Long)])
            .with_stream(vec![SourceEvent::fill("MARKET_ORDER", "EUR_USD", 10_000.0)]);
        let dest = FakeDestination::new(25_000.0);
        let mirror = Mirror::new(source.handle(), dest.boxed(), 1000);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let _ = timeout(Duration::from_secs(600), run(mirror.clone(), retry(), stop_rx)).await;

        assert_eq!(dest.opens().len(), 1);
        assert_eq!(dest.book().len(), 1);
        let trades = mirror.open_trades().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].1.size, 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn first_login_failure_is_fatal_exit_1() {
        let source = FakeSource::new(100_000.0);
        let dest = FakeDestination::new(25_000.0);
        dest.set_login_ok(false);
        let mirror = Mirror::new(source.handle(), dest.boxed(), 1000);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let err = run(mirror, retry(), stop_rx).await.unwrap_err();
        assert!(matches!(err, Fatal::InitialLogin(_)));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(source.stream_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn later_login_failures_only_retry() {
        let source = FakeSource::new(100_000.0).with_stream(vec![]);
        let dest = FakeDestination::new(25_000.0);
        let mirror = Mirror::new(source.handle(), dest.boxed(), 1000);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run(mirror, retry(), stop_rx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        // first cycle streamed an empty script and ended; now refuse logins
        dest.set_login_ok(false);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(dest.logins() > 2);
        assert_eq!(source.stream_calls(), 1);

        stop_tx.send(true).unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn unrecoverable_session_mid_stream_is_exit_2() {
        let source = FakeSource::new(100_000.0)
            .with_stream(vec![SourceEvent::fill("MARKET_ORDER", "EUR_USD", 10_000.0)]);
        let dest = FakeDestination::new(25_000.0);
        // connect logs in fine, then the session dies before the first fill
        dest.set_ping_ok(false);
        dest.fail_logins_after(1);
        let mirror = Mirror::new(source.handle(), dest.boxed(), 1000);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let err = run(mirror, retry(), stop_rx).await.unwrap_err();
        assert!(matches!(err, Fatal::SessionLost(_)));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(dest.logins(), 2);
        assert!(dest.opens().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_mid_stream_reconnects_instead_of_exiting() {
        let source = FakeSource::new(100_000.0)
            .with_positions(vec![spos("EURUSD", Side::Long)])
            .with_script(vec![
                Ok(SourceEvent::fill("MARKET_ORDER", "EUR_USD", 10_000.0)),
                Err(GatewayError::Idle(Duration::from_secs(15))),
            ]);
        let dest = FakeDestination::new(25_000.0);
        let mirror = Mirror::new(source.handle(), dest.boxed(), 1000);
        let (_stop_tx, stop_rx) = watch::channel(false);

        // still running when the timeout fires: no Fatal
        let r = timeout(Duration::from_secs(600), run(mirror.clone(), retry(), stop_rx)).await;
        assert!(r.is_err());

        assert_eq!(dest.logins(), 2);
        assert_eq!(source.stream_calls(), 2);
        assert_eq!(source.position_calls(), 2);
        assert_eq!(dest.opens().len(), 1);
        assert_eq!(mirror.open_trades().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_close_restarts_and_reconnect_closes_the_orphan() {
        let source = FakeSource::new(100_000.0).with_stream(vec![
            SourceEvent::fill("MARKET_ORDER", "EUR_USD", 10_000.0),
            SourceEvent::fill("STOP_LOSS_ORDER", "EUR_USD", -10_000.0),
        ]);
        let dest = FakeDestination::new(25_000.0);
        dest.fail_next_closes(1);
        let mirror = Mirror::new(source.handle(), dest.boxed(), 1000);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let r = timeout(Duration::from_secs(600), run(mirror.clone(), retry(), stop_rx)).await;
        assert!(r.is_err());

        assert_eq!(dest.logins(), 2);
        assert_eq!(source.stream_calls(), 2);
        assert_eq!(dest.opens().len(), 1);
        assert_eq!(dest.closes().len(), 1);
        assert!(dest.book().is_empty());
        assert!(mirror.open_trades().await.is_empty());
    }

    #[tokio::test]
    async fn stop_signal_is_sticky() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        stop_requested(&mut rx).await;
        stop_requested(&mut rx).await;
    }
}
