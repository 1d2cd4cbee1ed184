//! Dispatch loop
//!
//! Waits for transport events with a timeout bounded by the engine's nearest
//! timer, applies at most `max_dispatch_count` events under the engine lock,
//! then runs whatever timers are due. The runtime drives it from its own task
//! in the API-dispatch model; in the user-dispatch model the application calls
//! `RuntimeHandle::dispatch` instead.

use std::sync::Arc;
use std::time::Duration;

use mdprov_core::{DispatchConfig, ProviderEngine};
use tokio::sync::{mpsc, watch, Mutex};

#[cfg(not(feature = "std"))]
use log::{debug, info, warn};
#[cfg(feature = "std")]
use tracing::{debug, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::tcp::TransportEvent;

/// The engine behind the runtime's single coarse lock
pub type SharedEngine = Arc<Mutex<ProviderEngine>>;

pub struct Dispatcher {
    engine: SharedEngine,
    events: mpsc::Receiver<TransportEvent>,
    max_dispatch_count: usize,
    idle_timeout: Duration,
    dispatched: u64,
}

impl Dispatcher {
    pub fn new(
        engine: SharedEngine,
        events: mpsc::Receiver<TransportEvent>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            engine,
            events,
            max_dispatch_count: config.max_dispatch_count.max(1),
            idle_timeout: Duration::from_millis(config.dispatch_timeout_ms),
            dispatched: 0,
        }
    }

    /// Total events applied so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Wait up to `timeout` for events and process one batch.
    ///
    /// Returns the number of transport events and timer tasks processed. Fails
    /// with `Shutdown` once every event sender is gone.
    pub async fn dispatch(&mut self, timeout: Duration) -> RuntimeResult<usize> {
        let wait = self.wait_time(timeout).await;

        let first = match tokio::time::timeout(wait, self.events.recv()).await {
            Ok(Some(event)) => Some(event),
            Ok(None) => return Err(RuntimeError::Shutdown),
            Err(_) => None,
        };

        let mut engine = self.engine.lock().await;
        let mut events = 0;
        if let Some(event) = first {
            apply(&mut engine, event);
            events += 1;
            while events < self.max_dispatch_count {
                match self.events.try_recv() {
                    Ok(event) => {
                        apply(&mut engine, event);
                        events += 1;
                    }
                    Err(_) => break,
                }
            }
        }
        let timers = engine.process_timers();
        drop(engine);

        self.dispatched += events as u64;
        if events + timers > 0 {
            debug!("Dispatched {} events and {} timers", events, timers);
        }
        Ok(events + timers)
    }

    /// Dispatch until `shutdown` turns true or the transport goes away
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> RuntimeResult<()> {
        info!("Dispatch loop started");
        while !*shutdown.borrow() {
            match self.dispatch(self.idle_timeout).await {
                Ok(_) => {}
                Err(RuntimeError::Shutdown) => break,
                Err(err) => warn!("Dispatch failed: {}", err),
            }
        }
        info!("Dispatch loop stopped after {} events", self.dispatched);
        Ok(())
    }

    async fn wait_time(&self, timeout: Duration) -> Duration {
        let mut engine = self.engine.lock().await;
        let Some(deadline) = engine.next_deadline() else {
            return timeout;
        };
        let now = engine.now();
        if deadline <= now {
            return Duration::ZERO;
        }
        timeout.min(deadline.duration_since(now))
    }
}

/// Hand one transport event to the engine
fn apply(engine: &mut ProviderEngine, event: TransportEvent) {
    match event {
        TransportEvent::ChannelUp { channel, info } => {
            if let Err(err) = engine.on_channel_up(channel, info) {
                warn!("Refusing {}: {}", channel, err);
                engine.close_channel(channel);
            }
        }
        TransportEvent::ChannelDown { channel, reason } => {
            engine.on_channel_down(channel, &reason);
        }
        TransportEvent::Message { channel, bytes } => {
            if let Err(err) = engine.on_message(channel, &bytes) {
                debug!("Message on {} not processed: {}", channel, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdprov_core::testing::{ManualTimeSource, RecordingTransport};
    use mdprov_core::{ChannelId, ChannelInfo, ProviderConfig};

    fn dispatcher(max: usize) -> (Dispatcher, mpsc::Sender<TransportEvent>, SharedEngine) {
        let engine = ProviderEngine::builder(ProviderConfig::testing())
            .transport(Box::new(RecordingTransport::new()))
            .time_source(Arc::new(ManualTimeSource::new(0)))
            .build()
            .expect("engine");
        let engine = Arc::new(Mutex::new(engine));
        let (tx, rx) = mpsc::channel(64);
        let config = DispatchConfig {
            max_dispatch_count: max,
            ..DispatchConfig::testing()
        };
        (Dispatcher::new(engine.clone(), rx, &config), tx, engine)
    }

    #[tokio::test]
    async fn test_dispatch_honours_max_count() {
        let (mut dispatcher, tx, engine) = dispatcher(2);
        for id in 1..=5 {
            tx.send(TransportEvent::ChannelUp {
                channel: ChannelId::new(id),
                info: ChannelInfo::default(),
            })
            .await
            .expect("send");
        }

        assert_eq!(dispatcher.dispatch(Duration::from_millis(10)).await.expect("batch"), 2);
        assert_eq!(engine.lock().await.channels().len(), 2);
        assert_eq!(dispatcher.dispatch(Duration::from_millis(10)).await.expect("batch"), 2);
        assert_eq!(dispatcher.dispatch(Duration::from_millis(10)).await.expect("batch"), 1);
        assert_eq!(dispatcher.dispatched(), 5);
    }

    #[tokio::test]
    async fn test_idle_dispatch_times_out() {
        let (mut dispatcher, _tx, _engine) = dispatcher(4);
        let processed = dispatcher
            .dispatch(Duration::from_millis(5))
            .await
            .expect("idle");
        assert_eq!(processed, 0);
    }

    #[tokio::test]
    async fn test_closed_event_source_is_shutdown() {
        let (mut dispatcher, tx, _engine) = dispatcher(4);
        drop(tx);
        let result = dispatcher.dispatch(Duration::from_millis(5)).await;
        assert!(matches!(result, Err(RuntimeError::Shutdown)));
    }

    #[tokio::test]
    async fn test_refused_channel_is_closed() {
        let (mut dispatcher, tx, engine) = dispatcher(4);
        let channel = ChannelId::new(1);
        for _ in 0..2 {
            tx.send(TransportEvent::ChannelUp {
                channel,
                info: ChannelInfo::default(),
            })
            .await
            .expect("send");
        }

        dispatcher.dispatch(Duration::from_millis(5)).await.expect("batch");
        // the duplicate up tears the first session down with it
        assert!(engine.lock().await.session(channel).is_none());
    }
}
