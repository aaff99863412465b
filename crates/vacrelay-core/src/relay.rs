//! Relay core
//!
//! Owns the single background producer that turns raw gauge readings into
//! viewer events and log rows, plus the logging and simulation lifecycle
//! state. Exactly one producer task runs per relay, started lazily by the
//! first viewer connection.

use std::sync::Arc;

use chrono::Local;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::config::{RelayConfig, SourceMode};
use crate::datalog::{self, SessionLog};
use crate::error::RelayError;
use crate::event::RelayEvent;
use crate::sample::{Sample, SampleOrigin};
use crate::source::{parse_sample_line, SerialLink};

/// Producer slot and simulation epoch.
///
/// One lock covers both so the start-once check and an epoch reset can
/// never interleave.
#[derive(Default)]
struct ProducerState {
    task: Option<JoinHandle<()>>,
    sim_epoch: Option<Instant>,
}

/// The telemetry relay
pub struct Relay {
    config: RelayConfig,
    bus: EventBus,
    producer: Mutex<ProducerState>,
    logging: Mutex<Option<SessionLog>>,
    shutdown: CancellationToken,
}

impl Relay {
    /// Create a relay; the producer starts on the first viewer connection
    pub fn new(config: RelayConfig, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            config,
            bus,
            producer: Mutex::new(ProducerState::default()),
            logging: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    /// The broadcast boundary viewers subscribe through
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Handle a new viewer connection.
    ///
    /// Starts the producer if it is not already running and returns the
    /// current logging status for delivery to this viewer, so it reflects
    /// session state without racing the next sample.
    pub async fn on_viewer_connect(self: Arc<Self>) -> RelayEvent {
        self.clone().ensure_producer().await;
        self.logging_status().await
    }

    /// Start the producer task if no instance is running yet.
    ///
    /// Returns `true` if this call started it. The check and the spawn
    /// happen under one lock, so concurrent connections cannot start a
    /// second instance.
    pub async fn ensure_producer(self: Arc<Self>) -> bool {
        let mut slot = self.producer.lock().await;
        if slot.task.is_some() {
            return false;
        }
        info!(mode = ?self.config.mode, "starting producer task");
        let relay = Arc::clone(&self);
        slot.task = Some(tokio::spawn(relay.run_producer()));
        true
    }

    /// Current logging status as a wire event
    pub async fn logging_status(&self) -> RelayEvent {
        let guard = self.logging.lock().await;
        RelayEvent::LoggingStatus {
            active: guard.is_some(),
            filename: guard.as_ref().map(|log| log.filename().to_string()),
        }
    }

    /// Begin a new logging session.
    ///
    /// Idempotent: a second start while a session is active is a no-op. On
    /// file-creation failure logging stays inactive and the error is
    /// returned to the requester; nothing is broadcast.
    pub async fn start_logging(&self) -> Result<(), RelayError> {
        let mut guard = self.logging.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let filename = datalog::session_filename(Local::now());
        let path = self.config.log_dir.join(&filename);
        let log = SessionLog::create(&path).map_err(|source| RelayError::LogOpen {
            path: path.clone(),
            source,
        })?;
        info!(filename = log.filename(), "logging started");
        let status = RelayEvent::LoggingStatus {
            active: true,
            filename: Some(log.filename().to_string()),
        };
        *guard = Some(log);
        drop(guard);

        self.bus.publish(status);
        Ok(())
    }

    /// End the active logging session.
    ///
    /// The writer is closed before the state is cleared; a stop with no
    /// active session is a no-op and publishes nothing.
    pub async fn stop_logging(&self) {
        let mut guard = self.logging.lock().await;
        let Some(log) = guard.take() else {
            return;
        };
        let filename = log.filename().to_string();
        if let Err(error) = log.close() {
            warn!(%error, filename, "closing session log failed");
        } else {
            info!(filename, "logging stopped");
        }
        drop(guard);

        self.bus.publish(RelayEvent::LoggingStatus {
            active: false,
            filename: None,
        });
    }

    /// Restart the decay simulation from t = 0.
    ///
    /// No-op in Live mode. Takes the producer lock so a reset cannot
    /// interleave with the start-once check, and the epoch is overwritten
    /// but never cleared.
    pub async fn restart_simulation(&self) {
        if self.config.mode != SourceMode::Simulated {
            return;
        }
        let mut slot = self.producer.lock().await;
        slot.sim_epoch = Some(Instant::now());
        drop(slot);

        debug!("simulation epoch reset");
        self.bus.publish(RelayEvent::SimulationRestarted);
    }

    /// Stop the producer and close any active logging session
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.producer.lock().await.task.take();
        if let Some(task) = task {
            let _ = task.await;
        }
        let mut guard = self.logging.lock().await;
        if let Some(log) = guard.take() {
            if let Err(error) = log.close() {
                warn!(%error, "closing session log failed");
            }
        }
        info!("relay shut down");
    }

    /// True while the producer task is running
    pub async fn producer_running(&self) -> bool {
        self.producer
            .lock()
            .await
            .task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    async fn run_producer(self: Arc<Self>) {
        match self.config.mode {
            SourceMode::Simulated => self.run_simulated().await,
            SourceMode::Live => self.run_live().await,
        }
        debug!("producer task exiting");
    }

    /// Emit decay-model samples every `sample_interval` until shutdown
    async fn run_simulated(&self) {
        loop {
            let epoch = {
                let mut slot = self.producer.lock().await;
                *slot.sim_epoch.get_or_insert_with(Instant::now)
            };
            let pressure = crate::source::sim::pressure_at(epoch.elapsed());
            self.emit(Sample::new(pressure, SampleOrigin::Simulated)).await;

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(self.config.sample_interval) => {}
            }
        }
    }

    /// Read the serial link, reconnecting with a fixed backoff forever
    async fn run_live(&self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let link = match SerialLink::open(&self.config.port_name, self.config.baud_rate) {
                Ok(link) => {
                    info!(port = %self.config.port_name, "serial link connected");
                    link
                }
                Err(error) => {
                    warn!(port = %self.config.port_name, %error, "could not open serial link, retrying");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = sleep(self.config.reconnect_delay) => {}
                    }
                    continue;
                }
            };
            self.read_link(link).await;
        }
    }

    /// Poll an open link for lines until it drops or shutdown is requested.
    ///
    /// Malformed lines are discarded without breaking the loop; only
    /// link-level failures return to the reconnect loop.
    async fn read_link(&self, mut link: SerialLink) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = sleep(self.config.poll_interval) => {}
            }
            match link.poll_line() {
                Ok(Some(raw)) => match parse_sample_line(&raw) {
                    Ok(Some(pressure)) => {
                        self.emit(Sample::new(pressure, SampleOrigin::Live)).await;
                    }
                    Ok(None) => {}
                    Err(error) => {
                        warn!(%error, "discarding malformed sample line");
                    }
                },
                Ok(None) => {}
                Err(error) => {
                    warn!(%error, "serial link lost, reconnecting");
                    return;
                }
            }
        }
    }

    /// Publish one sample to the broadcast boundary and, while a logging
    /// session is active, append it to the session log
    async fn emit(&self, sample: Sample) {
        self.bus.publish(RelayEvent::NewData {
            pressure: sample.pressure,
            is_simulation: sample.is_simulation(),
        });

        let mut guard = self.logging.lock().await;
        if let Some(log) = guard.as_mut() {
            if let Err(error) = log.append(sample.at, sample.pressure) {
                warn!(%error, "could not append sample to session log");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;

    fn simulated_relay() -> Arc<Relay> {
        Relay::new(RelayConfig::simulated(), EventBus::default())
    }

    #[tokio::test]
    async fn test_producer_starts_at_most_once() {
        let relay = simulated_relay();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let relay = relay.clone();
            handles.push(tokio::spawn(relay.ensure_producer()));
        }
        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert!(relay.producer_running().await);

        relay.shutdown().await;
        assert!(!relay.producer_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_samples_follow_decay_curve() {
        let relay = simulated_relay();
        let mut rx = relay.bus().subscribe();

        let status = relay.clone().on_viewer_connect().await;
        assert_eq!(
            status,
            RelayEvent::LoggingStatus {
                active: false,
                filename: None
            }
        );

        let mut pressures = Vec::new();
        while pressures.len() <= 50 {
            if let RelayEvent::NewData {
                pressure,
                is_simulation,
            } = rx.recv().await.unwrap()
            {
                assert!(is_simulation);
                pressures.push(pressure);
            }
        }

        // Sample n is taken at n * 200ms of virtual time; sample 50 lands
        // exactly one time constant in.
        assert!((pressures[0] - 1.1).abs() < 1e-9, "got {}", pressures[0]);
        let one_tau = 1.1 * (-1.0f64).exp();
        assert!(
            (pressures[50] - one_tau).abs() < 1e-6,
            "got {}",
            pressures[50]
        );
        for pair in pressures.windows(2) {
            assert!(pair[1] < pair[0], "pressure not decreasing: {pair:?}");
        }

        relay.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_elapsed_time() {
        let relay = simulated_relay();
        let mut rx = relay.bus().subscribe();
        relay.clone().ensure_producer().await;

        let mut count = 0;
        let mut last = f64::INFINITY;
        while count < 25 {
            if let RelayEvent::NewData { pressure, .. } = rx.recv().await.unwrap() {
                last = pressure;
                count += 1;
            }
        }
        assert!(last < 0.7, "pressure {last} should have decayed");

        relay.restart_simulation().await;

        loop {
            match rx.recv().await.unwrap() {
                RelayEvent::SimulationRestarted => break,
                RelayEvent::NewData { .. } => {}
                other => panic!("unexpected event {other:?}"),
            }
        }
        let next = loop {
            if let RelayEvent::NewData { pressure, .. } = rx.recv().await.unwrap() {
                break pressure;
            }
        };
        assert!(
            next > 1.0,
            "pressure {next} should be near 1.1 right after restart"
        );

        relay.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_logging_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RelayConfig::simulated();
        config.log_dir = dir.path().to_path_buf();
        let relay = Relay::new(config, EventBus::default());
        let mut rx = relay.bus().subscribe();

        relay.clone().ensure_producer().await;
        relay.start_logging().await.unwrap();

        let filename = loop {
            if let RelayEvent::LoggingStatus {
                active: true,
                filename: Some(name),
            } = rx.recv().await.unwrap()
            {
                break name;
            }
        };

        let mut seen = 0;
        while seen < 5 {
            if let RelayEvent::NewData { .. } = rx.recv().await.unwrap() {
                seen += 1;
            }
        }
        relay.stop_logging().await;

        let path = dir.path().join(&filename);
        let contents = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = contents.lines().collect();
        assert_eq!(rows[0], datalog::LOG_HEADER);
        let data_rows = &rows[1..];
        assert!(!data_rows.is_empty());
        for row in data_rows {
            let (timestamp, pressure) = row.split_once(',').expect("delimited row");
            assert_eq!(timestamp.len(), "2024-03-09 14:30:05.042".len());
            pressure.parse::<f64>().expect("numeric pressure");
        }

        // No further rows appear once the session is stopped.
        let rows_at_stop = contents.lines().count();
        let mut more = 0;
        while more < 3 {
            if let RelayEvent::NewData { .. } = rx.recv().await.unwrap() {
                more += 1;
            }
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), rows_at_stop);

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_logging_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RelayConfig::simulated();
        config.log_dir = dir.path().to_path_buf();
        let relay = Relay::new(config, EventBus::default());
        let mut rx = relay.bus().subscribe();

        relay.start_logging().await.unwrap();
        relay.start_logging().await.unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(matches!(
            rx.recv().await.unwrap(),
            RelayEvent::LoggingStatus { active: true, .. }
        ));
        // The redundant start published nothing.
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        relay.stop_logging().await;
    }

    #[tokio::test]
    async fn test_stop_logging_when_inactive_is_noop() {
        let relay = simulated_relay();
        let mut rx = relay.bus().subscribe();

        relay.stop_logging().await;

        assert_eq!(
            relay.logging_status().await,
            RelayEvent::LoggingStatus {
                active: false,
                filename: None
            }
        );
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_failed_log_open_stays_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RelayConfig::simulated();
        config.log_dir = dir.path().join("missing").join("deeper");
        let relay = Relay::new(config, EventBus::default());
        let mut rx = relay.bus().subscribe();

        let err = relay.start_logging().await.unwrap_err();
        assert!(matches!(err, RelayError::LogOpen { .. }));
        assert_eq!(
            relay.logging_status().await,
            RelayEvent::LoggingStatus {
                active: false,
                filename: None
            }
        );
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_restart_simulation_is_noop_in_live_mode() {
        let relay = Relay::new(RelayConfig::default(), EventBus::default());
        let mut rx = relay.bus().subscribe();

        relay.restart_simulation().await;

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_mode_without_link_keeps_retrying() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RelayConfig::default();
        config.port_name = dir.path().join("no-such-port").display().to_string();
        let relay = Relay::new(config, EventBus::default());
        let mut rx = relay.bus().subscribe();
        relay.clone().ensure_producer().await;

        // Without a link nothing is emitted, but the producer keeps retrying
        // instead of dying.
        let waited = tokio::time::timeout(Duration::from_secs(30), rx.recv()).await;
        assert!(waited.is_err(), "expected no events without a link");
        assert!(relay.producer_running().await);

        relay.shutdown().await;
        assert!(!relay.producer_running().await);
    }
}
