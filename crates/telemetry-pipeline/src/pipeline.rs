//! Poll Loop Implementation

use crate::error::PipelineError;
use crate::status::ConnectionStatus;
use crate::subscriber::SampleSubscriber;
use data_validator::{SmoothingMethod, Smoother, ValidationConfig, Validator};
use obd_protocol::{
    catalog, decode, now_ms, ObdError, Parameter, ParameterDefinition, Sample, SharedChannel,
    POLL_TIMEOUT_MS,
};
use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for the poll loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parameters requested every cycle
    pub parameters: Vec<Parameter>,
    /// Target cycle period in milliseconds
    pub interval_ms: u64,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Recent samples kept for snapshots
    pub buffer_capacity: usize,
    /// Consecutive empty cycles before the link is reported degraded
    pub degraded_after: u32,
    pub smoothing: SmoothingMethod,
    pub validation: ValidationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parameters: catalog::default_poll_set(),
            interval_ms: 200,
            request_timeout_ms: POLL_TIMEOUT_MS,
            buffer_capacity: ring_buffer::DEFAULT_CAPACITY,
            degraded_after: 3,
            smoothing: SmoothingMethod::None,
            validation: ValidationConfig::default(),
        }
    }
}

/// Lifecycle of the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Polling,
    Stopped,
}

/// Counters since the pipeline was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub samples_published: u64,
    pub timeouts: u64,
    pub decode_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    failed_cycles: AtomicU64,
    samples_published: AtomicU64,
    timeouts: AtomicU64,
    decode_errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            failed_cycles: self.failed_cycles.load(Ordering::Relaxed),
            samples_published: self.samples_published.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

type Subscribers = Arc<Mutex<Vec<Box<dyn SampleSubscriber>>>>;

/// Continuous polling over a shared command channel
pub struct TelemetryPipeline {
    channel: SharedChannel,
    config: PipelineConfig,
    subscribers: Subscribers,
    buffer: Arc<Mutex<RingBuffer<Sample>>>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: Option<JoinHandle<()>>,
    state: PipelineState,
}

impl TelemetryPipeline {
    /// Create an idle pipeline reporting status on its own watch channel
    pub fn new(channel: SharedChannel, config: PipelineConfig) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Connected);
        let buffer = RingBuffer::new(config.buffer_capacity);
        Self {
            channel,
            config,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            buffer: Arc::new(Mutex::new(buffer)),
            status_tx: Arc::new(status_tx),
            counters: Arc::new(Counters::default()),
            stop: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            task: None,
            state: PipelineState::Idle,
        }
    }

    /// Report status on a watch channel shared with the caller
    pub fn with_status_sender(mut self, status_tx: Arc<watch::Sender<ConnectionStatus>>) -> Self {
        self.status_tx = status_tx;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Register a subscriber; it sees every sample published from now on
    pub fn add_subscriber(&self, subscriber: Box<dyn SampleSubscriber>) {
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(subscriber),
            Err(err) => error!("Subscriber list poisoned: {}", err),
        }
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_tx.borrow().clone()
    }

    /// Current lifecycle state; a loop that ended on its own counts as stopped
    pub fn state(&self) -> PipelineState {
        match (&self.task, self.state) {
            (Some(task), PipelineState::Polling) if task.is_finished() => PipelineState::Stopped,
            (None, PipelineState::Polling) => PipelineState::Stopped,
            (_, state) => state,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.state() == PipelineState::Polling
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Copy of the buffered samples, oldest first
    pub fn snapshot(&self) -> Vec<Sample> {
        self.buffer
            .lock()
            .map(|buffer| buffer.snapshot())
            .unwrap_or_default()
    }

    /// Copy of the last `count` buffered samples, oldest first
    pub fn recent(&self, count: usize) -> Vec<Sample> {
        self.buffer
            .lock()
            .map(|buffer| buffer.read_last(count))
            .unwrap_or_default()
    }

    /// Start polling with the configured parameter set and interval
    pub fn start_default(&mut self) -> Result<(), PipelineError> {
        let parameters = self.config.parameters.clone();
        let interval = Duration::from_millis(self.config.interval_ms);
        self.start(&parameters, interval)
    }

    /// Start polling `parameters` every `interval`
    pub fn start(&mut self, parameters: &[Parameter], interval: Duration) -> Result<(), PipelineError> {
        if self.state() == PipelineState::Polling {
            return Err(PipelineError::AlreadyPolling);
        }

        let definitions: Vec<&'static ParameterDefinition> =
            parameters.iter().filter_map(|p| p.definition()).collect();
        if definitions.is_empty() {
            return Err(PipelineError::EmptyParameterSet);
        }

        // Fresh stop signal per run so a stale permit cannot end the new loop
        self.stop = Arc::new(AtomicBool::new(false));
        self.wake = Arc::new(Notify::new());

        let poll_loop = PollLoop {
            channel: self.channel.clone(),
            definitions,
            interval: interval.max(Duration::from_millis(1)),
            request_timeout: Duration::from_millis(self.config.request_timeout_ms),
            degraded_after: self.config.degraded_after,
            validator: Validator::new(self.config.validation.clone()),
            smoother: Smoother::new(self.config.smoothing),
            subscribers: self.subscribers.clone(),
            buffer: self.buffer.clone(),
            status_tx: self.status_tx.clone(),
            counters: self.counters.clone(),
            stop: self.stop.clone(),
            wake: self.wake.clone(),
        };

        info!(
            "Starting telemetry polling of {} parameters every {:?}",
            poll_loop.definitions.len(),
            interval
        );
        self.task = Some(tokio::spawn(poll_loop.run()));
        self.state = PipelineState::Polling;
        Ok(())
    }

    /// Stop polling and wait for the loop to finish. Safe to call repeatedly,
    /// and from any state.
    pub async fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.wake.notify_one();

        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!("Poll loop ended abnormally: {}", err);
            }
            info!("Telemetry polling stopped");
        }
        self.state = PipelineState::Stopped;
    }
}

enum CycleOutcome {
    Sample(Sample),
    Empty,
    Stopped,
    Failed(ObdError),
}

struct PollLoop {
    channel: SharedChannel,
    definitions: Vec<&'static ParameterDefinition>,
    interval: Duration,
    request_timeout: Duration,
    degraded_after: u32,
    validator: Validator,
    smoother: Smoother,
    subscribers: Subscribers,
    buffer: Arc<Mutex<RingBuffer<Sample>>>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl PollLoop {
    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
            }
            if self.stopping() {
                break;
            }

            self.counters.cycles.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("obd_poll_cycles_total").increment(1);

            match self.poll_cycle().await {
                CycleOutcome::Sample(sample) => {
                    consecutive_failures = 0;
                    self.set_status_if(ConnectionStatus::Connected, |s| *s != ConnectionStatus::Connected);
                    self.publish(sample);
                }
                CycleOutcome::Empty => {
                    consecutive_failures += 1;
                    self.counters.failed_cycles.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("obd_poll_failures_total").increment(1);
                    debug!("Poll cycle produced no data ({} in a row)", consecutive_failures);

                    if consecutive_failures >= self.degraded_after
                        && self.set_status_if(ConnectionStatus::Degraded, |s| *s == ConnectionStatus::Connected)
                    {
                        warn!("{} consecutive empty poll cycles, link degraded", consecutive_failures);
                    }
                }
                CycleOutcome::Stopped => break,
                CycleOutcome::Failed(err) => {
                    error!("Polling aborted: {}", err);
                    self.status_tx.send_replace(ConnectionStatus::Failed(err.to_string()));
                    break;
                }
            }
        }
        debug!("Poll loop exited");
    }

    fn set_status_if(&self, status: ConnectionStatus, predicate: impl Fn(&ConnectionStatus) -> bool) -> bool {
        self.status_tx.send_if_modified(|current| {
            if predicate(current) {
                *current = status;
                true
            } else {
                false
            }
        })
    }

    /// One request per parameter, merged into a sample
    async fn poll_cycle(&mut self) -> CycleOutcome {
        let mut sample = Sample::new(0);

        for definition in self.definitions.clone() {
            if self.stopping() {
                return CycleOutcome::Stopped;
            }
            match self.request(definition).await {
                Ok(value) => sample.set(definition.parameter, value),
                Err(err) if err.is_fatal() => return CycleOutcome::Failed(err),
                Err(ObdError::Decode(err)) => {
                    self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                    debug!("{} not decoded: {}", definition.parameter, err);
                }
                Err(err) => debug!("{} not read: {}", definition.parameter, err),
            }
        }

        self.validator.validate_sample(&mut sample);
        if sample.is_empty() {
            return CycleOutcome::Empty;
        }
        sample.derive();
        if let Some(boost) = sample.get(Parameter::BoostPressure) {
            if let Err(err) = self.validator.validate(Parameter::BoostPressure, boost) {
                debug!("Dropping derived value: {}", err);
                sample.remove(Parameter::BoostPressure);
            }
        }
        self.smoother.smooth(&mut sample);
        sample.timestamp_ms = now_ms();
        CycleOutcome::Sample(sample)
    }

    /// Request and decode one parameter; a timeout is retried once
    async fn request(&self, definition: &'static ParameterDefinition) -> Result<f64, ObdError> {
        let mut retried = false;
        loop {
            let response = {
                let mut channel = self.channel.lock().await;
                channel
                    .send_with_timeout(definition.command, self.request_timeout)
                    .await
            };
            match response {
                Ok(raw) => return Ok(decode(definition, &raw)?),
                Err(ObdError::Timeout(ms)) if !retried => {
                    self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    debug!("{} timed out after {}ms, retrying", definition.command, ms);
                    retried = true;
                }
                Err(err) => {
                    if matches!(err, ObdError::Timeout(_)) {
                        self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    }
                    return Err(err);
                }
            }
        }
    }

    fn publish(&self, sample: Sample) {
        match self.buffer.lock() {
            Ok(mut buffer) => {
                buffer.push(sample.clone());
            }
            Err(err) => error!("Sample buffer poisoned: {}", err),
        }

        match self.subscribers.lock() {
            Ok(mut subscribers) => {
                for subscriber in subscribers.iter_mut() {
                    subscriber.on_sample(sample.clone());
                }
            }
            Err(err) => error!("Subscriber list poisoned: {}", err),
        }

        self.counters.samples_published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("obd_samples_published_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::mock::{CommandLog, MockAdapter, MockReply};
    use obd_protocol::CommandChannel;

    struct Collector(Arc<Mutex<Vec<Sample>>>);

    impl SampleSubscriber for Collector {
        fn on_sample(&mut self, sample: Sample) {
            self.0.lock().unwrap().push(sample);
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            interval_ms: 10,
            request_timeout_ms: 50,
            ..PipelineConfig::default()
        }
    }

    async fn pipeline(adapter: MockAdapter) -> (TelemetryPipeline, CommandLog) {
        let log = adapter.command_log();
        let mut channel = CommandChannel::new(Box::new(adapter.spawn()));
        channel.initialize().await.unwrap();
        (TelemetryPipeline::new(channel.shared(), config()), log)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_samples_reach_subscribers_and_buffer() {
        let (mut pipeline, _) = pipeline(MockAdapter::new().with_simulator()).await;
        let received = Arc::new(Mutex::new(Vec::new()));
        pipeline.add_subscriber(Box::new(Collector(received.clone())));

        pipeline.start_default().unwrap();
        wait_for(|| received.lock().unwrap().len() >= 2).await;
        pipeline.stop().await;

        let samples = received.lock().unwrap().clone();
        let first = &samples[0];
        assert!(first.get(Parameter::Rpm).is_some());
        assert!(first.get(Parameter::BoostPressure).is_some());
        assert!(first.timestamp_ms > 0);
        assert_eq!(pipeline.snapshot().len(), samples.len());
        assert_eq!(pipeline.stats().samples_published, samples.len() as u64);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let (mut pipeline, log) = pipeline(MockAdapter::new().with_simulator()).await;
        assert_eq!(pipeline.state(), PipelineState::Idle);
        let sent = log.len();

        pipeline.stop().await;
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(log.len(), sent);

        pipeline.start_default().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Polling);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_recent_returns_newest_tail() {
        let (mut pipeline, _) = pipeline(MockAdapter::new().with_simulator()).await;
        pipeline
            .start(&[Parameter::Rpm], Duration::from_millis(10))
            .unwrap();
        wait_for(|| pipeline.stats().samples_published >= 3).await;
        pipeline.stop().await;

        let all = pipeline.snapshot();
        assert_eq!(pipeline.recent(2), all[all.len() - 2..].to_vec());
        assert_eq!(pipeline.recent(10_000).len(), all.len());
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let (mut pipeline, _) = pipeline(MockAdapter::new().with_simulator()).await;
        pipeline.start_default().unwrap();
        assert!(matches!(pipeline.start_default(), Err(PipelineError::AlreadyPolling)));
        pipeline.stop().await;

        // Restart after stop is allowed
        pipeline.start_default().unwrap();
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_derived_only_parameter_set_is_rejected() {
        let (mut pipeline, _) = pipeline(MockAdapter::new()).await;
        let err = pipeline
            .start(&[Parameter::BoostPressure], Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyParameterSet));
    }

    #[tokio::test]
    async fn test_stop_twice_sends_nothing_more() {
        let (mut pipeline, log) = pipeline(MockAdapter::new().with_simulator()).await;
        pipeline.start_default().unwrap();
        wait_for(|| pipeline.stats().samples_published > 0).await;

        pipeline.stop().await;
        let sent = log.len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        pipeline.stop().await;

        assert_eq!(log.len(), sent);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn test_empty_cycles_degrade_then_recover() {
        let adapter = MockAdapter::new();
        let (mut pipeline, _) = pipeline(adapter).await;
        let status = pipeline.subscribe_status();

        pipeline
            .start(&[Parameter::Speed], Duration::from_millis(10))
            .unwrap();
        wait_for(|| *status.borrow() == ConnectionStatus::Degraded).await;
        assert!(pipeline.stats().failed_cycles >= 3);
        assert!(pipeline.snapshot().is_empty());
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_timeout_is_retried_within_cycle() {
        let adapter = MockAdapter::new()
            .reply("010D", "41 0D 3C")
            .reply_once("010D", MockReply::Silent);
        let (mut pipeline, log) = pipeline(adapter).await;

        pipeline
            .start(&[Parameter::Speed], Duration::from_millis(10))
            .unwrap();
        wait_for(|| pipeline.stats().samples_published > 0).await;
        pipeline.stop().await;

        let first = pipeline.snapshot()[0].clone();
        assert_eq!(first.get(Parameter::Speed), Some(60.0));
        assert_eq!(pipeline.stats().failed_cycles, 0);
        let speed_requests = log.commands().iter().filter(|c| *c == "010D").count();
        assert!(speed_requests >= 2);
    }

    #[tokio::test]
    async fn test_transport_failure_ends_loop() {
        let adapter = MockAdapter::new().behave("010C", MockReply::Hangup);
        let (mut pipeline, _) = pipeline(adapter).await;

        pipeline
            .start(&[Parameter::Rpm], Duration::from_millis(10))
            .unwrap();
        wait_for(|| matches!(pipeline.status(), ConnectionStatus::Failed(_))).await;
        wait_for(|| pipeline.state() == PipelineState::Stopped).await;
        pipeline.stop().await;
    }
}
