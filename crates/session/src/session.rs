//! Vehicle session context

use crate::error::SessionError;
use crate::router::{Fanout, SampleRouter};
use crate::settings::SessionConfig;
use obd_protocol::transport::BoxedStream;
use obd_protocol::{
    initialize_stream, is_clear_acknowledged, mode, parse_dtc_response, CommandChannel, ObdError,
    Parameter, RawTrace, Sample, SharedChannel, TRACE_CAPACITY,
};
use pattern_analyzer::{PatternAnalysis, PatternAnalyzer};
use safety_monitor::{
    DtcAssessment, HealthAssessor, HealthReport, ProtectiveActionRequest, SafetyEvent, SafetyMonitor,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry_pipeline::{
    BroadcastSubscriber, ConnectionStatus, PipelineState, PipelineStats, TelemetryPipeline,
};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};
use tuning_advisor::{RecommendationEngine, TuningAdjustment, TuningReport};

/// Broadcast capacity for samples; lagging receivers lose the oldest
const SAMPLE_CAPACITY: usize = 256;

/// One connected adapter and its consumers
pub struct VehicleSession {
    channel: SharedChannel,
    pipeline: TelemetryPipeline,
    safety: Arc<Mutex<SafetyMonitor>>,
    analyzer: Arc<Mutex<PatternAnalyzer>>,
    advisor: RecommendationEngine,
    health: HealthAssessor,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    sample_tx: broadcast::Sender<Sample>,
    trace_tx: broadcast::Sender<RawTrace>,
    events: Fanout<SafetyEvent>,
    actions: Fanout<ProtectiveActionRequest>,
    adjustments: Fanout<TuningAdjustment>,
}

impl VehicleSession {
    /// Open the configured transport and initialize the adapter
    pub async fn connect(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let (trace_tx, _) = broadcast::channel(TRACE_CAPACITY);
        let channel = obd_protocol::connect(&config.transport, config.protocol, trace_tx.clone()).await?;
        Ok(Self::assemble(config, channel, trace_tx))
    }

    /// Initialize an adapter reachable over an already open stream
    pub async fn open(config: SessionConfig, stream: BoxedStream) -> Result<Self, SessionError> {
        let (trace_tx, _) = broadcast::channel(TRACE_CAPACITY);
        let channel = initialize_stream(stream, config.protocol, trace_tx.clone()).await?;
        Ok(Self::assemble(config, channel, trace_tx))
    }

    fn assemble(config: SessionConfig, channel: CommandChannel, trace_tx: broadcast::Sender<RawTrace>) -> Self {
        let channel = channel.shared();
        let (status_tx, _) = watch::channel(ConnectionStatus::Connected);
        let status_tx = Arc::new(status_tx);

        let safety = Arc::new(Mutex::new(SafetyMonitor::new(config.safety)));
        let analyzer = Arc::new(Mutex::new(PatternAnalyzer::new(config.analyzer)));
        let advisor = RecommendationEngine::new(config.advisor);
        let health = HealthAssessor::new(config.health);

        let pipeline = TelemetryPipeline::new(channel.clone(), config.pipeline)
            .with_status_sender(status_tx.clone());

        let (sample_tx, _) = broadcast::channel(SAMPLE_CAPACITY);
        let router = SampleRouter::new(safety.clone(), analyzer.clone(), advisor.clone());
        let events = router.events().clone();
        let actions = router.actions().clone();
        let adjustments = router.adjustments().clone();

        // Safety and analysis see each sample before the presentation layer does
        pipeline.add_subscriber(Box::new(router));
        pipeline.add_subscriber(Box::new(BroadcastSubscriber::new(sample_tx.clone())));

        info!("Vehicle session ready");
        Self {
            channel,
            pipeline,
            safety,
            analyzer,
            advisor,
            health,
            status_tx,
            sample_tx,
            trace_tx,
            events,
            actions,
            adjustments,
        }
    }

    pub fn subscribe_samples(&self) -> broadcast::Receiver<Sample> {
        self.sample_tx.subscribe()
    }

    pub fn subscribe_safety_events(&self) -> mpsc::UnboundedReceiver<SafetyEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_protective_actions(&self) -> mpsc::UnboundedReceiver<ProtectiveActionRequest> {
        self.actions.subscribe()
    }

    pub fn subscribe_adjustments(&self) -> mpsc::UnboundedReceiver<TuningAdjustment> {
        self.adjustments.subscribe()
    }

    /// Every command/response exchange; lagging receivers lose old lines
    pub fn subscribe_raw_trace(&self) -> broadcast::Receiver<RawTrace> {
        self.trace_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Poll the configured parameter set at the configured interval
    pub fn start_polling(&mut self) -> Result<(), SessionError> {
        self.pipeline.start_default()?;
        Ok(())
    }

    pub fn start_polling_with(
        &mut self,
        parameters: &[Parameter],
        interval: Duration,
    ) -> Result<(), SessionError> {
        self.pipeline.start(parameters, interval)?;
        Ok(())
    }

    /// Returns once the poll loop has finished. Safe to call repeatedly.
    pub async fn stop_polling(&mut self) {
        self.pipeline.stop().await;
    }

    pub fn polling_state(&self) -> PipelineState {
        self.pipeline.state()
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// Buffered samples, oldest first
    pub fn recent_samples(&self) -> Vec<Sample> {
        self.pipeline.snapshot()
    }

    /// Read stored trouble codes; queues behind any in-flight poll request
    pub async fn read_dtcs(&self) -> Result<DtcAssessment, SessionError> {
        let response = self.request(mode::READ_DTC).await?;
        let codes = parse_dtc_response(&response)?;
        info!("Read {} stored trouble code(s)", codes.len());

        let assessment = match self.safety.lock() {
            Ok(monitor) => monitor.assess_dtcs(&codes),
            // Assessment reads no alarm state
            Err(poisoned) => poisoned.into_inner().assess_dtcs(&codes),
        };
        Ok(assessment)
    }

    /// Clear stored trouble codes
    pub async fn clear_dtcs(&self) -> Result<(), SessionError> {
        let response = self.request(mode::CLEAR_DTC).await?;
        if is_clear_acknowledged(&response) {
            info!("Trouble codes cleared");
            Ok(())
        } else {
            warn!("Trouble code clear not acknowledged: {:?}", response.trim());
            Err(SessionError::ClearRejected(response.trim().to_string()))
        }
    }

    async fn request(&self, command: &str) -> Result<String, SessionError> {
        let result = self.channel.lock().await.send(command).await;
        if let Err(err) = &result {
            if matches!(err, ObdError::Transport(_)) {
                self.status_tx
                    .send_replace(ConnectionStatus::Failed(err.to_string()));
            }
        }
        Ok(result?)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status_tx.borrow().clone()
    }

    /// One human-readable line describing the link
    pub fn status_message(&self) -> String {
        self.connection_status().message()
    }

    /// Record what the actuation side did with a protective action request
    pub fn report_action_outcome(&self, request: &ProtectiveActionRequest, success: bool, detail: &str) {
        match self.safety.lock() {
            Ok(mut monitor) => monitor.record_action_outcome(request, success, detail),
            Err(err) => error!("Safety monitor lock poisoned: {}", err),
        }
    }

    /// Most recent driving analysis, if one has run
    pub fn latest_analysis(&self) -> Option<PatternAnalysis> {
        self.analyzer
            .lock()
            .ok()
            .and_then(|analyzer| analyzer.latest_analysis().cloned())
    }

    /// Style, adjustment and insights for the most recent analysis
    pub fn tuning_report(&self) -> Option<TuningReport> {
        self.latest_analysis()
            .map(|analysis| self.advisor.report(&analysis))
    }

    /// Turbo and fuel system health over the most recent samples
    pub fn health_report(&self) -> HealthReport {
        self.health.assess(&self.pipeline.recent(self.health.config().window()))
    }

    /// Stop polling, close the adapter and forget session state
    pub async fn disconnect(&mut self) {
        self.pipeline.stop().await;
        self.channel.lock().await.close().await;

        if let Ok(mut monitor) = self.safety.lock() {
            monitor.reset();
        }
        if let Ok(mut analyzer) = self.analyzer.lock() {
            analyzer.reset();
        }
        self.status_tx.send_replace(ConnectionStatus::Disconnected);
        info!("Vehicle session disconnected");
    }

    /// Whether the adapter channel is still open
    pub async fn is_open(&self) -> bool {
        self.channel.lock().await.is_open()
    }
}

impl std::fmt::Debug for VehicleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VehicleSession")
            .field("status", &self.connection_status())
            .field("polling", &self.pipeline.state())
            .finish()
    }
}
