//! Per-sample consumers running inside the poll loop

use obd_protocol::Sample;
use pattern_analyzer::PatternAnalyzer;
use safety_monitor::{ProtectiveActionRequest, SafetyEvent, SafetyMonitor};
use std::sync::{Arc, Mutex};
use telemetry_pipeline::SampleSubscriber;
use tokio::sync::mpsc;
use tracing::{debug, error};
use tuning_advisor::{RecommendationEngine, TuningAdjustment};

/// Delivers every item to every live subscriber over unbounded channels.
/// Closed receivers are pruned on the next send.
pub struct Fanout<T> {
    senders: Arc<Mutex<Vec<mpsc::UnboundedSender<T>>>>,
}

impl<T> Clone for Fanout<T> {
    fn clone(&self) -> Self {
        Self {
            senders: self.senders.clone(),
        }
    }
}

impl<T> Default for Fanout<T> {
    fn default() -> Self {
        Self {
            senders: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> Fanout<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.senders.lock() {
            Ok(mut senders) => senders.push(tx),
            Err(err) => error!("Subscriber list poisoned: {}", err),
        }
        rx
    }

    pub fn send(&self, item: &T) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.retain(|tx| tx.send(item.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().map(|senders| senders.len()).unwrap_or(0)
    }
}

/// Runs safety evaluation, then pattern ingestion and recommendation, on
/// every published sample
pub struct SampleRouter {
    safety: Arc<Mutex<SafetyMonitor>>,
    analyzer: Arc<Mutex<PatternAnalyzer>>,
    advisor: RecommendationEngine,
    events: Fanout<SafetyEvent>,
    actions: Fanout<ProtectiveActionRequest>,
    adjustments: Fanout<TuningAdjustment>,
}

impl SampleRouter {
    pub fn new(
        safety: Arc<Mutex<SafetyMonitor>>,
        analyzer: Arc<Mutex<PatternAnalyzer>>,
        advisor: RecommendationEngine,
    ) -> Self {
        Self {
            safety,
            analyzer,
            advisor,
            events: Fanout::new(),
            actions: Fanout::new(),
            adjustments: Fanout::new(),
        }
    }

    pub fn events(&self) -> &Fanout<SafetyEvent> {
        &self.events
    }

    pub fn actions(&self) -> &Fanout<ProtectiveActionRequest> {
        &self.actions
    }

    pub fn adjustments(&self) -> &Fanout<TuningAdjustment> {
        &self.adjustments
    }
}

impl SampleSubscriber for SampleRouter {
    fn on_sample(&mut self, sample: Sample) {
        let evaluation = match self.safety.lock() {
            Ok(mut monitor) => monitor.evaluate(&sample),
            Err(err) => {
                error!("Safety monitor lock poisoned: {}", err);
                return;
            }
        };
        for event in &evaluation.events {
            self.events.send(event);
        }
        for action in &evaluation.actions {
            self.actions.send(action);
        }

        let analysis = match self.analyzer.lock() {
            Ok(mut analyzer) => analyzer.ingest(&sample),
            Err(err) => {
                error!("Pattern analyzer lock poisoned: {}", err);
                None
            }
        };
        if let Some(adjustment) = analysis.and_then(|analysis| self.advisor.recommend(&analysis)) {
            debug!("Publishing tuning adjustment for {}", adjustment.parameter);
            self.adjustments.send(&adjustment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::Parameter;
    use safety_monitor::{AlarmLevel, ProtectiveAction};
    use tuning_advisor::Category;

    fn router() -> SampleRouter {
        SampleRouter::new(
            Arc::new(Mutex::new(SafetyMonitor::default())),
            Arc::new(Mutex::new(PatternAnalyzer::default())),
            RecommendationEngine::default(),
        )
    }

    #[test]
    fn test_fanout_prunes_closed_receivers() {
        let fanout: Fanout<u32> = Fanout::new();
        let mut kept = fanout.subscribe();
        let dropped = fanout.subscribe();
        drop(dropped);

        fanout.send(&7);
        assert_eq!(kept.try_recv().unwrap(), 7);
        assert_eq!(fanout.subscriber_count(), 1);
    }

    #[test]
    fn test_overboost_reaches_event_and_action_subscribers() {
        let mut router = router();
        let mut events = router.events().subscribe();
        let mut actions = router.actions().subscribe();

        for i in 0..5 {
            router.on_sample(Sample::new(i).with(Parameter::BoostPressure, 23.0));
        }

        let event = events.try_recv().unwrap();
        assert_eq!(event.level, AlarmLevel::Critical);
        assert_eq!(event.event, "overboost");
        assert!(events.try_recv().is_err());

        let action = actions.try_recv().unwrap();
        assert_eq!(action.action, ProtectiveAction::ReduceBoost);
        assert!(actions.try_recv().is_err());
    }

    #[test]
    fn test_adjustment_after_analysis_interval() {
        let mut router = router();
        let mut adjustments = router.adjustments().subscribe();

        for i in 0..99 {
            router.on_sample(
                Sample::new(i)
                    .with(Parameter::ThrottlePosition, 90.0)
                    .with(Parameter::Rpm, 5200.0),
            );
        }
        assert!(adjustments.try_recv().is_err());

        router.on_sample(
            Sample::new(99)
                .with(Parameter::ThrottlePosition, 90.0)
                .with(Parameter::Rpm, 5200.0),
        );
        let adjustment = adjustments.try_recv().unwrap();
        assert_eq!(adjustment.category, Category::Performance);
    }
}
