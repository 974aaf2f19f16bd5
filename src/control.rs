//! Sense → decide → act.
//!
//! One frame in flight at a time: acquire, detect, decide, command, repeat.
//! The loop owns its frame source and pipeline; the actuator is moved into an
//! `ActuatorSession` for the duration of `run`, which guarantees a final stop
//! however the loop ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::actuate::{ActuationState, Actuator, ActuatorSession, Command};
use crate::detect::{Detection, DetectionBatch, DetectionPipeline, InferenceEngine};
use crate::error::{FrameSourceError, PilotError, UnknownClassError};
use crate::frame::FrameInfo;
use crate::ingest::FrameSource;

pub const DEFAULT_WATCHED_CLASS: &str = "stop sign";
pub const DEFAULT_THRESHOLD: f32 = 0.4;
pub const DEFAULT_FORWARD_SPEED: u8 = 20;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// What to do when the model reports a class id missing from the label table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownClassPolicy {
    /// Log it and treat the detection as not matching the watched class.
    #[default]
    Ignore,
    /// End the run with `UnknownClassError`.
    Fatal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ControlPolicy {
    pub watched_class: String,
    pub threshold: f32,
    pub forward_speed: u8,
    pub unknown_class: UnknownClassPolicy,
}

impl Default for ControlPolicy {
    fn default() -> Self {
        Self {
            watched_class: DEFAULT_WATCHED_CLASS.to_string(),
            threshold: DEFAULT_THRESHOLD,
            forward_speed: DEFAULT_FORWARD_SPEED,
            unknown_class: UnknownClassPolicy::Ignore,
        }
    }
}

/// Outcome of one sense/decide step.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub frame: FrameInfo,
    pub detections: DetectionBatch,
    pub triggered: bool,
    pub command: Command,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopEnd {
    /// The shutdown flag was raised.
    #[default]
    Shutdown,
    /// A finite frame source ran out of frames.
    SourceExhausted,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub cycles: u64,
    pub stop_commands: u64,
    pub forward_commands: u64,
    pub end: LoopEnd,
}

impl LoopSummary {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        match report.command.state() {
            ActuationState::Stopped => self.stop_commands += 1,
            ActuationState::Moving => self.forward_commands += 1,
        }
    }
}

pub struct ControlLoop<S: FrameSource, E: InferenceEngine> {
    source: S,
    pipeline: DetectionPipeline<E>,
    policy: ControlPolicy,
}

impl<S: FrameSource, E: InferenceEngine> ControlLoop<S, E> {
    /// `source` must already be connected.
    pub fn new(source: S, pipeline: DetectionPipeline<E>, policy: ControlPolicy) -> Self {
        if pipeline.labels().id_of(&policy.watched_class).is_none() {
            log::warn!(
                "watched class '{}' is not in the label table; the loop will never stop for it",
                policy.watched_class
            );
        }
        Self {
            source,
            pipeline,
            policy,
        }
    }

    pub fn policy(&self) -> &ControlPolicy {
        &self.policy
    }

    pub fn pipeline(&self) -> &DetectionPipeline<E> {
        &self.pipeline
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// True when any detection carries the watched class name.
    pub fn is_triggered(&self, detections: &[Detection]) -> Result<bool, UnknownClassError> {
        let mut triggered = false;
        for detection in detections {
            match self.pipeline.label_for(detection) {
                Ok(name) => triggered |= name == self.policy.watched_class,
                Err(err) => match self.policy.unknown_class {
                    UnknownClassPolicy::Ignore => {
                        log::warn!("ignoring detection: {}", err);
                    }
                    UnknownClassPolicy::Fatal => return Err(err),
                },
            }
        }
        Ok(triggered)
    }

    /// The command for a trigger decision.
    pub fn command_for(&self, triggered: bool) -> Command {
        if triggered {
            Command::Stop
        } else {
            Command::Forward(self.policy.forward_speed)
        }
    }

    /// Acquire one frame, detect and decide. Does not touch the actuator.
    pub fn cycle(&mut self) -> Result<CycleReport, PilotError> {
        let frame = self.source.next_frame()?;
        let detections = self.pipeline.run(&frame, self.policy.threshold)?;
        let triggered = self.is_triggered(&detections)?;
        let command = self.command_for(triggered);

        log::debug!(
            "frame {} ({} ms old): {} detections, triggered={}, command={:?}",
            frame.sequence,
            frame.age_ms(),
            detections.len(),
            triggered,
            command
        );

        Ok(CycleReport {
            frame: frame.info(),
            detections,
            triggered,
            command,
        })
    }

    /// Run cycles until `shutdown` is raised, the source runs dry or a cycle
    /// fails.
    ///
    /// The actuator is stopped before the first cycle and again on every way
    /// out of this function, including error returns and panics.
    pub fn run<A: Actuator>(
        &mut self,
        actuator: A,
        shutdown: &AtomicBool,
    ) -> Result<LoopSummary, PilotError> {
        let mut session = ActuatorSession::start(actuator)?;
        let mut summary = LoopSummary::default();
        let mut last_health_log = Instant::now();

        log::info!(
            "control loop running: watching '{}' at threshold {:.2}, forward speed {}",
            self.policy.watched_class,
            self.policy.threshold,
            self.policy.forward_speed
        );

        while !shutdown.load(Ordering::SeqCst) {
            let report = match self.cycle() {
                Ok(report) => report,
                Err(PilotError::FrameSource(FrameSourceError::Exhausted)) => {
                    log::info!("frame source {} exhausted", self.source.name());
                    summary.end = LoopEnd::SourceExhausted;
                    break;
                }
                Err(err) => {
                    log::error!("control cycle failed, stopping: {}", err);
                    return Err(err);
                }
            };

            // Interrupted while this cycle was in flight: do not act on it.
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            session.send(report.command)?;
            summary.record(&report);

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                log::info!(
                    "source={} health={} frames={} cycles={} stops={} state={:?}",
                    self.source.name(),
                    self.source.is_healthy(),
                    self.source.frames_captured(),
                    summary.cycles,
                    summary.stop_commands,
                    session.state()
                );
                last_health_log = Instant::now();
            }
        }

        session.finish()?;
        log::info!(
            "control loop ended ({:?}) after {} cycles",
            summary.end,
            summary.cycles
        );
        Ok(summary)
    }
}
