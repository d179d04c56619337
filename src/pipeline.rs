//! Per-packet orchestration: decode, extract, update every present electrode
//! concurrently, arbitrate, signal.
//!
//! # Concurrency
//!
//! Electrode state lives in a fixed arena built once from validated
//! locations.  Each electrode keeps its remedian and its detection window
//! behind separate locks, and every task spawned for a packet locks only the
//! half it owns:
//!
//! * the baseline task feeds the snippet into the remedian;
//! * the detection task subtracts the baseline as it stood *before* this
//!   packet (snapshotted at spawn time) and pushes the result into the window.
//!
//! All tasks of a packet run in one [`JoinSet`] that is drained completely
//! before the arbiter reads any weight.  The next packet is not touched until
//! that barrier is met, so per electrode the updates apply strictly in arrival
//! order.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::arbiter::Arbiter;
use crate::config::validate_locations;
use crate::detection::DetectionWindow;
use crate::error::{ConfigError, PipelineError};
use crate::link::Actuator;
use crate::parse::{decode_packet, extract_snippet};
use crate::recorder::Recorder;
use crate::remedian::BaselineEstimator;
use crate::types::{DetectionResult, PacketContext, PacketOutcome, PixelRow, Snippet};

// ── Electrode arena ──────────────────────────────────────────────────────────

/// One sensing position and the state that tracks it.
#[derive(Debug)]
pub struct Electrode {
    pub index: usize,
    /// Sample offset of the electrode center in the logical stream.
    pub location: usize,
    baseline: Arc<Mutex<BaselineEstimator>>,
    window: Arc<Mutex<DetectionWindow>>,
}

impl Electrode {
    fn new(index: usize, location: usize) -> Self {
        Self {
            index,
            location,
            baseline: Arc::new(Mutex::new(BaselineEstimator::new())),
            window: Arc::new(Mutex::new(DetectionWindow::new())),
        }
    }

    /// Last offset-0 weight.
    pub fn weight(&self) -> Result<i16, PipelineError> {
        Ok(lock_state(&self.window, self.index)?.weight())
    }

    /// Copy of the current per-pixel baseline.
    pub fn baseline(&self) -> Result<PixelRow, PipelineError> {
        Ok(*lock_state(&self.baseline, self.index)?.baseline())
    }

    /// Copy of the detection window.
    pub fn window(&self) -> Result<DetectionWindow, PipelineError> {
        Ok(lock_state(&self.window, self.index)?.clone())
    }
}

/// Lock one half of an electrode's state.
///
/// A poisoned lock means a task panicked mid-update; the state is not
/// trusted afterwards and every access reports it.
fn lock_state<T>(state: &Mutex<T>, electrode: usize) -> Result<MutexGuard<'_, T>, PipelineError> {
    state
        .lock()
        .map_err(|_| PipelineError::TaskFailed(format!("electrode {electrode} state is poisoned")))
}

// ── State machine ────────────────────────────────────────────────────────────

/// Stage the pipeline is in for the packet being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Decoding,
    Extracting,
    ProcessingElectrodes,
    Arbitrating,
    Signaling,
}

/// Counters kept over the lifetime of a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Buffers handed to [`PacketPipeline::process_packet`].
    pub packets: u64,
    /// Buffers rejected by the codec or the snippet extractor.
    pub malformed: u64,
    /// Packets that failed after decoding (task, actuator, or recorder error).
    pub failed: u64,
    /// Detections signalled to the actuator.
    pub detections: u64,
}

/// Result of one per-electrode task.
enum ElectrodeWork {
    Baseline { electrode: usize, baseline: PixelRow },
    Weight { electrode: usize, weight: i16 },
}

// ── PacketPipeline ───────────────────────────────────────────────────────────

pub struct PacketPipeline<A> {
    electrodes: Vec<Electrode>,
    arbiter: Arbiter,
    actuator: A,
    recorder: Recorder,
    state: PipelineState,
    stats: PipelineStats,
}

impl<A: Actuator> PacketPipeline<A> {
    /// Build the electrode arena from `locations` (sample offsets).
    ///
    /// Fails if any location would put its window outside a packet.
    pub fn new(
        locations: &[usize],
        arbiter: Arbiter,
        actuator: A,
        recorder: Recorder,
    ) -> Result<Self, ConfigError> {
        validate_locations(locations)?;
        let electrodes = locations
            .iter()
            .enumerate()
            .map(|(index, &location)| Electrode::new(index, location))
            .collect();
        Ok(Self {
            electrodes,
            arbiter,
            actuator,
            recorder,
            state: PipelineState::Idle,
            stats: PipelineStats::default(),
        })
    }

    pub fn electrodes(&self) -> &[Electrode] {
        &self.electrodes
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    fn enter(&mut self, state: PipelineState) {
        trace!("pipeline: {:?} → {:?}", self.state, state);
        self.state = state;
    }

    /// Consume packets until the channel closes, logging per-packet failures.
    pub async fn run(&mut self, mut packets: mpsc::Receiver<Vec<u8>>) -> PipelineStats {
        while let Some(buffer) = packets.recv().await {
            match self.process_packet(&buffer).await {
                Ok(PacketOutcome {
                    detection: Some(d), ..
                }) => {
                    info!(
                        "particle on electrode {} (frame {}, weight {}{})",
                        d.electrode,
                        d.frame_id,
                        d.weight,
                        if d.resolved_by_narrowing { ", narrowed" } else { "" }
                    );
                }
                Ok(outcome) => {
                    debug!(
                        "frame {} segment {}: electrodes {:?}, no detection",
                        outcome.frame_id, outcome.segment, outcome.electrodes
                    );
                }
                Err(PipelineError::Packet(e)) => warn!("packet skipped: {e}"),
                Err(e) => error!("packet failed: {e}"),
            }
        }
        self.finish()
    }

    /// Flush every recorder sink and return the final counters.
    pub fn finish(&mut self) -> PipelineStats {
        if let Err(e) = self.recorder.flush() {
            error!("flushing recorder: {e}");
        }
        self.stats
    }

    /// Process one wire packet end to end.
    ///
    /// A malformed buffer is rejected before any electrode state is touched.
    /// Whatever happens, the pipeline is back in [`PipelineState::Idle`] when
    /// this returns.
    pub async fn process_packet(&mut self, buffer: &[u8]) -> Result<PacketOutcome, PipelineError> {
        self.stats.packets += 1;
        let result = self.advance(buffer).await;
        match &result {
            Err(PipelineError::Packet(_)) => self.stats.malformed += 1,
            Err(_) => self.stats.failed += 1,
            Ok(outcome) if outcome.detection.is_some() => self.stats.detections += 1,
            Ok(_) => {}
        }
        self.enter(PipelineState::Idle);
        result
    }

    async fn advance(&mut self, buffer: &[u8]) -> Result<PacketOutcome, PipelineError> {
        self.enter(PipelineState::Decoding);
        let context = decode_packet(buffer)?;
        self.recorder.capture(&context)?;

        self.enter(PipelineState::Extracting);
        let mut snippets = Vec::new();
        for electrode in &self.electrodes {
            if let Some(snippet) = extract_snippet(electrode.index, electrode.location, &context)? {
                snippets.push(snippet);
            }
        }
        let electrodes: Vec<usize> = snippets.iter().map(|s| s.electrode).collect();

        let mut outcome = PacketOutcome {
            frame_id: context.frame_id,
            segment: context.segment,
            electrodes,
            detection: None,
        };
        if snippets.is_empty() {
            return Ok(outcome);
        }

        self.enter(PipelineState::ProcessingElectrodes);
        self.process_electrodes(&context, &snippets).await?;

        self.enter(PipelineState::Arbitrating);
        let Some(detection) = self.arbitrate(context.frame_id, &outcome.electrodes)? else {
            return Ok(outcome);
        };

        self.enter(PipelineState::Signaling);
        self.actuator
            .signal(detection.electrode as u8)
            .await
            .map_err(PipelineError::Actuator)?;
        let location = self.electrodes[detection.electrode].location;
        self.recorder.particle(&detection, location)?;

        outcome.detection = Some(detection);
        Ok(outcome)
    }

    /// Spawn the baseline and detection task of every snippet and wait for
    /// all of them.
    async fn process_electrodes(
        &mut self,
        context: &PacketContext,
        snippets: &[Snippet],
    ) -> Result<(), PipelineError> {
        let mut tasks = JoinSet::new();
        let mut previous = Vec::with_capacity(snippets.len());

        for snippet in snippets {
            let electrode = &self.electrodes[snippet.electrode];
            let before = *lock_state(&electrode.baseline, electrode.index)?.baseline();
            previous.push(before);

            let index = electrode.index;
            let samples = snippet.samples;

            let estimator = Arc::clone(&electrode.baseline);
            tasks.spawn(async move {
                let baseline = lock_state(&estimator, index)?.update_snippet(&samples);
                Ok::<_, PipelineError>(ElectrodeWork::Baseline {
                    electrode: index,
                    baseline,
                })
            });

            let window = Arc::clone(&electrode.window);
            tasks.spawn(async move {
                let weight = lock_state(&window, index)?.ingest(&samples, &before);
                Ok::<_, PipelineError>(ElectrodeWork::Weight {
                    electrode: index,
                    weight,
                })
            });
        }

        // Drain every task before reporting, so no task of this packet can
        // still be running when the caller moves on.
        let mut failure = None;
        let mut updated = Vec::with_capacity(snippets.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(ElectrodeWork::Baseline { electrode, baseline })) => {
                    updated.push((electrode, baseline));
                }
                Ok(Ok(ElectrodeWork::Weight { electrode, weight })) => {
                    trace!("frame {}: electrode {electrode} weight {weight}", context.frame_id);
                }
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(PipelineError::TaskFailed(e.to_string()));
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        for (snippet, before) in snippets.iter().zip(&previous) {
            self.recorder.snippet(context, snippet, before)?;
        }
        updated.sort_by_key(|(electrode, _)| *electrode);
        for (electrode, baseline) in &updated {
            self.recorder.remedian(*electrode, baseline)?;
        }
        Ok(())
    }

    /// Run the arbiter over the electrodes refreshed by this packet.
    ///
    /// Electrodes carried by other segments keep their last weight, but it
    /// was already arbitrated on their own packet; here they count as zero.
    fn arbitrate(
        &self,
        frame_id: u32,
        present: &[usize],
    ) -> Result<Option<DetectionResult>, PipelineError> {
        let mut windows = Vec::with_capacity(self.electrodes.len());
        for electrode in &self.electrodes {
            windows.push(if present.contains(&electrode.index) {
                Some(lock_state(&electrode.window, electrode.index)?)
            } else {
                None
            });
        }
        let weights: Vec<i16> = windows
            .iter()
            .map(|w| w.as_ref().map_or(0, |w| w.weight()))
            .collect();
        Ok(self.arbiter.arbitrate(frame_id, &weights, |e, offset| {
            windows[e].as_ref().and_then(|w| w.weight_at(offset))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::SerialActuator;
    use crate::protocol::{PACKET_LENGTH, SNIPPET_DEPTH, WIDTH, WINDOW_WIDTH};

    fn pipeline(locations: &[usize]) -> PacketPipeline<SerialActuator<Vec<u8>>> {
        PacketPipeline::new(
            locations,
            Arbiter::default(),
            SerialActuator::new(Vec::new()),
            Recorder::disabled(),
        )
        .unwrap()
    }

    /// A segment-1 packet with `value` written around sample `location`.
    fn packet(frame: u32, location: usize, value: i16) -> Vec<u8> {
        let mut buf = vec![0u8; PACKET_LENGTH];
        buf[..4].copy_from_slice(&frame.to_be_bytes());
        buf[4] = 1;
        let start = location * 2 - 2 * WIDTH;
        for i in 0..WINDOW_WIDTH {
            let [hi, lo] = value.to_be_bytes();
            buf[start + 2 * i] = lo;
            buf[start + 2 * i + 1] = hi;
        }
        buf
    }

    #[tokio::test]
    async fn rejects_short_packet_without_touching_state() {
        let mut p = pipeline(&[100]);
        p.process_packet(&packet(0, 100, 2000)).await.unwrap();
        let weight = p.electrodes()[0].weight().unwrap();
        let baseline = p.electrodes()[0].baseline().unwrap();

        let err = p.process_packet(&[0u8; 10]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Packet(_)));
        assert_eq!(p.electrodes()[0].weight().unwrap(), weight);
        assert_eq!(p.electrodes()[0].baseline().unwrap(), baseline);
        assert_eq!(p.state(), PipelineState::Idle);
        assert_eq!(p.stats().malformed, 1);
        assert_eq!(p.stats().packets, 2);
    }

    #[tokio::test]
    async fn single_electrode_detection_signals_its_index() {
        let mut p = pipeline(&[100, 300]);
        let outcome = p.process_packet(&packet(5, 300, 31000)).await.unwrap();
        assert_eq!(outcome.electrodes, vec![0, 1]);
        let detection = outcome.detection.unwrap();
        assert_eq!(detection.electrode, 1);
        assert_eq!(detection.frame_id, 5);
        assert_eq!(detection.weight, (31000 / SNIPPET_DEPTH as i32) as i16);
        assert!(!detection.resolved_by_narrowing);
        assert_eq!(p.actuator().get_ref(), &vec![1u8]);
        assert_eq!(p.stats().detections, 1);
    }

    #[tokio::test]
    async fn quiet_packet_has_no_detection() {
        let mut p = pipeline(&[100]);
        let outcome = p.process_packet(&packet(1, 100, 10)).await.unwrap();
        assert_eq!(outcome.detection, None);
        assert!(p.actuator().get_ref().is_empty());
    }

    #[tokio::test]
    async fn absent_electrodes_are_not_processed() {
        // 600 samples → byte 1200, carried by segment 2.
        let mut p = pipeline(&[100, 600]);
        let outcome = p.process_packet(&packet(1, 100, 500)).await.unwrap();
        assert_eq!(outcome.electrodes, vec![0]);
        assert_eq!(p.electrodes()[1].window().unwrap().frames()[0], [0; WINDOW_WIDTH]);
        assert_eq!(p.electrodes()[1].weight().unwrap(), 0);
    }

    #[tokio::test]
    async fn detection_uses_baseline_from_before_the_packet() {
        let mut p = pipeline(&[100]);
        for frame in 0..3 {
            p.process_packet(&packet(frame, 100, 40)).await.unwrap();
        }
        // The remedian has not reached its deepest layer yet, so the
        // subtracted frames are the raw values.
        let window = p.electrodes()[0].window().unwrap();
        assert_eq!(window.frames()[0], [40; WINDOW_WIDTH]);
        assert_eq!(window.frames()[2], [40; WINDOW_WIDTH]);
        assert_eq!(window.frames()[3], [0; WINDOW_WIDTH]);
    }

    #[tokio::test]
    async fn arbitration_ignores_electrodes_outside_the_packet() {
        // 600 samples → byte 1200, carried by segment 2.
        let mut p = pipeline(&[100, 600]);
        let first = p.process_packet(&packet(1, 100, 31000)).await.unwrap();
        assert_eq!(first.detection.map(|d| d.electrode), Some(0));

        let mut seg2 = vec![0u8; PACKET_LENGTH];
        seg2[..4].copy_from_slice(&1u32.to_be_bytes());
        seg2[4] = 2;
        let second = p.process_packet(&seg2).await.unwrap();
        assert_eq!(second.electrodes, vec![1]);
        assert_eq!(second.detection, None);
        assert_eq!(p.actuator().get_ref(), &vec![0u8]);
    }

    #[tokio::test]
    async fn poisoned_electrode_state_is_reported_everywhere() {
        let mut p = pipeline(&[100]);
        let window = Arc::clone(&p.electrodes()[0].window);
        let _ = std::thread::spawn(move || {
            let _guard = window.lock().unwrap();
            panic!("window update panicked");
        })
        .join();

        assert!(matches!(p.electrodes()[0].weight(), Err(PipelineError::TaskFailed(_))));
        assert!(matches!(p.electrodes()[0].window(), Err(PipelineError::TaskFailed(_))));
        let err = p.process_packet(&packet(1, 100, 40)).await.unwrap_err();
        assert!(matches!(err, PipelineError::TaskFailed(_)));
        assert_eq!(p.stats().failed, 1);
        assert_eq!(p.state(), PipelineState::Idle);
    }

    #[test]
    fn invalid_locations_are_rejected() {
        let result = PacketPipeline::new(
            &[3],
            Arbiter::default(),
            SerialActuator::new(Vec::new()),
            Recorder::disabled(),
        );
        assert!(matches!(result, Err(ConfigError::LocationOutOfBounds { .. })));
    }
}
