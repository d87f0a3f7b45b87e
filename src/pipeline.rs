use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use crate::audio::analysis::SpectrumAnalyzer;
use crate::audio::playback::DelayedMonitor;
use crate::audio::source::{AudioSource, CaptureError};
use crate::input::{Command, CommandSource};
use crate::render::modes::Renderer;
use crate::transport::udp::FrameSender;

const FPS_WINDOW: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Quit key.
    Quit,
    /// Process interrupt.
    Interrupted,
    /// The audio source ran out (file playback).
    EndOfStream,
}

#[derive(Clone, Debug, Default)]
pub struct FrameStats {
    pub frames_sent: u64,
    pub blocks_skipped: u64,
    pub send_failures: u64,
    pub fps: f32,
}

/// Logs the first failure of a streak at `warn` and the rest at `debug`.
#[derive(Default)]
struct FailureStreak {
    count: u64,
}

impl FailureStreak {
    fn fail(&mut self, what: &str, err: &dyn std::fmt::Display) {
        if self.count == 0 {
            log::warn!("{}: {}", what, err);
        } else {
            log::debug!("{} ({} in a row): {}", what, self.count + 1, err);
        }
        self.count += 1;
    }

    fn recover(&mut self, what: &str) {
        if self.count > 1 {
            log::info!("{} recovered after {} failures", what, self.count);
        }
        self.count = 0;
    }
}

struct FpsMeter {
    window_start: Instant,
    frames: u32,
}

impl FpsMeter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
        }
    }

    /// Count a frame; returns the new rate once per window.
    fn tick(&mut self) -> Option<f32> {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed < FPS_WINDOW {
            return None;
        }
        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.window_start = Instant::now();
        self.frames = 0;
        Some(fps)
    }
}

/// The capture loop: read, analyse, render and send one frame per audio block.
///
/// Whichever way the loop ends, the display gets an `EXIT` datagram exactly
/// once, at the latest when the pipeline is dropped.
pub struct Pipeline {
    analyzer: SpectrumAnalyzer,
    renderer: Renderer,
    sender: FrameSender,
    monitor: Option<DelayedMonitor>,
    stop: Arc<AtomicBool>,
    show_status: bool,
    stats: FrameStats,
    exit_sent: bool,
}

impl Pipeline {
    pub fn new(analyzer: SpectrumAnalyzer, renderer: Renderer, sender: FrameSender) -> Self {
        Self {
            analyzer,
            renderer,
            sender,
            monitor: None,
            stop: Arc::new(AtomicBool::new(false)),
            show_status: false,
            stats: FrameStats::default(),
            exit_sent: false,
        }
    }

    pub fn with_monitor(mut self, monitor: DelayedMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Loop stops at the next block once `stop` is set.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_status(mut self, show: bool) -> Self {
        self.show_status = show;
        self
    }

    pub fn analyzer(&self) -> &SpectrumAnalyzer {
        &self.analyzer
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn run<S, C>(&mut self, source: &mut S, commands: &mut C) -> Result<StopReason>
    where
        S: AudioSource + ?Sized,
        C: CommandSource + ?Sized,
    {
        let progress = self.status_bar(source.total_blocks());
        let result = self.run_loop(source, commands, &progress);
        progress.finish_and_clear();
        self.shutdown();
        result
    }

    fn run_loop<S, C>(
        &mut self,
        source: &mut S,
        commands: &mut C,
        progress: &ProgressBar,
    ) -> Result<StopReason>
    where
        S: AudioSource + ?Sized,
        C: CommandSource + ?Sized,
    {
        let mut block = Vec::new();
        let mut capture_streak = FailureStreak::default();
        let mut send_streak = FailureStreak::default();
        let mut fps = FpsMeter::new();
        self.update_status(progress);

        loop {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(StopReason::Interrupted);
            }

            while let Some(command) = commands.poll_command() {
                if command == Command::Quit {
                    return Ok(StopReason::Quit);
                }
                if let Some(message) = self.apply(command) {
                    announce(progress, &message);
                }
                self.update_status(progress);
            }

            match source.read_block(&mut block) {
                Ok(true) => capture_streak.recover("Audio capture"),
                Ok(false) => return Ok(StopReason::EndOfStream),
                Err(err) if err.is_transient() => {
                    self.stats.blocks_skipped += 1;
                    capture_streak.fail("Skipping audio block", &err);
                    continue;
                }
                Err(err) => return Err(fatal(err)),
            }

            if let Some(monitor) = &self.monitor {
                monitor.feed(&block);
            }

            let spectrum = self.analyzer.analyze(&block);
            let frame = self.renderer.render(&spectrum);
            match self.sender.send(frame) {
                Ok(()) => {
                    self.stats.frames_sent += 1;
                    send_streak.recover("Frame send");
                }
                Err(err) => {
                    self.stats.send_failures += 1;
                    send_streak.fail("Frame send failed", &err);
                }
            }

            progress.inc(1);
            if let Some(rate) = fps.tick() {
                self.stats.fps = rate;
                self.update_status(progress);
            }
        }
    }

    /// Applies a key command and returns the line to report, if any.
    fn apply(&mut self, command: Command) -> Option<String> {
        match command {
            Command::SetMode(mode) => {
                self.renderer.set_mode(mode);
                Some(format!("Mode: {}", mode.name()))
            }
            Command::SetCurve(curve) => {
                self.analyzer.set_curve(curve);
                Some(format!("Amplitude curve: {}", curve.name()))
            }
            Command::CycleScheme => {
                let scheme = self.renderer.cycle_scheme();
                Some(format!("Color scheme: {}", scheme.name()))
            }
            Command::Quit => None,
        }
    }

    fn status_bar(&self, total_blocks: Option<u64>) -> ProgressBar {
        if !self.show_status {
            return ProgressBar::hidden();
        }
        match total_blocks {
            Some(total) => {
                let pb = ProgressBar::new(total);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=>-"),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner} [{elapsed_precise}] {pos} frames {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb.enable_steady_tick(Duration::from_millis(250));
                pb
            }
        }
    }

    fn update_status(&self, progress: &ProgressBar) {
        if progress.is_hidden() {
            return;
        }
        progress.set_message(format!(
            "| {:.1} fps | {} | {} | {} | skipped {}",
            self.stats.fps,
            self.renderer.mode().name(),
            self.renderer.scheme().name(),
            self.analyzer.curve().name(),
            self.stats.blocks_skipped,
        ));
    }

    fn shutdown(&mut self) {
        if self.exit_sent {
            return;
        }
        self.exit_sent = true;
        if let Some(monitor) = &self.monitor {
            let underruns = monitor.underruns();
            if underruns > 0 {
                log::info!("Delayed playback ran dry {} times", underruns);
            }
        }
        match self.sender.send_exit() {
            Ok(()) => log::debug!("Sent EXIT to {}", self.sender.target()),
            Err(err) => log::warn!("Failed to send EXIT: {}", err),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reports a key command. A visible status line already shows the new
/// state, and raw-mode output has no carriage return, so logging stays at
/// debug there.
fn announce(progress: &ProgressBar, message: &str) {
    if progress.is_hidden() {
        log::info!("{}", message);
    } else {
        log::debug!("{}", message);
    }
}

fn fatal(err: CaptureError) -> anyhow::Error {
    anyhow::Error::new(err).context("Audio capture failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analysis::AnalyzerSettings;
    use crate::render::color::ColorScheme;
    use crate::render::mapper::Geometry;
    use crate::render::modes::Mode;
    use std::collections::VecDeque;
    use std::net::UdpSocket;

    struct ToneSource {
        blocks: usize,
        produced: usize,
        glitch_at: Option<usize>,
        disconnect_at: Option<usize>,
    }

    impl ToneSource {
        fn new(blocks: usize) -> Self {
            Self {
                blocks,
                produced: 0,
                glitch_at: None,
                disconnect_at: None,
            }
        }
    }

    impl AudioSource for ToneSource {
        fn sample_rate(&self) -> u32 {
            44100
        }

        fn channels(&self) -> u16 {
            1
        }

        fn read_block(&mut self, block: &mut Vec<f32>) -> Result<bool, CaptureError> {
            let n = self.produced;
            self.produced += 1;
            if self.glitch_at == Some(n) {
                return Err(CaptureError::Stream("overrun".into()));
            }
            if self.disconnect_at == Some(n) {
                return Err(CaptureError::Disconnected);
            }
            if n >= self.blocks {
                return Ok(false);
            }
            block.clear();
            block.extend((0..1024).map(|i| {
                let t = i as f32 / 44100.0;
                0.8 * (2.0 * std::f32::consts::PI * 1000.0 * t).sin()
            }));
            Ok(true)
        }
    }

    /// Commands handed out per loop iteration.
    struct Script {
        frames: VecDeque<Vec<Command>>,
        pending: VecDeque<Command>,
        started: bool,
    }

    impl Script {
        fn new(frames: Vec<Vec<Command>>) -> Self {
            Self {
                frames: frames.into(),
                pending: VecDeque::new(),
                started: false,
            }
        }
    }

    impl CommandSource for Script {
        fn poll_command(&mut self) -> Option<Command> {
            if !self.started {
                self.pending = self.frames.pop_front().unwrap_or_default().into();
                self.started = true;
            }
            let next = self.pending.pop_front();
            if next.is_none() {
                self.started = false;
            }
            next
        }
    }

    fn setup() -> (Pipeline, UdpSocket) {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        rx.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let port = rx.local_addr().unwrap().port();

        let geometry = Geometry::default();
        let analyzer = SpectrumAnalyzer::new(AnalyzerSettings {
            sample_rate: 44100,
            ..AnalyzerSettings::default()
        });
        let renderer = Renderer::new(geometry, 0.3, Mode::Bars, ColorScheme::Rainbow);
        let sender = FrameSender::new("127.0.0.1", port, geometry.max_leds).unwrap();
        (Pipeline::new(analyzer, renderer, sender), rx)
    }

    /// Datagram sizes up to and including EXIT.
    fn drain(rx: &UdpSocket) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = rx.recv(&mut buf).unwrap();
            if &buf[..n] == b"EXIT" {
                return sizes;
            }
            sizes.push(n);
        }
    }

    #[test]
    fn file_like_source_runs_to_end() {
        let (mut pipeline, rx) = setup();
        let reason = pipeline
            .run(&mut ToneSource::new(5), &mut Script::new(vec![]))
            .unwrap();
        assert_eq!(reason, StopReason::EndOfStream);
        assert_eq!(pipeline.stats().frames_sent, 5);
        assert_eq!(drain(&rx), vec![3072; 5]);
    }

    #[test]
    fn transient_glitch_skips_one_block() {
        let (mut pipeline, rx) = setup();
        let mut source = ToneSource::new(4);
        source.glitch_at = Some(1);
        pipeline.run(&mut source, &mut Script::new(vec![])).unwrap();
        assert_eq!(pipeline.stats().blocks_skipped, 1);
        assert_eq!(drain(&rx).len(), 3);
    }

    #[test]
    fn disconnect_is_fatal_but_exit_is_sent() {
        let (mut pipeline, rx) = setup();
        let mut source = ToneSource::new(10);
        source.disconnect_at = Some(2);
        let err = pipeline.run(&mut source, &mut Script::new(vec![])).unwrap_err();
        assert!(format!("{:#}", err).contains("disconnected"));
        assert_eq!(drain(&rx).len(), 2);
    }

    #[test]
    fn keys_switch_state_between_frames() {
        let (mut pipeline, rx) = setup();
        let script = vec![
            vec![],
            vec![
                Command::SetMode(Mode::Spectrogram),
                Command::SetCurve(crate::audio::features::AmplitudeCurve::Db),
            ],
            vec![Command::CycleScheme],
            vec![Command::Quit],
        ];
        let reason = pipeline
            .run(&mut ToneSource::new(100), &mut Script::new(script))
            .unwrap();
        assert_eq!(reason, StopReason::Quit);
        assert_eq!(pipeline.renderer().mode(), Mode::Spectrogram);
        assert_eq!(pipeline.renderer().scheme(), ColorScheme::Fire);
        assert_eq!(
            pipeline.analyzer().curve(),
            crate::audio::features::AmplitudeCurve::Db
        );
        assert_eq!(drain(&rx).len(), 3);
    }

    #[test]
    fn commands_report_the_new_state() {
        let (mut pipeline, _rx) = setup();
        assert_eq!(
            pipeline.apply(Command::SetMode(Mode::Wave)).as_deref(),
            Some("Mode: wave")
        );
        let expected = format!("Color scheme: {}", ColorScheme::Rainbow.next().name());
        assert_eq!(pipeline.apply(Command::CycleScheme), Some(expected));
        assert_eq!(pipeline.apply(Command::Quit), None);
        assert_eq!(pipeline.renderer().mode(), Mode::Wave);
    }

    #[test]
    fn interrupt_stops_before_next_block() {
        let (pipeline, rx) = setup();
        let stop = Arc::new(AtomicBool::new(true));
        let mut pipeline = pipeline.with_stop_flag(stop);
        let reason = pipeline
            .run(&mut ToneSource::new(10), &mut Script::new(vec![]))
            .unwrap();
        assert_eq!(reason, StopReason::Interrupted);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn exit_is_sent_once() {
        let (mut pipeline, rx) = setup();
        pipeline
            .run(&mut ToneSource::new(1), &mut Script::new(vec![]))
            .unwrap();
        drop(pipeline);
        assert_eq!(drain(&rx).len(), 1);
        rx.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let mut buf = [0u8; 16];
        assert!(rx.recv(&mut buf).is_err());
    }

    #[test]
    fn dropping_an_unrun_pipeline_sends_exit() {
        let (pipeline, rx) = setup();
        drop(pipeline);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn tone_frame_lights_its_band() {
        let (mut pipeline, _rx) = setup();
        pipeline
            .run(&mut ToneSource::new(1), &mut Script::new(vec![]))
            .unwrap();
        let heights = &pipeline.analyzer().state().prev_heights;
        let loudest = heights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(loudest, Some(17));
        assert!(pipeline.renderer().frame().lit_count() > 0);
    }
}
