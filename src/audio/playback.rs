use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, StreamConfig};

/// Blocks of headroom kept on top of the delay before old audio is discarded.
const SLACK_BLOCKS: usize = 4;

/// Fixed-latency mono FIFO.
///
/// Starts with `delay` samples of silence. Holds at most `delay + slack`
/// samples; when the writer outruns the reader the oldest audio is dropped so
/// the delay cannot creep upward.
#[derive(Debug)]
pub struct DelayLine {
    buffer: VecDeque<f32>,
    capacity: usize,
    underruns: u64,
}

impl DelayLine {
    pub fn new(delay: usize, slack: usize) -> Self {
        let capacity = delay + slack.max(1);
        let mut buffer = VecDeque::with_capacity(capacity);
        buffer.resize(delay, 0.0);
        Self {
            buffer,
            capacity,
            underruns: 0,
        }
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    pub fn push(&mut self, samples: &[f32]) {
        self.buffer.extend(samples.iter().copied());
        let excess = self.buffer.len().saturating_sub(self.capacity);
        self.buffer.drain(..excess);
    }

    /// Fill `out` from the head of the line; missing samples are silence.
    pub fn pop_into(&mut self, out: &mut [f32]) {
        let available = out.len().min(self.buffer.len());
        for (dst, src) in out.iter_mut().zip(self.buffer.drain(..available)) {
            *dst = src;
        }
        if available < out.len() {
            out[available..].fill(0.0);
            self.underruns += 1;
        }
    }
}

/// Plays analysed audio on the default output device, `delay` behind the LEDs' input.
pub struct DelayedMonitor {
    line: Arc<Mutex<DelayLine>>,
    _stream: cpal::Stream,
}

impl DelayedMonitor {
    pub fn open(sample_rate: u32, delay: Duration, block_size: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default output device for delayed playback"))?;
        let default_config = device
            .default_output_config()
            .context("Failed to query output device configuration")?;

        let config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let delay_samples = (delay.as_secs_f64() * sample_rate as f64).round() as usize;
        let line = Arc::new(Mutex::new(DelayLine::new(
            delay_samples,
            block_size * SLACK_BLOCKS,
        )));

        let stream = match default_config.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, line.clone()),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, line.clone()),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, line.clone()),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, line.clone()),
            other => Err(anyhow!("Unsupported output sample format {:?}", other)),
        }?;
        stream.play().context("Failed to start delayed playback")?;

        log::info!(
            "Delayed monitor on '{}': {} ms behind",
            device.name().unwrap_or_default(),
            delay.as_millis()
        );

        Ok(Self {
            line,
            _stream: stream,
        })
    }

    pub fn feed(&self, block: &[f32]) {
        self.line
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(block);
    }

    pub fn underruns(&self) -> u64 {
        self.line
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .underruns()
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    line: Arc<Mutex<DelayLine>>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    let mut mono: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            mono.resize(data.len() / channels.max(1), 0.0);
            line.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_into(&mut mono);
            for (frame, &sample) in data.chunks_exact_mut(channels.max(1)).zip(mono.iter()) {
                frame.fill(T::from_sample(sample));
            }
        },
        |err| log::warn!("Delayed playback error: {}", err),
        None,
    )?;
    Ok(stream)
}
