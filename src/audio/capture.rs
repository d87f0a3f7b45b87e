use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, StreamConfig};

use super::source::{downmix, AudioSource, CaptureError};

/// PulseAudio/PipeWire monitor of the sink set up for the visualizer.
const PREFERRED_MONITOR: &str = "visualizer_sink.monitor";
const MONITOR_HINT: &str = "monitor";

#[derive(Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub is_monitor: bool,
}

pub fn list_devices() -> Result<Vec<DeviceInfo>, CaptureError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::Open(e.to_string()))?;

    Ok(devices
        .filter_map(|d| d.name().ok())
        .map(|name| DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            is_monitor: name.to_lowercase().contains(MONITOR_HINT),
            name,
        })
        .collect())
}

/// Pick a capture device by name.
///
/// `requested` matches as a case-insensitive substring, `"default"` means the
/// host default. Without a request only monitor devices qualify, the
/// visualizer sink's monitor first.
pub fn choose_device(names: &[String], requested: Option<&str>) -> Option<usize> {
    let lower: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
    match requested {
        Some(wanted) => {
            let wanted = wanted.to_lowercase();
            lower.iter().position(|n| n.contains(&wanted))
        }
        None => lower
            .iter()
            .position(|n| n.contains(PREFERRED_MONITOR))
            .or_else(|| lower.iter().position(|n| n.contains(MONITOR_HINT))),
    }
}

fn open_device(requested: Option<&str>) -> Result<Device, CaptureError> {
    let host = cpal::default_host();
    if requested.is_some_and(|r| r.eq_ignore_ascii_case("default")) {
        return host
            .default_input_device()
            .ok_or(CaptureError::NoDevice(Some("default".into())));
    }

    let devices: Vec<Device> = host
        .input_devices()
        .map_err(|e| CaptureError::Open(e.to_string()))?
        .collect();
    let names: Vec<String> = devices
        .iter()
        .map(|d| d.name().unwrap_or_default())
        .collect();

    let idx = choose_device(&names, requested)
        .ok_or_else(|| CaptureError::NoDevice(requested.map(str::to_string)))?;
    devices
        .into_iter()
        .nth(idx)
        .ok_or_else(|| CaptureError::NoDevice(requested.map(str::to_string)))
}

enum Fault {
    Glitch(String),
    Disconnected,
}

/// Hand-off between the audio callback and the capture loop.
///
/// Holds at most one complete block; a newer block replaces an unread one so
/// latency stays at one block no matter how late the reader is.
#[derive(Default)]
struct BlockSlot {
    block_size: usize,
    pending: Vec<f32>,
    ready: Option<Vec<f32>>,
    spare: Option<Vec<f32>>,
    dropped: u64,
    fault: Option<Fault>,
}

impl BlockSlot {
    fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            pending: Vec::with_capacity(block_size * 2),
            ..Self::default()
        }
    }

    fn push_mono(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.block_size {
            let mut block = self.spare.take().unwrap_or_default();
            block.clear();
            block.extend(self.pending.drain(..self.block_size));
            if let Some(stale) = self.ready.replace(block) {
                self.spare = Some(stale);
                self.dropped += 1;
            }
        }
    }

    fn has_news(&self) -> bool {
        self.ready.is_some() || self.fault.is_some()
    }

    /// Swap the ready block into `out`. Disconnection outranks data.
    fn take(&mut self, out: &mut Vec<f32>) -> Option<Result<(), CaptureError>> {
        if matches!(self.fault, Some(Fault::Disconnected)) {
            return Some(Err(CaptureError::Disconnected));
        }
        if let Some(mut block) = self.ready.take() {
            std::mem::swap(out, &mut block);
            self.spare = Some(block);
            return Some(Ok(()));
        }
        match self.fault.take() {
            Some(Fault::Glitch(msg)) => Some(Err(CaptureError::Stream(msg))),
            Some(Fault::Disconnected) => Some(Err(CaptureError::Disconnected)),
            None => None,
        }
    }
}

struct Shared {
    slot: Mutex<BlockSlot>,
    ready: Condvar,
}

impl Shared {
    fn with_slot<R>(&self, f: impl FnOnce(&mut BlockSlot) -> R) -> R {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let r = f(&mut slot);
        self.ready.notify_one();
        r
    }
}

/// Live loopback capture through cpal.
pub struct LoopbackCapture {
    sample_rate: u32,
    channels: u16,
    timeout: Duration,
    shared: Arc<Shared>,
    _stream: cpal::Stream,
}

impl LoopbackCapture {
    pub fn open(
        requested: Option<&str>,
        sample_rate: u32,
        channels: u16,
        block_size: usize,
    ) -> Result<Self, CaptureError> {
        let device = open_device(requested)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());
        let sample_format = device
            .default_input_config()
            .map_err(|e| CaptureError::Open(e.to_string()))?
            .sample_format();

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(Shared {
            slot: Mutex::new(BlockSlot::new(block_size)),
            ready: Condvar::new(),
        });

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, shared.clone()),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, shared.clone()),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, shared.clone()),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, shared.clone()),
            other => Err(CaptureError::Open(format!("unsupported sample format {:?}", other))),
        }?;
        stream
            .play()
            .map_err(|e| CaptureError::Open(e.to_string()))?;

        let block_time = Duration::from_secs_f64(block_size as f64 / sample_rate.max(1) as f64);
        log::info!(
            "Capturing from '{}' ({} Hz, {} ch, {:?})",
            device_name,
            sample_rate,
            channels,
            sample_format
        );

        Ok(Self {
            sample_rate,
            channels,
            timeout: (block_time * 4).max(Duration::from_millis(200)),
            shared,
            _stream: stream,
        })
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    shared: Arc<Shared>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let data_shared = shared.clone();
    let mut interleaved: Vec<f32> = Vec::new();
    let mut mono: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                interleaved.clear();
                interleaved.extend(data.iter().map(|&s| f32::from_sample(s)));
                mono.clear();
                downmix(&interleaved, channels, &mut mono);
                data_shared.with_slot(|slot| slot.push_mono(&mono));
            },
            move |err| {
                let fault = match err {
                    cpal::StreamError::DeviceNotAvailable => Fault::Disconnected,
                    other => Fault::Glitch(other.to_string()),
                };
                shared.with_slot(|slot| {
                    if !matches!(slot.fault, Some(Fault::Disconnected)) {
                        slot.fault = Some(fault);
                    }
                });
            },
            None,
        )
        .map_err(|e| CaptureError::Open(e.to_string()))
}

impl AudioSource for LoopbackCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn dropped_blocks(&self) -> u64 {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dropped
    }

    fn read_block(&mut self, block: &mut Vec<f32>) -> Result<bool, CaptureError> {
        let slot = self
            .shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (mut slot, _) = self
            .shared
            .ready
            .wait_timeout_while(slot, self.timeout, |s| !s.has_news())
            .unwrap_or_else(PoisonError::into_inner);

        match slot.take(block) {
            Some(result) => result.map(|()| true),
            None => Err(CaptureError::Timeout),
        }
    }
}
