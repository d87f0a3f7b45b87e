use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use super::decode::{decode_audio, DecodedAudio};
use super::source::{AudioSource, CaptureError};

/// Plays a decoded file as if it were live: one block per block duration.
///
/// The schedule is anchored at the first read, so a slow frame is caught up
/// on instead of pushing every later block back.
pub struct FileSource {
    audio: DecodedAudio,
    block_size: usize,
    position: usize,
    paced: bool,
    started: Option<Instant>,
    emitted: u32,
}

impl FileSource {
    pub fn open(path: &Path, block_size: usize) -> Result<Self> {
        let audio = decode_audio(path)?;
        log::info!(
            "Playing {} ({:.1}s, {} ch down-mixed) in blocks of {}",
            path.display(),
            audio.duration_secs(),
            audio.source_channels,
            block_size
        );
        Ok(Self::from_decoded(audio, block_size))
    }

    pub fn from_decoded(audio: DecodedAudio, block_size: usize) -> Self {
        Self {
            audio,
            block_size: block_size.max(1),
            position: 0,
            paced: true,
            started: None,
            emitted: 0,
        }
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.audio.sample_rate.max(1) as f64)
    }

    pub fn block_count(&self) -> u64 {
        (self.audio.samples.len() / self.block_size) as u64
    }

    fn wait_for_slot(&mut self) {
        if !self.paced {
            return;
        }
        let start = *self.started.get_or_insert_with(Instant::now);
        let due = start + self.block_duration() * self.emitted;
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }
}

impl AudioSource for FileSource {
    fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    fn channels(&self) -> u16 {
        1
    }

    fn total_blocks(&self) -> Option<u64> {
        Some(self.block_count())
    }

    fn read_block(&mut self, block: &mut Vec<f32>) -> Result<bool, CaptureError> {
        let end = self.position + self.block_size;
        // a trailing partial block is not played
        let Some(chunk) = self.audio.samples.get(self.position..end) else {
            return Ok(false);
        };
        block.clear();
        block.extend_from_slice(chunk);
        self.position = end;

        self.wait_for_slot();
        self.emitted += 1;
        Ok(true)
    }
}
