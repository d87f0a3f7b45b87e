use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no loopback/monitor capture device found{}", hint(.0))]
    NoDevice(Option<String>),
    #[error("failed to open audio stream: {0}")]
    Open(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("timed out waiting for audio")]
    Timeout,
    #[error("audio device disconnected")]
    Disconnected,
}

fn hint(requested: &Option<String>) -> String {
    match requested {
        Some(name) => format!(" matching `{}`", name),
        None => String::new(),
    }
}

impl CaptureError {
    /// Transient errors cost one block; anything else ends the session.
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::Stream(_) | CaptureError::Timeout)
    }
}

/// Supplier of fixed-size mono blocks for the capture loop.
pub trait AudioSource {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Number of blocks the source will produce, when known up front.
    fn total_blocks(&self) -> Option<u64> {
        None
    }

    /// Blocks the backend discarded because the loop fell behind.
    fn dropped_blocks(&self) -> u64 {
        0
    }

    /// Fill `block` with the next mono block. `Ok(false)` means the source is exhausted.
    fn read_block(&mut self, block: &mut Vec<f32>) -> Result<bool, CaptureError>;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn channels(&self) -> u16 {
        (**self).channels()
    }

    fn total_blocks(&self) -> Option<u64> {
        (**self).total_blocks()
    }

    fn dropped_blocks(&self) -> u64 {
        (**self).dropped_blocks()
    }

    fn read_block(&mut self, block: &mut Vec<f32>) -> Result<bool, CaptureError> {
        (**self).read_block(block)
    }
}

/// Average interleaved frames down to mono, appending to `out`.
/// A trailing partial frame is dropped.
pub fn downmix(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_is_averaged() {
        let mut out = Vec::new();
        downmix(&[1.0, 0.0, -0.5, -0.5, 0.25, 0.75, 1.0], 2, &mut out);
        assert_eq!(out, vec![0.5, -0.5, 0.5]);
    }

    #[test]
    fn mono_passes_through() {
        let mut out = vec![9.0];
        downmix(&[0.1, 0.2], 1, &mut out);
        assert_eq!(out, vec![9.0, 0.1, 0.2]);
    }

    #[test]
    fn error_classes() {
        assert!(CaptureError::Timeout.is_transient());
        assert!(CaptureError::Stream("xrun".into()).is_transient());
        assert!(!CaptureError::Disconnected.is_transient());
        assert!(!CaptureError::NoDevice(None).is_transient());
        assert_eq!(
            CaptureError::NoDevice(Some("usb".into())).to_string(),
            "no loopback/monitor capture device found matching `usb`"
        );
    }
}
