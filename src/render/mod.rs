pub mod beat;
pub mod color;
pub mod frame;
pub mod mapper;
pub mod modes;
pub mod spectrogram;
