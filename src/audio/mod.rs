pub mod analysis;
pub mod capture;
pub mod decode;
pub mod features;
pub mod file;
pub mod playback;
pub mod source;
