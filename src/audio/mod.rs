pub mod capture;
#[cfg(feature = "audio-io")]
pub mod input;
pub mod wav;

pub use capture::{AudioClip, CaptureAdapter};
#[cfg(feature = "audio-io")]
pub use input::MicrophoneCapture;
pub use wav::encode_wav;
