//! Core audio subsystem for a native port of a 1994 DOS action game:
//! a software OPL2 (YM3812) FM synthesizer, a VOC (Creative Voice File)
//! decoder, a PC-speaker square-wave generator, and the real-time mixer
//! that combines them into a single host-rate PCM16 stream.
//!
//! [`engine::AudioEngine`] is the single entry point a game integrates
//! against; the individual building blocks (`opl2`, `voc`, `pcspeaker`,
//! `mixer`, `ring`) are public so a host can compose them directly if it
//! needs finer control than the engine's lifecycle object provides.

pub mod engine;
pub mod error;
pub mod mixer;
pub mod opl2;
pub mod pcspeaker;
pub mod ring;
pub mod voc;

pub mod prelude {
    pub use crate::engine::{AudioEngine, voc_decode};
    pub use crate::error::{AudioError, AudioResult};
    pub use crate::mixer::{Mixer, SoundFinishedCallback};
    pub use crate::opl2::Opl2;
    pub use crate::pcspeaker::PcSpeaker;
    pub use crate::voc::DecodedVoc;
}
