use thiserror::Error;

/// Error taxonomy for the audio core.
///
/// The audio thread itself never produces an `AudioError` — `Mixer::generate`
/// and `Opl2::generate` always run to completion and emit silence for any
/// sub-source they cannot read. Only non-real-time entry points (chiefly
/// `voc_decode`) return one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// Malformed or unsupported input: a bad VOC header, a truncated block,
    /// an unsupported codec, or a rate-yielding time constant of zero.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A buffer allocation failed while growing the VOC output during
    /// decode. The OPL2 ring is preallocated to a fixed capacity rather
    /// than grown, so a ring that cannot keep up with the read cursor
    /// falls back to emitting silence instead of raising this variant.
    #[error("out of memory")]
    OutOfMemory,

    /// An operation was attempted on state that was never initialised
    /// (e.g. a `Mixer` used directly without `init`).
    #[error("state misuse: {0}")]
    StateMisuse(String),
}

pub type AudioResult<T> = Result<T, AudioError>;
