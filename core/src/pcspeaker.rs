//! PC-speaker emulation: PIT channel-2 divisor writes rendered as a
//! phase-continuous 50% duty square wave at the host sample rate.

/// PIT input clock, in Hz: `1_193_182 / divisor` gives the speaker
/// frequency for a given 16-bit divisor.
const PIT_CLOCK_HZ: f64 = 1_193_182.0;

/// Fixed output amplitude, roughly -16 dBFS, chosen to sit comfortably
/// under the OPL2 contribution in the mix. Real PC speaker hardware has
/// no software gain control, so this stays a constant rather than
/// something dynamically balanced against OPL2 loudness.
pub const AMPLITUDE: i16 = 5000;

/// Square-wave generator driven by a PIT channel-2 divisor.
pub struct PcSpeaker {
    host_rate: u32,
    divisor: u16,
    phase: f64,
    step: f64,
}

impl PcSpeaker {
    pub fn new(host_rate: u32) -> Self {
        Self {
            host_rate,
            divisor: 0,
            phase: 0.0,
            step: 0.0,
        }
    }

    /// Sets the PIT divisor. `0` silences the channel. Safe to call at any
    /// time; the only mutator of this generator's frequency.
    pub fn set_divisor(&mut self, divisor: u16) {
        self.divisor = divisor;
        self.step = if divisor == 0 {
            0.0
        } else {
            (PIT_CLOCK_HZ / divisor as f64) / self.host_rate as f64
        };
    }

    /// Advances phase by one host sample and returns the next output
    /// sample: `+AMPLITUDE` for the first half of the cycle, `-AMPLITUDE`
    /// for the second. No band-limiting: divisor discontinuities produce
    /// phase-continuous but otherwise immediate transitions.
    pub fn next(&mut self) -> i16 {
        if self.divisor == 0 {
            return 0;
        }
        let out = if self.phase < 0.5 { AMPLITUDE } else { -AMPLITUDE };
        self.phase += self.step;
        if self.phase >= 1.0 {
            self.phase -= self.phase.trunc();
        }
        out
    }
}
