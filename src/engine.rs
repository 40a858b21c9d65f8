//! Code width growth and the dictionary reset policies.
//!
//! The encoder and the decoder each own a `Codebook` and report every code word to it, right
//! after the code word was written or decoded. Both sides report the same sequence of string
//! lengths and dictionary sizes, so both reach the same decisions without ever exchanging them.
use crate::{Mode, MAX_WIDTH, MIN_WIDTH};

/// The ratio degradation at which the monitor clears the dictionary.
const DEGRADATION_LIMIT: f64 = 1.1;

/// A snapshot of the adaptive state of an encoder or decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodebookState {
    /// The width in bits of the next code word.
    pub code_width: u8,
    /// The code that the next dictionary entry would receive.
    pub next_code: u32,
    /// How often the dictionary was cleared so far.
    pub resets: u32,
}

/// What the owner of the dictionary must do after a code word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Growth {
    /// There is room for the next entry, possibly after widening the codes.
    Room,
    /// Full at the maximum width and kept as is. No entry is registered.
    Saturated,
    /// Clear the dictionary. The entry due at this step is dropped.
    Clear,
}

/// Tracks the current code width and the number of codes it can represent.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WidthController {
    width: u8,
}

/// Compression ratio since the last clear, for `Mode::Monitor`.
#[derive(Clone, Copy, Debug, Default)]
struct RatioMonitor {
    bits_in: u64,
    bits_out: u64,
    /// The ratio when the dictionary first filled up after the last clear.
    baseline: Option<f64>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct ResetPolicy {
    mode: Mode,
    monitor: RatioMonitor,
}

pub(crate) struct Codebook {
    width: WidthController,
    policy: ResetPolicy,
    resets: u32,
}

impl WidthController {
    pub(crate) fn new() -> Self {
        WidthController { width: MIN_WIDTH }
    }

    pub(crate) fn width(&self) -> u8 {
        self.width
    }

    /// The number of codes representable at the current width.
    pub(crate) fn capacity(&self) -> usize {
        1 << self.width
    }

    /// Adopt `new_width` if it does not exceed the maximum.
    ///
    /// Returns `false`, and keeps the current width, when the codes can not grow any further.
    pub(crate) fn try_grow(&mut self, new_width: u8) -> bool {
        if new_width <= MAX_WIDTH {
            self.width = new_width;
            true
        } else {
            false
        }
    }

    pub(crate) fn reset_to_minimum(&mut self) {
        self.width = MIN_WIDTH;
    }
}

impl RatioMonitor {
    fn record(&mut self, symbol_len: usize, width: u8) {
        self.bits_in += 8 * symbol_len as u64;
        self.bits_out += u64::from(width);
    }

    fn ratio(&self) -> f64 {
        self.bits_in as f64 / self.bits_out as f64
    }

    /// Evaluate at a point where the dictionary is full.
    fn has_degraded(&mut self) -> bool {
        let current = self.ratio();
        match self.baseline {
            None => {
                tracing::debug!(ratio = current, "monitor baseline captured");
                self.baseline = Some(current);
                false
            }
            Some(baseline) => {
                tracing::trace!(baseline, ratio = current, "monitor evaluated");
                baseline / current > DEGRADATION_LIMIT
            }
        }
    }
}

impl ResetPolicy {
    pub(crate) fn new(mode: Mode) -> Self {
        ResetPolicy {
            mode,
            monitor: RatioMonitor::default(),
        }
    }

    /// Account for one code word of `symbol_len` bytes written with `width` bits.
    pub(crate) fn record(&mut self, symbol_len: usize, width: u8) {
        if let Mode::Monitor = self.mode {
            self.monitor.record(symbol_len, width);
        }
    }

    /// Decide whether a dictionary that is full at the maximum width gets cleared.
    pub(crate) fn should_clear(&mut self) -> bool {
        match self.mode {
            Mode::NoReset => false,
            Mode::Reset => true,
            Mode::Monitor => self.monitor.has_degraded(),
        }
    }

    /// Restart the statistics after the dictionary was cleared.
    pub(crate) fn cleared(&mut self) {
        self.monitor = RatioMonitor::default();
    }
}

impl Codebook {
    pub(crate) fn new(mode: Mode) -> Self {
        Codebook {
            width: WidthController::new(),
            policy: ResetPolicy::new(mode),
            resets: 0,
        }
    }

    pub(crate) fn mode(&self) -> Mode {
        self.policy.mode
    }

    pub(crate) fn width(&self) -> u8 {
        self.width.width()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.width.capacity()
    }

    /// Account for a code word standing for `symbol_len` bytes, coded at the current width.
    ///
    /// `next_code` is the code the next dictionary entry would receive. When it does not fit
    /// the current width the codes grow by one bit and, at the maximum width, the reset policy
    /// decides what happens.
    pub(crate) fn after_code(&mut self, symbol_len: usize, next_code: usize) -> Growth {
        self.policy.record(symbol_len, self.width.width());

        if next_code < self.width.capacity() {
            return Growth::Room;
        }

        if self.width.try_grow(self.width.width() + 1) {
            tracing::debug!(width = self.width.width(), "code width increased");
            return Growth::Room;
        }

        if !self.policy.should_clear() {
            return Growth::Saturated;
        }

        self.width.reset_to_minimum();
        self.policy.cleared();
        self.resets += 1;
        tracing::debug!(mode = %self.policy.mode, resets = self.resets, "dictionary cleared");
        Growth::Clear
    }

    pub(crate) fn state(&self, next_code: usize) -> CodebookState {
        CodebookState {
            code_width: self.width.width(),
            next_code: next_code as u32,
            resets: self.resets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Codebook, Growth, WidthController};
    use crate::{Mode, MAX_WIDTH, MIN_WIDTH};

    const FULL: usize = 1 << MAX_WIDTH;

    /// Report one-byte code words at a full dictionary until the width is at its maximum.
    fn saturate(codebook: &mut Codebook) {
        while codebook.width() < MAX_WIDTH {
            let capacity = codebook.capacity();
            assert_eq!(codebook.after_code(1, capacity), Growth::Room);
        }
    }

    #[test]
    fn width_grows_up_to_maximum() {
        let mut width = WidthController::new();
        assert_eq!(width.capacity(), 512);

        for w in MIN_WIDTH + 1..=MAX_WIDTH {
            assert!(width.try_grow(w));
            assert_eq!(width.capacity(), 1 << w);
        }

        assert!(!width.try_grow(MAX_WIDTH + 1));
        assert_eq!(width.width(), MAX_WIDTH);
        assert_eq!(width.capacity(), FULL);

        width.reset_to_minimum();
        assert_eq!(width.width(), MIN_WIDTH);
        assert_eq!(width.capacity(), 512);
    }

    #[test]
    fn room_left_keeps_width() {
        let mut codebook = Codebook::new(Mode::Reset);
        assert_eq!(codebook.after_code(3, 300), Growth::Room);
        assert_eq!(codebook.after_code(3, 511), Growth::Room);
        assert_eq!(codebook.width(), MIN_WIDTH);
        assert_eq!(codebook.after_code(3, 512), Growth::Room);
        assert_eq!(codebook.width(), MIN_WIDTH + 1);
    }

    #[test]
    fn no_reset_saturates() {
        let mut codebook = Codebook::new(Mode::NoReset);
        saturate(&mut codebook);
        for _ in 0..1000 {
            assert_eq!(codebook.after_code(1, FULL), Growth::Saturated);
        }
        assert_eq!(codebook.width(), MAX_WIDTH);
        assert_eq!(codebook.state(FULL).resets, 0);
    }

    #[test]
    fn reset_clears_when_full() {
        let mut codebook = Codebook::new(Mode::Reset);
        for round in 1..=3 {
            saturate(&mut codebook);
            assert_eq!(codebook.after_code(1, FULL), Growth::Clear);
            assert_eq!(codebook.width(), MIN_WIDTH);
            assert_eq!(codebook.state(257).resets, round);
        }
    }

    #[test]
    fn monitor_clears_after_degradation() {
        let mut codebook = Codebook::new(Mode::Monitor);
        saturate(&mut codebook);

        // The first event at a full dictionary only records the baseline.
        assert_eq!(codebook.after_code(8, FULL), Growth::Saturated);
        // Improving ratio.
        for _ in 0..1000 {
            assert_eq!(codebook.after_code(8, FULL), Growth::Saturated);
        }

        let cleared_at = (0..100_000)
            .position(|_| codebook.after_code(1, FULL) == Growth::Clear)
            .expect("ratio degraded by more than 10%");
        assert!(cleared_at > 0);
        assert_eq!(codebook.width(), MIN_WIDTH);

        // A fresh baseline is captured instead of clearing again right away.
        saturate(&mut codebook);
        assert_eq!(codebook.after_code(1, FULL), Growth::Saturated);
        assert_eq!(codebook.state(FULL).resets, 1);
    }

    #[test]
    fn monitor_keeps_stable_ratio() {
        let mut codebook = Codebook::new(Mode::Monitor);
        saturate(&mut codebook);
        for _ in 0..10_000 {
            assert_eq!(codebook.after_code(2, FULL), Growth::Saturated);
        }
    }
}
