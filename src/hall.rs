// Hall sensor decoding and wheel odometry
// Maps the 3 hall lines to one of 6 commutation positions and turns position
// changes into signed encoder ticks accumulated modulo 100 wheel revolutions.

use embedded_hal::digital::InputPin;

use crate::config::hall::TICKS_MODULO;
use crate::driver::HallInputs;

/// Hall pattern lookup table
/// Maps raw hall pattern (a<<2 | b<<1 | c) to commutation position (0-5)
/// Patterns 0b000 and 0b111 cannot occur on a healthy sensor and map to the
/// sentinel position 0.
const HALL_TO_POSITION: [u8; 8] = [
    0, // 0b000: invalid (sentinel)
    2, // 0b001
    0, // 0b010
    1, // 0b011
    4, // 0b100
    3, // 0b101
    5, // 0b110
    0, // 0b111: invalid (sentinel)
];

/// Tick delta indexed by (previous - current) mod 6
/// Encodes sign and size of a 1- or 2-step hall transition. Index 3 (half a
/// turn away) is ambiguous and counts as no movement.
const DIRECTION_TABLE: [i8; 6] = [0, -1, -2, 0, 2, 1];

/// Number of commutation positions per electrical revolution
const POSITIONS: i16 = 6;

/// Position reported for invalid hall patterns
pub const SENTINEL_POSITION: u8 = 0;

/// Decoded commutation position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HallPosition {
    position: u8,
    pattern: u8,
}

impl HallPosition {
    /// Build from a raw 3-bit hall pattern
    pub const fn from_pattern(pattern: u8) -> Self {
        let pattern = pattern & 0b111;
        Self {
            position: HALL_TO_POSITION[pattern as usize],
            pattern,
        }
    }

    /// Commutation position (0-5), sentinel 0 for invalid patterns
    pub const fn position(self) -> u8 {
        self.position
    }

    /// Raw hall pattern (0-7)
    pub const fn pattern(self) -> u8 {
        self.pattern
    }

    /// `false` for the all-low / all-high patterns (sensor wiring fault)
    pub const fn is_valid(self) -> bool {
        self.pattern != 0b000 && self.pattern != 0b111
    }
}

/// Raw state of the three hall lines (true = active)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HallLines {
    pub a: bool,
    pub b: bool,
    pub c: bool,
}

impl HallLines {
    pub const fn new(a: bool, b: bool, c: bool) -> Self {
        Self { a, b, c }
    }

    /// 3-bit pattern: a<<2 | b<<1 | c
    pub const fn pattern(self) -> u8 {
        ((self.a as u8) << 2) | ((self.b as u8) << 1) | (self.c as u8)
    }
}

/// Decode three hall lines into a commutation position
#[inline(always)]
pub fn decode(a: bool, b: bool, c: bool) -> HallPosition {
    HallPosition::from_pattern(HallLines::new(a, b, c).pattern())
}

/// Signed tick delta (-2..=2) for a transition between two positions
#[inline(always)]
pub fn tick_delta(previous: u8, current: u8) -> i8 {
    let d = (previous as i16 - current as i16).rem_euclid(POSITIONS);
    DIRECTION_TABLE[d as usize]
}

/// Add a signed delta to a tick counter, wrapping into `[0, modulo)`
#[inline(always)]
pub fn accumulate(counter: u16, delta: i16, modulo: u16) -> u16 {
    (i32::from(counter) + i32::from(delta)).rem_euclid(i32::from(modulo)) as u16
}

/// Mounting direction of a wheel relative to vehicle forward motion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mounting {
    /// Position delta adds to the tick counter
    Forward,
    /// Mirrored motor: position delta subtracts from the tick counter
    Mirrored,
}

/// Per-motor odometry tracker
pub struct EncoderTracker {
    /// Previous position, `None` until the first reading
    previous: Option<HallPosition>,
    ticks: u16,
    modulo: u16,
    mounting: Mounting,
}

impl EncoderTracker {
    pub const fn new(mounting: Mounting) -> Self {
        Self::with_modulo(mounting, TICKS_MODULO)
    }

    pub const fn with_modulo(mounting: Mounting, modulo: u16) -> Self {
        Self {
            previous: None,
            ticks: 0,
            modulo,
            mounting,
        }
    }

    /// Feed the current position and return the applied tick delta
    ///
    /// The first reading only seeds the previous position. Invalid patterns
    /// still go through the direction table with the sentinel position.
    pub fn update(&mut self, current: HallPosition) -> i8 {
        let delta = match self.previous {
            Some(previous) => tick_delta(previous.position(), current.position()),
            None => 0,
        };
        let signed = match self.mounting {
            Mounting::Forward => i16::from(delta),
            Mounting::Mirrored => -i16::from(delta),
        };
        self.ticks = accumulate(self.ticks, signed, self.modulo);
        self.previous = Some(current);
        delta
    }

    /// Odometry counter in `[0, modulo)`
    pub fn ticks(&self) -> u16 {
        self.ticks
    }

    pub fn previous(&self) -> Option<HallPosition> {
        self.previous
    }
}

/// Three hall inputs read through embedded-hal pins
///
/// Hoverboard hall sensors pull the line low when active, so `active_low`
/// inverts the pin level. A pin read error reads as inactive.
pub struct HallPins<A, B, C> {
    a: A,
    b: B,
    c: C,
    active_low: bool,
}

impl<A: InputPin, B: InputPin, C: InputPin> HallPins<A, B, C> {
    pub fn new(a: A, b: B, c: C, active_low: bool) -> Self {
        Self {
            a,
            b,
            c,
            active_low,
        }
    }

    fn level<P: InputPin>(pin: &mut P, active_low: bool) -> bool {
        let read = if active_low { pin.is_low() } else { pin.is_high() };
        read.unwrap_or(false)
    }

    /// Release the pins
    pub fn release(self) -> (A, B, C) {
        (self.a, self.b, self.c)
    }
}

impl<A: InputPin, B: InputPin, C: InputPin> HallInputs for HallPins<A, B, C> {
    fn read(&mut self) -> HallLines {
        HallLines {
            a: Self::level(&mut self.a, self.active_low),
            b: Self::level(&mut self.b, self.active_low),
            c: Self::level(&mut self.c, self.active_low),
        }
    }
}
