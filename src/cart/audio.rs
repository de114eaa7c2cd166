// Three-voice music engine.
//
// A virtual 20kHz oscillator is derived from the 6507 clock; every voice
// carries a 32-bit phase accumulator stepped by its frequency on each
// oscillator tick. Updates are lazy: whoever needs current audio state
// reconciles the counters against the system cycle count first.

use crate::constants::timing::{CPU_HZ, OSC_HZ};

use super::thumb::ThumbCallbacks;

#[derive(Clone, Copy, Default)]
pub struct Voice {
    pub counter:        u32,    // phase accumulator
    pub frequency:      u32,    // added to the accumulator per tick
    pub waveform_size:  u8,     // right-shift turning the accumulator into an index
}

pub struct MusicEngine {
    pub voices: [Voice; 3],

    audio_cycles:       i64,    // system cycle count at the last update
    fractional_clocks:  f64,    // oscillator ticks not yet applied
}

impl MusicEngine {
    pub fn new() -> Self {
        MusicEngine {
            voices:             [Voice::default(); 3],
            audio_cycles:       0,
            fractional_clocks:  0.0,
        }
    }

    // Snap the baseline to the present; pending fractional ticks are lost.
    pub fn reset(&mut self, cycles: u64) {
        self.audio_cycles = cycles as i64;
        self.fractional_clocks = 0.0;
    }

    // The host rebased its cycle counter; shift our baseline with it.
    pub fn rebase(&mut self, offset: u64) {
        self.audio_cycles -= offset as i64;
    }

    // Advance all three accumulators by the whole oscillator ticks that
    // fit in the elapsed cycles, carrying the remainder.
    pub fn update(&mut self, cycles_now: u64) {
        let cycles = cycles_now as i64 - self.audio_cycles;
        self.audio_cycles = cycles_now as i64;

        let clocks = (OSC_HZ * cycles as f64) / CPU_HZ + self.fractional_clocks;
        let whole_clocks = clocks as i32;
        self.fractional_clocks = clocks - whole_clocks as f64;

        if whole_clocks <= 0 {
            return;
        }

        for voice in self.voices.iter_mut() {
            voice.counter = voice
                .counter
                .wrapping_add(voice.frequency.wrapping_mul(whole_clocks as u32));
        }
    }

    pub fn audio_cycles(&self) -> i64 {
        self.audio_cycles
    }

    pub fn set_audio_cycles(&mut self, cycles: i64) {
        self.audio_cycles = cycles;
    }

    pub fn fractional_clocks(&self) -> f64 {
        self.fractional_clocks
    }

    pub fn set_fractional_clocks(&mut self, clocks: f64) {
        self.fractional_clocks = clocks;
    }
}

// The ARM side drives notes through these four calls and nothing else.
// Voice indices arrive from trusted driver code and are 0-2.
impl ThumbCallbacks for MusicEngine {
    fn thumb_callback(&mut self, function: u8, value1: u32, value2: u32) -> u32 {
        match function {
            // set the note frequency
            0 => self.voices[value1 as usize].frequency = value2,

            // rewind the wave, so digital samples start from the top
            1 => self.voices[value1 as usize].counter = 0,

            // read the counter back
            2 => return self.voices[value1 as usize].counter,

            // resize the waveform buffer
            3 => self.voices[value1 as usize].waveform_size = value2 as u8,

            _ => {}
        }

        0
    }
}
