// Seam to the ARM Thumb interpreter that runs the cartridge's embedded
// C code against Harmony RAM.
//
// The interpreter lives outside this crate. It is handed the image and
// RAM for each run, executes for a budget of 6507 cycles' worth of work,
// and may re-enter the cartridge only through the callback table.

use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConsoleTiming {
    Ntsc,
    Pal,
    Secam,
}

// Memory regions for one interpreter run: the full 32K image (code and
// constants) and the 8K Harmony RAM.
pub struct ThumbMemory<'a> {
    pub rom: &'a [u8],
    pub ram: &'a mut [u8],
}

#[derive(Debug, Error)]
#[error("ARM execution fault: {0}")]
pub struct ThumbFault(pub String);

/// Calls made by ARM code back into the cartridge. `function` selects
/// set-note (0), reset-wave (1), read-counter (2) or set-waveform-size
/// (3); the voice index in `value1` is trusted to be 0-2.
pub trait ThumbCallbacks {
    fn thumb_callback(&mut self, function: u8, value1: u32, value2: u32) -> u32;
}

/// The interpreter contract: run to completion on the caller's stack,
/// then return. A fault leaves RAM and callback state wherever the
/// interpreter got to.
pub trait ThumbCore {
    fn run(
        &mut self,
        cycles: i32,
        mem: ThumbMemory<'_>,
        callbacks: &mut dyn ThumbCallbacks,
    ) -> Result<(), ThumbFault>;

    fn set_console_timing(&mut self, timing: ConsoleTiming);
}

// Bookkeeping around the interpreter: which cycles are still owed to it,
// and what to do when it faults.
pub struct ThumbBridge {
    core:       Option<Box<dyn ThumbCore>>,
    arm_cycles: i64,
    trap_fatal: bool,
}

impl ThumbBridge {
    pub fn new(trap_fatal: bool) -> Self {
        ThumbBridge {
            core:       None,
            arm_cycles: 0,
            trap_fatal,
        }
    }

    pub fn attach(&mut self, core: Box<dyn ThumbCore>) {
        self.core = Some(core);
    }

    pub fn reset(&mut self, cycles: u64) {
        self.arm_cycles = cycles as i64;
    }

    pub fn rebase(&mut self, offset: u64) {
        self.arm_cycles -= offset as i64;
    }

    pub fn set_console_timing(&mut self, timing: ConsoleTiming) {
        if let Some(core) = self.core.as_mut() {
            core.set_console_timing(timing);
        }
    }

    pub fn arm_cycles(&self) -> i64 {
        self.arm_cycles
    }

    pub fn set_arm_cycles(&mut self, cycles: i64) {
        self.arm_cycles = cycles;
    }

    // CALLFN. 254 asks for IRQ-driven audio and 255 for none, but the ARM
    // code runs in zero 6507 cycles either way, so both collapse to one
    // run over the cycles queued since the last call. Other values are
    // reserved.
    pub fn call_function(
        &mut self,
        value: u8,
        cycles_now: u64,
        mem: ThumbMemory<'_>,
        callbacks: &mut dyn ThumbCallbacks,
        autodetect: bool,
    ) {
        match value {
            254 | 255 => {
                let cycles = cycles_now as i64 - self.arm_cycles;
                self.arm_cycles = cycles_now as i64;

                if let Some(core) = self.core.as_mut() {
                    if let Err(fault) = core.run(cycles as i32, mem, callbacks) {
                        if !autodetect {
                            if self.trap_fatal {
                                log::error!("{}", fault);
                            } else {
                                log::warn!("{}", fault);
                            }
                        }
                    }
                }
            }

            _ => {}
        }
    }
}
