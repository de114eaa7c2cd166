// CDF cartridge: seven bank-switched 4K ROM windows in front of a
// stream-driven display RAM, three music voices and an ARM co-processor
// sharing the cartridge's 8K of Harmony RAM.
//
// Every 6507 read in the cartridge window runs through a second decoder
// layered over the instruction stream: depending on the mode byte and two
// operand-address latches, a peek may serve program ROM, a data stream
// byte, a computed audio sample, or trigger a bank switch.

mod audio;
mod ram;
mod thumb;


use crate::{
    config::Settings,
    constants::{
        geometry::{BANK_COUNT, DRIVER_SIZE, IMAGE_SIZE, PROGRAM_OFFSET, RAM_SIZE, STARTUP_BANK},
        hotspots,
        layout::ARM_RAM_BASE,
        streams,
    },
    state::{StateError, StateReader, StateWriter},
    system::{PageAccess, System, PAGE_SIZE},
};

pub use audio::{MusicEngine, Voice};
pub use ram::HarmonyRam;
pub use thumb::{
    ConsoleTiming,
    ThumbBridge,
    ThumbCallbacks,
    ThumbCore,
    ThumbFault,
    ThumbMemory,
};

const LDA_IMMEDIATE: u8 = 0xA9;
const JMP_ABSOLUTE: u8 = 0x4C;

pub struct CartridgeCdf {
    image:  Box<[u8]>,      // 32K: driver template, ARM code, program ROM
    ram:    HarmonyRam,
    music:  MusicEngine,
    thumb:  ThumbBridge,

    current_bank:   u16,
    startup_bank:   u16,
    mode:           u8,

    // Fast-fetch latches. A non-zero LDA latch names the address the next
    // peek must hit for the operand to be replaced; the JMP latch counts
    // down over the two redirected operand bytes.
    lda_operand_addr:   u16,
    jmp_operand_addr:   u16,
    fast_jump_active:   u8,

    bank_locked:    bool,
    bank_changed:   bool,

    random_ram: bool,
}

impl CartridgeCdf {
    // Build from a ROM image; short images are zero-padded to 32K.
    pub fn new(image: &[u8], settings: &Settings) -> Self {
        let mut buffer = vec![0; IMAGE_SIZE];
        let len = image.len().min(IMAGE_SIZE);
        buffer[..len].copy_from_slice(&image[..len]);

        let mut cart = CartridgeCdf {
            image:  buffer.into_boxed_slice(),
            ram:    HarmonyRam::new(),
            music:  MusicEngine::new(),
            thumb:  ThumbBridge::new(settings.trap_fatal),

            current_bank:   0,
            startup_bank:   STARTUP_BANK,
            mode:           0xFF,

            lda_operand_addr:   0,
            jmp_operand_addr:   0,
            fast_jump_active:   0,

            bank_locked:    false,
            bank_changed:   false,

            random_ram: settings.random_ram,
        };

        cart.set_initial_state();
        cart
    }

    pub fn with_thumb(mut self, core: Box<dyn ThumbCore>) -> Self {
        self.thumb.attach(core);
        self
    }

    pub fn name(&self) -> &'static str {
        "CartridgeCDF"
    }

    // Bind the register window to peek/poke and map the startup bank.
    pub fn install(&mut self, system: &mut System) {
        for address in (0x1000..0x1040).step_by(PAGE_SIZE as usize) {
            system.set_page_access(address, PageAccess::cartridge_read());
        }

        self.bank(self.startup_bank, system);
    }

    pub fn reset(&mut self, system: &mut System) {
        self.ram.init_display(self.random_ram);

        self.music.reset(system.cycles());
        self.thumb.reset(system.cycles());

        self.set_initial_state();

        self.bank(self.startup_bank, system);
    }

    fn set_initial_state(&mut self) {
        self.ram.load_driver(&self.image[..DRIVER_SIZE]);

        for voice in self.music.voices.iter_mut() {
            voice.waveform_size = 27;
        }

        self.startup_bank = STARTUP_BANK;
        self.mode = 0xFF;       // fast fetch and digital audio both off
        self.fast_jump_active = 0;
    }

    // The host rebased its cycle counter; shift every stored baseline by
    // the offset it applied so future deltas stay correct.
    pub fn system_cycles_reset(&mut self, offset: u64) {
        self.music.rebase(offset);
        self.thumb.rebase(offset);
    }

    pub fn console_changed(&mut self, timing: ConsoleTiming) {
        self.thumb.set_console_timing(timing);
    }

    pub fn peek(&mut self, address: u16, system: &mut System) -> u8 {
        let address = address & 0x0FFF;

        let peekvalue = self.program_byte(address);

        // A locked bank means the debugger is reading; nothing may change.
        if self.bank_locked {
            return peekvalue;
        }

        // JMP $0000 redirection in progress: operand bytes come from the
        // jump stream, which always steps by one whole byte regardless of
        // its increment register.
        if self.fast_jump_active > 0 && address == self.jmp_operand_addr {
            self.fast_jump_active -= 1;
            self.jmp_operand_addr += 1;

            let pointer = self.ram.stream_ptr(streams::JUMP);
            let value = self.ram.display_read(pointer >> 20);
            self.ram.set_stream_ptr(streams::JUMP, pointer.wrapping_add(0x0010_0000));

            return value;
        }

        // Arm the redirection when JMP $0000 goes past: the opcode itself
        // is served unchanged and the next two peeks are captured.
        if self.fast_fetch_on()
            && peekvalue == JMP_ABSOLUTE
            && self.program_byte(address + 1) == 0
            && self.program_byte(address + 2) == 0
        {
            self.fast_jump_active = 2;
            self.jmp_operand_addr = address + 1;
            return peekvalue;
        }

        self.jmp_operand_addr = 0;

        // LDA #: an operand of 0..=0x22 names a stream, with AMPLITUDE
        // replaced by the current audio sample.
        if self.fast_fetch_on()
            && address == self.lda_operand_addr
            && peekvalue <= streams::AMPLITUDE
        {
            self.lda_operand_addr = 0;

            if peekvalue == streams::AMPLITUDE {
                self.music.update(system.cycles());

                return if self.digital_audio_on() {
                    self.sample_byte()
                } else {
                    self.waveform_byte()
                };
            }

            return self.ram.read_stream(peekvalue);
        }

        self.lda_operand_addr = 0;

        // Hotspots switch on reads too; the byte served still belongs to
        // the bank that was active when the peek started.
        if let Some(bank) = bank_hotspot(address) {
            self.bank(bank, system);
        }

        if self.fast_fetch_on() && peekvalue == LDA_IMMEDIATE {
            self.lda_operand_addr = address + 1;
        }

        peekvalue
    }

    // Hotspot writes. The cartridge never suppresses bus activity.
    pub fn poke(&mut self, address: u16, value: u8, system: &mut System) -> bool {
        let address = address & 0x0FFF;

        match address {
            hotspots::DSWRITE => {
                let pointer = self.ram.stream_ptr(streams::COMM);
                self.ram.display_write(pointer >> 20, value);
                self.ram.set_stream_ptr(streams::COMM, pointer.wrapping_add(0x0010_0000));
            }

            // The pointer is rebuilt a byte at a time over four writes,
            // most significant byte first.
            hotspots::DSPTR => {
                let mut pointer = self.ram.stream_ptr(streams::COMM);
                pointer <<= 8;
                pointer &= 0xF000_0000;
                pointer |= (value as u32) << 20;
                self.ram.set_stream_ptr(streams::COMM, pointer);
            }

            hotspots::SETMODE => self.mode = value,

            hotspots::CALLFN => self.call_function(value, system),

            hotspots::BANK0..=hotspots::BANK6 => {
                self.bank(address - hotspots::BANK0, system);
            }

            _ => {}
        }

        false
    }

    pub fn bank(&mut self, bank: u16, system: &mut System) -> bool {
        if self.bank_locked {
            return false;
        }

        self.current_bank = bank;
        let offset = (bank as usize) << 12;

        // Rebind the banked window; each page carries the image offset
        // the disassembler attributes executed bytes to.
        for address in (0x1040..0x2000).step_by(PAGE_SIZE as usize) {
            system.set_page_access(
                address,
                PageAccess::cartridge_read().with_code_access(offset + (address & 0x0FFF) as usize),
            );
        }

        self.bank_changed = true;
        true
    }

    pub fn get_bank(&self) -> u16 {
        self.current_bank
    }

    pub fn bank_count(&self) -> u16 {
        BANK_COUNT
    }

    // Debugger-driven ROM patching. The low 64 bytes of the window are
    // the cartridge's own registers, not ROM.
    pub fn patch(&mut self, address: u16, value: u8) -> bool {
        let address = address & 0x0FFF;

        if address < 0x0040 {
            return false;
        }

        let offset = PROGRAM_OFFSET + ((self.current_bank as usize) << 12) + address as usize;
        self.image[offset] = value;

        self.bank_changed = true;
        true
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn waveform_size(&self, voice: usize) -> u8 {
        self.music.voices[voice].waveform_size
    }

    pub fn lock_bank(&mut self) {
        self.bank_locked = true;
    }

    pub fn unlock_bank(&mut self) {
        self.bank_locked = false;
    }

    // Sticky flag for the debugger: has the mapping changed since it
    // last looked?
    pub fn bank_changed(&mut self) -> bool {
        let changed = self.bank_changed;
        self.bank_changed = false;
        changed
    }
}

// Internal.
impl CartridgeCdf {
    fn fast_fetch_on(&self) -> bool {
        self.mode & 0x0F == 0
    }

    fn digital_audio_on(&self) -> bool {
        self.mode & 0xF0 == 0
    }

    fn program_byte(&self, address: u16) -> u8 {
        let offset = PROGRAM_OFFSET + ((self.current_bank as usize) << 12) + address as usize;

        // The JMP lookahead can step past the last bank; serve zero there.
        self.image.get(offset).copied().unwrap_or(0)
    }

    fn call_function(&mut self, value: u8, system: &mut System) {
        let CartridgeCdf {
            image,
            ram,
            music,
            thumb,
            ..
        } = self;

        thumb.call_function(
            value,
            system.cycles(),
            ThumbMemory {
                rom: &image[..],
                ram: ram.bytes_mut(),
            },
            music,
            system.autodetect_mode(),
        );
    }

    // One nibble of the packed digital sample, chosen by bit 20 of the
    // voice 0 counter. The sample base may address the image or Harmony
    // RAM; anything else reads as silence.
    fn sample_byte(&self) -> u8 {
        let address = self
            .ram
            .sample_base()
            .wrapping_add(self.music.voices[0].counter >> 21);

        let mut value = if address < IMAGE_SIZE as u32 {
            self.image[address as usize]
        } else if address >= ARM_RAM_BASE && address < ARM_RAM_BASE + RAM_SIZE as u32 {
            self.ram.bytes()[(address - ARM_RAM_BASE) as usize]
        } else {
            0
        };

        if self.music.voices[0].counter & (1 << 20) == 0 {
            value >>= 4;
        }

        value & 0x0F
    }

    // Sum of the three voices' waveform bytes, wrapping as 8 bits.
    fn waveform_byte(&self) -> u8 {
        let mut value: u8 = 0;

        for (index, voice) in self.music.voices.iter().enumerate() {
            let phase = voice
                .counter
                .checked_shr(voice.waveform_size as u32)
                .unwrap_or(0);
            let offset = self.ram.waveform_base(index).wrapping_add(phase);

            value = value.wrapping_add(self.ram.waveform_read(offset));
        }

        value
    }
}

// Save and load. The field order is fixed; loaders reject mismatched
// name tags before touching any state.
impl CartridgeCdf {
    pub fn save(&self, out: &mut StateWriter) {
        out.write_string(self.name());

        out.write_u16(self.current_bank);
        out.write_u8(self.mode);
        out.write_u8(self.fast_jump_active);

        out.write_u16(self.lda_operand_addr);
        out.write_u16(self.jmp_operand_addr);

        out.write_bytes(self.ram.bytes());

        for voice in self.music.voices.iter() {
            out.write_u32(voice.counter);
        }
        for voice in self.music.voices.iter() {
            out.write_u32(voice.frequency);
        }
        for voice in self.music.voices.iter() {
            out.write_u8(voice.waveform_size);
        }

        out.write_u32(self.music.audio_cycles() as u32);
        out.write_u32((self.music.fractional_clocks() * 100_000_000.0) as u32);
        out.write_u32(self.thumb.arm_cycles() as u32);
    }

    pub fn load(&mut self, input: &mut StateReader<'_>, system: &mut System) -> Result<(), StateError> {
        let tag = input.read_string()?;
        if tag != self.name() {
            return Err(StateError::WrongCartridge {
                expected: self.name().to_string(),
                found: tag,
            });
        }

        // Everything is read before anything is applied, so a truncated
        // stream leaves the cartridge untouched.
        let current_bank = input.read_u16()?;
        let mode = input.read_u8()?;
        let fast_jump_active = input.read_u8()?;

        let lda_operand_addr = input.read_u16()?;
        let jmp_operand_addr = input.read_u16()?;

        let ram = input.read_bytes(RAM_SIZE)?;

        let mut counters = [0; 3];
        for counter in counters.iter_mut() {
            *counter = input.read_u32()?;
        }

        let mut frequencies = [0; 3];
        for frequency in frequencies.iter_mut() {
            *frequency = input.read_u32()?;
        }

        let mut waveform_sizes = [0; 3];
        for size in waveform_sizes.iter_mut() {
            *size = input.read_u8()?;
        }

        let audio_cycles = input.read_u32()? as i32 as i64;
        let fractional_clocks = input.read_u32()? as f64 / 100_000_000.0;
        let arm_cycles = input.read_u32()? as i32 as i64;

        self.current_bank = current_bank;
        self.mode = mode;
        self.fast_jump_active = fast_jump_active;
        self.lda_operand_addr = lda_operand_addr;
        self.jmp_operand_addr = jmp_operand_addr;

        self.ram.restore(ram);

        for (voice, index) in self.music.voices.iter_mut().zip(0..3) {
            voice.counter = counters[index];
            voice.frequency = frequencies[index];
            voice.waveform_size = waveform_sizes[index];
        }

        self.music.set_audio_cycles(audio_cycles);
        self.music.set_fractional_clocks(fractional_clocks);
        self.thumb.set_arm_cycles(arm_cycles);

        // Re-establish the page mapping for the restored bank.
        self.bank(current_bank, system);

        Ok(())
    }
}

fn bank_hotspot(address: u16) -> Option<u16> {
    if (hotspots::BANK0..=hotspots::BANK6).contains(&address) {
        Some(address - hotspots::BANK0)
    } else {
        None
    }
}
