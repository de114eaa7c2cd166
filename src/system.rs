// Host-side bus contract: the page access table the cartridge installs
// itself into, and the system cycle counter the audio and ARM bridges
// reconcile against.
//
// The 6507 exposes 13 address lines; the host CPU core resolves every
// access through this table and forwards cartridge pages to peek/poke.

use bitflags::bitflags;

pub const PAGE_SHIFT: u16 = 6;
pub const PAGE_SIZE: u16 = 1 << PAGE_SHIFT;

const ADDR_SPACE: usize = 0x2000;
const NUM_PAGES: usize = ADDR_SPACE >> PAGE_SHIFT;

bitflags! {
    pub struct Access: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PageDevice {
    Unmapped,
    Cartridge,
}

// One 64-byte page of the address space. `code_access_base` carries the
// image offset the disassembler attributes executed bytes to.
#[derive(Clone, Copy)]
pub struct PageAccess {
    pub device: PageDevice,
    pub access: Access,
    pub code_access_base: Option<usize>,
}

impl PageAccess {
    pub fn cartridge_read() -> Self {
        PageAccess {
            device: PageDevice::Cartridge,
            access: Access::READ,
            code_access_base: None,
        }
    }

    pub fn with_code_access(mut self, base: usize) -> Self {
        self.code_access_base = Some(base);
        self
    }
}

impl Default for PageAccess {
    fn default() -> Self {
        PageAccess {
            device: PageDevice::Unmapped,
            access: Access::empty(),
            code_access_base: None,
        }
    }
}

pub struct System {
    cycles:     u64,
    autodetect: bool,
    pages:      [PageAccess; NUM_PAGES],
}

impl System {
    pub fn new() -> Self {
        System {
            cycles:     0,
            autodetect: false,
            pages:      [PageAccess::default(); NUM_PAGES],
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn increment_cycles(&mut self, cycles: u64) {
        self.cycles += cycles;
    }

    // Rebase the counter to zero. Devices holding cycle baselines must be
    // told the returned offset through their own cycle-reset hooks.
    pub fn reset_cycles(&mut self) -> u64 {
        let offset = self.cycles;
        self.cycles = 0;
        offset
    }

    pub fn set_page_access(&mut self, addr: u16, access: PageAccess) {
        self.pages[page_index(addr)] = access;
    }

    pub fn page_access(&self, addr: u16) -> PageAccess {
        self.pages[page_index(addr)]
    }

    // While autodetecting a ROM the host probes blind; devices should
    // keep quiet about faults they would otherwise report.
    pub fn autodetect_mode(&self) -> bool {
        self.autodetect
    }

    pub fn set_autodetect_mode(&mut self, autodetect: bool) {
        self.autodetect = autodetect;
    }
}

impl Default for System {
    fn default() -> Self {
        System::new()
    }
}

fn page_index(addr: u16) -> usize {
    (addr >> PAGE_SHIFT) as usize & (NUM_PAGES - 1)
}
