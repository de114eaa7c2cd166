//! CDF cartridge core for the Atari 2600: seven bank-switched 4K ROM
//! windows, fast-fetch data streams, a three-voice music engine and a
//! bridge to the ARM co-processor that runs the cartridge's embedded code.

pub mod constants;

mod cart;
mod config;
mod state;
mod system;

pub use cart::{
    CartridgeCdf,
    ConsoleTiming,
    HarmonyRam,
    MusicEngine,
    ThumbCallbacks,
    ThumbCore,
    ThumbFault,
    ThumbMemory,
    Voice,
};
pub use config::Settings;
pub use state::{StateError, StateReader, StateWriter};
pub use system::{Access, PageAccess, PageDevice, System, PAGE_SHIFT, PAGE_SIZE};
