// Host-facing configuration, consumed when the cartridge is constructed.

#[derive(Clone, Debug)]
pub struct Settings {
    /// Treat ARM execution faults as fatal: report them at error severity
    /// for the debugger instead of as warnings.
    pub trap_fatal: bool,
    /// Fill display RAM with random bytes at power-on instead of zeroes.
    pub random_ram: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            trap_fatal: false,
            random_ram: false,
        }
    }
}
