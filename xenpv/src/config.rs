//! Platform constants of the emulated Xen interface.
use hvcore::vm::Gpa;

/// Instruction the hypercall stubs trap with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HypercallInsn {
    /// Intel `vmcall`.
    Vmcall,
    /// AMD `vmmcall`.
    Vmmcall,
}

impl HypercallInsn {
    /// Encoding of the instruction.
    #[inline]
    pub const fn encoding(self) -> [u8; 3] {
        match self {
            HypercallInsn::Vmcall => [0x0f, 0x01, 0xc1],
            HypercallInsn::Vmmcall => [0x0f, 0x01, 0xd9],
        }
    }
}

/// Configuration of a Xen domain.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// First cpuid leaf of the xen range.
    pub cpuid_base: u32,
    /// Msr the guest writes to install the hypercall page.
    pub hypercall_msr: u32,
    /// Interface version reported by cpuid (major << 16 | minor).
    pub version: u32,
    /// Guest physical address of the console ring.
    pub console_gpa: Gpa,
    /// Trap instruction of the hypercall stubs.
    pub insn: HypercallInsn,
}

impl Config {
    /// Xen 4.13 on an Intel host.
    pub const fn new() -> Self {
        Self {
            cpuid_base: 0x4000_0100,
            hypercall_msr: 0xC000_0500,
            version: 0x0004_0D00,
            console_gpa: match Gpa::new(0x000F_E000) {
                Some(gpa) => gpa,
                None => unreachable!(),
            },
            insn: HypercallInsn::Vmcall,
        }
    }

    /// Set the first cpuid leaf.
    pub const fn cpuid_base(mut self, base: u32) -> Self {
        self.cpuid_base = base;
        self
    }

    /// Set the hypercall page msr.
    pub const fn hypercall_msr(mut self, msr: u32) -> Self {
        self.hypercall_msr = msr;
        self
    }

    /// Set the reported interface version.
    pub const fn version(mut self, major: u16, minor: u16) -> Self {
        self.version = (major as u32) << 16 | minor as u32;
        self
    }

    /// Relocate the console ring.
    pub const fn console_gpa(mut self, gpa: Gpa) -> Self {
        self.console_gpa = gpa;
        self
    }

    /// Set the trap instruction of the hypercall stubs.
    pub const fn insn(mut self, insn: HypercallInsn) -> Self {
        self.insn = insn;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let config = Config::new().version(4, 17).insn(HypercallInsn::Vmmcall);
        assert_eq!(config.version, 0x0004_0011);
        assert_eq!(config.insn.encoding(), [0x0f, 0x01, 0xd9]);
        assert_eq!(Config::default().version, 0x0004_0D00);
        assert_eq!(Config::default().console_gpa.gfn(), 0xfe);
    }
}
