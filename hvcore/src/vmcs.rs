//! Exit reasons reported by the VMCS.
//!
//! The trap plumbing reads the `VmexitReason` field of the activated VMCS and hands the raw
//! value to [`ExitReason::from_raw`]. Only the reasons the paravirtual layer emulates are named;
//! the rest are kept as [`BasicExitReason::Unknown`] so a controller chain can still refuse them.
use num_enum::FromPrimitive;

/// Basic exit reason (bits 15:0 of the exit reason field).
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u16)]
pub enum BasicExitReason {
    /// Guest executed `cpuid`.
    Cpuid = 0x0A,
    /// Guest executed `hlt`.
    Hlt = 0x0C,
    /// Guest executed `vmcall`.
    Vmcall = 0x12,
    /// Guest executed `rdmsr`.
    Rdmsr = 0x1F,
    /// Guest executed `wrmsr`.
    Wrmsr = 0x20,
    /// Any other exit reason.
    #[num_enum(default)]
    Unknown = 0xFFFF,
}

/// Exit reason of the vcpu.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitReason {
    /// Vmexit while running the guest.
    BasicExitReason(BasicExitReason),
    /// Vmentry failed with the reason.
    EntryFailure(BasicExitReason),
    /// Vmexit from the VMX root operation (SMM).
    ExitFromVmxRootOperation(BasicExitReason),
}

impl ExitReason {
    /// Decode the raw exit reason field.
    pub fn from_raw(reason: u32) -> Self {
        let basic = BasicExitReason::from_primitive((reason & 0xffff) as u16);
        match reason {
            reason if reason & 0x2000_0000 != 0 => ExitReason::ExitFromVmxRootOperation(basic),
            reason if reason & 0x8000_0000 != 0 => ExitReason::EntryFailure(basic),
            _ => ExitReason::BasicExitReason(basic),
        }
    }

    /// Get the basic exit reason.
    #[inline]
    pub fn get_basic_reason(&self) -> &BasicExitReason {
        match self {
            ExitReason::BasicExitReason(e) => e,
            ExitReason::EntryFailure(e) => e,
            ExitReason::ExitFromVmxRootOperation(e) => e,
        }
    }
}

impl From<BasicExitReason> for ExitReason {
    fn from(basic: BasicExitReason) -> Self {
        ExitReason::BasicExitReason(basic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode() {
        assert_eq!(
            ExitReason::from_raw(0x12),
            ExitReason::BasicExitReason(BasicExitReason::Vmcall)
        );
        assert_eq!(
            ExitReason::from_raw(0x8000_0021).get_basic_reason(),
            &BasicExitReason::Unknown
        );
        assert_eq!(
            ExitReason::from_raw(0x2000_000A),
            ExitReason::ExitFromVmxRootOperation(BasicExitReason::Cpuid)
        );
    }
}
