//! Hypercall page.
//!
//! The guest discovers the hypercall msr through cpuid and writes the guest physical address of
//! a page to it. The hypervisor fills the page with one stub per hypercall number:
//!
//! ```text
//! slot i (32 bytes):  b8 ii 00 00 00    mov eax, i
//!                     0f 01 c1          vmcall (or vmmcall)
//!                     c3                ret
//!                     cc ...            int3
//! ```
//!
//! A guest kernel then calls `page + 32 * nr` instead of executing `vmcall` itself.
use crate::{
    abi::{HYPERCALL_SLOTS, HYPERCALL_SLOT_SIZE},
    config::HypercallInsn,
    vmexit::msr::Msr,
};
use alloc::boxed::Box;
use hvcore::{
    probe::{GuestSlice, OutOfBounds},
    vcpu::GenericVCpuState,
    vm::{Gpa, PAGE_SIZE},
    Probe, VmError,
};
use log::info;

const PAD: [u8; HYPERCALL_SLOT_SIZE] = [0xcc; HYPERCALL_SLOT_SIZE];

fn stub(nr: usize, insn: HypercallInsn) -> [u8; HYPERCALL_SLOT_SIZE] {
    let mut slot = PAD;
    slot[0] = 0xb8;
    slot[1..5].copy_from_slice(&(nr as u32).to_le_bytes());
    slot[5..8].copy_from_slice(&insn.encoding());
    slot[8] = 0xc3;
    slot
}

/// Fill the mapped `page` with the hypercall stubs, slot by slot.
pub fn write_hypercall_page(
    page: &mut GuestSlice<'_, u8>,
    insn: HypercallInsn,
) -> Result<(), OutOfBounds> {
    for nr in 0..PAGE_SIZE / HYPERCALL_SLOT_SIZE {
        let slot = if nr < HYPERCALL_SLOTS { stub(nr, insn) } else { PAD };
        page.write_at(nr * HYPERCALL_SLOT_SIZE, &slot)?;
    }
    Ok(())
}

/// The hypercall page msr.
pub struct HypercallPageMsr {
    insn: HypercallInsn,
    value: u64,
}

impl HypercallPageMsr {
    /// Create the msr, whose stubs trap with `insn`.
    pub fn new(insn: HypercallInsn) -> Self {
        Self { insn, value: 0 }
    }
}

impl Msr for HypercallPageMsr {
    fn rdmsr(
        &self,
        _index: u32,
        _p: &dyn Probe,
        _generic_vcpu_state: &mut GenericVCpuState,
    ) -> Result<u64, VmError> {
        Ok(self.value)
    }

    fn wrmsr(
        &mut self,
        _index: u32,
        value: u64,
        p: &dyn Probe,
        generic_vcpu_state: &mut GenericVCpuState,
    ) -> Result<(), VmError> {
        let gpa = Gpa::new(value as usize).ok_or(VmError::GpaNotMapped(Gpa::END, PAGE_SIZE))?;
        let mut page = GuestSlice::<u8>::gpa(p, gpa, PAGE_SIZE)?;
        write_hypercall_page(&mut page, self.insn)
            .map_err(|e| VmError::ControllerError(Box::new(e)))?;
        self.value = value;
        info!(
            "xen: vcpu {} installed the hypercall page at {gpa}",
            generic_vcpu_state.id()
        );
        Ok(())
    }
}
