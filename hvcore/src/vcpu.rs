//! Virtual CPU implementation.
use crate::{
    probe::Probe,
    vm::VmOps,
    vmcs::ExitReason,
    vmexits::VmexitController,
    VmError,
};
use alloc::sync::{Arc, Weak};
use log::debug;

/// X86_64 general purpose registers of the guest.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct GeneralPurposeRegisters {
    pub r15: usize,
    pub r14: usize,
    pub r13: usize,
    pub r12: usize,
    pub r11: usize,
    pub r10: usize,
    pub r9: usize,
    pub r8: usize,
    pub rsi: usize,
    pub rdi: usize,
    pub rbp: usize,
    pub rdx: usize,
    pub rcx: usize,
    pub rbx: usize,
    pub rax: usize,
}

/// A visible state for VCpu.
pub struct GenericVCpuState<'a> {
    /// general purpose register of the vcpu.
    pub gprs: &'a mut GeneralPurposeRegisters,
    /// Weak reference of the vm.
    pub vm: Weak<dyn VmOps>,
    // guest rip.
    rip: &'a mut u64,
    // length of the instruction that caused the vmexit.
    instruction_len: u64,
    // id of this vcpu.
    id: usize,
}

impl<'a> GenericVCpuState<'a> {
    /// Get id of this vcpu.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Guest instruction pointer.
    #[inline]
    pub fn rip(&self) -> u64 {
        *self.rip
    }

    /// Forward to the next instruction.
    ///
    /// This commits the emulation of the instruction that caused the vmexit.
    pub fn forward_rip(&mut self) -> Result<(), VmError> {
        *self.rip = self.rip.wrapping_add(self.instruction_len);
        Ok(())
    }

    /// Get the vm that owns this vcpu.
    pub fn vm(&self) -> Result<Arc<dyn VmOps>, VmError> {
        self.vm.upgrade().ok_or(VmError::VmDestroyed)
    }
}

/// Virtual cpu.
pub struct VCpu {
    /// vcpu id.
    pub vcpu_id: usize,
    // general purpose register of the vcpu.
    gprs: GeneralPurposeRegisters,
    // guest rip.
    rip: u64,
    /// Vm that owned this VCpu.
    vm: Weak<dyn VmOps>,
}

impl VCpu {
    /// Create a new vcpu `vcpu_id` of `vm`.
    pub fn new(vcpu_id: usize, vm: Weak<dyn VmOps>) -> Self {
        Self {
            vcpu_id,
            gprs: GeneralPurposeRegisters::default(),
            rip: 0,
            vm,
        }
    }

    /// General purpose registers of this vcpu.
    #[inline]
    pub fn gprs(&self) -> &GeneralPurposeRegisters {
        &self.gprs
    }

    /// Mutable general purpose registers of this vcpu.
    #[inline]
    pub fn gprs_mut(&mut self) -> &mut GeneralPurposeRegisters {
        &mut self.gprs
    }

    /// Guest instruction pointer.
    #[inline]
    pub fn rip(&self) -> u64 {
        self.rip
    }

    /// Set the guest instruction pointer.
    #[inline]
    pub fn set_rip(&mut self, rip: u64) {
        self.rip = rip;
    }

    /// Handle a vmexit of this vcpu with `controller`.
    ///
    /// `raw_reason` is the exit reason field and `instruction_len` the exit instruction length
    /// field of the VMCS.
    pub fn handle_vmexit<C: VmexitController, P: Probe>(
        &mut self,
        raw_reason: u32,
        instruction_len: u64,
        controller: &mut C,
        p: &mut P,
    ) -> Result<VmexitResult, VmError> {
        let Self {
            vcpu_id,
            gprs,
            rip,
            vm,
        } = self;
        let mut generic_state = GenericVCpuState {
            gprs,
            vm: vm.clone(),
            rip,
            instruction_len,
            id: *vcpu_id,
        };
        let result = controller.handle(ExitReason::from_raw(raw_reason), p, &mut generic_state);
        if let Err(VmError::HandleVmexitFailed(reason)) = &result {
            debug!("vcpu {}: no controller handles {:?}", vcpu_id, reason);
        }
        result
    }
}

/// Possible result of the Vmexit.
#[derive(Debug, Eq, PartialEq)]
pub enum VmexitResult {
    /// VCpu can be continued.
    Ok,
    /// VCpu is exited.
    Exited(i32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{MockMemory, MockVm},
        vmcs::BasicExitReason,
    };
    use alloc::vec;

    struct Halt;

    impl VmexitController for Halt {
        fn handle<P: Probe>(
            &mut self,
            reason: ExitReason,
            _p: &mut P,
            generic_vcpu_state: &mut GenericVCpuState,
        ) -> Result<VmexitResult, VmError> {
            match reason.get_basic_reason() {
                BasicExitReason::Hlt => {
                    generic_vcpu_state.forward_rip()?;
                    Ok(VmexitResult::Exited(generic_vcpu_state.gprs.rdi as i32))
                }
                _ => Err(VmError::HandleVmexitFailed(reason)),
            }
        }
    }

    #[test]
    fn chain() {
        let vm: Arc<dyn VmOps> = Arc::new(MockVm::new(1, vec![]));
        let mut vcpu = VCpu::new(0, Arc::downgrade(&vm));
        let mut mem = MockMemory::new(0x1000);
        let mut controller = ((), (Halt, ()));

        vcpu.set_rip(0x4000);
        vcpu.gprs_mut().rdi = 0xcafe;
        assert_eq!(
            vcpu.handle_vmexit(0x0C, 1, &mut controller, &mut mem).unwrap(),
            VmexitResult::Exited(0xcafe)
        );
        assert_eq!(vcpu.rip(), 0x4001);

        assert!(matches!(
            vcpu.handle_vmexit(0x0A, 2, &mut controller, &mut mem),
            Err(VmError::HandleVmexitFailed(ExitReason::BasicExitReason(
                BasicExitReason::Cpuid
            )))
        ));
        assert_eq!(vcpu.rip(), 0x4001);
    }

    #[test]
    fn vm_destroyed() {
        let vm: Arc<dyn VmOps> = Arc::new(MockVm::new(1, vec![]));
        let vcpu = VCpu::new(0, Arc::downgrade(&vm));
        drop(vm);
        let mut gprs = *vcpu.gprs();
        let mut rip = 0;
        let state = GenericVCpuState {
            gprs: &mut gprs,
            vm: vcpu.vm.clone(),
            rip: &mut rip,
            instruction_len: 0,
            id: 0,
        };
        assert!(matches!(state.vm(), Err(VmError::VmDestroyed)));
    }
}
