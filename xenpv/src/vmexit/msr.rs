//! Model-specific register vmexit controller.
//!
//! RDMSR reads the msr indexed by ECX into EDX:EAX, and WRMSR writes EDX:EAX to the msr indexed
//! by ECX. The upper halves of RAX and RDX are ignored on write and cleared on read.
//!
//! The controller only serves the msrs registered with [`Controller::insert`]. Accesses to other
//! msrs are left to the next controller.
use alloc::{
    boxed::Box,
    collections::{btree_map::Entry, BTreeMap},
};
use hvcore::{
    vcpu::{GenericVCpuState, VmexitResult},
    vmcs::{BasicExitReason, ExitReason},
    Probe, VmError,
};

/// Trait that represent handlers for MSR registers.
pub trait Msr
where
    Self: Send + Sync,
{
    /// Handler on rdmsr.
    fn rdmsr(
        &self,
        index: u32,
        p: &dyn Probe,
        generic_vcpu_state: &mut GenericVCpuState,
    ) -> Result<u64, VmError>;
    /// Handler on wrmsr.
    fn wrmsr(
        &mut self,
        index: u32,
        value: u64,
        p: &dyn Probe,
        generic_vcpu_state: &mut GenericVCpuState,
    ) -> Result<(), VmError>;
}

/// Msr vmexit controller.
pub struct Controller {
    msrs: BTreeMap<u32, Box<dyn Msr>>,
}

impl Controller {
    /// Create a new msr controller.
    pub fn new() -> Self {
        Self {
            msrs: BTreeMap::new(),
        }
    }

    /// Insert msr handler to the index.
    ///
    /// Return false if msr handler for index is exists.
    /// Otherwise, return true.
    pub fn insert(&mut self, index: u32, msr: impl Msr + 'static) -> bool {
        match self.msrs.entry(index) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(Box::new(msr));
                true
            }
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl hvcore::vmexits::VmexitController for Controller {
    fn handle<P: Probe>(
        &mut self,
        reason: ExitReason,
        p: &mut P,
        generic_vcpu_state: &mut GenericVCpuState,
    ) -> Result<VmexitResult, VmError> {
        let index = generic_vcpu_state.gprs.rcx as u32;
        match reason.get_basic_reason() {
            BasicExitReason::Rdmsr => {
                let msr = self
                    .msrs
                    .get(&index)
                    .ok_or(VmError::HandleVmexitFailed(reason))?;
                let value = msr.rdmsr(index, &*p, generic_vcpu_state)?;
                generic_vcpu_state.gprs.rax = (value & 0xffff_ffff) as usize;
                generic_vcpu_state.gprs.rdx = (value >> 32) as usize;
                generic_vcpu_state.forward_rip()?;
                Ok(VmexitResult::Ok)
            }
            BasicExitReason::Wrmsr => {
                let msr = self
                    .msrs
                    .get_mut(&index)
                    .ok_or(VmError::HandleVmexitFailed(reason))?;
                let value = (generic_vcpu_state.gprs.rdx as u64) << 32
                    | (generic_vcpu_state.gprs.rax as u64 & 0xffff_ffff);
                msr.wrmsr(index, value, &*p, generic_vcpu_state)?;
                generic_vcpu_state.forward_rip()?;
                Ok(VmexitResult::Ok)
            }
            _ => Err(VmError::HandleVmexitFailed(reason)),
        }
    }
}
