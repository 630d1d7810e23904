//! Xen hypercalls.
//!
//! A guest requests a hypercall by calling into a slot of its hypercall page, which executes
//! `vmcall` with the hypercall number in eax. The arguments follow the System V calling
//! convention: %rdi holds the sub-command and %rsi the guest virtual address of the argument
//! record. The result is returned in %rax, either 0 or a negated [`Errno`].
//!
//! Each hypercall is served by a handler that returns `Result<(), HcallError>`:
//!
//! * `Ok(())` completes the hypercall with 0.
//! * [`HcallError::Errno`] completes the hypercall with the error. This includes every guest
//!   address that could not be mapped, which is reported as `-EFAULT`.
//! * [`HcallError::NotHandled`] leaves the registers untouched and hands the vmexit back to the
//!   controller chain.
use crate::{
    abi::{Errno, HypercallNr},
    domain::XenDomain,
    evtchn, hvm_op, memory_op,
    version_op,
    vmexit::hypercall::{self, HypercallAbi},
};
use alloc::sync::Arc;
use hvcore::{
    vcpu::{GenericVCpuState, VmexitResult},
    vm::Gva,
    vmcs::BasicExitReason,
    Probe, VmError,
};
use log::{debug, warn};

/// Error of a hypercall handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HcallError {
    /// Complete the hypercall with the error.
    Errno(Errno),
    /// The hypercall is not served here.
    NotHandled,
}

impl HcallError {
    /// Report a guest memory access failure as `-EFAULT`.
    pub(crate) fn fault(e: VmError) -> Self {
        debug!("xen: guest memory fault: {e}");
        HcallError::Errno(Errno::EFAULT)
    }
}

impl From<Errno> for HcallError {
    fn from(e: Errno) -> Self {
        HcallError::Errno(e)
    }
}

/// Arguments of a hypercall.
#[derive(Clone, Copy, Debug)]
pub struct HypercallArgs {
    /// Sub-command. Provides on rdi.
    pub cmd: u64,
    // Argument record. Provides on rsi.
    arg: usize,
}

impl HypercallArgs {
    /// Arguments with the sub-command `cmd` and the record at `arg`.
    pub fn new(cmd: u64, arg: usize) -> Self {
        Self { cmd, arg }
    }

    /// Guest virtual address of the argument record.
    pub fn arg(&self) -> Result<Gva, HcallError> {
        Gva::new(self.arg).ok_or(HcallError::Errno(Errno::EFAULT))
    }
}

/// A resolved Xen hypercall.
#[derive(Clone, Copy, Debug)]
pub struct XenHypercall {
    /// Hypercall number. Provides on rax.
    pub nr: HypercallNr,
    /// Arguments.
    pub args: HypercallArgs,
}

impl hypercall::Hypercall for XenHypercall {
    fn resolve(GenericVCpuState { gprs, .. }: &mut GenericVCpuState) -> Option<Self> {
        let nr = HypercallNr::try_from(gprs.rax as u64).ok()?;
        Some(Self {
            nr,
            args: HypercallArgs::new(gprs.rdi as u64, gprs.rsi),
        })
    }
}

/// Hypercall context of a vcpu.
pub struct HypercallCtx {
    domain: Arc<XenDomain>,
}

impl HypercallCtx {
    /// Create a hypercall context that serves `domain`.
    pub fn new(domain: Arc<XenDomain>) -> Self {
        Self { domain }
    }
}

impl HypercallAbi for HypercallCtx {
    type Call = XenHypercall;

    fn handle<P: Probe>(
        &mut self,
        hc: Self::Call,
        p: &mut P,
        generic_vcpu_state: &mut GenericVCpuState,
    ) -> Result<VmexitResult, VmError> {
        let p: &dyn Probe = &*p;
        let vm = generic_vcpu_state.vm()?;
        let XenHypercall { nr, args } = hc;
        debug!(
            "xen: vcpu {} hypercall {:?} cmd {} arg {:#x}",
            generic_vcpu_state.id(),
            nr,
            args.cmd,
            args.arg
        );
        let result = match nr {
            HypercallNr::MemoryOp => memory_op::memory_op(&self.domain, vm.as_ref(), &args, p),
            HypercallNr::XenVersion => version_op::xen_version(&args, p),
            HypercallNr::HvmOp => hvm_op::hvm_op(&self.domain, &args, p),
            HypercallNr::EventChannelOp => evtchn::event_channel_op(&self.domain, &args, p),
        };
        generic_vcpu_state.gprs.rax = match result {
            Ok(()) => 0,
            Err(HcallError::Errno(e)) => {
                debug!("xen: {nr:?} cmd {} failed with {e:?}", args.cmd);
                e.as_ret()
            }
            Err(HcallError::NotHandled) => {
                warn!("xen: unsupported {nr:?} cmd {}", args.cmd);
                return Err(VmError::HandleVmexitFailed(BasicExitReason::Vmcall.into()));
            }
        };
        Ok(VmexitResult::Ok)
    }
}
