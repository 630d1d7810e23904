//! Hypercall vmexit controller.
use hvcore::{
    vcpu::{GenericVCpuState, VmexitResult},
    vmcs::{BasicExitReason, ExitReason},
    Probe, VmError,
};

/// Hypercall vmexit controller.
pub struct Controller<H: HypercallAbi> {
    inner: H,
}

impl<H: HypercallAbi> Controller<H> {
    /// Create a new hypercall controller.
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H: HypercallAbi> hvcore::vmexits::VmexitController for Controller<H> {
    fn handle<P: Probe>(
        &mut self,
        reason: ExitReason,
        p: &mut P,
        generic_vcpu_state: &mut GenericVCpuState,
    ) -> Result<VmexitResult, VmError> {
        match reason.get_basic_reason() {
            BasicExitReason::Vmcall => {
                let hc = H::Call::resolve(generic_vcpu_state)
                    .ok_or(VmError::HandleVmexitFailed(reason))?;
                self.inner
                    .handle(hc, p, generic_vcpu_state)
                    .map_err(|e| match e {
                        VmError::HandleVmexitFailed(_) => VmError::HandleVmexitFailed(reason),
                        e => e,
                    })
                    .and_then(|r| generic_vcpu_state.forward_rip().map(|_| r))
            }
            _ => Err(VmError::HandleVmexitFailed(reason)),
        }
    }
}

/// Trait that represent the hypercall abi.
pub trait HypercallAbi
where
    Self: Sync + Send + 'static,
{
    /// Hypercalls that this controller can handle.
    type Call: Hypercall;

    /// Handle the hypercall `hc`.
    ///
    /// Returns [`VmError::HandleVmexitFailed`] to leave the hypercall to the next controller.
    fn handle<P: Probe>(
        &mut self,
        hc: Self::Call,
        p: &mut P,
        generic_vcpu_state: &mut GenericVCpuState,
    ) -> Result<VmexitResult, VmError>;
}

/// Trait that represent the enumeration of supported hypercall.
pub trait Hypercall {
    /// Resolve the requested hypercall.
    ///
    /// Returns `None` if the guest requested a hypercall that is not supported.
    fn resolve(generic_vcpu_state: &mut GenericVCpuState) -> Option<Self>
    where
        Self: Sized;
}
