//! Cpuid vmexit controller.
//!
//! A Xen guest looks for the hypervisor by scanning the cpuid leaves reserved for hypervisors
//! (0x4000_0000 to 0x4001_0000, by steps of 0x100) for the "XenVMMXenVMM" signature. This
//! controller answers the leaves of a single range starting at [`Config::cpuid_base`]:
//!
//! | leaf      | eax                     | ebx                  | ecx          | edx |
//! |-----------|-------------------------|----------------------|--------------|-----|
//! | base      | base + 5 (max leaf)     | "XenV"               | "MMXe"       | "nVMM" |
//! | base + 1  | interface version       | 0                    | 0            | 0 |
//! | base + 2  | number of hcall pages   | hypercall page msr   | 0            | 0 |
//! | base + 4  | hvm features            | vcpu id              | domain id    | 0 |
//!
//! Every other leaf is left to the next controller.
use crate::{
    abi::{HvmCpuidFeatures, XEN_CPUID_SIGNATURE},
    config::Config,
};
use hvcore::{
    vcpu::{GenericVCpuState, VmexitResult},
    vmcs::{BasicExitReason, ExitReason},
    Probe, VmError,
};

/// Result of a cpuid leaf.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CpuidResult {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

type Leaf = fn(&Config, &GenericVCpuState<'_>) -> Result<CpuidResult, VmError>;

const MAX_LEAF: u32 = 5;

const LEAVES: &[(u32, Leaf)] = &[
    (0, signature),
    (1, version),
    (2, hypercall_pages),
    (4, hvm_features),
];

fn signature(config: &Config, _: &GenericVCpuState) -> Result<CpuidResult, VmError> {
    let [ebx, ecx, edx] = XEN_CPUID_SIGNATURE;
    Ok(CpuidResult {
        eax: config.cpuid_base + MAX_LEAF,
        ebx,
        ecx,
        edx,
    })
}

fn version(config: &Config, _: &GenericVCpuState) -> Result<CpuidResult, VmError> {
    Ok(CpuidResult {
        eax: config.version,
        ..Default::default()
    })
}

fn hypercall_pages(config: &Config, _: &GenericVCpuState) -> Result<CpuidResult, VmError> {
    Ok(CpuidResult {
        eax: 1,
        ebx: config.hypercall_msr,
        ..Default::default()
    })
}

fn hvm_features(_: &Config, state: &GenericVCpuState) -> Result<CpuidResult, VmError> {
    let features = HvmCpuidFeatures::X2APIC_VIRT
        | HvmCpuidFeatures::VCPU_ID_PRESENT
        | HvmCpuidFeatures::DOMID_PRESENT;
    Ok(CpuidResult {
        eax: features.bits(),
        ebx: state.id() as u32,
        ecx: state.vm()?.domid() as u32,
        edx: 0,
    })
}

/// Cpuid vmexit controller.
pub struct Controller {
    config: Config,
}

impl Controller {
    /// Create a new cpuid controller.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn leaf(&self, eax: u32) -> Option<Leaf> {
        let offset = eax.checked_sub(self.config.cpuid_base)?;
        LEAVES
            .iter()
            .find(|(leaf, _)| *leaf == offset)
            .map(|(_, f)| *f)
    }
}

impl hvcore::vmexits::VmexitController for Controller {
    fn handle<P: Probe>(
        &mut self,
        reason: ExitReason,
        _p: &mut P,
        generic_vcpu_state: &mut GenericVCpuState,
    ) -> Result<VmexitResult, VmError> {
        match reason.get_basic_reason() {
            BasicExitReason::Cpuid => {
                let leaf = self
                    .leaf(generic_vcpu_state.gprs.rax as u32)
                    .ok_or(VmError::HandleVmexitFailed(reason))?;
                let CpuidResult { eax, ebx, ecx, edx } = leaf(&self.config, generic_vcpu_state)?;
                let gprs = &mut generic_vcpu_state.gprs;
                gprs.rax = eax as usize;
                gprs.rbx = ebx as usize;
                gprs.rcx = ecx as usize;
                gprs.rdx = edx as usize;
                generic_vcpu_state.forward_rip()?;
                Ok(VmexitResult::Ok)
            }
            _ => Err(VmError::HandleVmexitFailed(reason)),
        }
    }
}
