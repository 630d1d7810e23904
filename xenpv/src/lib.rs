//! Xen PVH interface emulation.
//!
//! A guest kernel built for Xen PVH expects the Xen paravirtual interface: it finds the
//! hypervisor through cpuid, installs a hypercall page through an msr, and talks to the
//! hypervisor with hypercalls. This crate emulates that interface on top of the vmexit
//! controllers of [`hvcore`], so such a guest runs unmodified under hardware-assisted
//! virtualization.
//!
//! ## Discovery
//! 1. The guest reads the cpuid leaf at [`Config::cpuid_base`] and finds the "XenVMMXenVMM"
//!    signature. The following leaves report the interface version, the hypercall page msr,
//!    and the vcpu and domain ids. See [`vmexit::cpuid`].
//! 2. The guest writes the guest physical address of a free page to the hypercall page msr.
//!    The hypervisor fills the page with one stub per hypercall. See [`hcall_page`].
//! 3. The guest calls the stub of a hypercall, which traps with `vmcall`.
//!
//! ## Hypercalls
//! | hypercall          | sub-commands                                      |
//! |--------------------|---------------------------------------------------|
//! | `memory_op`        | `memory_map`, `add_to_physmap` (shared info)      |
//! | `xen_version`      | `get_features`                                    |
//! | `hvm_op`           | `set_param`, `get_param`, `pagetable_dying`       |
//! | `event_channel_op` | `init_control`                                    |
//!
//! A request the emulation does not serve is left to the next controller of the chain with
//! [`VmError::HandleVmexitFailed`], without touching the vcpu. See [`hypercall`] for the
//! calling convention and the error reporting.
//!
//! ## Domain
//! The state shared by the vcpus of a domain lives in a [`XenDomain`]: the shared info page and
//! the console ring, which stay mapped once installed, the callback vector, and the event
//! channel subsystem. Each vcpu gets its own controller chain from [`vcpu_controller`].
//!
//! ```ignore
//! let domain = Arc::new(XenDomain::new(Config::new(), evtchn));
//! let mut controller = xenpv::vcpu_controller(domain.clone());
//! vcpu.handle_vmexit(raw_reason, instruction_len, &mut controller, &mut probe)?;
//! ```
//!
//! [`VmError::HandleVmexitFailed`]: hvcore::VmError::HandleVmexitFailed

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod abi;
pub mod config;
pub mod domain;
pub mod evtchn;
pub mod hcall_page;
mod hvm_op;
pub mod hypercall;
mod memory_op;
pub mod version_op;
pub mod vmexit;

pub use config::{Config, HypercallInsn};
pub use domain::XenDomain;
pub use evtchn::EventChannel;

use alloc::sync::Arc;
use hcall_page::HypercallPageMsr;
use hypercall::HypercallCtx;

/// Controller chain of a vcpu.
pub type XenController = (
    vmexit::cpuid::Controller,
    (
        vmexit::msr::Controller,
        vmexit::hypercall::Controller<HypercallCtx>,
    ),
);

/// Build the controller chain of a vcpu of `domain`.
pub fn vcpu_controller(domain: Arc<XenDomain>) -> XenController {
    let config = *domain.config();
    let mut msr = vmexit::msr::Controller::new();
    msr.insert(config.hypercall_msr, HypercallPageMsr::new(config.insn));
    (
        vmexit::cpuid::Controller::new(config),
        (
            msr,
            vmexit::hypercall::Controller::new(HypercallCtx::new(domain)),
        ),
    )
}
