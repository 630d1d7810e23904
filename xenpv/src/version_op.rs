//! `xen_version`.
use crate::{
    abi::{Errno, XenFeatureInfo, XenFeatures, XenVersionOp, XENFEAT_NR_SUBMAPS},
    hypercall::{HcallError, HypercallArgs},
};
use hvcore::{probe::GuestRef, Probe};

/// Features of the emulated platform, in submap 0.
pub fn supported_features() -> XenFeatures {
    XenFeatures::WRITABLE_PAGE_TABLES
        | XenFeatures::WRITABLE_DESCRIPTOR_TABLES
        | XenFeatures::AUTO_TRANSLATED_PHYSMAP
        | XenFeatures::SUPERVISOR_MODE_KERNEL
        | XenFeatures::PAE_PGDIR_ABOVE_4GB
        | XenFeatures::GNTTAB_MAP_AVAIL_BITS
        | XenFeatures::HVM_CALLBACK_VECTOR
        | XenFeatures::HVM_PIRQS
        | XenFeatures::DOM0
        | XenFeatures::LINUX_RSDP_UNRESTRICTED
}

/// Handle `xen_version`.
pub(crate) fn xen_version(args: &HypercallArgs, p: &dyn Probe) -> Result<(), HcallError> {
    match XenVersionOp::try_from(args.cmd).map_err(|_| HcallError::NotHandled)? {
        XenVersionOp::GetFeatures => {
            let mut arg =
                GuestRef::<XenFeatureInfo>::gva(p, args.arg()?).map_err(HcallError::fault)?;
            let mut info = arg.read();
            if info.submap_idx >= XENFEAT_NR_SUBMAPS {
                return Err(Errno::EINVAL.into());
            }
            info.submap = supported_features().bits();
            arg.write(&info);
            Ok(())
        }
    }
}
