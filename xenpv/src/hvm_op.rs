//! `hvm_op`: HVM parameters.
use crate::{
    abi::{CallbackVia, Errno, HvmOp, HvmParam, XenHvmParam},
    domain::XenDomain,
    hypercall::{HcallError, HypercallArgs},
};
use hvcore::{probe::GuestRef, Probe};
use log::warn;

/// Handle `hvm_op`.
pub(crate) fn hvm_op(
    domain: &XenDomain,
    args: &HypercallArgs,
    p: &dyn Probe,
) -> Result<(), HcallError> {
    match HvmOp::try_from(args.cmd).map_err(|_| HcallError::NotHandled)? {
        HvmOp::SetParam => set_param(domain, args, p),
        HvmOp::GetParam => get_param(domain, args, p),
        HvmOp::PagetableDying => Ok(()),
    }
}

fn set_param(domain: &XenDomain, args: &HypercallArgs, p: &dyn Probe) -> Result<(), HcallError> {
    let param = GuestRef::<XenHvmParam>::gva(p, args.arg()?)
        .map_err(HcallError::fault)?
        .read();

    match HvmParam::try_from(param.index) {
        Ok(HvmParam::CallbackIrq) => {
            let via = CallbackVia::try_from(param.value).map_err(|e| {
                warn!("xen: invalid callback via {:#x}", e.0);
                Errno::EINVAL
            })?;
            domain.set_callback_via(via);
            Ok(())
        }
        _ => {
            warn!("xen: set_param {} is not supported", param.index);
            Err(HcallError::NotHandled)
        }
    }
}

fn get_param(domain: &XenDomain, args: &HypercallArgs, p: &dyn Probe) -> Result<(), HcallError> {
    let mut arg = GuestRef::<XenHvmParam>::gva(p, args.arg()?).map_err(HcallError::fault)?;
    let mut param = arg.read();

    param.value = match HvmParam::try_from(param.index) {
        Ok(HvmParam::ConsoleEvtchn) => domain.evtchn().bind_console(),
        Ok(HvmParam::ConsolePfn) => domain.console(p).map_err(HcallError::fault)?.gpa().gfn(),
        _ => {
            warn!("xen: get_param {} is not supported", param.index);
            return Err(HcallError::NotHandled);
        }
    };
    arg.write(&param);
    Ok(())
}
