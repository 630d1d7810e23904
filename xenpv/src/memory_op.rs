//! `memory_op`: guest memory layout and physmap.
use crate::{
    abi::{E820Entry, Errno, MapSpace, MemoryOp, XenAddToPhysmap, XenMemoryMap, DOMID_SELF},
    domain::XenDomain,
    hypercall::{HcallError, HypercallArgs},
};
use hvcore::{
    probe::{GuestRef, GuestSlice},
    vm::{Gpa, Gva, VmOps},
    Probe,
};
use log::warn;

/// Handle `memory_op`.
pub(crate) fn memory_op(
    domain: &XenDomain,
    vm: &dyn VmOps,
    args: &HypercallArgs,
    p: &dyn Probe,
) -> Result<(), HcallError> {
    match MemoryOp::try_from(args.cmd).map_err(|_| HcallError::NotHandled)? {
        MemoryOp::MemoryMap => memory_map(vm, args, p),
        MemoryOp::AddToPhysmap => add_to_physmap(domain, args, p),
    }
}

// Copy the whole e820 map of the domain or nothing.
fn memory_map(vm: &dyn VmOps, args: &HypercallArgs, p: &dyn Probe) -> Result<(), HcallError> {
    let mut arg = GuestRef::<XenMemoryMap>::gva(p, args.arg()?).map_err(HcallError::fault)?;
    let mut map = arg.read();
    let e820 = vm.e820();

    if (map.nr_entries as usize) < e820.len() {
        warn!(
            "xen: memory_map buffer of {} entries is short of {}",
            map.nr_entries,
            e820.len()
        );
        return Err(Errno::EINVAL.into());
    }

    if !e820.is_empty() {
        let buffer = Gva::new(map.buffer as usize).ok_or(Errno::EFAULT)?;
        let mut entries =
            GuestSlice::<E820Entry>::gva(p, buffer, e820.len()).map_err(HcallError::fault)?;
        for (idx, entry) in e820.iter().enumerate() {
            entries
                .write_at(idx, &[E820Entry::from(entry)])
                .map_err(|_| Errno::EFAULT)?;
        }
    }

    map.nr_entries = e820.len() as u32;
    arg.write(&map);
    Ok(())
}

fn add_to_physmap(
    domain: &XenDomain,
    args: &HypercallArgs,
    p: &dyn Probe,
) -> Result<(), HcallError> {
    let req = GuestRef::<XenAddToPhysmap>::gva(p, args.arg()?)
        .map_err(HcallError::fault)?
        .read();

    if req.domid != DOMID_SELF {
        warn!("xen: add_to_physmap for foreign domain {:#x}", req.domid);
        return Err(Errno::EINVAL.into());
    }

    match MapSpace::try_from(req.space) {
        Ok(MapSpace::GmfnForeign) => Err(Errno::ENOSYS.into()),
        Ok(MapSpace::SharedInfo) => {
            let gpa = Gpa::from_gfn(req.gpfn).ok_or(Errno::EINVAL)?;
            let page = domain
                .install_shared_info(p, gpa)
                .map_err(HcallError::fault)?;
            if page.gpa() != gpa {
                warn!(
                    "xen: shared info is already at {}, refusing {gpa}",
                    page.gpa()
                );
                return Err(Errno::EEXIST.into());
            }
            Ok(())
        }
        _ => {
            warn!("xen: add_to_physmap for space {}", req.space);
            Err(HcallError::NotHandled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evtchn::tests::domain;
    use hvcore::{
        mock::{MockMemory, MockVm},
        vm::{e820_type, E820Entry as Region},
    };

    const ARG: usize = 0x1000;
    const BUF: usize = 0x2000;

    fn args(cmd: MemoryOp) -> HypercallArgs {
        HypercallArgs::new(cmd as u64, ARG)
    }

    fn vm() -> MockVm {
        MockVm::new(
            1,
            vec![
                Region::new(0, 0x9_f000, e820_type::RAM),
                Region::new(0xf_0000, 0x1_0000, e820_type::RESERVED),
                Region::new(0x10_0000, 0x3ff0_0000, e820_type::RAM),
            ],
        )
    }

    fn memory_map_req(nr_entries: u32) -> XenMemoryMap {
        XenMemoryMap {
            nr_entries,
            buffer: BUF as u64,
            ..Default::default()
        }
    }

    #[test]
    fn memory_map() {
        let mem = MockMemory::new(0x10000);
        let (domain, _) = domain();
        mem.write_pod(ARG, &memory_map_req(8));

        assert_eq!(
            memory_op(&domain, &vm(), &args(MemoryOp::MemoryMap), &mem),
            Ok(())
        );
        assert_eq!({ mem.read_pod::<XenMemoryMap>(ARG).nr_entries }, 3);
        let entry = mem.read_pod::<E820Entry>(BUF + 20);
        assert_eq!(
            ({ entry.addr }, { entry.size }, { entry.typ }),
            (0xf_0000, 0x1_0000, e820_type::RESERVED)
        );
        assert_eq!({ mem.read_pod::<E820Entry>(BUF + 40).size }, 0x3ff0_0000);
        assert_eq!(mem.outstanding(), 0);
    }

    #[test]
    fn memory_map_short_buffer() {
        let mem = MockMemory::new(0x10000);
        let (domain, _) = domain();
        mem.write_pod(ARG, &memory_map_req(2));

        assert_eq!(
            memory_op(&domain, &vm(), &args(MemoryOp::MemoryMap), &mem),
            Err(HcallError::Errno(Errno::EINVAL))
        );
        assert_eq!({ mem.read_pod::<XenMemoryMap>(ARG).nr_entries }, 2);
        assert!(mem.read_vec(BUF, 60).iter().all(|b| *b == 0));
        assert_eq!(mem.maps(), 1);
        assert_eq!(mem.outstanding(), 0);
    }

    #[test]
    fn memory_map_bad_buffer() {
        let mem = MockMemory::new(0x10000);
        let (domain, _) = domain();
        let mut req = memory_map_req(3);
        req.buffer = 0xfff0;
        mem.write_pod(ARG, &req);

        assert_eq!(
            memory_op(&domain, &vm(), &args(MemoryOp::MemoryMap), &mem),
            Err(HcallError::Errno(Errno::EFAULT))
        );
        assert_eq!({ mem.read_pod::<XenMemoryMap>(ARG).nr_entries }, 3);
        assert_eq!(mem.outstanding(), 0);
    }

    #[test]
    fn memory_map_empty() {
        let mem = MockMemory::new(0x10000);
        let (domain, _) = domain();
        let mut req = memory_map_req(0);
        req.buffer = u64::MAX;
        mem.write_pod(ARG, &req);

        assert_eq!(
            memory_op(&domain, &MockVm::new(1, vec![]), &args(MemoryOp::MemoryMap), &mem),
            Ok(())
        );
        assert_eq!({ mem.read_pod::<XenMemoryMap>(ARG).nr_entries }, 0);
    }

    fn physmap(domid: u16, space: MapSpace, gpfn: u64) -> XenAddToPhysmap {
        XenAddToPhysmap {
            domid,
            space: space as u32,
            gpfn,
            ..Default::default()
        }
    }

    #[test]
    fn shared_info() {
        let mem = MockMemory::new(0x10000);
        let (domain, _) = domain();
        let args = args(MemoryOp::AddToPhysmap);

        mem.write_pod(ARG, &physmap(DOMID_SELF, MapSpace::SharedInfo, 0x5));
        assert_eq!(memory_op(&domain, &vm(), &args, &mem), Ok(()));
        assert_eq!(
            domain.shared_info().map(|page| page.gpa().into_usize()),
            Some(0x5000)
        );
        assert_eq!(memory_op(&domain, &vm(), &args, &mem), Ok(()));

        mem.write_pod(ARG, &physmap(DOMID_SELF, MapSpace::SharedInfo, 0x6));
        assert_eq!(
            memory_op(&domain, &vm(), &args, &mem),
            Err(HcallError::Errno(Errno::EEXIST))
        );
        assert_eq!(
            domain.shared_info().map(|page| page.gpa().into_usize()),
            Some(0x5000)
        );
        // The shared info page is the only mapping left.
        assert_eq!(mem.outstanding(), 1);
    }

    #[test]
    fn shared_info_out_of_memory() {
        let mem = MockMemory::new(0x10000);
        let (domain, _) = domain();

        mem.write_pod(ARG, &physmap(DOMID_SELF, MapSpace::SharedInfo, 0x100));
        assert_eq!(
            memory_op(&domain, &vm(), &args(MemoryOp::AddToPhysmap), &mem),
            Err(HcallError::Errno(Errno::EFAULT))
        );
        assert!(domain.shared_info().is_none());

        mem.write_pod(ARG, &physmap(DOMID_SELF, MapSpace::SharedInfo, u64::MAX));
        assert_eq!(
            memory_op(&domain, &vm(), &args(MemoryOp::AddToPhysmap), &mem),
            Err(HcallError::Errno(Errno::EINVAL))
        );
        assert_eq!(mem.outstanding(), 0);
    }

    #[test]
    fn physmap_spaces() {
        let mem = MockMemory::new(0x10000);
        let (domain, _) = domain();
        let args = args(MemoryOp::AddToPhysmap);

        mem.write_pod(ARG, &physmap(0, MapSpace::SharedInfo, 0x5));
        assert_eq!(
            memory_op(&domain, &vm(), &args, &mem),
            Err(HcallError::Errno(Errno::EINVAL))
        );
        assert!(domain.shared_info().is_none());

        mem.write_pod(ARG, &physmap(DOMID_SELF, MapSpace::GmfnForeign, 0x5));
        assert_eq!(
            memory_op(&domain, &vm(), &args, &mem),
            Err(HcallError::Errno(Errno::ENOSYS))
        );

        mem.write_pod(ARG, &physmap(DOMID_SELF, MapSpace::GrantTable, 0x5));
        assert_eq!(
            memory_op(&domain, &vm(), &args, &mem),
            Err(HcallError::NotHandled)
        );
        assert_eq!(mem.outstanding(), 0);
    }

    #[test]
    fn bad_argument() {
        let mem = MockMemory::new(0x10000);
        let (domain, _) = domain();
        for arg in [0xffff_0000, 0x8000_0000_0000_0000] {
            assert_eq!(
                memory_op(
                    &domain,
                    &vm(),
                    &HypercallArgs::new(MemoryOp::MemoryMap as u64, arg),
                    &mem
                ),
                Err(HcallError::Errno(Errno::EFAULT))
            );
        }
        assert_eq!(
            memory_op(&domain, &vm(), &HypercallArgs::new(4, ARG), &mem),
            Err(HcallError::NotHandled)
        );
        assert_eq!(mem.maps(), 0);
    }
}
