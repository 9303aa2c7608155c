// MIT License
// Copyright 2017--present xhal developers

//! C exports for GBTx configuration and phase scans.

#![allow(non_snake_case)]

use crate::c_api::{with_session, xhal_interface_t};
use crate::rpc_manager::gbt::{
    scan_gbt_phases, write_gbt_config, write_gbt_phase, PhaseScan, VFATS_PER_OH,
};
use crate::status::{set_last_error, xhal_status_t};

/// Write `configSize` bytes of GBTx configuration from `config` to GBT
/// `gbtN` of OptoHybrid `ohN`. `configSize` must be 366.
///
/// # Safety
/// `iface` must be NULL or a live handle; `config` must be NULL or point to
/// `configSize` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn writeGBTConfig(
    iface: *mut xhal_interface_t,
    ohN: u32,
    gbtN: u32,
    configSize: u32,
    config: *const u8,
) -> u32 {
    let status = unsafe {
        with_session(iface, "writeGBTConfig", |s| {
            if config.is_null() {
                set_last_error("writeGBTConfig: config is NULL");
                return xhal_status_t::XHAL_INVALID_PARAMETER;
            }
            let bytes = std::slice::from_raw_parts(config, configSize as usize);
            write_gbt_config(s, ohN, gbtN, bytes)
        })
    };
    status.code()
}

/// Write `phase` (0-15) as the RX phase of VFAT `vfatN` on OptoHybrid `ohN`.
///
/// # Safety
/// `iface` must be NULL or a live handle.
#[no_mangle]
pub unsafe extern "C" fn writeGBTPhase(
    iface: *mut xhal_interface_t,
    ohN: u32,
    vfatN: u32,
    phase: u32,
) -> u32 {
    let status = unsafe {
        with_session(iface, "writeGBTPhase", |s| write_gbt_phase(s, ohN, vfatN, phase))
    };
    status.code()
}

/// Scan the phases `phaseMin..=phaseMax` (step `phaseStep`) of the first
/// `nVFAT` VFATs on OptoHybrid `ohN`, repeating `nScans` times.
///
/// On success `results[vfat * 16 + phase]` holds the number of good
/// repetitions.
///
/// # Safety
/// `iface` must be NULL or a live handle; `results` must be NULL or point to
/// `nVFAT * 16` writable words.
#[no_mangle]
pub unsafe extern "C" fn scanGBTPhases(
    iface: *mut xhal_interface_t,
    results: *mut u32,
    ohN: u32,
    nScans: u32,
    phaseMin: u32,
    phaseMax: u32,
    phaseStep: u32,
    nVFAT: u32,
) -> u32 {
    let scan = PhaseScan {
        n_scans: nScans,
        phase_min: phaseMin,
        phase_max: phaseMax,
        phase_step: phaseStep,
        n_vfat: nVFAT,
    };
    let status = unsafe {
        with_session(iface, "scanGBTPhases", |s| {
            if results.is_null() {
                set_last_error("scanGBTPhases: results is NULL");
                return xhal_status_t::XHAL_INVALID_PARAMETER;
            }
            // oversized VFAT counts fail validation; never build a slice for them
            let len = if nVFAT <= VFATS_PER_OH { scan.result_len() } else { 0 };
            let table = std::slice::from_raw_parts_mut(results, len);
            scan_gbt_phases(s, table, ohN, &scan)
        })
    };
    status.code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::c_api::interface::xhal_interface_free;
    use crate::c_api::tests::{handle, last_error};
    use crate::message::RpcMessage;
    use crate::rpc_manager::gbt::{GBT_CONFIG_SIZE, SCAN_GBT_PHASES};
    use crate::transport::mock::MockTransport;

    #[test]
    fn config_and_phase_writes() {
        let (mock, journal) = MockTransport::new();
        let (iface, _) = handle(mock);
        let config = [0x5a_u8; GBT_CONFIG_SIZE];
        unsafe {
            assert_eq!(
                writeGBTConfig(iface, 1, 0, GBT_CONFIG_SIZE as u32, config.as_ptr()),
                0
            );
            assert_eq!(
                writeGBTConfig(iface, 1, 0, 12, config.as_ptr()),
                xhal_status_t::XHAL_INVALID_PARAMETER.code()
            );
            assert_eq!(
                writeGBTConfig(iface, 1, 0, 366, std::ptr::null()),
                xhal_status_t::XHAL_INVALID_PARAMETER.code()
            );
            assert_eq!(last_error(), "writeGBTConfig: config is NULL");
            assert_eq!(writeGBTPhase(iface, 1, 4, 9), 0);
            xhal_interface_free(iface);
        }
        let journal = journal.lock();
        assert_eq!(journal.requests.len(), 2);
        assert_eq!(journal.requests[1].get_word("phase"), Some(9));
    }

    #[test]
    fn scan_fills_caller_buffer() {
        let mut rsp = RpcMessage::new(SCAN_GBT_PHASES);
        rsp.set_word_array("results", vec![7; 16]);
        let (mock, _) = MockTransport::new();
        let (iface, _) = handle(mock.respond(Ok(rsp)));

        let mut results = [0_u32; 16];
        unsafe {
            let status = scanGBTPhases(iface, results.as_mut_ptr(), 0, 50, 0, 15, 1, 1);
            assert_eq!(status, 0);
            assert_eq!(
                scanGBTPhases(iface, std::ptr::null_mut(), 0, 50, 0, 15, 1, 1),
                xhal_status_t::XHAL_INVALID_PARAMETER.code()
            );
            xhal_interface_free(iface);
        }
        assert_eq!(results, [7; 16]);
    }
}
