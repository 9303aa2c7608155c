// MIT License
// Copyright 2017--present xhal developers

//! GBTx configuration and VFAT phase alignment.
//!
//! Each OptoHybrid carries up to three GBTx chips. The three register
//! functions here (`write_gbt_config`, `write_gbt_phase`, `scan_gbt_phases`)
//! follow the same request/status shape as [`super::optohybrid`], with
//! their parameters range-checked before anything is sent.
//!
//! The remaining helpers work across boards. They read GBTx configuration
//! files and pick OptoHybrids out of a mask. They scan or write phases and
//! configurations on every selected board, and they render or append scan
//! results.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write as _};
use std::path::Path;

use crate::error::{Result, XhalError};
use crate::interface::XhalInterface;
use crate::message::RpcMessage;
use crate::rpc_manager::{execute, into_status};
use crate::status::xhal_status_t;
use crate::transport::Transport;

pub const WRITE_GBT_CONFIG: &str = "gbt.writeGBTConfig";
pub const WRITE_GBT_PHASE: &str = "gbt.writeGBTPhase";
pub const SCAN_GBT_PHASES: &str = "gbt.scanGBTPhases";

/// Registers in one GBTx configuration.
pub const GBT_CONFIG_SIZE: usize = 366;
/// GBTx chips per OptoHybrid.
pub const GBTS_PER_OH: u32 = 3;
/// VFATs per OptoHybrid.
pub const VFATS_PER_OH: u32 = 24;
/// Highest valid phase setting.
pub const PHASE_MAX: u32 = 15;
/// Phase settings per VFAT in a scan result.
pub const PHASES_PER_VFAT: usize = 16;
/// Marker for "no good phase found"; such entries are skipped when writing.
pub const BAD_PHASE: u32 = 0xdead_dead;
/// First line of a phase scan results file (ROOT `TTree::ReadFile` format).
pub const PHASE_SCAN_HEADER: &str = "ohN/I:vfatN/I:phase/I:nRepetitions/I:nSuccesses/I\n";

/// Write a full GBTx configuration to GBT `gbt` of OptoHybrid `oh`.
pub fn write_gbt_config<T: Transport>(
    iface: &mut XhalInterface<T>,
    oh: u32,
    gbt: u32,
    config: &[u8],
) -> xhal_status_t {
    let outcome = try_write_gbt_config(iface, oh, gbt, config);
    into_status(iface, outcome)
}

fn try_write_gbt_config<T: Transport>(
    iface: &mut XhalInterface<T>,
    oh: u32,
    gbt: u32,
    config: &[u8],
) -> Result<RpcMessage> {
    if gbt >= GBTS_PER_OH {
        return Err(XhalError::InvalidParameter(format!(
            "GBT index {gbt} out of range (max {})",
            GBTS_PER_OH - 1
        )));
    }
    if config.len() != GBT_CONFIG_SIZE {
        return Err(XhalError::InvalidParameter(format!(
            "GBT configuration must be {GBT_CONFIG_SIZE} bytes, got {}",
            config.len()
        )));
    }
    let mut req = RpcMessage::new(WRITE_GBT_CONFIG);
    req.set_word("ohN", oh)
        .set_word("gbtN", gbt)
        .set_word_array("config", config.iter().map(|&b| u32::from(b)).collect());
    execute(iface, &req)
}

/// Write the RX phase of VFAT `vfat` on OptoHybrid `oh`.
pub fn write_gbt_phase<T: Transport>(
    iface: &mut XhalInterface<T>,
    oh: u32,
    vfat: u32,
    phase: u32,
) -> xhal_status_t {
    let outcome = try_write_gbt_phase(iface, oh, vfat, phase);
    into_status(iface, outcome)
}

fn try_write_gbt_phase<T: Transport>(
    iface: &mut XhalInterface<T>,
    oh: u32,
    vfat: u32,
    phase: u32,
) -> Result<RpcMessage> {
    if vfat >= VFATS_PER_OH {
        return Err(XhalError::InvalidParameter(format!(
            "VFAT index {vfat} out of range (max {})",
            VFATS_PER_OH - 1
        )));
    }
    if phase > PHASE_MAX {
        return Err(XhalError::InvalidParameter(format!(
            "phase {phase} out of range (max {PHASE_MAX})"
        )));
    }
    let mut req = RpcMessage::new(WRITE_GBT_PHASE);
    req.set_word("ohN", oh)
        .set_word("vfatN", vfat)
        .set_word("phase", phase);
    execute(iface, &req)
}

/// Parameters of a phase scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseScan {
    pub n_scans: u32,
    pub phase_min: u32,
    pub phase_max: u32,
    pub phase_step: u32,
    pub n_vfat: u32,
}

impl Default for PhaseScan {
    fn default() -> Self {
        Self {
            n_scans: 100,
            phase_min: 0,
            phase_max: PHASE_MAX,
            phase_step: 1,
            n_vfat: VFATS_PER_OH,
        }
    }
}

impl PhaseScan {
    /// Entries in the result table: `n_vfat * 16`.
    pub fn result_len(&self) -> usize {
        self.n_vfat as usize * PHASES_PER_VFAT
    }

    fn validate(&self) -> Result<()> {
        if self.phase_min > self.phase_max || self.phase_max > PHASE_MAX {
            return Err(XhalError::InvalidParameter(format!(
                "phase range {}..={} invalid (max {PHASE_MAX})",
                self.phase_min, self.phase_max
            )));
        }
        if self.phase_step == 0 {
            return Err(XhalError::InvalidParameter("phase step must be non-zero".into()));
        }
        if self.n_vfat == 0 || self.n_vfat > VFATS_PER_OH {
            return Err(XhalError::InvalidParameter(format!(
                "VFAT count {} out of range (1..={VFATS_PER_OH})",
                self.n_vfat
            )));
        }
        Ok(())
    }
}

/// Scan GBT phases of OptoHybrid `oh`.
///
/// On success `results[vfat * 16 + phase]` holds the number of good
/// repetitions for that phase. `results` must hold at least
/// [`PhaseScan::result_len`] entries.
pub fn scan_gbt_phases<T: Transport>(
    iface: &mut XhalInterface<T>,
    results: &mut [u32],
    oh: u32,
    scan: &PhaseScan,
) -> xhal_status_t {
    let outcome = try_scan_gbt_phases(iface, results, oh, scan);
    into_status(iface, outcome)
}

fn try_scan_gbt_phases<T: Transport>(
    iface: &mut XhalInterface<T>,
    results: &mut [u32],
    oh: u32,
    scan: &PhaseScan,
) -> Result<()> {
    scan.validate()?;
    let expected = scan.result_len();
    if results.len() < expected {
        return Err(XhalError::InvalidParameter(format!(
            "result buffer holds {} entries, scan needs {expected}",
            results.len()
        )));
    }
    let mut req = RpcMessage::new(SCAN_GBT_PHASES);
    req.set_word("ohN", oh)
        .set_word("N", scan.n_scans)
        .set_word("phaseMin", scan.phase_min)
        .set_word("phaseMax", scan.phase_max)
        .set_word("phaseStep", scan.phase_step)
        .set_word("nVFAT", scan.n_vfat);
    let rsp = execute(iface, &req)?;
    let table = rsp
        .get_word_array("results")
        .filter(|t| t.len() == expected)
        .ok_or_else(|| {
            XhalError::Rpc(format!(
                "{SCAN_GBT_PHASES}: expected {expected} result words"
            ))
        })?;
    results[..expected].copy_from_slice(table);
    Ok(())
}

/// Read a GBTx configuration file: one hexadecimal register value per line.
///
/// Files longer than [`GBT_CONFIG_SIZE`] are truncated; shorter ones are
/// rejected.
pub fn read_gbt_config_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| XhalError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_gbt_config(&text).map_err(|e| match e {
        XhalError::InvalidParameter(m) => {
            XhalError::InvalidParameter(format!("{}: {m}", path.display()))
        }
        other => other,
    })
}

fn parse_gbt_config(text: &str) -> Result<Vec<u8>> {
    let mut config = Vec::with_capacity(GBT_CONFIG_SIZE);
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let digits = line
            .strip_prefix("0x")
            .or_else(|| line.strip_prefix("0X"))
            .unwrap_or(line);
        let value = u8::from_str_radix(digits, 16).map_err(|e| {
            XhalError::InvalidParameter(format!("line {}: {line:?}: {e}", n + 1))
        })?;
        config.push(value);
        if config.len() == GBT_CONFIG_SIZE {
            break;
        }
    }
    if config.len() < GBT_CONFIG_SIZE {
        return Err(XhalError::InvalidParameter(format!(
            "configuration too short: {} of {GBT_CONFIG_SIZE} registers",
            config.len()
        )));
    }
    Ok(config)
}

/// Indices below `n_ohs` whose bit is set in `oh_mask`.
pub fn oh_indices(oh_mask: u32, n_ohs: u32) -> impl Iterator<Item = u32> {
    (0..n_ohs.min(u32::BITS)).filter(move |oh| (oh_mask >> oh) & 1 == 1)
}

/// Write `configs[gbt]` to GBT `gbt` of every OptoHybrid selected by
/// `oh_mask`. Stops at the first failure.
pub fn configure_gbts<T: Transport>(
    iface: &mut XhalInterface<T>,
    configs: &[Vec<u8>],
    oh_mask: u32,
    n_ohs: u32,
) -> Result<()> {
    if configs.len() > GBTS_PER_OH as usize {
        return Err(XhalError::InvalidParameter(format!(
            "{} GBT configurations given, at most {GBTS_PER_OH} allowed",
            configs.len()
        )));
    }
    for oh in oh_indices(oh_mask, n_ohs) {
        for (gbt, config) in (0u32..).zip(configs) {
            try_write_gbt_config(iface, oh, gbt, config).map_err(|e| {
                iface
                    .logger()
                    .error(format_args!("Failed to configure GBT{gbt} of OH{oh}: {e}"));
                e
            })?;
        }
    }
    Ok(())
}

/// Write `phases[vfat]` to every VFAT of OptoHybrid `oh`, skipping
/// [`BAD_PHASE`] entries. Stops at the first failure.
pub fn set_phase_all_vfats<T: Transport>(
    iface: &mut XhalInterface<T>,
    oh: u32,
    phases: &[u32],
) -> Result<()> {
    for (vfat, &phase) in (0u32..).zip(phases) {
        if phase == BAD_PHASE {
            iface
                .logger()
                .warn(format_args!("Bad phase for OH{oh} VFAT{vfat}"));
            continue;
        }
        iface
            .logger()
            .debug(format_args!("Setting phase {phase} to OH{oh} VFAT{vfat}"));
        try_write_gbt_phase(iface, oh, vfat, phase).map_err(|e| {
            iface.logger().error(format_args!(
                "Failed to write phase {phase} to VFAT{vfat} of OH{oh}: {e}"
            ));
            e
        })?;
    }
    Ok(())
}

/// Scan every OptoHybrid selected by `oh_mask` with the same parameters.
///
/// Returns each board's result table (laid out as for [`scan_gbt_phases`])
/// keyed by OptoHybrid index. Stops at the first failure.
pub fn scan_gbt_phases_all<T: Transport>(
    iface: &mut XhalInterface<T>,
    oh_mask: u32,
    n_ohs: u32,
    scan: &PhaseScan,
) -> Result<BTreeMap<u32, Vec<u32>>> {
    scan.validate()?;
    let mut tables = BTreeMap::new();
    for oh in oh_indices(oh_mask, n_ohs) {
        let mut results = vec![0; scan.result_len()];
        try_scan_gbt_phases(iface, &mut results, oh, scan).map_err(|e| {
            iface
                .logger()
                .error(format_args!("Failed to scan GBT phases of OH{oh}: {e}"));
            e
        })?;
        iface.logger().debug(format_args!(
            "Phase scan results for OH{oh}\n{}",
            format_phase_scan_table(&results, scan.n_vfat)
        ));
        tables.insert(oh, results);
    }
    Ok(tables)
}

/// Render a scan result table with one row per phase and one column per VFAT.
///
/// Columns are right-aligned under a dashed rule. VFATs beyond what
/// `results` holds are left out.
pub fn format_phase_scan_table(results: &[u32], n_vfat: u32) -> String {
    let n_vfat = (n_vfat as usize).min(results.len() / PHASES_PER_VFAT);

    let mut header = vec!["Phase".to_string()];
    header.extend((0..n_vfat).map(|vfat| format!("VFAT{vfat}")));
    let rows: Vec<Vec<String>> = (0..PHASES_PER_VFAT)
        .map(|phase| {
            std::iter::once(phase.to_string())
                .chain((0..n_vfat).map(|vfat| results[vfat * PHASES_PER_VFAT + phase].to_string()))
                .collect()
        })
        .collect();
    let widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(col, title)| {
            rows.iter()
                .map(|row| row[col].len())
                .fold(title.len(), usize::max)
        })
        .collect();
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();

    let mut out = String::new();
    for cells in std::iter::once(&header).chain(std::iter::once(&rule)).chain(&rows) {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:>width$}"))
            .collect();
        out.push_str(&line.join("  "));
        out.push('\n');
    }
    out
}

/// Append the scan of OptoHybrid `oh` to the results file at `path`.
///
/// One line per VFAT and phase: `ohN vfatN phase nRepetitions nSuccesses`.
/// A new or empty file gets [`PHASE_SCAN_HEADER`] first. An existing file
/// must start with that header and end with a newline.
pub fn save_phase_scan_results(
    path: impl AsRef<Path>,
    oh: u32,
    results: &[u32],
    n_repetitions: u32,
    n_vfat: u32,
) -> Result<()> {
    let path = path.as_ref();
    let io_err = |source| XhalError::Io {
        path: path.to_path_buf(),
        source,
    };
    let expected = n_vfat as usize * PHASES_PER_VFAT;
    if results.len() < expected {
        return Err(XhalError::InvalidParameter(format!(
            "{} scan results given, {n_vfat} VFATs need {expected}",
            results.len()
        )));
    }

    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(io_err)?;
    if file.metadata().map_err(io_err)?.len() == 0 {
        file.write_all(PHASE_SCAN_HEADER.as_bytes())
            .map_err(io_err)?;
    } else if let Some(reason) = results_file_defect(&file).map_err(io_err)? {
        return Err(XhalError::CorruptResultsFile {
            path: path.to_path_buf(),
            reason,
        });
    }

    let mut rows = String::with_capacity(expected * 16);
    for (vfat, table) in results[..expected].chunks(PHASES_PER_VFAT).enumerate() {
        for (phase, successes) in table.iter().enumerate() {
            // writing to a String cannot fail
            let _ = writeln!(rows, "{oh} {vfat} {phase} {n_repetitions} {successes}");
        }
    }
    file.write_all(rows.as_bytes()).map_err(io_err)
}

/// Why a non-empty results file cannot be appended to, if it cannot.
fn results_file_defect(file: &File) -> std::io::Result<Option<&'static str>> {
    let mut first = Vec::new();
    BufReader::new(file).read_until(b'\n', &mut first)?;
    if first != PHASE_SCAN_HEADER.as_bytes() {
        return Ok(Some("invalid header"));
    }
    let mut last = [0u8];
    let mut file = file;
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        return Ok(Some("no EOL before EOF"));
    }
    Ok(None)
}

/// Write the phases of every OptoHybrid selected by `oh_mask`.
///
/// `phases[&oh]` lists the phase of each VFAT of that board, as taken by
/// [`set_phase_all_vfats`]. A selected board without an entry is an error.
/// Stops at the first failure.
pub fn set_phase_all_ohs<T: Transport>(
    iface: &mut XhalInterface<T>,
    phases: &BTreeMap<u32, Vec<u32>>,
    oh_mask: u32,
    n_ohs: u32,
) -> Result<()> {
    for oh in oh_indices(oh_mask, n_ohs) {
        let oh_phases = phases.get(&oh).ok_or_else(|| {
            XhalError::InvalidParameter(format!("no phases given for OH{oh}"))
        })?;
        set_phase_all_vfats(iface, oh, oh_phases)?;
    }
    Ok(())
}
