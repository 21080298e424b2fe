/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Simulated collaborators for driving a [`UeStack`](ue_stack::UeStack)
//! without a radio.
//!
//! The layers share one [`SimBearers`] buffer: PDCP and NAS append PDUs, MAC
//! drains a fixed number of them per tick, RLC answers `has_data` from it.
//! All of it is only ever touched by the executor thread; the mutex is there
//! because the layers are separate trait objects, not for contention.
//!
//! Attach runs the whole background path: NAS asks for a cell search, RRC
//! selects the cell found, and NAS registers a few ticks after RRC reports
//! the connection.

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use ue_stack::layers::{
    CaptureHandle, CaptureSink, CaptureSinks, CellSearchResult, EstablishmentCause, MacLayer, NasLayer,
    PdcpLayer, PhyCell, RadioDriver, RlcLayer, RrcLayer, StackLayers, UsimLayer, LCID_SRB1,
};
use ue_stack::metrics::{EmmState, MacMetrics, NasMetrics, RlcMetrics, RrcMetrics, RrcState};
use ue_stack::{targets, StackHandle};

/// Logical channel of the default data bearer.
pub const LCID_DRB1: u32 = 3;

// ── Settings ──────────────────────────────────────────────────────────────────

/// Behaviour of the simulated network, loaded from an optional YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimSettings {
    pub imsi: String,
    pub pci: u32,
    pub earfcn: u32,
    /// How long the simulated cell search blocks its worker.
    pub search_delay_ms: u64,
    /// Ticks between RRC connection and NAS registration.
    pub attach_delay_ticks: u32,
    /// PDUs MAC transmits per sub-tick.
    pub grant_pdus_per_tti: usize,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            imsi: "001010123456789".to_string(),
            pci: 1,
            earfcn: 3400,
            search_delay_ms: 20,
            attach_delay_ticks: 10,
            grant_pdus_per_tti: 1,
        }
    }
}

impl SimSettings {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read simulator settings: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse simulator settings: {}", path.display()))
    }

    pub fn cell(&self) -> PhyCell {
        PhyCell {
            pci: self.pci,
            earfcn: self.earfcn,
        }
    }
}

// ── Shared bearer buffers ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BearerState {
    queues: BTreeMap<u32, VecDeque<Vec<u8>>>,
    ul_bytes: u64,
    tx_pkts: u64,
    rrc_connected: bool,
}

/// Uplink PDUs waiting for transmission, per logical channel.
#[derive(Debug, Clone, Default)]
pub struct SimBearers(Arc<Mutex<BearerState>>);

impl SimBearers {
    pub fn push(&self, lcid: u32, pdu: Vec<u8>) {
        self.0.lock().queues.entry(lcid).or_default().push_back(pdu);
    }

    pub fn has_data(&self, lcid: u32) -> bool {
        self.0.lock().queues.get(&lcid).is_some_and(|q| !q.is_empty())
    }

    /// Transmits up to `grant` PDUs, signalling first.  Returns the PDUs
    /// that went out.
    fn transmit(&self, grant: usize) -> Vec<Vec<u8>> {
        let mut state = self.0.lock();
        let mut sent = Vec::new();
        for queue in state.queues.values_mut() {
            while sent.len() < grant {
                let Some(pdu) = queue.pop_front() else { break };
                sent.push(pdu);
            }
        }
        state.ul_bytes += sent.iter().map(|pdu| pdu.len() as u64).sum::<u64>();
        state.tx_pkts += sent.len() as u64;
        sent
    }

    fn set_connected(&self, connected: bool) {
        self.0.lock().rrc_connected = connected;
    }

    fn connected(&self) -> bool {
        self.0.lock().rrc_connected
    }
}

// ── Layers ────────────────────────────────────────────────────────────────────

pub struct SimUsim {
    imsi: String,
}

impl UsimLayer for SimUsim {
    fn init(&mut self) -> Result<()> {
        ensure!(
            self.imsi.len() == 15 && self.imsi.bytes().all(|b| b.is_ascii_digit()),
            "IMSI '{}' must be 15 digits",
            self.imsi
        );
        info!(target: targets::USIM, imsi = %self.imsi, "simulated USIM ready");
        Ok(())
    }

    fn stop(&mut self) {
        debug!(target: targets::USIM, "USIM stopped");
    }
}

pub struct SimMac {
    bearers: SimBearers,
    grant: usize,
    last_tti: Option<u32>,
    ticks: u64,
    capture: Option<CaptureHandle>,
}

impl MacLayer for SimMac {
    fn start_pcap(&mut self, capture: CaptureHandle) {
        self.capture = Some(capture);
    }

    fn run_tti(&mut self, tti: u32) {
        if let Some(last) = self.last_tti {
            let expected = (last + 1) % ue_stack::executor::tick::TTI_WRAP;
            if tti != expected {
                warn!(target: targets::MAC, tti, expected, "sub-tick out of sequence");
            }
        }
        self.last_tti = Some(tti);
        self.ticks += 1;
        if !self.bearers.connected() {
            return;
        }
        for pdu in self.bearers.transmit(self.grant) {
            if let Some(capture) = &self.capture {
                capture.write_pdu(&pdu);
            }
        }
    }

    fn metrics(&self) -> MacMetrics {
        MacMetrics {
            tx_pkts: self.bearers.0.lock().tx_pkts,
            rx_pkts: self.ticks,
            ..Default::default()
        }
    }

    fn stop(&mut self) {
        debug!(target: targets::MAC, ticks = self.ticks, "MAC stopped");
    }
}

pub struct SimRlc {
    bearers: SimBearers,
}

impl RlcLayer for SimRlc {
    fn has_data(&self, lcid: u32) -> bool {
        self.bearers.has_data(lcid)
    }

    fn metrics(&self) -> RlcMetrics {
        RlcMetrics {
            ul_bytes: self.bearers.0.lock().ul_bytes,
            dl_bytes: 0,
        }
    }

    fn stop(&mut self) {
        debug!(target: targets::RLC, "RLC stopped");
    }
}

pub struct SimPdcp {
    bearers: SimBearers,
}

impl PdcpLayer for SimPdcp {
    fn write_sdu(&mut self, lcid: u32, sdu: Vec<u8>, _blocking: bool) {
        self.bearers.push(lcid, sdu);
    }

    fn stop(&mut self) {
        debug!(target: targets::PDCP, "PDCP stopped");
    }
}

pub struct SimNas {
    bearers: SimBearers,
    handle: Option<StackHandle>,
    state: EmmState,
    attach_delay: u32,
    ticks_connected: u32,
    capture: Option<CaptureHandle>,
}

impl SimNas {
    fn capture(&self, pdu: &[u8]) {
        if let Some(capture) = &self.capture {
            capture.write_pdu(pdu);
        }
    }
}

impl NasLayer for SimNas {
    fn init(&mut self, stack: StackHandle) {
        self.handle = Some(stack);
    }

    fn start_pcap(&mut self, capture: CaptureHandle) {
        self.capture = Some(capture);
    }

    fn start_attach(&mut self, cause: EstablishmentCause) {
        if self.state != EmmState::Deregistered {
            debug!(target: targets::NAS, state = ?self.state, "attach already in progress");
            return;
        }
        info!(target: targets::NAS, ?cause, "attach requested");
        self.capture(b"ATTACH REQUEST");
        self.state = EmmState::RegisteredInitiated;
        self.ticks_connected = 0;
        if !self.bearers.connected() {
            if let Some(handle) = &self.handle {
                handle.start_cell_search();
            }
        }
    }

    fn detach_request(&mut self, switch_off: bool) -> bool {
        if self.state == EmmState::Deregistered {
            return false;
        }
        info!(target: targets::NAS, switch_off, "sending detach request");
        self.capture(b"DETACH REQUEST");
        self.bearers.push(LCID_SRB1, b"DETACH REQUEST".to_vec());
        self.state = if switch_off {
            EmmState::Deregistered
        } else {
            EmmState::DeregisteredInitiated
        };
        true
    }

    fn run_tti(&mut self) {
        match self.state {
            EmmState::RegisteredInitiated if self.bearers.connected() => {
                self.ticks_connected += 1;
                if self.ticks_connected >= self.attach_delay {
                    info!(target: targets::NAS, "attach complete");
                    self.state = EmmState::Registered;
                }
            }
            EmmState::DeregisteredInitiated if !self.bearers.has_data(LCID_SRB1) => {
                self.state = EmmState::Deregistered;
            }
            _ => {}
        }
    }

    fn metrics(&self) -> NasMetrics {
        NasMetrics {
            state: self.state,
            nof_active_eps_bearer: u32::from(self.state == EmmState::Registered),
        }
    }

    fn stop(&mut self) {
        self.handle = None;
        debug!(target: targets::NAS, "NAS stopped");
    }
}

pub struct SimRrc {
    bearers: SimBearers,
    handle: Option<StackHandle>,
    in_sync: u64,
    out_of_sync: u64,
}

impl RrcLayer for SimRrc {
    fn init(&mut self, stack: StackHandle) {
        self.handle = Some(stack);
    }

    fn run_tti(&mut self) {}

    fn in_sync(&mut self) {
        self.in_sync += 1;
    }

    fn out_of_sync(&mut self) {
        self.out_of_sync += 1;
        debug!(target: targets::RRC, count = self.out_of_sync, "out of sync");
    }

    fn cell_search_completed(&mut self, result: CellSearchResult, cell: PhyCell) {
        info!(target: targets::RRC, ?result, pci = cell.pci, earfcn = cell.earfcn, "cell search completed");
        if result == CellSearchResult::CellFound {
            if let Some(handle) = &self.handle {
                handle.start_cell_select(cell);
            }
        }
    }

    fn cell_select_completed(&mut self, selected: bool) {
        info!(target: targets::RRC, selected, "cell selection completed");
        self.bearers.set_connected(selected);
    }

    fn metrics(&self) -> RrcMetrics {
        let state = if self.bearers.connected() {
            RrcState::Connected
        } else {
            RrcState::Idle
        };
        RrcMetrics { state }
    }

    fn stop(&mut self) {
        self.handle = None;
        self.bearers.set_connected(false);
        debug!(target: targets::RRC, in_sync = self.in_sync, "RRC stopped");
    }
}

/// Builds the simulated layer set.  The returned [`SimBearers`] lets a test
/// inspect what is still waiting for transmission.
pub fn sim_layers(settings: &SimSettings) -> (StackLayers, SimBearers) {
    let bearers = SimBearers::default();
    let layers = StackLayers {
        usim: Box::new(SimUsim {
            imsi: settings.imsi.clone(),
        }),
        mac: Box::new(SimMac {
            bearers: bearers.clone(),
            grant: settings.grant_pdus_per_tti,
            last_tti: None,
            ticks: 0,
            capture: None,
        }),
        rlc: Box::new(SimRlc {
            bearers: bearers.clone(),
        }),
        pdcp: Box::new(SimPdcp {
            bearers: bearers.clone(),
        }),
        nas: Box::new(SimNas {
            bearers: bearers.clone(),
            handle: None,
            state: EmmState::Deregistered,
            attach_delay: settings.attach_delay_ticks,
            ticks_connected: 0,
            capture: None,
        }),
        rrc: Box::new(SimRrc {
            bearers: bearers.clone(),
            handle: None,
            in_sync: 0,
            out_of_sync: 0,
        }),
    };
    (layers, bearers)
}

// ── Radio ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SimRadio {
    cell: PhyCell,
    search_delay: Duration,
}

impl SimRadio {
    pub fn new(settings: &SimSettings) -> Self {
        Self {
            cell: settings.cell(),
            search_delay: Duration::from_millis(settings.search_delay_ms),
        }
    }
}

impl RadioDriver for SimRadio {
    fn cell_search(&self) -> (CellSearchResult, PhyCell) {
        thread::sleep(self.search_delay);
        (CellSearchResult::CellFound, self.cell)
    }

    fn cell_select(&self, cell: &PhyCell) -> bool {
        thread::sleep(self.search_delay / 2);
        *cell == self.cell
    }
}

// ── Capture ───────────────────────────────────────────────────────────────────

/// Capture sink writing a text log to a file: one `<len> <hex>` line per
/// PDU between a header and a footer.
pub struct FileCapture {
    layer: &'static str,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl FileCapture {
    pub fn new(layer: &'static str) -> Self {
        Self {
            layer,
            path: None,
            writer: None,
        }
    }
}

impl CaptureSink for FileCapture {
    fn open(&mut self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "# {} capture", self.layer)?;
        self.path = Some(path.to_path_buf());
        self.writer = Some(writer);
        Ok(())
    }

    fn write_pdu(&mut self, pdu: &[u8]) -> io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "capture not open"));
        };
        let hex: String = pdu.iter().map(|b| format!("{b:02x}")).collect();
        writeln!(writer, "{} {hex}", pdu.len())
    }

    fn close(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        let flushed = writeln!(writer, "# closed").and_then(|()| writer.flush());
        if let Err(e) = flushed {
            warn!(target: targets::STACK, layer = self.layer, path = ?self.path, "cannot flush capture: {e}");
        }
    }
}

pub fn file_captures() -> CaptureSinks {
    CaptureSinks {
        mac: Some(Box::new(FileCapture::new("mac"))),
        nas: Some(Box::new(FileCapture::new("nas"))),
    }
}
