/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Recording mock layers shared by the unit tests.

use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::StackConfig;
use crate::executor::StackContext;
use crate::layers::{
    CaptureHandle, CaptureSink, CaptureSinks, CellSearchResult, EstablishmentCause, MacLayer, NasLayer,
    PdcpLayer, PhyCell, RadioDriver, RlcLayer, RrcLayer, StackLayers, UsimLayer, LCID_SRB1,
};
use crate::metrics::{EmmState, MacMetrics, NasMetrics, RlcMetrics, RrcMetrics, RrcState};
use crate::stack::StackHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    UsimInit,
    UsimStop,
    MacInit,
    MacTti(u32),
    MacStop,
    RlcInit,
    RlcStop,
    PdcpInit,
    PdcpSdu { lcid: u32, len: usize },
    PdcpStop,
    NasInit,
    NasAttach,
    NasDetach { switch_off: bool },
    NasTti,
    NasStop,
    RrcInit,
    RrcTti,
    RrcInSync,
    RrcOutOfSync,
    RrcCellSearch(CellSearchResult),
    RrcCellSelect(bool),
    RrcStop,
    CaptureOpen(&'static str),
    CapturePdu(&'static str, Vec<u8>),
    CaptureClose(&'static str),
}

#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Call>>>);

impl Recorder {
    pub fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn mac_ttis(&self) -> Vec<u32> {
        self.0
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::MacTti(t) => Some(*t),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    pub usim_fails: bool,
    pub capture_open_fails: bool,
    /// Sleep inside every MAC sub-tick.
    pub mac_tti_delay: Option<Duration>,
}

/// Knobs and probes shared between a test and its mock layers.
#[derive(Debug, Clone, Default)]
pub struct MockControls {
    /// What `rlc.has_data(SRB1)` answers.
    pub srb1_pending: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    threads: Arc<Mutex<HashSet<String>>>,
}

impl MockControls {
    /// Highest number of MAC hooks observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Names of the threads the MAC hook ran on.
    pub fn threads(&self) -> HashSet<String> {
        self.threads.lock().clone()
    }
}

// ── Layers ────────────────────────────────────────────────────────────────────

struct MockUsim {
    rec: Recorder,
    fails: bool,
}

impl UsimLayer for MockUsim {
    fn init(&mut self) -> anyhow::Result<()> {
        self.rec.push(Call::UsimInit);
        if self.fails {
            anyhow::bail!("no card reader");
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.rec.push(Call::UsimStop);
    }
}

struct MockMac {
    rec: Recorder,
    controls: MockControls,
    delay: Option<Duration>,
    ticks: u64,
    capture: Option<CaptureHandle>,
}

impl MacLayer for MockMac {
    fn init(&mut self) {
        self.rec.push(Call::MacInit);
    }

    fn start_pcap(&mut self, capture: CaptureHandle) {
        self.capture = Some(capture);
    }

    fn run_tti(&mut self, tti: u32) {
        let now = self.controls.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.controls.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(name) = thread::current().name() {
            self.controls.threads.lock().insert(name.to_string());
        }
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.ticks += 1;
        self.rec.push(Call::MacTti(tti));
        if let Some(capture) = &self.capture {
            capture.write_pdu(&tti.to_be_bytes());
        }
        self.controls.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn metrics(&self) -> MacMetrics {
        MacMetrics {
            tx_pkts: self.ticks,
            ..Default::default()
        }
    }

    fn stop(&mut self) {
        self.rec.push(Call::MacStop);
    }
}

struct MockRlc {
    rec: Recorder,
    srb1_pending: Arc<AtomicBool>,
}

impl RlcLayer for MockRlc {
    fn init(&mut self) {
        self.rec.push(Call::RlcInit);
    }

    fn has_data(&self, lcid: u32) -> bool {
        lcid == LCID_SRB1 && self.srb1_pending.load(Ordering::SeqCst)
    }

    fn metrics(&self) -> RlcMetrics {
        RlcMetrics::default()
    }

    fn stop(&mut self) {
        self.rec.push(Call::RlcStop);
    }
}

struct MockPdcp {
    rec: Recorder,
}

impl PdcpLayer for MockPdcp {
    fn init(&mut self) {
        self.rec.push(Call::PdcpInit);
    }

    fn write_sdu(&mut self, lcid: u32, sdu: Vec<u8>, _blocking: bool) {
        self.rec.push(Call::PdcpSdu { lcid, len: sdu.len() });
    }

    fn stop(&mut self) {
        self.rec.push(Call::PdcpStop);
    }
}

struct MockNas {
    rec: Recorder,
    state: EmmState,
    handle: Option<StackHandle>,
    capture: Option<CaptureHandle>,
}

/// First bytes of an EMM attach request, as the mock NAS captures it.
pub const ATTACH_REQUEST_PDU: [u8; 2] = [0x07, 0x41];

impl NasLayer for MockNas {
    fn init(&mut self, stack: StackHandle) {
        self.rec.push(Call::NasInit);
        self.handle = Some(stack);
    }

    fn start_pcap(&mut self, capture: CaptureHandle) {
        self.capture = Some(capture);
    }

    fn start_attach(&mut self, _cause: EstablishmentCause) {
        self.rec.push(Call::NasAttach);
        if let Some(capture) = &self.capture {
            capture.write_pdu(&ATTACH_REQUEST_PDU);
        }
        self.state = EmmState::Registered;
    }

    fn detach_request(&mut self, switch_off: bool) -> bool {
        self.rec.push(Call::NasDetach { switch_off });
        self.state = EmmState::Deregistered;
        true
    }

    fn run_tti(&mut self) {
        self.rec.push(Call::NasTti);
    }

    fn metrics(&self) -> NasMetrics {
        NasMetrics {
            state: self.state,
            nof_active_eps_bearer: u32::from(self.state == EmmState::Registered),
        }
    }

    fn stop(&mut self) {
        self.rec.push(Call::NasStop);
        self.handle = None;
    }
}

struct MockRrc {
    rec: Recorder,
    state: RrcState,
}

impl RrcLayer for MockRrc {
    fn init(&mut self, _stack: StackHandle) {
        self.rec.push(Call::RrcInit);
    }

    fn run_tti(&mut self) {
        self.rec.push(Call::RrcTti);
    }

    fn in_sync(&mut self) {
        self.rec.push(Call::RrcInSync);
        self.state = RrcState::Connected;
    }

    fn out_of_sync(&mut self) {
        self.rec.push(Call::RrcOutOfSync);
    }

    fn cell_search_completed(&mut self, result: CellSearchResult, _cell: PhyCell) {
        self.rec.push(Call::RrcCellSearch(result));
    }

    fn cell_select_completed(&mut self, selected: bool) {
        self.rec.push(Call::RrcCellSelect(selected));
        if selected {
            self.state = RrcState::Connected;
        }
    }

    fn metrics(&self) -> RrcMetrics {
        RrcMetrics { state: self.state }
    }

    fn stop(&mut self) {
        self.rec.push(Call::RrcStop);
    }
}

// ── Radio and capture ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MockRadio {
    pub cell: PhyCell,
    pub delay: Duration,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self {
            cell: PhyCell { pci: 1, earfcn: 3400 },
            delay: Duration::from_millis(5),
        }
    }
}

impl RadioDriver for MockRadio {
    fn cell_search(&self) -> (CellSearchResult, PhyCell) {
        thread::sleep(self.delay);
        (CellSearchResult::CellFound, self.cell)
    }

    fn cell_select(&self, cell: &PhyCell) -> bool {
        thread::sleep(self.delay);
        *cell == self.cell
    }
}

struct MockCapture {
    name: &'static str,
    rec: Recorder,
    fails: bool,
}

impl CaptureSink for MockCapture {
    fn open(&mut self, _path: &Path) -> io::Result<()> {
        self.rec.push(Call::CaptureOpen(self.name));
        if self.fails {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        Ok(())
    }

    fn write_pdu(&mut self, pdu: &[u8]) -> io::Result<()> {
        self.rec.push(Call::CapturePdu(self.name, pdu.to_vec()));
        Ok(())
    }

    fn close(&mut self) {
        self.rec.push(Call::CaptureClose(self.name));
    }
}

// ── Builders ──────────────────────────────────────────────────────────────────

/// Small, fast configuration: one worker, 200 ms detach deadline.
pub fn test_config() -> StackConfig {
    let mut config = StackConfig::default();
    config.queue_capacity = 64;
    config.background_workers = 1;
    config.detach.timeout_ms = 200;
    config.detach.poll_interval_ms = 5;
    config
}

pub fn mock_layers(rec: &Recorder, opts: &MockOptions) -> (StackLayers, MockControls) {
    let controls = MockControls::default();
    let layers = StackLayers {
        usim: Box::new(MockUsim {
            rec: rec.clone(),
            fails: opts.usim_fails,
        }),
        mac: Box::new(MockMac {
            rec: rec.clone(),
            controls: controls.clone(),
            delay: opts.mac_tti_delay,
            ticks: 0,
            capture: None,
        }),
        rlc: Box::new(MockRlc {
            rec: rec.clone(),
            srb1_pending: Arc::clone(&controls.srb1_pending),
        }),
        pdcp: Box::new(MockPdcp { rec: rec.clone() }),
        nas: Box::new(MockNas {
            rec: rec.clone(),
            state: EmmState::Deregistered,
            handle: None,
            capture: None,
        }),
        rrc: Box::new(MockRrc {
            rec: rec.clone(),
            state: RrcState::Idle,
        }),
    };
    (layers, controls)
}

pub fn mock_captures(rec: &Recorder, opts: &MockOptions) -> CaptureSinks {
    CaptureSinks {
        mac: Some(Box::new(MockCapture {
            name: "mac",
            rec: rec.clone(),
            fails: opts.capture_open_fails,
        })),
        nas: Some(Box::new(MockCapture {
            name: "nas",
            rec: rec.clone(),
            fails: opts.capture_open_fails,
        })),
    }
}

/// An executor context that is driven directly by the test thread.
pub fn mock_context(config: StackConfig, opts: MockOptions) -> (StackContext, Recorder, MockControls) {
    let rec = Recorder::default();
    let (layers, controls) = mock_layers(&rec, &opts);
    let captures = mock_captures(&rec, &opts);
    let handle = StackHandle::new(config).unwrap();
    (StackContext::new(layers, captures, handle), rec, controls)
}
