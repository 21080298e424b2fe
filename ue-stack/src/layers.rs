/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Boundary of the protocol layers, radio driver and capture sinks.
//!
//! The layers' internals are external to this crate.  What matters here is
//! the ownership model:
//!
//! | Collaborator | Owner | Threads touching it |
//! |---|---|---|
//! | MAC, RLC, PDCP, RRC, NAS, USIM | executor ([`StackLayers`]) | executor thread only, after `init()` |
//! | capture sinks | executor ([`CaptureSinks`]), shared with MAC/NAS as [`CaptureHandle`] | executor thread only, after `init()` |
//! | radio driver | shared `Arc<dyn RadioDriver>` | background workers |
//!
//! Layer traits therefore require `Send` (the layers are moved onto the
//! executor thread once) but not `Sync`.  The radio driver is the only
//! collaborator called from several threads and must be `Send + Sync`.
//!
//! Cross-layer references are not stored as pointers: each task receives
//! `&mut StackLayers` and calls whichever layers it needs.  RRC and NAS get a
//! [`StackHandle`] during `init()` as their route back into the stack
//! (background work, deferred callbacks, cell search).

use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::metrics::{MacMetrics, NasMetrics, RlcMetrics, RrcMetrics};
use crate::stack::StackHandle;
use crate::targets;

/// Logical channel id of SRB1, carrier of NAS signalling (detach request).
pub const LCID_SRB1: u32 = 1;

// ── Radio-side value types ────────────────────────────────────────────────────

/// A cell found by the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PhyCell {
    /// Physical cell id.
    pub pci: u32,
    /// E-UTRA absolute radio frequency channel number.
    pub earfcn: u32,
}

/// Outcome of a blocking cell search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellSearchResult {
    CellFound,
    CellNotFound,
    Error,
}

/// RRC establishment cause of an attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EstablishmentCause {
    #[default]
    MoSignalling,
    MoData,
}

// ── Layer traits ──────────────────────────────────────────────────────────────

pub trait UsimLayer: Send {
    /// Brings up the credential store.  Failure aborts stack initialisation.
    ///
    /// # Errors
    /// Any error reported by the credential backend (reader missing, ...).
    fn init(&mut self) -> anyhow::Result<()>;
    fn stop(&mut self);
}

pub trait MacLayer: Send {
    fn init(&mut self) {}
    /// Hands over the MAC capture once it is open.
    fn start_pcap(&mut self, _capture: CaptureHandle) {}
    /// Per-sub-tick hook; `tti` is the sub-tick id.
    fn run_tti(&mut self, tti: u32);
    fn metrics(&self) -> MacMetrics;
    fn stop(&mut self);
}

pub trait RlcLayer: Send {
    fn init(&mut self) {}
    /// Whether the bearer on `lcid` still holds data waiting for transmission.
    fn has_data(&self, lcid: u32) -> bool;
    fn metrics(&self) -> RlcMetrics;
    fn stop(&mut self);
}

pub trait PdcpLayer: Send {
    fn init(&mut self) {}
    /// Uplink SDU from the IP layer.
    fn write_sdu(&mut self, lcid: u32, sdu: Vec<u8>, blocking: bool);
    fn stop(&mut self);
}

pub trait NasLayer: Send {
    fn init(&mut self, _stack: StackHandle) {}
    /// Hands over the NAS capture once it is open.
    fn start_pcap(&mut self, _capture: CaptureHandle) {}
    fn start_attach(&mut self, cause: EstablishmentCause);
    /// Queues a detach request; `switch_off` marks a power-down detach.
    /// Returns `false` if no detach could be generated.
    fn detach_request(&mut self, switch_off: bool) -> bool;
    /// Per-batch hook.
    fn run_tti(&mut self);
    fn metrics(&self) -> NasMetrics;
    fn stop(&mut self);
}

pub trait RrcLayer: Send {
    fn init(&mut self, _stack: StackHandle) {}
    /// Per-batch hook.
    fn run_tti(&mut self);
    fn in_sync(&mut self);
    fn out_of_sync(&mut self);
    fn cell_search_completed(&mut self, result: CellSearchResult, cell: PhyCell);
    fn cell_select_completed(&mut self, selected: bool);
    fn metrics(&self) -> RrcMetrics;
    fn stop(&mut self);
}

/// Physical-layer driver.  Its calls may block for a long time and are only
/// issued from background workers.
pub trait RadioDriver: Send + Sync {
    fn cell_search(&self) -> (CellSearchResult, PhyCell);
    fn cell_select(&self, cell: &PhyCell) -> bool;
}

/// Diagnostic packet-capture writer.
pub trait CaptureSink: Send {
    /// # Errors
    /// Propagates the writer's I/O error.
    fn open(&mut self, path: &Path) -> io::Result<()>;
    /// Appends one PDU to the capture.
    ///
    /// # Errors
    /// Propagates the writer's I/O error.
    fn write_pdu(&mut self, pdu: &[u8]) -> io::Result<()>;
    fn close(&mut self);
}

// ── CaptureHandle ─────────────────────────────────────────────────────────────

struct OpenCapture {
    sink: Box<dyn CaptureSink>,
    open: bool,
}

/// An open capture sink, shared between the executor (which closes it at
/// teardown) and the layer writing into it.
///
/// Writes after close are ignored.  A failing write closes the capture.
#[derive(Clone)]
pub struct CaptureHandle {
    layer: &'static str,
    inner: Arc<Mutex<OpenCapture>>,
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("layer", &self.layer)
            .field("open", &self.is_open())
            .finish()
    }
}

impl CaptureHandle {
    /// Wraps a sink that has already been opened.
    pub(crate) fn new(layer: &'static str, sink: Box<dyn CaptureSink>) -> Self {
        Self {
            layer,
            inner: Arc::new(Mutex::new(OpenCapture { sink, open: true })),
        }
    }

    pub fn layer(&self) -> &'static str {
        self.layer
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    pub fn write_pdu(&self, pdu: &[u8]) {
        let mut capture = self.inner.lock();
        if !capture.open {
            return;
        }
        if let Err(e) = capture.sink.write_pdu(pdu) {
            warn!(target: targets::STACK, layer = self.layer, "capture write failed, closing: {e}");
            capture.sink.close();
            capture.open = false;
        }
    }

    pub(crate) fn close(&self) {
        let mut capture = self.inner.lock();
        if capture.open {
            capture.sink.close();
            capture.open = false;
        }
    }
}

// ── Bundles ───────────────────────────────────────────────────────────────────

/// Every protocol-layer instance of one stack.  Owned by the executor.
pub struct StackLayers {
    pub usim: Box<dyn UsimLayer>,
    pub mac: Box<dyn MacLayer>,
    pub rlc: Box<dyn RlcLayer>,
    pub pdcp: Box<dyn PdcpLayer>,
    pub nas: Box<dyn NasLayer>,
    pub rrc: Box<dyn RrcLayer>,
}

impl std::fmt::Debug for StackLayers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StackLayers { usim, mac, rlc, pdcp, nas, rrc }")
    }
}

/// Optional capture sinks, opened when enabled in the `pcap` config section
/// and then handed to MAC and NAS.
#[derive(Default)]
pub struct CaptureSinks {
    pub mac: Option<Box<dyn CaptureSink>>,
    pub nas: Option<Box<dyn CaptureSink>>,
}

impl std::fmt::Debug for CaptureSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSinks")
            .field("mac", &self.mac.is_some())
            .field("nas", &self.nas.is_some())
            .finish()
    }
}
