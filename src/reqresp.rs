//! Request/response servicer (C7, §4.7): serves missing-segment requests for
//! peers and accepts responses for ourselves.

use binary_serde::BinarySerde;

use crate::chainload::ChainLoader;
use crate::fmt::*;
use crate::protocol::{PacketKind, RepeatCount, SegmentHeader, DATA_RSP_SEGMENT_LEN, WIRE_ENDIANNESS};
use crate::segment::segment_address;
use crate::state::DfuState;
use crate::timer::StateTimer;
use crate::transport::Transport;
use crate::verifier::SignatureVerifier;
use crate::writer::{FlashWriter, WriteStatus};
use crate::Bootloader;

impl<T, F, Tm, V, C> Bootloader<T, F, Tm, V, C>
where
    T: Transport,
    F: FlashWriter,
    Tm: StateTimer,
    V: SignatureVerifier,
    C: ChainLoader,
{
    /// A peer asking us to retransmit a segment (§4.7).
    pub(crate) fn on_data_req(&mut self, payload: &[u8]) {
        let Some((header, _)) = SegmentHeader::parse(payload) else {
            debug!("dropping malformed DATA_REQ header");
            return;
        };
        let Some(txn) = self.transaction else {
            return;
        };
        if header.transaction_id != txn.transaction_id {
            return;
        }
        if self.req_cache.contains(header.segment) {
            debug!("segment {} served recently, dropping repeat request", header.segment);
            return;
        }

        let addr = segment_address(txn.start_addr, header.segment);
        let mut body = [0u8; DATA_RSP_SEGMENT_LEN];
        if !self.flash.dfu_has_entry(addr, &mut body) {
            return;
        }

        let mut frame = [0u8; SegmentHeader::WIRE_LEN + DATA_RSP_SEGMENT_LEN];
        let Some(header_bytes) = frame.get_mut(..SegmentHeader::WIRE_LEN) else {
            return;
        };
        header.binary_serialize(header_bytes, WIRE_ENDIANNESS);
        if let Some(body_bytes) = frame.get_mut(SegmentHeader::WIRE_LEN..) {
            body_bytes.copy_from_slice(&body);
        }

        let Some(mut pkt) = self.transport.acquire() else {
            warn!("DATA_RSP for segment {} dropped: no transport buffer", header.segment);
            return;
        };
        self.transport.set_local_addr(&mut pkt);
        if !self.transport.build(&mut pkt, PacketKind::DataRsp, self.config.mesh_uuid, &frame) {
            return;
        }
        self.transport.tx(pkt, RepeatCount::Finite(self.config.rsp_repeat_count), self.config.rsp_interval_class);
        self.req_cache.push(header.segment);
    }

    /// A peer supplying a segment we're missing (§4.7). Fire-and-forget:
    /// writes through the flash writer but does not decrement
    /// `segments_remaining` (§9 "Open question: RSP accounting" — progress
    /// authority stays with the DATA path).
    pub(crate) fn on_data_rsp(&mut self, payload: &[u8]) {
        let Some((header, body)) = SegmentHeader::parse(payload) else {
            debug!("dropping malformed DATA_RSP header");
            return;
        };
        let Some(txn) = self.transaction else {
            return;
        };
        if header.transaction_id != txn.transaction_id || self.state != DfuState::DfuTarget {
            return;
        }

        let addr = segment_address(txn.start_addr, header.segment);
        match self.flash.dfu_data(addr, body) {
            WriteStatus::Written => debug!("RSP-delivered segment {} written", header.segment),
            WriteStatus::Duplicate => {}
            WriteStatus::Rejected(err) => warn!("RSP-delivered segment {} rejected: {:?}", header.segment, err),
        }
    }
}
