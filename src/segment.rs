//! Segment engine (C6, §4.6): validates segment ordering, computes target
//! addresses, drives the flash writer, and triggers relay.

use crate::chainload::ChainLoader;
use crate::config::SEGMENT_LENGTH;
use crate::fmt::*;
use crate::protocol::{DfuType, PacketKind, RepeatCount, SegmentHeader, StartMeta};
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
    /// A DATA frame is ignored unless its `transaction_id` equals the current
    /// transaction's (§4.6).
    pub(crate) fn on_data(&mut self, payload: &[u8]) {
        let Some((header, body)) = SegmentHeader::parse(payload) else {
            debug!("dropping malformed DATA header");
            return;
        };
        let Some(txn) = self.transaction else {
            return;
        };
        if header.transaction_id != txn.transaction_id {
            return;
        }

        match self.state {
            DfuState::DfuReady if header.segment == 0 => self.on_start_packet(header, body, payload),
            DfuState::DfuReady => self.on_missed_start(header),
            DfuState::DfuTarget if header.segment == 0 => {} // idempotent re-receive of start
            DfuState::DfuTarget => self.on_segment(header, body, payload),
            _ => {}
        }
    }

    /// READY → TARGET: segment 0 carries the start metadata (§4.6).
    fn on_start_packet(&mut self, header: SegmentHeader, body: &[u8], raw_payload: &[u8]) {
        let Some(meta) = StartMeta::parse(body) else {
            debug!("dropping malformed start packet");
            return;
        };
        let Some(mut txn) = self.transaction else {
            return;
        };

        let dfu_segment = self.memory_map.segment_for(txn.dfu_type);
        if !dfu_segment.contains_range(meta.start_address, meta.length_bytes()) {
            warn!("start packet outside the legal flash region, staying in READY");
            return;
        }

        let misalignment = meta.start_address & 0x0F;
        let Some(numerator) = meta.length_bytes().checked_add(misalignment).and_then(|n| n.checked_sub(1)) else {
            warn!("start packet length computation overflowed, staying in READY");
            return;
        };
        let segment_count = u16::try_from((numerator / SEGMENT_LENGTH) + 1).unwrap_or(0xFFFF);

        let bank_addr = if txn.dfu_type == DfuType::Bl {
            let app_segment = self.memory_map.app;
            let padded = round_up(meta.length_bytes(), self.config.page_size);
            app_segment.start.saturating_add(app_segment.length).saturating_sub(padded).saturating_sub(self.config.page_size)
        } else {
            meta.start_address
        };

        txn.start_addr = meta.start_address;
        txn.bank_addr = bank_addr;
        txn.length = meta.length_bytes();
        txn.signature_length = meta.signature_length;
        txn.segment_count = segment_count;
        txn.segments_remaining = segment_count;
        txn.segment_is_valid_after_transfer = meta.last != 0;

        if self.flash.dfu_start(txn.start_addr, bank_addr, txn.length, txn.segment_is_valid_after_transfer).is_err() {
            warn!("flash writer rejected dfu_start, staying in READY");
            return;
        }

        self.transaction = Some(txn);
        info!("start packet accepted: {} segments expected", segment_count);
        self.enter_target();
        self.relay(header.segment, raw_payload);
    }

    /// READY, segment != 0: we missed segment 0 (§4.6).
    fn on_missed_start(&mut self, header: SegmentHeader) {
        debug!("missed the start packet, restarting request for transaction {}", header.transaction_id);
        self.tid_cache.push(header.transaction_id);
        if let Some(txn) = self.transaction {
            self.enter_req(txn.dfu_type, txn.target);
        }
    }

    /// TARGET, segment > 0 (§4.6).
    fn on_segment(&mut self, header: SegmentHeader, body: &[u8], raw_payload: &[u8]) {
        let Some(mut txn) = self.transaction else {
            return;
        };
        if header.segment == 0 || header.segment > txn.segment_count {
            return;
        }

        let addr = segment_address(txn.start_addr, header.segment);
        match self.flash.dfu_data(addr, body) {
            WriteStatus::Written => {
                txn.segments_remaining = txn.segments_remaining.saturating_sub(1);
                self.transaction = Some(txn);
                self.relay(header.segment, raw_payload);
                if txn.segments_remaining == 0 {
                    self.finalize();
                }
            }
            WriteStatus::Duplicate => debug!("segment {} already written, not relaying", header.segment),
            WriteStatus::Rejected(err) => warn!("segment {} write rejected: {:?}", header.segment, err),
        }
    }

    /// A DATA frame that advanced our state is relayed verbatim with DATA
    /// repeat/interval (§4.6 "Relay rule").
    fn relay(&mut self, segment: u16, raw_payload: &[u8]) {
        let Some(mut pkt) = self.transport.acquire() else {
            warn!("relay of segment {} dropped: no transport buffer", segment);
            return;
        };
        self.transport.set_local_addr(&mut pkt);
        if !self.transport.build(&mut pkt, PacketKind::Data, self.config.mesh_uuid, raw_payload) {
            warn!("relay of segment {} dropped: payload did not fit", segment);
            return;
        }
        self.transport.tx(pkt, RepeatCount::Finite(self.config.data_repeat_count), self.config.data_interval_class);
    }
}

/// Segment 1 is aligned to the first 16-byte slot containing `start_addr`;
/// segment *n* > 1 is contiguous from there (§4.6, glossary "Segment").
pub(crate) fn segment_address(start_addr: u32, segment: u16) -> u32 {
    if segment <= 1 {
        start_addr
    } else {
        (u32::from(segment - 1) << 4) + (start_addr & !0xF_u32)
    }
}

fn round_up(value: u32, multiple: u32) -> u32 {
    if multiple == 0 {
        return value;
    }
    let rem = value % multiple;
    if rem == 0 {
        value
    } else {
        value.saturating_add(multiple - rem)
    }
}
