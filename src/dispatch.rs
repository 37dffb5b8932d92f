//! Packet dispatch (C4, §4.3): pure routing by the one-byte kind prefix, plus
//! the FWID (§4.4) and STATE/READY (§4.5) handlers that don't belong to the
//! segment engine or the request/response servicer.

use crate::chainload::ChainLoader;
use crate::fmt::*;
use crate::protocol::{DfuType, Fwid, PacketKind, StateParams, StatePacket, TargetId};
use crate::state::DfuState;
use crate::timer::StateTimer;
use crate::transport::Transport;
use crate::verifier::SignatureVerifier;
use crate::writer::FlashWriter;
use crate::Bootloader;

impl<T, F, Tm, V, C> Bootloader<T, F, Tm, V, C>
where
    T: Transport,
    F: FlashWriter,
    Tm: StateTimer,
    V: SignatureVerifier,
    C: ChainLoader,
{
    /// Routes one inbound DFU frame by its leading `packet_type` byte.
    /// Unknown kinds and malformed payloads are dropped silently (§4.3).
    pub(crate) fn dispatch(&mut self, raw: &[u8]) {
        let Some((&kind_byte, payload)) = raw.split_first() else {
            return;
        };
        let Some(kind) = PacketKind::from_u8(kind_byte) else {
            trace!("dropping packet with unknown kind {}", kind_byte);
            return;
        };
        match kind {
            PacketKind::Fwid => self.on_fwid(payload),
            PacketKind::State => self.on_state(payload),
            PacketKind::Data => self.on_data(payload),
            PacketKind::DataReq => self.on_data_req(payload),
            PacketKind::DataRsp => self.on_data_rsp(payload),
        }
    }

    /// Only meaningful in FIND_FWID (§4.4).
    fn on_fwid(&mut self, payload: &[u8]) {
        if self.state != DfuState::FindFwid {
            return;
        }
        let Some(theirs) = Fwid::from_bytes(payload) else {
            debug!("dropping malformed FWID payload");
            return;
        };

        if self.own_fwid.bl_is_newer(&theirs) {
            info!("newer bootloader advertised, requesting a BL upgrade");
            self.enter_req(DfuType::Bl, TargetId::Bl(theirs.bl_version));
        } else if self.own_fwid.app_is_newer(&theirs) && self.own_fwid.runtime_differs(&theirs) {
            info!("newer app mandates a different runtime, requesting it first");
            self.enter_req(DfuType::Runtime, TargetId::Runtime(theirs.sd_version));
        } else if self.own_fwid.app_is_newer(&theirs) {
            info!("newer app advertised, requesting an app upgrade");
            self.enter_req(DfuType::App, TargetId::App(theirs.app_id));
        }
    }

    /// A STATE frame carrying either a REQ or a READY (§4.5). Peer REQs are
    /// informational only — this core never serves as a source — so only the
    /// READY shape is acted on.
    fn on_state(&mut self, payload: &[u8]) {
        let Some(packet) = StatePacket::parse(payload) else {
            debug!("dropping malformed STATE payload");
            return;
        };
        let StateParams::Ready { transaction_id, mic, target } = packet.params else {
            return;
        };
        if packet.authority == 0 {
            return;
        }
        self.on_ready(packet.dfu_type, packet.authority, transaction_id, mic, target);
    }

    /// §4.5: matches iff `dfu_type` and `target` agree with our transaction
    /// and the offered `transaction_id` hasn't recently been abandoned.
    fn on_ready(&mut self, dfu_type: DfuType, authority: u8, transaction_id: u32, mic: u64, target: TargetId) {
        let matches_current = self
            .transaction
            .as_ref()
            .is_some_and(|txn| txn.dfu_type == dfu_type && txn.target == target && !self.tid_cache.contains(transaction_id));
        if !matches_current {
            return;
        }

        match self.state {
            DfuState::DfuReq => {
                if let Some(txn) = self.transaction.as_mut() {
                    txn.authority = authority;
                    txn.transaction_id = transaction_id;
                    txn.ready_mic = mic;
                }
                info!("adopting first READY offer, authority={}", authority);
                self.enter_ready();
            }
            DfuState::DfuReady => {
                let incoming_key = (authority, transaction_id);
                let current_key = self.transaction.as_ref().map_or((0, 0), |t| t.authority_key());
                if incoming_key > current_key {
                    if let Some(txn) = self.transaction.as_mut() {
                        txn.authority = authority;
                        txn.transaction_id = transaction_id;
                        txn.ready_mic = mic;
                    }
                    debug!("overwriting adopted offer with a strictly greater one");
                }
            }
            _ => {}
        }
    }
}
