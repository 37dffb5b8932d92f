//! Beacon builder (C3, §4.2): maintains at most one outstanding outbound
//! beacon and (re)formats one of the seven advertisement payload shapes.

use crate::error::BootloaderError;
use crate::protocol::{BeaconKind, Fwid, IntervalClass, StateParams, StatePacket};
use crate::transaction::Transaction;
use crate::transport::{abort_and_release, Transport};

/// Largest encoded STATE payload: authority(1) + dfu_type(1) + tid(4) + mic(8) + app id(6).
const MAX_BEACON_PAYLOAD: usize = 20;

pub struct BeaconBuilder<T: Transport> {
    current: Option<T::Packet>,
}

impl<T: Transport> BeaconBuilder<T> {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// True while a beacon is outstanding (used by the state machine to know
    /// whether `stop` has anything to do, §4.1 DFU_TARGET "Stops the beacon").
    pub fn is_set(&self) -> bool {
        self.current.is_some()
    }

    /// Aborts and releases the current beacon without replacing it (§4.1
    /// DFU_TARGET: "Stops the beacon").
    pub fn stop(&mut self, transport: &mut T) {
        abort_and_release(transport, &mut self.current);
    }

    /// Replaces the current beacon with `kind`'s payload (§4.2). `own_fwid`
    /// is used for the `Fwid` kind; `transaction` supplies the target id,
    /// authority, transaction id, and MIC for `Req`/`Ready` kinds.
    pub fn set(
        &mut self,
        transport: &mut T,
        mesh_uuid: [u8; 2],
        kind: BeaconKind,
        own_fwid: Fwid,
        transaction: Option<&Transaction>,
    ) -> Result<(), BootloaderError> {
        abort_and_release(transport, &mut self.current);

        let mut buf = [0u8; MAX_BEACON_PAYLOAD];
        let len = encode_payload(kind, own_fwid, transaction, &mut buf).ok_or(BootloaderError::InvalidPersistentStorage)?;

        let mut pkt = transport.acquire().ok_or(BootloaderError::OutOfMemory)?;
        transport.set_local_addr(&mut pkt);
        if !transport.build(&mut pkt, kind.packet_kind(), mesh_uuid, buf.get(..len).unwrap_or(&[])) {
            return Err(BootloaderError::OutOfMemory);
        }

        // One ref for the transport's tx queue, one retained here so we can
        // `tx_abort` + `ref_count_dec` it on the next `set`/`stop` (§9).
        transport.ref_count_inc(&mut pkt);
        transport.tx(pkt, kind.repeat(), IntervalClass::Fast);
        self.current = Some(pkt);
        Ok(())
    }
}

impl<T: Transport> Default for BeaconBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_payload(kind: BeaconKind, own_fwid: Fwid, transaction: Option<&Transaction>, out: &mut [u8]) -> Option<usize> {
    match kind {
        BeaconKind::Fwid => {
            let bytes = own_fwid.to_bytes();
            let dst = out.get_mut(..bytes.len())?;
            dst.copy_from_slice(&bytes);
            Some(bytes.len())
        }
        BeaconKind::Req(dfu_type) => {
            let txn = transaction?;
            let packet = StatePacket { dfu_type, authority: 0, params: StateParams::Req { target: txn.target } };
            packet.encode(out)
        }
        BeaconKind::Ready(dfu_type) => {
            let txn = transaction?;
            let packet = StatePacket {
                dfu_type,
                authority: txn.authority,
                params: StateParams::Ready { transaction_id: txn.transaction_id, mic: txn.ready_mic, target: txn.target },
            };
            packet.encode(out)
        }
    }
}
