//! Mesh advertising transport boundary (§6 "Transport API consumed").
//!
//! The transport owns buffer allocation and tx scheduling; the core only ever
//! holds at most one outstanding packet handle per outbound frame and always
//! explicitly aborts+derefs it before replacing it (§4.2, §5 "Shared
//! resources"). `Transport::Packet` is opaque to the core — it's whatever
//! buffer/descriptor type the concrete radio driver uses.

use crate::protocol::{IntervalClass, PacketKind, RepeatCount};

/// Driver boundary for the mesh advertising transport.
pub trait Transport {
    /// Opaque transport buffer handle, reference-counted by the driver. Cheap
    /// to copy (a small descriptor or index, not an owning buffer) so the
    /// core can hand one copy to `tx` while retaining another to `tx_abort`
    /// later (§9 "Reference-counted beacons").
    type Packet: Copy;

    /// Acquires a fresh transport buffer. `None` on allocation failure, which
    /// is fatal when a buffer is required to make progress (§7 `OutOfMemory`).
    fn acquire(&mut self) -> Option<Self::Packet>;

    /// Sets the advertisement envelope's source address to this node's local
    /// address (§6 "Outbound envelope").
    fn set_local_addr(&mut self, pkt: &mut Self::Packet);

    /// Fills `pkt`'s advertisement payload: non-connectable undirected
    /// advertising, mesh UUID bytes, and the given DFU frame bytes, with the
    /// advertisement-data length field set to `DFU_PACKET_ADV_OVERHEAD +
    /// dfu_len` (§6). Returns `false` if `payload` does not fit.
    fn build(&mut self, pkt: &mut Self::Packet, kind: PacketKind, mesh_uuid: [u8; 2], payload: &[u8]) -> bool;

    /// Queues `pkt` for transmission with the given repeat/interval class,
    /// consuming one reference (§4.2, §9 "Reference-counted beacons").
    fn tx(&mut self, pkt: Self::Packet, repeat: RepeatCount, interval: IntervalClass);

    /// Aborts an in-flight transmission of `pkt` without consuming it; the
    /// caller still owns the reference and must `ref_count_dec` it (§4.2).
    fn tx_abort(&mut self, pkt: &mut Self::Packet);

    fn ref_count_inc(&mut self, pkt: &mut Self::Packet);
    fn ref_count_dec(&mut self, pkt: &mut Self::Packet);
}

/// Aborts and releases `pkt` if present, per the "abort current beacon, then
/// decrement its reference" half of §4.2's `beacon_set` contract.
pub fn abort_and_release<T: Transport>(transport: &mut T, pkt: &mut Option<T::Packet>) {
    if let Some(mut old) = pkt.take() {
        transport.tx_abort(&mut old);
        transport.ref_count_dec(&mut old);
    }
}
