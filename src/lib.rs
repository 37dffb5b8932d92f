#![cfg_attr(not(test), no_std)]
//! Mesh DFU bootloader core: the state machine, packet dispatch, and
//! transaction bookkeeping that moves a node from advertising its own
//! firmware identity through a negotiated, segment-reliable transfer to a
//! verified reboot into new firmware (§1, §2).
//!
//! Everything outside this crate — the mesh advertising transport, the flash
//! writer, the persistent info store, the state timer, the signature
//! verifier, and the chain-load helper — is a collaborator trait (§6);
//! replacing any of them leaves this core unchanged.

pub mod beacon;
pub mod chainload;
pub mod components;
pub mod config;
mod dispatch;
pub mod error;
mod finalize;
pub mod fmt;
pub mod info;
pub mod protocol;
mod reqresp;
mod segment;
pub mod state;
pub mod timer;
pub mod transaction;
pub mod transport;
pub mod verifier;
pub mod writer;

use p256::ecdsa::VerifyingKey;

use crate::beacon::BeaconBuilder;
use crate::chainload::ChainLoader;
use crate::components::MemoryMap;
use crate::config::BootloaderConfig;
use crate::error::{AbortReason, BootloaderError};
use crate::fmt::*;
use crate::info::{InfoStore, JOURNAL_LEN, VERSION_INVALID};
use crate::protocol::{BeaconKind, DfuType, Fwid, TargetId};
use crate::state::DfuState;
use crate::timer::StateTimer;
use crate::transaction::{ReqCache, TidCache, Transaction};
use crate::transport::Transport;
use crate::verifier::SignatureVerifier;
use crate::writer::FlashWriter;

/// Owns every piece of mutable state described in §9's "module-level mutable
/// state" design note (transaction, state, beacon, caches) plus the
/// collaborator handles the state machine drives. One instance spans from
/// `init` to the first terminal `abort` (§9).
pub struct Bootloader<T: Transport, F: FlashWriter, Tm: StateTimer, V: SignatureVerifier, C: ChainLoader> {
    config: BootloaderConfig,
    own_fwid: Fwid,
    memory_map: MemoryMap,
    public_key: Option<VerifyingKey>,
    state: DfuState,
    transaction: Option<Transaction>,
    beacon: BeaconBuilder<T>,
    req_cache: ReqCache,
    tid_cache: TidCache,
    transport: T,
    flash: F,
    timer: Tm,
    verifier: V,
    chain: C,
}

impl<T, F, Tm, V, C> Bootloader<T, F, Tm, V, C>
where
    T: Transport,
    F: FlashWriter,
    Tm: StateTimer,
    V: SignatureVerifier,
    C: ChainLoader,
{
    /// §4.8 initialization: reads the six persistent info entries, seeds the
    /// flash writer's journal, and enters the state dictated by the
    /// integrity flags and sentinel version checks.
    pub fn init<I: InfoStore>(
        transport: T,
        mut flash: F,
        timer: Tm,
        verifier: V,
        chain: C,
        config: BootloaderConfig,
        info: &mut I,
    ) -> Result<Self, BootloaderError> {
        let mut boot_info = info.read_boot_info().ok_or(BootloaderError::InvalidPersistentStorage)?;

        let journal = match boot_info.journal {
            Some(journal) => journal,
            None => {
                let fresh = [0xFFu8; JOURNAL_LEN];
                if !info.write_journal(&fresh) {
                    return Err(BootloaderError::InvalidPersistentStorage);
                }
                boot_info.journal = Some(fresh);
                fresh
            }
        };
        let half = JOURNAL_LEN / 2;
        let Some(first_half) = journal.get(..half) else {
            return Err(BootloaderError::InvalidPersistentStorage);
        };
        let Some(second_half) = journal.get(half..) else {
            return Err(BootloaderError::InvalidPersistentStorage);
        };
        flash.init_journal(first_half, second_half);

        let runtime_needs_dfu = !boot_info.sd_intact || boot_info.fwid.sd_version == u32::from(VERSION_INVALID);
        let app_needs_dfu = !boot_info.app_intact || boot_info.fwid.app_id.version == VERSION_INVALID;

        let mut bootloader = Self {
            config,
            own_fwid: boot_info.fwid,
            memory_map: boot_info.memory_map,
            public_key: boot_info.public_key,
            state: DfuState::FindFwid,
            transaction: None,
            beacon: BeaconBuilder::new(),
            req_cache: ReqCache::new(),
            tid_cache: TidCache::new(),
            transport,
            flash,
            timer,
            verifier,
            chain,
        };

        if runtime_needs_dfu {
            warn!("runtime not intact at boot, requesting a runtime upgrade");
            let target = TargetId::Runtime(bootloader.own_fwid.sd_version);
            bootloader.enter_req(DfuType::Runtime, target);
        } else if app_needs_dfu {
            warn!("application not intact at boot, requesting an app upgrade");
            let target = TargetId::App(bootloader.own_fwid.app_id);
            bootloader.enter_req(DfuType::App, target);
        } else {
            bootloader.enter_find_fwid();
        }

        Ok(bootloader)
    }

    /// Entry point for inbound DFU frames (§5 "the transport delivers
    /// received packets to `bootloader_rx`").
    pub fn bootloader_rx(&mut self, raw: &[u8]) {
        self.dispatch(raw);
    }

    /// Entry point for state-timer expiry (§5 "the timer raises
    /// `bootloader_rtc_irq_handler` on state-timeout").
    pub fn bootloader_rtc_irq_handler(&mut self) {
        match self.state {
            DfuState::FindFwid => self.abort(AbortReason::FwidValid),
            DfuState::DfuReq | DfuState::DfuReady => self.abort(AbortReason::NoStart),
            DfuState::DfuTarget => {
                if let Some(txn) = self.transaction {
                    warn!("target timed out, falling back to a fresh request");
                    self.enter_req(txn.dfu_type, txn.target);
                }
            }
            DfuState::Rampdown => self.abort(AbortReason::Success),
        }
    }

    pub fn state(&self) -> DfuState {
        self.state
    }

    /// §4.2: acquiring the fresh transport buffer a beacon needs is "fatal-abort
    /// on OOM" — a failed `beacon_set` terminates the bootloader rather than
    /// silently leaving the old beacon in place.
    pub(crate) fn enter_find_fwid(&mut self) {
        if let Err(err) = self.beacon.set(&mut self.transport, self.config.mesh_uuid, BeaconKind::Fwid, self.own_fwid, None) {
            self.abort(err.into());
        }
        self.arm(DfuState::FindFwid);
    }

    pub(crate) fn enter_req(&mut self, dfu_type: DfuType, target: TargetId) {
        self.transaction = Some(Transaction::new_request(dfu_type, target));
        if let Err(err) = self.beacon.set(&mut self.transport, self.config.mesh_uuid, BeaconKind::Req(dfu_type), self.own_fwid, self.transaction.as_ref()) {
            self.abort(err.into());
        }
        self.arm(DfuState::DfuReq);
    }

    pub(crate) fn enter_ready(&mut self) {
        let dfu_type = self.transaction.as_ref().map_or(DfuType::App, |t| t.dfu_type);
        if let Err(err) = self.beacon.set(&mut self.transport, self.config.mesh_uuid, BeaconKind::Ready(dfu_type), self.own_fwid, self.transaction.as_ref()) {
            self.abort(err.into());
        }
        self.arm(DfuState::DfuReady);
    }

    pub(crate) fn enter_target(&mut self) {
        self.beacon.stop(&mut self.transport);
        self.arm(DfuState::DfuTarget);
    }

    pub(crate) fn enter_rampdown(&mut self) {
        self.arm(DfuState::Rampdown);
    }

    /// Entering any state arms its timeout and writes the new state value;
    /// beacons are handled by each `enter_*` caller (§4.1).
    fn arm(&mut self, state: DfuState) {
        self.timer.arm(state.timeout(&self.config));
        self.state = state;
        debug!("entered state {:?}", state);
    }

    /// Terminal exit (§6 "Terminal exits", §7): disarms the timer, stops any
    /// outstanding beacon, logs the reason, and chain-loads. Never returns.
    pub(crate) fn abort(&mut self, reason: AbortReason) -> ! {
        self.timer.disarm();
        self.beacon.stop(&mut self.transport);
        match reason {
            AbortReason::Unauthorized => warn!("aborting: unauthorized"),
            AbortReason::NoStart => warn!("aborting: no_start"),
            AbortReason::FwidValid => info!("aborting: fwid_valid"),
            AbortReason::Success => info!("aborting: success"),
            AbortReason::Error(_) => error!("aborting: error"),
        }
        if reason.chain_loads_to_bootloader() {
            self.chain.jump_to_bootloader()
        } else {
            self.chain.jump_to_application()
        }
    }
}

/// End-to-end scenario tests built against fakes of all six collaborator
/// traits (§8.1), covering the numbered scenarios and invariants of §8. Each
/// collaborator's own unit tests live alongside its trait in its own module;
/// these exercise the full `Bootloader` state machine the way an integrator
/// would drive it from a real transport/timer pair.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::vec::Vec;
    use std::collections::BTreeMap;

    use binary_serde::BinarySerde;
    use p256::ecdsa::SigningKey;

    use super::*;
    use crate::components::MemorySegment;
    use crate::info::BootInfo;
    use crate::protocol::{
        AppId, IntervalClass, PacketKind, RepeatCount, SegmentHeader, StartMeta, StateParams, StatePacket, WIRE_ENDIANNESS,
    };
    use crate::writer::{FlashWriterError, WriteStatus};

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct FakePacket(u32);

    #[derive(Default)]
    struct FakeTransport {
        next_id: u32,
        built: BTreeMap<u32, (PacketKind, Vec<u8>)>,
        sent: Vec<(PacketKind, Vec<u8>)>,
        aborted: Vec<u32>,
    }

    impl Transport for FakeTransport {
        type Packet = FakePacket;

        fn acquire(&mut self) -> Option<Self::Packet> {
            let id = self.next_id;
            self.next_id += 1;
            Some(FakePacket(id))
        }

        fn set_local_addr(&mut self, _pkt: &mut Self::Packet) {}

        fn build(&mut self, pkt: &mut Self::Packet, kind: PacketKind, _mesh_uuid: [u8; 2], payload: &[u8]) -> bool {
            self.built.insert(pkt.0, (kind, payload.to_vec()));
            true
        }

        fn tx(&mut self, pkt: Self::Packet, _repeat: RepeatCount, _interval: IntervalClass) {
            if let Some(entry) = self.built.get(&pkt.0) {
                self.sent.push(entry.clone());
            }
        }

        fn tx_abort(&mut self, pkt: &mut Self::Packet) {
            self.aborted.push(pkt.0);
        }

        fn ref_count_inc(&mut self, _pkt: &mut Self::Packet) {}
        fn ref_count_dec(&mut self, _pkt: &mut Self::Packet) {}
    }

    /// Stores whatever was last written at each address; a byte-identical
    /// rewrite is reported `Duplicate` rather than `Written` (§4.6, §5).
    #[derive(Default)]
    struct FakeFlashWriter {
        written: BTreeMap<u32, Vec<u8>>,
        start_called_with: Option<(u32, u32, u32, bool)>,
        ended: bool,
    }

    impl FlashWriter for FakeFlashWriter {
        fn init_journal(&mut self, _first_half: &[u8], _second_half: &[u8]) {}

        fn dfu_start(&mut self, start: u32, bank: u32, length: u32, seg_valid_after_transfer: bool) -> Result<(), FlashWriterError> {
            self.start_called_with = Some((start, bank, length, seg_valid_after_transfer));
            self.written.clear();
            Ok(())
        }

        fn dfu_data(&mut self, addr: u32, bytes: &[u8]) -> WriteStatus {
            if let Some(existing) = self.written.get(&addr) {
                if existing.as_slice() == bytes {
                    return WriteStatus::Duplicate;
                }
            }
            self.written.insert(addr, bytes.to_vec());
            WriteStatus::Written
        }

        fn dfu_end(&mut self) {
            self.ended = true;
        }

        fn dfu_has_entry(&self, addr: u32, out: &mut [u8]) -> bool {
            match self.written.get(&addr) {
                Some(bytes) if bytes.len() == out.len() => {
                    out.copy_from_slice(bytes);
                    true
                }
                _ => false,
            }
        }

        fn dfu_sha256(&self) -> [u8; 32] {
            [0u8; 32]
        }
    }

    /// Ignores the key and hash entirely; only `accept` decides the outcome,
    /// since real curve math is covered by `verifier`'s own unit tests.
    struct FakeVerifier {
        accept: bool,
    }

    impl SignatureVerifier for FakeVerifier {
        fn verify(&self, _public_key: &VerifyingKey, _hash: &[u8; 32], _signature: &[u8]) -> bool {
            self.accept
        }
    }

    /// Panics with a distinguishable message per exit so a test can
    /// `catch_unwind` the (deliberately divergent) `abort` call and inspect
    /// which terminal path was taken.
    struct FakeChainLoader;

    impl ChainLoader for FakeChainLoader {
        fn jump_to_application(&self) -> ! {
            panic!("chain:application");
        }

        fn jump_to_bootloader(&self) -> ! {
            panic!("chain:bootloader");
        }
    }

    struct FakeInfoStore {
        info: Option<BootInfo>,
    }

    impl InfoStore for FakeInfoStore {
        fn read_boot_info(&self) -> Option<BootInfo> {
            self.info.clone()
        }

        fn write_journal(&mut self, journal: &[u8; JOURNAL_LEN]) -> bool {
            if let Some(info) = &mut self.info {
                info.journal = Some(*journal);
                true
            } else {
                false
            }
        }
    }

    fn boot_info(fwid: Fwid, memory_map: MemoryMap, public_key: Option<VerifyingKey>) -> BootInfo {
        BootInfo { fwid, memory_map, sd_intact: true, app_intact: true, public_key, journal: None }
    }

    fn init_bootloader(
        info: BootInfo,
    ) -> Bootloader<FakeTransport, FakeFlashWriter, crate::timer::fake::FakeTimer, FakeVerifier, FakeChainLoader> {
        let mut store = FakeInfoStore { info: Some(info) };
        Bootloader::init(
            FakeTransport::default(),
            FakeFlashWriter::default(),
            crate::timer::fake::FakeTimer::new(),
            FakeVerifier { accept: true },
            FakeChainLoader,
            BootloaderConfig::default(),
            &mut store,
        )
        .unwrap()
    }

    fn fwid_frame(fwid: Fwid) -> Vec<u8> {
        let mut v = vec![PacketKind::Fwid as u8];
        v.extend_from_slice(&fwid.to_bytes());
        v
    }

    fn state_frame(packet: StatePacket) -> Vec<u8> {
        let mut buf = [0u8; 32];
        let n = packet.encode(&mut buf).unwrap();
        let mut v = vec![PacketKind::State as u8];
        v.extend_from_slice(&buf[..n]);
        v
    }

    fn data_start_frame(transaction_id: u32, meta: StartMeta) -> Vec<u8> {
        let mut v = vec![PacketKind::Data as u8];
        let header = SegmentHeader { transaction_id, segment: 0 };
        let mut hbuf = [0u8; SegmentHeader::WIRE_LEN];
        header.binary_serialize(&mut hbuf, WIRE_ENDIANNESS);
        v.extend_from_slice(&hbuf);
        let mut mbuf = [0u8; StartMeta::WIRE_LEN];
        meta.binary_serialize(&mut mbuf, WIRE_ENDIANNESS);
        v.extend_from_slice(&mbuf);
        v
    }

    fn data_segment_frame(transaction_id: u32, segment: u16, body: &[u8]) -> Vec<u8> {
        let mut v = vec![PacketKind::Data as u8];
        let header = SegmentHeader { transaction_id, segment };
        let mut hbuf = [0u8; SegmentHeader::WIRE_LEN];
        header.binary_serialize(&mut hbuf, WIRE_ENDIANNESS);
        v.extend_from_slice(&hbuf);
        v.extend_from_slice(body);
        v
    }

    fn data_req_frame(transaction_id: u32, segment: u16) -> Vec<u8> {
        let mut v = vec![PacketKind::DataReq as u8];
        let header = SegmentHeader { transaction_id, segment };
        let mut hbuf = [0u8; SegmentHeader::WIRE_LEN];
        header.binary_serialize(&mut hbuf, WIRE_ENDIANNESS);
        v.extend_from_slice(&hbuf);
        v
    }

    fn data_rsp_frame(transaction_id: u32, segment: u16, body: &[u8]) -> Vec<u8> {
        let mut v = vec![PacketKind::DataRsp as u8];
        let header = SegmentHeader { transaction_id, segment };
        let mut hbuf = [0u8; SegmentHeader::WIRE_LEN];
        header.binary_serialize(&mut hbuf, WIRE_ENDIANNESS);
        v.extend_from_slice(&hbuf);
        v.extend_from_slice(body);
        v
    }

    fn chain_panic_message(result: std::thread::Result<()>) -> std::string::String {
        let payload = result.expect_err("expected the chain-loader fake to panic");
        payload.downcast_ref::<&str>().copied().unwrap_or_default().into()
    }

    /// Scenario 1 (clean app upgrade) plus scenario 6 (relay idempotence):
    /// a resend of an already-written segment neither decrements progress
    /// nor relays a second time (P2, P7).
    #[test]
    fn full_app_upgrade_with_duplicate_segment_reaches_rampdown_and_jumps_to_application() {
        let own_fwid = Fwid { app_id: AppId { vendor_id: 1, product_id: 1, version: 5 }, bl_version: 1, sd_version: 1 };
        let memory_map = MemoryMap { app: MemorySegment { start: 0x1C000, length: 0x1000 }, ..Default::default() };
        let mut bootloader = init_bootloader(boot_info(own_fwid, memory_map, None));
        assert_eq!(bootloader.state(), DfuState::FindFwid);

        let theirs = Fwid { app_id: AppId { vendor_id: 1, product_id: 1, version: 6 }, bl_version: 1, sd_version: 1 };
        bootloader.bootloader_rx(&fwid_frame(theirs));
        assert_eq!(bootloader.state(), DfuState::DfuReq);

        let ready = StatePacket {
            dfu_type: DfuType::App,
            authority: 1,
            params: StateParams::Ready { transaction_id: 0x100, mic: 0, target: TargetId::App(theirs.app_id) },
        };
        bootloader.bootloader_rx(&state_frame(ready));
        assert_eq!(bootloader.state(), DfuState::DfuReady);

        // two segments: length_words=8 -> length_bytes=32 -> segment_count=2
        let meta = StartMeta { start_address: 0x1C000, length_words: 8, signature_length: 0, last: 1 };
        bootloader.bootloader_rx(&data_start_frame(0x100, meta));
        assert_eq!(bootloader.state(), DfuState::DfuTarget);
        assert_eq!(bootloader.transaction.unwrap().segment_count, 2);

        bootloader.bootloader_rx(&data_segment_frame(0x100, 1, &[0xAA; 16]));
        assert_eq!(bootloader.transaction.unwrap().segments_remaining, 1);
        let sent_after_first_segment = bootloader.transport.sent.len();

        bootloader.bootloader_rx(&data_segment_frame(0x100, 1, &[0xAA; 16]));
        assert_eq!(bootloader.transaction.unwrap().segments_remaining, 1);
        assert_eq!(bootloader.transport.sent.len(), sent_after_first_segment);

        bootloader.bootloader_rx(&data_segment_frame(0x100, 2, &[0xBB; 16]));
        assert_eq!(bootloader.state(), DfuState::Rampdown);

        let result = catch_unwind(AssertUnwindSafe(|| bootloader.bootloader_rtc_irq_handler()));
        assert_eq!(chain_panic_message(result), "chain:application");
    }

    /// Scenario 4: a complete transfer with `signature_length == 0` while a
    /// public key is provisioned is rejected outright (P4).
    #[test]
    fn unsigned_image_with_provisioned_public_key_is_rejected_and_jumps_to_bootloader() {
        let own_fwid = Fwid { app_id: AppId { vendor_id: 2, product_id: 2, version: 1 }, bl_version: 1, sd_version: 1 };
        let memory_map = MemoryMap { app: MemorySegment { start: 0x1C000, length: 0x1000 }, ..Default::default() };
        let signing_key = SigningKey::from_bytes(&[0x33; 32].into()).unwrap();
        let verifying_key = VerifyingKey::from(&signing_key);
        let mut bootloader = init_bootloader(boot_info(own_fwid, memory_map, Some(verifying_key)));

        bootloader.enter_req(DfuType::App, TargetId::App(own_fwid.app_id));
        bootloader.enter_ready();

        let meta = StartMeta { start_address: 0x1C000, length_words: 4, signature_length: 0, last: 1 };
        bootloader.bootloader_rx(&data_start_frame(0, meta));
        assert_eq!(bootloader.state(), DfuState::DfuTarget);

        let result = catch_unwind(AssertUnwindSafe(|| {
            bootloader.bootloader_rx(&data_segment_frame(0, 1, &[0xCC; 16]));
        }));
        assert_eq!(chain_panic_message(result), "chain:bootloader");
    }

    /// Scenario 2: competing READY offers converge on the lexicographic
    /// maximum of `(authority, transaction_id)` (P3).
    #[test]
    fn competing_ready_offers_adopt_the_lexicographic_maximum() {
        let mut bootloader = init_bootloader(boot_info(Fwid::default(), MemoryMap::default(), None));
        let target = TargetId::App(AppId::default());
        bootloader.enter_req(DfuType::App, target);

        let ready = |authority: u8, tid: u32| StatePacket {
            dfu_type: DfuType::App,
            authority,
            params: StateParams::Ready { transaction_id: tid, mic: 0, target },
        };

        bootloader.bootloader_rx(&state_frame(ready(2, 0x10)));
        assert_eq!(bootloader.state(), DfuState::DfuReady);
        assert_eq!(bootloader.transaction.unwrap().authority_key(), (2, 0x10));

        bootloader.bootloader_rx(&state_frame(ready(3, 0x1)));
        assert_eq!(bootloader.transaction.unwrap().authority_key(), (3, 0x1));

        bootloader.bootloader_rx(&state_frame(ready(3, 0x2)));
        assert_eq!(bootloader.transaction.unwrap().authority_key(), (3, 0x2));

        // a lower authority does not displace the adopted offer
        bootloader.bootloader_rx(&state_frame(ready(2, 0xFF)));
        assert_eq!(bootloader.transaction.unwrap().authority_key(), (3, 0x2));
    }

    /// Scenario 3: missing segment 0 restarts the request and suppresses the
    /// abandoned transaction id until a fresh one is offered.
    #[test]
    fn missed_start_packet_falls_back_to_a_fresh_request() {
        let mut bootloader = init_bootloader(boot_info(Fwid::default(), MemoryMap::default(), None));
        let target = TargetId::App(AppId::default());
        bootloader.enter_req(DfuType::App, target);

        let ready = |tid: u32| StatePacket {
            dfu_type: DfuType::App,
            authority: 1,
            params: StateParams::Ready { transaction_id: tid, mic: 0, target },
        };

        bootloader.bootloader_rx(&state_frame(ready(0x200)));
        assert_eq!(bootloader.state(), DfuState::DfuReady);

        bootloader.bootloader_rx(&data_segment_frame(0x200, 5, &[0u8; 16]));
        assert_eq!(bootloader.state(), DfuState::DfuReq);

        bootloader.bootloader_rx(&state_frame(ready(0x200)));
        assert_eq!(bootloader.state(), DfuState::DfuReq);

        bootloader.bootloader_rx(&state_frame(ready(0x201)));
        assert_eq!(bootloader.state(), DfuState::DfuReady);
        assert_eq!(bootloader.transaction.unwrap().transaction_id, 0x201);
    }

    /// Scenario 5: a bootloader upgrade is staged in the tail of the
    /// application region, one page short of its end.
    #[test]
    fn bootloader_upgrade_stages_image_in_the_tail_of_the_app_region() {
        let memory_map = MemoryMap {
            app: MemorySegment { start: 0x1C000, length: 0x20000 },
            bl: MemorySegment { start: 0, length: 0x8000 },
            ..Default::default()
        };
        let mut bootloader = init_bootloader(boot_info(Fwid::default(), memory_map, None));
        bootloader.enter_req(DfuType::Bl, TargetId::Bl(2));
        bootloader.enter_ready();

        let meta = StartMeta { start_address: 0, length_words: 0x1000, signature_length: 0, last: 1 };
        bootloader.bootloader_rx(&data_start_frame(0, meta));

        assert_eq!(bootloader.flash.start_called_with, Some((0, 0x37000, 0x4000, true)));
    }

    /// P5: a peer re-requesting an already-served segment is dropped by
    /// `req_cache` instead of triggering a second DATA_RSP.
    #[test]
    fn repeated_data_req_for_the_same_segment_is_served_once() {
        let own_fwid = Fwid { app_id: AppId { vendor_id: 3, product_id: 3, version: 1 }, bl_version: 1, sd_version: 1 };
        let memory_map = MemoryMap { app: MemorySegment { start: 0x1C000, length: 0x1000 }, ..Default::default() };
        let mut bootloader = init_bootloader(boot_info(own_fwid, memory_map, None));
        bootloader.enter_req(DfuType::App, TargetId::App(own_fwid.app_id));
        bootloader.enter_ready();

        // two segments: length_words=8 -> length_bytes=32 -> segment_count=2
        let meta = StartMeta { start_address: 0x1C000, length_words: 8, signature_length: 0, last: 1 };
        bootloader.bootloader_rx(&data_start_frame(0x300, meta));
        bootloader.bootloader_rx(&data_segment_frame(0x300, 1, &[0xAA; 16]));
        assert_eq!(bootloader.transaction.unwrap().segments_remaining, 1);

        let sent_before = bootloader.transport.sent.len();
        bootloader.bootloader_rx(&data_req_frame(0x300, 1));
        let sent_after_first_request = bootloader.transport.sent.len();
        assert_eq!(sent_after_first_request, sent_before + 1);
        assert_eq!(bootloader.transport.sent.last().unwrap().0, PacketKind::DataRsp);

        bootloader.bootloader_rx(&data_req_frame(0x300, 1));
        assert_eq!(bootloader.transport.sent.len(), sent_after_first_request);
    }

    /// DATA_RSP writes the delivered segment through the flash writer but
    /// never touches `segments_remaining` — progress authority stays with
    /// the DATA path (§9's RSP-accounting open question).
    #[test]
    fn data_rsp_writes_flash_without_advancing_progress() {
        let own_fwid = Fwid { app_id: AppId { vendor_id: 4, product_id: 4, version: 1 }, bl_version: 1, sd_version: 1 };
        let memory_map = MemoryMap { app: MemorySegment { start: 0x1C000, length: 0x1000 }, ..Default::default() };
        let mut bootloader = init_bootloader(boot_info(own_fwid, memory_map, None));
        bootloader.enter_req(DfuType::App, TargetId::App(own_fwid.app_id));
        bootloader.enter_ready();

        let meta = StartMeta { start_address: 0x1C000, length_words: 8, signature_length: 0, last: 1 };
        bootloader.bootloader_rx(&data_start_frame(0x400, meta));
        assert_eq!(bootloader.transaction.unwrap().segments_remaining, 2);

        bootloader.bootloader_rx(&data_rsp_frame(0x400, 1, &[0xCC; 16]));

        assert_eq!(bootloader.transaction.unwrap().segments_remaining, 2);
        assert_eq!(bootloader.flash.written.get(&0x1C000), Some(&vec![0xCC; 16]));
    }
}
