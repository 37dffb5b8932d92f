//! Wire format definitions for the mesh DFU frame (§6).
//!
//! Fixed-shape pieces use `BinarySerde` the way the sibling protocol crate this
//! core is built from uses it for its command/response structs. The STATE and
//! DATA frames multiplex a variable-width tail on a preceding discriminant
//! (`dfu_type`, `segment == 0`); those are parsed by hand, the same way that
//! crate hand-rolls `UpdateOfferComponentInfoByte0` instead of forcing the
//! derive macro onto a context-dependent shape.

use binary_serde::{BinarySerde, Endianness};

pub(crate) const WIRE_ENDIANNESS: Endianness = Endianness::Big;

/// One of the three firmware kinds a transaction can target (§3, §4.1).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DfuType {
    #[default]
    App = 0,
    Bl = 1,
    Runtime = 2,
}

impl DfuType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(DfuType::App),
            1 => Some(DfuType::Bl),
            2 => Some(DfuType::Runtime),
            _ => None,
        }
    }
}

/// Application id: vendor + product + version (§3, "application id (vendor
/// id, product id, version)").
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, BinarySerde)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AppId {
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: u16,
}

/// Firmware identity triplet advertised in FWID beacons (§6, glossary FWID).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, BinarySerde)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fwid {
    pub app_id: AppId,
    pub bl_version: u16,
    pub sd_version: u32,
}

impl Fwid {
    pub const WIRE_LEN: usize = 12;

    /// §3: "the application is newer iff vendor+product match and version is
    /// strictly greater".
    pub fn app_is_newer(&self, theirs: &Fwid) -> bool {
        self.app_id.vendor_id == theirs.app_id.vendor_id
            && self.app_id.product_id == theirs.app_id.product_id
            && theirs.app_id.version > self.app_id.version
    }

    /// §3: "the bootloader is newer iff its version is strictly greater".
    pub fn bl_is_newer(&self, theirs: &Fwid) -> bool {
        theirs.bl_version > self.bl_version
    }

    /// §3: "the runtime is upgraded only when a newer application mandates a
    /// different runtime version" — this only asks whether the runtime
    /// versions differ; the "newer application" half of the condition is
    /// evaluated by the caller (§4.4).
    pub fn runtime_differs(&self, theirs: &Fwid) -> bool {
        self.sd_version != theirs.sd_version
    }

    pub fn to_bytes(&self) -> [u8; Fwid::WIRE_LEN] {
        let mut buf = [0u8; Fwid::WIRE_LEN];
        self.binary_serialize(&mut buf, WIRE_ENDIANNESS);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let slice = buf.get(..Fwid::WIRE_LEN)?;
        Fwid::binary_deserialize(slice, WIRE_ENDIANNESS).ok()
    }
}

/// Target identity carried in STATE (REQ/READY) frames. The wire width
/// depends on `DfuType` (§6: "exact match of the 6-byte app id for APP,
/// scalar equality for BL or RUNTIME", §4.5).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetId {
    App(AppId),
    Bl(u16),
    Runtime(u32),
}

impl TargetId {
    pub fn dfu_type(&self) -> DfuType {
        match self {
            TargetId::App(_) => DfuType::App,
            TargetId::Bl(_) => DfuType::Bl,
            TargetId::Runtime(_) => DfuType::Runtime,
        }
    }

    pub fn wire_len(dfu_type: DfuType) -> usize {
        match dfu_type {
            DfuType::App => 6,
            DfuType::Bl => 2,
            DfuType::Runtime => 4,
        }
    }

    pub fn encode(&self, out: &mut [u8]) -> Option<usize> {
        match *self {
            TargetId::App(id) => {
                let dst = out.get_mut(..6)?;
                id.binary_serialize(dst, WIRE_ENDIANNESS);
                Some(6)
            }
            TargetId::Bl(v) => {
                let dst = out.get_mut(..2)?;
                dst.copy_from_slice(&v.to_be_bytes());
                Some(2)
            }
            TargetId::Runtime(v) => {
                let dst = out.get_mut(..4)?;
                dst.copy_from_slice(&v.to_be_bytes());
                Some(4)
            }
        }
    }

    pub fn decode(dfu_type: DfuType, buf: &[u8]) -> Option<Self> {
        match dfu_type {
            DfuType::App => {
                let slice = buf.get(..6)?;
                Some(TargetId::App(AppId::binary_deserialize(slice, WIRE_ENDIANNESS).ok()?))
            }
            DfuType::Bl => {
                let slice = buf.get(..2)?;
                Some(TargetId::Bl(u16::from_be_bytes(slice.try_into().ok()?)))
            }
            DfuType::Runtime => {
                let slice = buf.get(..4)?;
                Some(TargetId::Runtime(u32::from_be_bytes(slice.try_into().ok()?)))
            }
        }
    }
}

/// §6 `packet_type` discriminant.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketKind {
    Fwid = 0,
    State = 1,
    Data = 2,
    DataReq = 3,
    DataRsp = 4,
}

impl PacketKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(PacketKind::Fwid),
            1 => Some(PacketKind::State),
            2 => Some(PacketKind::Data),
            3 => Some(PacketKind::DataReq),
            4 => Some(PacketKind::DataRsp),
            _ => None,
        }
    }
}

/// STATE frame params: REQ carries only the target id (authority is carried
/// in the outer header and is always 0 for a REQ); READY additionally carries
/// the transaction id and MIC (§6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StateParams {
    Req { target: TargetId },
    Ready { transaction_id: u32, mic: u64, target: TargetId },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatePacket {
    pub dfu_type: DfuType,
    pub authority: u8,
    pub params: StateParams,
}

impl StatePacket {
    /// `payload` excludes the leading `packet_type` byte.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let dfu_type = DfuType::from_u8(*payload.first()?)?;
        let authority = *payload.get(1)?;
        let rest = payload.get(2..)?;
        let id_len = TargetId::wire_len(dfu_type);

        if rest.len() == id_len {
            let target = TargetId::decode(dfu_type, rest)?;
            return Some(StatePacket {
                dfu_type,
                authority,
                params: StateParams::Req { target },
            });
        }
        if rest.len() == 4 + 8 + id_len {
            let transaction_id = u32::from_be_bytes(rest.get(0..4)?.try_into().ok()?);
            let mic = u64::from_be_bytes(rest.get(4..12)?.try_into().ok()?);
            let target = TargetId::decode(dfu_type, rest.get(12..)?)?;
            return Some(StatePacket {
                dfu_type,
                authority,
                params: StateParams::Ready { transaction_id, mic, target },
            });
        }
        None
    }

    /// Encodes into `out`, returning the number of bytes written (not
    /// including the outer `packet_type` byte, which the beacon builder adds).
    pub fn encode(&self, out: &mut [u8]) -> Option<usize> {
        let dst = out.get_mut(0)?;
        *dst = self.dfu_type as u8;
        let dst = out.get_mut(1)?;
        *dst = self.authority;
        match &self.params {
            StateParams::Req { target } => {
                let n = target.encode(out.get_mut(2..)?)?;
                Some(2 + n)
            }
            StateParams::Ready { transaction_id, mic, target } => {
                out.get_mut(2..6)?.copy_from_slice(&transaction_id.to_be_bytes());
                out.get_mut(6..14)?.copy_from_slice(&mic.to_be_bytes());
                let n = target.encode(out.get_mut(14..)?)?;
                Some(14 + n)
            }
        }
    }
}

/// Fixed header shared by DATA, DATA_REQ, and DATA_RSP frames (§6).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, BinarySerde)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SegmentHeader {
    pub transaction_id: u32,
    pub segment: u16,
}

impl SegmentHeader {
    pub const WIRE_LEN: usize = 6;

    pub fn parse(payload: &[u8]) -> Option<(Self, &[u8])> {
        let slice = payload.get(..Self::WIRE_LEN)?;
        let header = SegmentHeader::binary_deserialize(slice, WIRE_ENDIANNESS).ok()?;
        Some((header, payload.get(Self::WIRE_LEN..)?))
    }
}

/// Start-packet metadata reinterpreted from a DATA frame's bytes when
/// `segment == 0` (§6, §4.6).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, BinarySerde)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StartMeta {
    pub start_address: u32,
    /// Length of the incoming image in 4-byte words (§4.6).
    pub length_words: u32,
    pub signature_length: u16,
    pub last: u8,
}

impl StartMeta {
    pub const WIRE_LEN: usize = 11;

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let slice = bytes.get(..Self::WIRE_LEN)?;
        StartMeta::binary_deserialize(slice, WIRE_ENDIANNESS).ok()
    }

    /// Length of the incoming image in bytes.
    pub fn length_bytes(&self) -> u32 {
        self.length_words.saturating_mul(4)
    }
}

/// Fixed payload length of a DATA_RSP frame's segment bytes (§6: `bytes[16]`).
pub const DATA_RSP_SEGMENT_LEN: usize = 16;

/// Advertising repeat behavior for a queued transmission (§4.2).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RepeatCount {
    /// Keeps announcing until superseded by a state transition (FWID, REQ, READY).
    Infinite,
    /// One-shot or small fixed number of repeats (DATA relay, RSP/REQ service).
    Finite(u8),
}

/// Coarse advertising-interval tier; the concrete millisecond value is an
/// integration detail of the transport, not the core (§4.2).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IntervalClass {
    Fast,
    Slow,
}

/// The one outstanding beacon's payload shape (§4.2: "Seven payload shapes").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BeaconKind {
    Fwid,
    Req(DfuType),
    Ready(DfuType),
}

impl BeaconKind {
    /// FWID, REQ, and READY beacons repeat forever until a state transition
    /// replaces them (§4.2).
    pub fn repeat(self) -> RepeatCount {
        RepeatCount::Infinite
    }

    pub fn packet_kind(self) -> PacketKind {
        match self {
            BeaconKind::Fwid => PacketKind::Fwid,
            BeaconKind::Req(_) | BeaconKind::Ready(_) => PacketKind::State,
        }
    }
}
