//! Finalizer (C8, §4.6 "Finalization"): signature check and terminal action.

use crate::chainload::ChainLoader;
use crate::error::AbortReason;
use crate::fmt::*;
use crate::timer::StateTimer;
use crate::transport::Transport;
use crate::verifier::SignatureVerifier;
use crate::writer::FlashWriter;
use crate::Bootloader;

/// Fixed-width raw ECDSA P-256 signature (r||s); longer claimed lengths are
/// rejected outright rather than grown into.
const MAX_SIGNATURE_LEN: usize = 64;

impl<T, F, Tm, V, C> Bootloader<T, F, Tm, V, C>
where
    T: Transport,
    F: FlashWriter,
    Tm: StateTimer,
    V: SignatureVerifier,
    C: ChainLoader,
{
    /// Called once `segments_remaining` reaches 0 (§4.6 "Finalization").
    pub(crate) fn finalize(&mut self) {
        self.flash.dfu_end();

        let Some(txn) = self.transaction else {
            return;
        };

        let Some(public_key) = self.public_key.clone() else {
            info!("no public key provisioned, accepting image unverified");
            self.enter_rampdown();
            return;
        };

        if txn.signature_length == 0 {
            warn!("public key provisioned but image is unsigned");
            self.abort(AbortReason::Unauthorized);
        }

        let signature_len = usize::from(txn.signature_length);
        // §9 "signature read address": the signature is the trailing
        // `signature_length` bytes of the bank, i.e. it is included in `length`.
        let Some(signature_offset) = txn.length.checked_sub(u32::from(txn.signature_length)) else {
            warn!("signature length exceeds image length");
            self.abort(AbortReason::Unauthorized);
        };

        let mut sig_buf = [0u8; MAX_SIGNATURE_LEN];
        let Some(sig_slice) = sig_buf.get_mut(..signature_len) else {
            warn!("signature length exceeds local buffer");
            self.abort(AbortReason::Unauthorized);
        };
        if !self.flash.dfu_has_entry(txn.bank_addr.saturating_add(signature_offset), sig_slice) {
            warn!("signature bytes not available from the flash writer");
            self.abort(AbortReason::Unauthorized);
        }

        let hash = self.flash.dfu_sha256();
        if self.verifier.verify(&public_key, &hash, sig_slice) {
            info!("signature verified, proceeding to rampdown");
            self.enter_rampdown();
        } else {
            warn!("signature verification failed");
            self.abort(AbortReason::Unauthorized);
        }
    }
}
