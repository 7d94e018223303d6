//! Signed ledger calls and commit receipts.
//!
//! Every write reaches the ledger as a [`SignedCall`]: the payload, the
//! ledger it targets, and the signer's sequential nonce, signed with the
//! account's ed25519 key. The ledger derives the caller's [`AccountId`]
//! from the verified key, so identity cannot be claimed without the key.
//!
//! Signing bytes:
//! ```text
//! SHA-256( CALL_SIGNING_DOMAIN || ledger (20) || nonce (u64 LE) || JSON(call) )
//! ```

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    AccountId, CustodyError, LedgerAddress, ProductId, RegisterProduct, Result, TransferProduct,
    TxHash, constants,
};

/// The operations a signed call can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum LedgerCall {
    Register(RegisterProduct),
    Transfer(TransferProduct),
    /// Administrative bulk read. Authenticated like a write.
    ListAll,
}

impl LedgerCall {
    /// Short operation name for logs and messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::Transfer(_) => "transfer",
            Self::ListAll => "list_all",
        }
    }

    /// Whether this call mutates ledger state.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Register(_) | Self::Transfer(_))
    }

    /// The product this call targets, if any.
    #[must_use]
    pub fn product_id(&self) -> Option<&ProductId> {
        match self {
            Self::Register(req) => Some(&req.product_id),
            Self::Transfer(req) => Some(&req.product_id),
            Self::ListAll => None,
        }
    }
}

/// A call authenticated by its signer's ed25519 key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCall {
    pub call: LedgerCall,
    /// The ledger this call was signed for.
    pub ledger: LedgerAddress,
    /// Signer's sequential nonce.
    pub nonce: u64,
    /// Raw ed25519 public key of the signer.
    pub signer_key: [u8; 32],
    /// Ed25519 signature over [`SignedCall::signing_bytes`].
    pub signature: Vec<u8>,
}

impl SignedCall {
    /// Sign `call` for `ledger` at `nonce`.
    pub fn sign(
        call: LedgerCall,
        ledger: LedgerAddress,
        nonce: u64,
        key: &SigningKey,
    ) -> Result<Self> {
        let digest = Self::digest(&call, ledger, nonce)?;
        let signature = key.sign(&digest);
        Ok(Self {
            call,
            ledger,
            nonce,
            signer_key: key.verifying_key().to_bytes(),
            signature: signature.to_bytes().to_vec(),
        })
    }

    fn digest(call: &LedgerCall, ledger: LedgerAddress, nonce: u64) -> Result<[u8; 32]> {
        let payload = serde_json::to_vec(call)?;
        let mut hasher = Sha256::new();
        hasher.update(constants::CALL_SIGNING_DOMAIN);
        hasher.update(ledger.as_bytes());
        hasher.update(nonce.to_le_bytes());
        hasher.update(&payload);
        Ok(hasher.finalize().into())
    }

    /// The 32 bytes that were signed.
    pub fn signing_bytes(&self) -> Result<[u8; 32]> {
        Self::digest(&self.call, self.ledger, self.nonce)
    }

    /// The account claimed by `signer_key`, without checking the signature.
    pub fn claimed_signer(&self) -> Result<AccountId> {
        let key =
            VerifyingKey::from_bytes(&self.signer_key).map_err(|_| CustodyError::SignatureInvalid)?;
        Ok(AccountId::from_verifying_key(&key))
    }

    /// Verify the signature and return the signing account.
    ///
    /// # Errors
    /// Returns [`CustodyError::SignatureInvalid`] if the key or signature
    /// is malformed or the signature doesn't cover this call.
    pub fn verify(&self) -> Result<AccountId> {
        let key =
            VerifyingKey::from_bytes(&self.signer_key).map_err(|_| CustodyError::SignatureInvalid)?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| CustodyError::SignatureInvalid)?;
        let digest = self.signing_bytes()?;
        key.verify_strict(&digest, &signature)
            .map_err(|_| CustodyError::SignatureInvalid)?;
        Ok(AccountId::from_verifying_key(&key))
    }

    /// Hash identifying this call once committed.
    pub fn tx_hash(&self) -> Result<TxHash> {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_bytes()?);
        hasher.update(&self.signature);
        Ok(TxHash(hasher.finalize().into()))
    }
}

/// The ledger's acknowledgment that a write is committed and final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    /// Position of the commit in the ledger's history, starting at 1.
    pub block_number: u64,
    pub signer: AccountId,
    pub product_id: Option<ProductId>,
    pub committed_at: DateTime<Utc>,
}

/// Deterministic keys for unit tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
#[must_use]
pub fn test_signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}
