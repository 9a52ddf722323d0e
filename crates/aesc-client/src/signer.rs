//! Signing surfaces and the per-channel sign broker.
//!
//! Two surfaces face the caller:
//!
//! - [`TransactionSigner`] — untagged; supplied with each deliberately
//!   initiated action. The caller signs whatever the node asks for
//!   during that action.
//! - [`TaggedSigner`] — supplied at [`Channel::initialize`]; handles
//!   node-initiated requests. The [`SignTag`] tells the caller *why*
//!   they are being asked to sign.
//!
//! Both return a [`SignOutcome`]: a signed blob, a numeric abort code,
//! or a generic rejection. The broker validates the shape (an empty
//! blob is a rejection) and serializes invocations per channel — the
//! FSM never calls into the signer while a previous invocation is
//! unresolved.
//!
//! [`Channel::initialize`]: crate::Channel::initialize

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use aesc_core::{TxBlob, UpdateOp};
use aesc_rpc::SignTag;

/// Context accompanying a sign request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignMeta {
    /// The off-chain updates the transaction applies, when the node
    /// supplied them.
    pub updates: Vec<UpdateOp>,
}

/// Result of a signing invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignOutcome {
    /// The caller signed; contains the signed transaction.
    Signed(TxBlob),
    /// The caller aborted with a user-defined numeric code.
    Abort(i64),
    /// The caller rejected without a code.
    Rejected,
}

/// Untagged signer supplied per action.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Sign `tx`, or abort/reject.
    async fn sign(&self, tx: &TxBlob, meta: &SignMeta) -> SignOutcome;
}

/// Tagged signer supplied at channel initialization.
#[async_trait]
pub trait TaggedSigner: Send + Sync {
    /// Sign `tx` requested under `tag`, or abort/reject.
    async fn sign(&self, tag: SignTag, tx: &TxBlob, meta: &SignMeta) -> SignOutcome;
}

#[async_trait]
impl<F> TransactionSigner for F
where
    F: Fn(&TxBlob, &SignMeta) -> SignOutcome + Send + Sync,
{
    async fn sign(&self, tx: &TxBlob, meta: &SignMeta) -> SignOutcome {
        self(tx, meta)
    }
}

/// Serializes signer invocations for one channel and normalizes their
/// results.
pub struct SignBroker {
    tagged: Arc<dyn TaggedSigner>,
    // Held across every signer await; enforces no re-entrancy.
    guard: Mutex<()>,
}

impl SignBroker {
    /// Create a broker around the channel's tagged signer.
    #[must_use]
    pub fn new(tagged: Arc<dyn TaggedSigner>) -> Self {
        Self {
            tagged,
            guard: Mutex::new(()),
        }
    }

    /// Invoke the channel's tagged signer.
    pub async fn sign_tagged(&self, tag: SignTag, tx: &TxBlob, meta: &SignMeta) -> SignOutcome {
        let _held = self.guard.lock().await;
        debug!(%tag, "invoking tagged signer");
        normalize(self.tagged.sign(tag, tx, meta).await)
    }

    /// Invoke an action's untagged signer.
    pub async fn sign_action(
        &self,
        signer: &dyn TransactionSigner,
        tx: &TxBlob,
        meta: &SignMeta,
    ) -> SignOutcome {
        let _held = self.guard.lock().await;
        debug!("invoking action signer");
        normalize(signer.sign(tx, meta).await)
    }
}

/// An empty blob can never be a valid signed transaction.
fn normalize(outcome: SignOutcome) -> SignOutcome {
    match outcome {
        SignOutcome::Signed(tx) if tx.is_empty() => SignOutcome::Rejected,
        other => other,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
