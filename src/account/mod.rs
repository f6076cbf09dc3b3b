//! Registration support: the expiring verification-code store and the
//! outbound mail seam.
//!
//! Code delivery itself is an external collaborator; the in-tree [`LogMailer`]
//! only logs. The code store is injected through `AppState` rather than
//! living in a process-wide global.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;

/// Fixed code lifetime, matching the message shown to the user.
pub const CODE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    /// No code on file for this email, or it expired.
    ExpiredOrMissing,
    Mismatch,
}

struct PendingCode {
    code: String,
    expires_at: Instant,
}

/// Expiring map of email -> verification code. Expiry is lazy: stale entries
/// are dropped when read, there is no background sweeper.
pub struct VerificationCodes {
    ttl: Duration,
    codes: Mutex<HashMap<String, PendingCode>>,
}

impl VerificationCodes {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            codes: Mutex::new(HashMap::new()),
        }
    }

    /// Generate, store, and return a fresh 6-digit code for this email,
    /// replacing any previous one.
    pub fn issue(&self, email: &str) -> String {
        let code = rand::thread_rng().gen_range(100_000..=999_999).to_string();
        let mut codes = self.codes.lock().unwrap_or_else(|e| e.into_inner());
        codes.insert(
            email.to_string(),
            PendingCode {
                code: code.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        code
    }

    /// Check a submitted code. A successful check consumes the code; a
    /// mismatch leaves it in place for another attempt until it expires.
    pub fn verify(&self, email: &str, submitted: &str) -> VerifyOutcome {
        let mut codes = self.codes.lock().unwrap_or_else(|e| e.into_inner());
        let Some(pending) = codes.remove(email) else {
            return VerifyOutcome::ExpiredOrMissing;
        };
        if pending.expires_at <= Instant::now() {
            return VerifyOutcome::ExpiredOrMissing;
        }
        if pending.code != submitted {
            codes.insert(email.to_string(), pending);
            return VerifyOutcome::Mismatch;
        }
        VerifyOutcome::Ok
    }
}

impl Default for VerificationCodes {
    fn default() -> Self {
        Self::new(CODE_TTL)
    }
}

/// Outbound mail boundary. The reference deployment wires a real provider
/// behind this; [`LogMailer`] stands in everywhere else.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_code(&self, email: &str, code: &str) -> anyhow::Result<()>;
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification_code(&self, email: &str, code: &str) -> anyhow::Result<()> {
        tracing::info!(%email, %code, "verification code issued");
        Ok(())
    }
}
