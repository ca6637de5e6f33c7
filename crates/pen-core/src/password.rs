//! Password collection and the encrypt-side confirmation policy.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::convert::Job;
use crate::error::{PenError, PenResult};
use crate::types::Mode;

pub const PROMPT: &str = "Enter password: ";
pub const CONFIRM_PROMPT: &str = "Enter password (repeat): ";

/// Supplies passwords, e.g. from a terminal with echo disabled.
pub trait PasswordSource {
    fn read_password(&mut self, prompt: &str) -> std::io::Result<SecretString>;
}

/// Ask for the password once for the whole invocation.
///
/// With `confirm` set and at least one job encrypting, the password is asked
/// a second time and must match. A mismatch fails before any file is touched.
pub fn obtain_password(
    source: &mut dyn PasswordSource,
    jobs: &[Job],
    confirm: bool,
) -> PenResult<SecretString> {
    let password = source.read_password(PROMPT)?;

    if confirm && jobs.iter().any(|job| job.mode == Mode::Encrypt) {
        let repeat = source.read_password(CONFIRM_PROMPT)?;
        if repeat.expose_secret() != password.expose_secret() {
            return Err(PenError::PasswordMismatch);
        }
        debug!("password confirmed");
    }

    Ok(password)
}
