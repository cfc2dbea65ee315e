//! One-shot sign-in hint for interactive sessions running without a
//! resolvable credential.

use std::io::IsTerminal;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::auth::CredentialStore;

/// Set to `1` to suppress the hint entirely.
pub const MEMORI_NO_LOGIN_HINT_ENV_VAR: &str = "MEMORI_NO_LOGIN_HINT";

/// The single advisory line. Callers must not vary this text.
pub const LOGIN_HINT: &str =
    "Not signed in to Memori. Run `memori login` to connect your account.";

static HINT_SHOWN: AtomicBool = AtomicBool::new(false);

/// The gate, kept pure so every combination is testable.
pub fn should_show_login_hint(
    credential_resolves: bool,
    interactive: bool,
    suppressed: bool,
) -> bool {
    !credential_resolves && interactive && !suppressed
}

/// Prints [`LOGIN_HINT`] to stderr at most once per process, and only when
/// no credential resolves, stderr is a terminal, and the suppression flag is
/// unset. Returns whether the hint was emitted. Never errors, never blocks.
pub fn show_login_hint_once(store: &CredentialStore) -> bool {
    emit_login_hint_once(
        store.resolve().is_some(),
        std::io::stderr().is_terminal(),
        hint_suppressed(),
    )
}

fn emit_login_hint_once(credential_resolves: bool, interactive: bool, suppressed: bool) -> bool {
    if !should_show_login_hint(credential_resolves, interactive, suppressed) {
        return false;
    }
    if HINT_SHOWN.swap(true, Ordering::SeqCst) {
        return false;
    }
    eprintln!("{LOGIN_HINT}");
    true
}

fn hint_suppressed() -> bool {
    std::env::var(MEMORI_NO_LOGIN_HINT_ENV_VAR).as_deref() == Ok("1")
}
