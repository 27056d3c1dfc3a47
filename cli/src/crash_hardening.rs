//! Keep the API key out of core dumps.

use anyhow::{Context, Result};
#[cfg(unix)]
use std::io;
use std::env;

const QUILL_ALLOW_COREDUMPS: &str = "QUILL_ALLOW_COREDUMPS";

pub fn apply() -> Result<()> {
    if env::var(QUILL_ALLOW_COREDUMPS).is_ok_and(|raw| is_truthy(&raw)) {
        tracing::warn!(
            env_var = QUILL_ALLOW_COREDUMPS,
            "Core dump hardening disabled by environment override"
        );
        return Ok(());
    }

    disable_core_dumps().context("failed to disable core dumps")?;
    tracing::debug!("Core dumps disabled");
    Ok(())
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

#[cfg(unix)]
fn disable_core_dumps() -> Result<()> {
    let limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, initialized rlimit for the duration of the call.
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &raw const limit) };
    if rc != 0 {
        return Err(io::Error::last_os_error()).context("setrlimit(RLIMIT_CORE=0)");
    }

    #[cfg(target_os = "linux")]
    {
        // SAFETY: PR_SET_DUMPABLE takes plain integer arguments.
        let rc = unsafe { libc::prctl(libc::PR_SET_DUMPABLE, 0, 0, 0, 0) };
        if rc != 0 {
            return Err(io::Error::last_os_error()).context("prctl(PR_SET_DUMPABLE=0)");
        }
    }

    Ok(())
}

#[cfg(not(unix))]
fn disable_core_dumps() -> Result<()> {
    Ok(())
}
