//! Environment variable-based runtime configuration.
//!
//! The only knob today is `RESTGATE_STACK_SIZE`, the stack size for the
//! `may` coroutines the HTTP layer runs connections on. Accepts decimal
//! (`16384`) or hex (`0x4000`) values; defaults to 16 KB. Larger stacks
//! support deeper handler call chains, smaller stacks keep memory usage
//! down under high connection counts.

use std::env;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes (default: 16 KB / 0x4000).
    pub stack_size: usize,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let stack_size = match env::var("RESTGATE_STACK_SIZE") {
            Ok(val) => {
                if let Some(hex) = val.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).unwrap_or(0x4000)
                } else {
                    val.parse().unwrap_or(0x4000)
                }
            }
            Err(_) => 0x4000,
        };
        RuntimeConfig { stack_size }
    }
}
