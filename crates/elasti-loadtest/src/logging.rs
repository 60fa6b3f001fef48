//! Tracing setup and log redaction helpers

use std::collections::BTreeMap;

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable console output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool, format: LogFormat) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false).with_file(false))
            .init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

/// Replace the middle of `input` with `*`, keeping `prefix` leading and
/// `suffix` trailing characters. Short inputs are masked entirely.
pub fn mask_middle(input: &str, prefix: usize, suffix: usize) -> String {
    let chars: Vec<char> = input.chars().collect();
    let n = chars.len();
    if n <= prefix + suffix {
        return "*".repeat(n);
    }

    let mut masked = String::with_capacity(input.len());
    masked.extend(&chars[..prefix]);
    masked.push_str(&"*".repeat(n - prefix - suffix));
    masked.extend(&chars[n - suffix..]);
    masked
}

/// Header names whose values should never reach the logs verbatim
pub fn is_sensitive_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    matches!(
        name.as_str(),
        "authorization" | "proxy-authorization" | "cookie" | "set-cookie"
    ) || name.contains("token")
        || name.contains("secret")
        || name.contains("api-key")
        || name.contains("apikey")
}

/// `name: value` pairs for logging, with sensitive values masked
pub fn display_headers(headers: &BTreeMap<String, String>) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            if is_sensitive_header(name) {
                format!("{}: {}", name, mask_middle(value, 2, 2))
            } else {
                format!("{}: {}", name, value)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
