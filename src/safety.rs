//! Safety policy: remote-input rejection, script disabling and the network allow-list
//!
//! Safe mode alone does not install request interception. In-page
//! subresources are only filtered when an allow-list is supplied, whether or
//! not safe mode is on.

use crate::{Error, RequestAction, RequestInfo, Result};
use log::warn;

/// Policy applied to a single conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyPolicy {
    /// Safe mode flag as passed by the caller
    pub enabled: bool,
    /// URL prefixes that may be fetched while interception is active
    pub network_allowlist: Vec<String>,
    /// Whether `<script>` content survives normalisation and may execute
    pub scripts_allowed: bool,
}

/// True for `http://` and `https://` inputs
pub fn is_remote_url(input: &str) -> bool {
    match url::Url::parse(input.trim()) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

impl SafetyPolicy {
    /// Build the policy from the safe flag. Scripts are only allowed when
    /// explicitly requested and safe mode is off.
    pub fn new(safe: bool, allow_scripts: bool, network_allowlist: Vec<String>) -> Self {
        Self {
            enabled: safe,
            network_allowlist,
            scripts_allowed: allow_scripts && !safe,
        }
    }

    /// Reject remote URL sources when safe mode is on.
    pub fn check_source_url(&self, url: &str) -> Result<()> {
        if self.enabled && is_remote_url(url) {
            return Err(Error::UnsafeInputRejected { url: url.to_string() });
        }
        Ok(())
    }

    /// Whether the browser context should run page scripts at all
    pub fn javascript_enabled(&self) -> bool {
        !self.enabled
    }

    /// Interception is installed only when an allow-list was supplied.
    pub fn intercepts_requests(&self) -> bool {
        !self.network_allowlist.is_empty()
    }

    /// Permit requests whose URL starts with an allow-listed prefix; abort the rest.
    pub fn decide(&self, request: &RequestInfo) -> RequestAction {
        if self
            .network_allowlist
            .iter()
            .any(|prefix| request.url.starts_with(prefix.as_str()))
        {
            RequestAction::Continue
        } else {
            warn!("Blocked request outside allow-list: {} {}", request.method, request.url);
            RequestAction::Fail { reason: "not in network allow-list".to_string() }
        }
    }

    /// Owned handler suitable for [`crate::Engine::on_request`]
    pub fn request_handler(&self) -> impl Fn(&RequestInfo) -> RequestAction + Send + Sync + 'static {
        let policy = self.clone();
        move |req: &RequestInfo| policy.decide(req)
    }
}
