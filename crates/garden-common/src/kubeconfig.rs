//! Kubeconfig helpers for credential Secrets
//!
//! Credential Secrets carry a kubeconfig document under the `kubeconfig` data
//! key. The client map fingerprints those bytes to notice rotation and checks
//! that token-based kubeconfigs have actually been populated before building
//! a client from them.

use k8s_openapi::api::core::v1::Secret;
use serde::Deserialize;

use crate::KUBECONFIG_SECRET_KEY;

// =============================================================================
// Pure Functions (unit-testable)
// =============================================================================

/// Raw kubeconfig bytes stored in a credential Secret
///
/// Returns None when the Secret has no (or an empty) `kubeconfig` key.
pub fn kubeconfig_from_secret(secret: &Secret) -> Option<&[u8]> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(KUBECONFIG_SECRET_KEY))
        .map(|bytes| bytes.0.as_slice())
        .filter(|bytes| !bytes.is_empty())
}

/// Fingerprint of credential material: hex-encoded SHA-256 of the raw bytes
pub fn fingerprint(kubeconfig: &[u8]) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, kubeconfig);
    hash.as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// The parts of a kubeconfig needed to find the current user's token
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct KubeconfigView {
    #[serde(default)]
    current_context: Option<String>,
    #[serde(default)]
    contexts: Option<Vec<NamedContext>>,
    #[serde(default)]
    users: Option<Vec<NamedUser>>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    #[serde(default)]
    context: Option<ContextView>,
}

#[derive(Debug, Deserialize)]
struct ContextView {
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: Option<UserView>,
}

#[derive(Debug, Deserialize)]
struct UserView {
    #[serde(default)]
    token: Option<String>,
}

/// Check whether the current context's user carries a non-empty bearer token
///
/// Token kubeconfigs are written before an external controller fills in the
/// token, so an empty token means "not ready yet" rather than "broken".
///
/// # Returns
///
/// * `Ok(true)` - the current context's user has a token
/// * `Ok(false)` - no current context, no matching user, or an empty token
/// * `Err` - the document is not a parseable kubeconfig
pub fn is_token_populated(kubeconfig: &[u8]) -> Result<bool, serde_yaml::Error> {
    let view: KubeconfigView = serde_yaml::from_slice(kubeconfig)?;

    let current = view.current_context.unwrap_or_default();
    let user_name = view
        .contexts
        .unwrap_or_default()
        .into_iter()
        .find(|c| !current.is_empty() && c.name == current)
        .and_then(|c| c.context)
        .and_then(|c| c.user)
        .unwrap_or_default();

    Ok(view
        .users
        .unwrap_or_default()
        .into_iter()
        .filter(|u| u.name == user_name)
        .any(|u| {
            u.user
                .and_then(|u| u.token)
                .is_some_and(|token| !token.is_empty())
        }))
}
