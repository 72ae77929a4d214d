//! Connection management for the remote execution service.
//!
//! The caller owns a [`ConnectionContext`] and passes it by `&mut` into every
//! operation that may need to (re)authenticate. There is no process-global
//! session.

use std::fmt;
use std::sync::Arc;

use qhub_hal::{HalError, RemoteService, ServiceHandle, Target};
use tracing::{debug, info, instrument, warn};

use crate::error::{OrchestratorError, Result};

/// Upper bound on error text forwarded to callers.
const MAX_ERROR_MESSAGE_LEN: usize = 200;

/// An operational target with its display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableTarget {
    pub target: Target,
    pub label: String,
}

impl AvailableTarget {
    fn new(target: Target) -> Self {
        let label = target.label();
        Self { target, label }
    }

    /// Target identifier.
    pub fn id(&self) -> &str {
        &self.target.id
    }
}

/// Per-caller session state.
#[derive(Clone, Default)]
pub struct ConnectionContext {
    token: Option<String>,
    handle: Option<Arc<dyn ServiceHandle>>,
    targets: Vec<AvailableTarget>,
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("token", &self.token.as_deref().map(redact_token))
            .field("connected", &self.handle.is_some())
            .field("targets", &self.targets)
            .finish()
    }
}

impl ConnectionContext {
    /// An empty, disconnected context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live service handle is held.
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// The service handle, if connected.
    pub fn handle(&self) -> Option<Arc<dyn ServiceHandle>> {
        self.handle.clone()
    }

    /// Whether a credential is stored.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Operational targets in service order.
    pub fn targets(&self) -> &[AvailableTarget] {
        &self.targets
    }

    /// Look up a connected target by id.
    pub fn target(&self, id: &str) -> Option<&Target> {
        self.targets
            .iter()
            .find(|t| t.id() == id)
            .map(|t| &t.target)
    }

    /// Forget the credential, handle and targets.
    pub fn clear(&mut self) {
        self.token = None;
        self.handle = None;
        self.targets.clear();
    }

    /// Drop the handle but keep the credential for a later reconnect.
    pub fn drop_handle(&mut self) {
        self.handle = None;
    }

    fn redacted_token(&self) -> String {
        self.token.as_deref().map(redact_token).unwrap_or_default()
    }
}

/// Redact a credential to `abcd...wxyz` form. Short credentials are fully
/// masked.
pub fn redact_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Replace every occurrence of `token` in `message` with its redacted form
/// and bound the length.
pub fn sanitize_message(message: &str, token: &str) -> String {
    let mut clean = if token.is_empty() {
        message.to_string()
    } else {
        message.replace(token, &redact_token(token))
    };
    if clean.chars().count() > MAX_ERROR_MESSAGE_LEN {
        clean = clean.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        clean.push_str("...");
    }
    clean
}

/// Authenticates against a [`RemoteService`] and fills contexts.
#[derive(Clone)]
pub struct ConnectionManager {
    service: Arc<dyn RemoteService>,
}

impl ConnectionManager {
    pub fn new(service: Arc<dyn RemoteService>) -> Self {
        Self { service }
    }

    /// Name of the underlying service.
    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    /// Authenticate with `token` and record the operational targets.
    ///
    /// On an unauthorized rejection the context is cleared. Other failures
    /// leave it untouched.
    #[instrument(skip(self, ctx, token), fields(service = %self.service.name()))]
    pub async fn connect(&self, ctx: &mut ConnectionContext, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(OrchestratorError::InvalidCredential(
                "token must not be empty".to_string(),
            ));
        }

        let result = async {
            let handle = self.service.authenticate(token).await?;
            let targets = handle.list_targets().await?;
            Ok::<_, HalError>((handle, targets))
        }
        .await;

        let (handle, targets) = match result {
            Ok(ok) => ok,
            Err(e) if e.is_unauthorized() => {
                warn!(token = %redact_token(token), "Credential rejected");
                ctx.clear();
                return Err(OrchestratorError::InvalidCredential(sanitize_message(
                    &e.to_string(),
                    token,
                )));
            }
            Err(e) => {
                let message = sanitize_message(&e.to_string(), token);
                warn!(error = %message, "Connection failed");
                return Err(OrchestratorError::ConnectionError(message));
            }
        };

        let available: Vec<AvailableTarget> = targets
            .into_iter()
            .filter(|t| t.operational)
            .map(AvailableTarget::new)
            .collect();
        if available.is_empty() {
            return Err(OrchestratorError::NoOperationalTargets);
        }

        info!(
            token = %redact_token(token),
            targets = available.len(),
            "Connected to execution service"
        );
        ctx.token = Some(token.to_string());
        ctx.handle = Some(handle);
        ctx.targets = available;
        Ok(())
    }

    /// Reconnect with the stored credential if the handle is gone.
    ///
    /// Returns whether the context is connected afterwards.
    pub async fn ensure_connected(&self, ctx: &mut ConnectionContext) -> bool {
        if ctx.is_connected() {
            return true;
        }
        let Some(token) = ctx.token.clone() else {
            return false;
        };
        debug!(token = %ctx.redacted_token(), "Reconnecting with stored credential");
        match self.connect(ctx, &token).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Reconnect failed");
                false
            }
        }
    }
}
