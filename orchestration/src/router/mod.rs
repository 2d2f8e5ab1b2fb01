//! Provider routing.
//!
//! Decides which providers a call may try and in what order:
//!
//! ```text
//! Routing          | First candidate             | Remaining candidates
//! -----------------|-----------------------------|-------------------------------
//! Default          | default provider if healthy | healthy providers, reg. order
//! Prefer(id)       | id, even if circuit open    | healthy providers, reg. order
//! Only(id)         | id, even if circuit open    | none
//! ```

pub mod circuit_breaker;

use serde::{Deserialize, Serialize};

pub use circuit_breaker::{
    CircuitState, FallbackLadder, HealthSnapshot, HealthTracker, ProviderHealthState,
};

use crate::types::ProviderId;

/// Per-call routing directive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "provider")]
pub enum Routing {
    /// Default provider first (if healthy), then the rest in registration order.
    #[default]
    Default,
    /// Try this provider first regardless of its circuit, then fail over.
    Prefer(ProviderId),
    /// Try only this provider; no failover.
    Only(ProviderId),
}

impl Routing {
    /// Explicitly requested provider, if any.
    pub fn explicit(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Prefer(id) | Self::Only(id) => Some(id),
        }
    }

    pub fn allows_failover(&self) -> bool {
        !matches!(self, Self::Only(_))
    }

    /// `Prefer(id)` when `provider` is set, otherwise `Default`.
    pub fn prefer(provider: Option<impl Into<ProviderId>>) -> Self {
        match provider {
            Some(id) => Self::Prefer(id.into()),
            None => Self::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_explicit() {
        assert_eq!(Routing::Default.explicit(), None);
        assert_eq!(Routing::Prefer("a".into()).explicit(), Some("a"));
        assert_eq!(Routing::Only("b".into()).explicit(), Some("b"));
    }

    #[test]
    fn test_only_disables_failover() {
        assert!(Routing::Default.allows_failover());
        assert!(Routing::Prefer("a".into()).allows_failover());
        assert!(!Routing::Only("a".into()).allows_failover());
    }

    #[test]
    fn test_prefer_from_option() {
        assert_eq!(Routing::prefer(None::<String>), Routing::Default);
        assert_eq!(Routing::prefer(Some("x")), Routing::Prefer("x".into()));
    }
}
