//! Strategy-driven choice of transport kind, with a one-shot fallback when
//! `Start` returns a classified error.
//!
//! The fallback table is deliberately flat rather than modeled on
//! `turbomcp-transport`'s multi-attempt `RetryPolicy`: this protocol only
//! ever swaps transport kind once per connection attempt, so a lookup
//! function expresses the rule more directly than a retry-count state
//! machine would.

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Which concrete transport a connection is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    Sse,
}

/// Upstream-configured policy for choosing and falling back between
/// transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportStrategy {
    HttpFirst,
    SseFirst,
    HttpOnly,
    SseOnly,
}

impl Default for TransportStrategy {
    fn default() -> Self {
        Self::HttpFirst
    }
}

impl TransportStrategy {
    /// The transport kind a connection should try first.
    pub fn initial_kind(self) -> TransportKind {
        match self {
            Self::HttpFirst | Self::HttpOnly => TransportKind::Http,
            Self::SseFirst | Self::SseOnly => TransportKind::Sse,
        }
    }

    /// Given the kind that just failed and the classified error it failed
    /// with, returns the kind to retry with, or `None` if this strategy (or
    /// this error) does not call for a fallback.
    ///
    /// `Unauthorised` never falls back here; the connection state machine
    /// handles it by running the interactive auth flow and retrying the
    /// same kind.
    pub fn fallback_kind(self, failed: TransportKind, error: &TransportError) -> Option<TransportKind> {
        match (self, failed, error) {
            (Self::HttpFirst, TransportKind::Http, TransportError::NotFound) => Some(TransportKind::Sse),
            (Self::SseFirst, TransportKind::Sse, TransportError::MethodNotAllowed) => Some(TransportKind::Http),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_first_falls_back_to_sse_on_not_found() {
        let strategy = TransportStrategy::HttpFirst;
        assert_eq!(strategy.initial_kind(), TransportKind::Http);
        assert_eq!(
            strategy.fallback_kind(TransportKind::Http, &TransportError::NotFound),
            Some(TransportKind::Sse)
        );
    }

    #[test]
    fn sse_first_falls_back_to_http_on_method_not_allowed() {
        let strategy = TransportStrategy::SseFirst;
        assert_eq!(strategy.initial_kind(), TransportKind::Sse);
        assert_eq!(
            strategy.fallback_kind(TransportKind::Sse, &TransportError::MethodNotAllowed),
            Some(TransportKind::Http)
        );
    }

    #[test]
    fn only_strategies_never_fall_back() {
        assert_eq!(
            TransportStrategy::HttpOnly.fallback_kind(TransportKind::Http, &TransportError::NotFound),
            None
        );
        assert_eq!(
            TransportStrategy::SseOnly.fallback_kind(TransportKind::Sse, &TransportError::MethodNotAllowed),
            None
        );
    }

    #[test]
    fn fallback_is_one_shot_by_construction() {
        let strategy = TransportStrategy::HttpFirst;
        let first = strategy.fallback_kind(TransportKind::Http, &TransportError::NotFound);
        assert_eq!(first, Some(TransportKind::Sse));
        // A second failure, now on the fallback kind, has no further match arm.
        let second = strategy.fallback_kind(TransportKind::Sse, &TransportError::NotFound);
        assert_eq!(second, None);
    }

    #[test]
    fn unauthorised_never_triggers_a_transport_swap() {
        let strategy = TransportStrategy::HttpFirst;
        assert_eq!(
            strategy.fallback_kind(TransportKind::Http, &TransportError::Unauthorised),
            None
        );
    }
}
