//! The authentication state machine.

/// Where a session is in its lifecycle.
///
/// Login sessions walk one of two paths:
///
/// ```text
///                       ┌─→ LegacyAuth ──────────────────────────────────────┐
/// Connecting → StreamOpening                                                 ├─→ Ready → Closed
///                       └─→ SaslNegotiating → SaslChallenge → SaslSuccess    │
///                             → PostSaslStreamOpening → Binding → SessionEstablishing
/// ```
///
/// Registration sessions take a short path and close after the server's
/// single answer:
///
/// ```text
/// Connecting → StreamOpening → RegisterRequest → Closed
/// ```
///
/// Any phase may jump to `Closed` when the connection fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Connecting,
    StreamOpening,
    LegacyAuth,
    SaslNegotiating,
    SaslChallenge,
    SaslSuccess,
    PostSaslStreamOpening,
    Binding,
    SessionEstablishing,
    Ready,
    RegisterRequest,
    Closed,
}

impl Phase {
    /// Returns `true` once stanzas may be routed to listeners.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` while credentials are being exchanged.
    pub fn is_authenticating(self) -> bool {
        matches!(
            self,
            Self::LegacyAuth
                | Self::SaslNegotiating
                | Self::SaslChallenge
                | Self::SaslSuccess
                | Self::RegisterRequest
        )
    }

    /// Returns `true` while the engine expects a `<stream:features>`.
    pub fn awaits_features(self) -> bool {
        matches!(self, Self::StreamOpening | Self::PostSaslStreamOpening)
    }

    /// Returns `true` if moving to `target` follows the state machine.
    pub fn can_transition_to(self, target: Self) -> bool {
        use Phase::*;
        if target == Closed {
            return self != Closed;
        }
        matches!(
            (self, target),
            (Connecting, StreamOpening)
                | (StreamOpening, LegacyAuth | SaslNegotiating | RegisterRequest)
                | (LegacyAuth, Ready)
                | (SaslNegotiating, SaslChallenge)
                | (SaslChallenge, SaslChallenge | SaslSuccess)
                | (SaslSuccess, PostSaslStreamOpening)
                | (PostSaslStreamOpening, Binding | SessionEstablishing | Ready)
                | (Binding, SessionEstablishing | Ready)
                | (SessionEstablishing, Ready)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "Connecting",
            Self::StreamOpening => "StreamOpening",
            Self::LegacyAuth => "LegacyAuth",
            Self::SaslNegotiating => "SaslNegotiating",
            Self::SaslChallenge => "SaslChallenge",
            Self::SaslSuccess => "SaslSuccess",
            Self::PostSaslStreamOpening => "PostSaslStreamOpening",
            Self::Binding => "Binding",
            Self::SessionEstablishing => "SessionEstablishing",
            Self::Ready => "Ready",
            Self::RegisterRequest => "RegisterRequest",
            Self::Closed => "Closed",
        };
        f.write_str(name)
    }
}
