//! Token acquisition phases. Evaluation is pure; the manager in the Kommo
//! crate performs the network exchange each phase calls for.

use serde::{Deserialize, Serialize};

use crate::domain::credentials::TokenState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPhase {
    /// Stored access token is usable as-is.
    Valid,
    /// Access token missing or expired, refresh token available.
    NeedsRefresh,
    /// No usable token pair, authorization code available.
    NeedsReauthorization,
    Unauthenticated,
}

impl TokenPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::NeedsRefresh => "needs_refresh",
            Self::NeedsReauthorization => "needs_reauthorization",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

pub fn evaluate(state: &TokenState, has_authorization_code: bool, now: i64) -> TokenPhase {
    if state.usable_access_token(now).is_some() {
        TokenPhase::Valid
    } else if state.refresh_token().is_some() {
        TokenPhase::NeedsRefresh
    } else if has_authorization_code {
        TokenPhase::NeedsReauthorization
    } else {
        TokenPhase::Unauthenticated
    }
}

#[cfg(test)]
mod tests {
    use super::{evaluate, TokenPhase};
    use crate::domain::credentials::TokenState;

    fn state(access: Option<&str>, refresh: Option<&str>, expires_at: Option<i64>) -> TokenState {
        TokenState {
            access_token: access.map(str::to_owned),
            refresh_token: refresh.map(str::to_owned),
            expires_at,
        }
    }

    #[test]
    fn unexpired_token_is_valid() {
        let phase = evaluate(&state(Some("a"), Some("r"), Some(2_000)), false, 1_999);
        assert_eq!(phase, TokenPhase::Valid);
    }

    #[test]
    fn token_expiring_now_needs_refresh() {
        let phase = evaluate(&state(Some("a"), Some("r"), Some(2_000)), true, 2_000);
        assert_eq!(phase, TokenPhase::NeedsRefresh);
    }

    #[test]
    fn cleared_state_falls_back_to_authorization_code() {
        assert_eq!(evaluate(&TokenState::default(), true, 0), TokenPhase::NeedsReauthorization);
        assert_eq!(evaluate(&TokenState::default(), false, 0), TokenPhase::Unauthenticated);
    }

    #[test]
    fn access_token_without_expiry_is_treated_as_expired() {
        assert_eq!(evaluate(&state(Some("a"), None, None), false, 0), TokenPhase::Unauthenticated);
        assert_eq!(evaluate(&state(Some("a"), Some("r"), None), false, 0), TokenPhase::NeedsRefresh);
    }

    #[test]
    fn phase_names_are_stable() {
        assert_eq!(TokenPhase::NeedsReauthorization.as_str(), "needs_reauthorization");
    }
}
