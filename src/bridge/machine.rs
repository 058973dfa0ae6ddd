// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! States, events, effects, and the pure transition function.

use serde_json::Value;

pub const MSG_CHECK_SESSION: &str = "Failed to check session";
pub const MSG_TOKEN_FAILED: &str = "Failed to get JWT from auth server";
pub const MSG_NO_JWT: &str = "No JWT token received from auth server";
pub const MSG_NO_ACCESS_TOKEN: &str = "No access token available to fetch user info";

/// What the page knows about the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Access token issued by the auth server
    pub access_token: String,
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeState {
    Idle,
    CheckingSession,
    Unauthenticated,
    Authenticated { session: SessionInfo },
    FetchingToken { session: SessionInfo },
    TokenReady { session: SessionInfo, jwt: String },
    TokenError { session: SessionInfo, message: String },
    FetchingUserInfo { session: SessionInfo, jwt: String },
    UserInfoReady { session: SessionInfo, jwt: String, claims: Value },
    UserInfoError { session: SessionInfo, message: String },
    SigningIn,
    Redirecting { url: String },
    SignInError { message: String },
    SigningOut,
}

impl BridgeState {
    /// Session of every signed-in state.
    pub fn session(&self) -> Option<&SessionInfo> {
        match self {
            Self::Authenticated { session }
            | Self::FetchingToken { session }
            | Self::TokenReady { session, .. }
            | Self::TokenError { session, .. }
            | Self::FetchingUserInfo { session, .. }
            | Self::UserInfoReady { session, .. }
            | Self::UserInfoError { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Error message carried by the state, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::TokenError { message, .. }
            | Self::UserInfoError { message, .. }
            | Self::SignInError { message } => Some(message),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingSession => "checking_session",
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated { .. } => "authenticated",
            Self::FetchingToken { .. } => "fetching_token",
            Self::TokenReady { .. } => "token_ready",
            Self::TokenError { .. } => "token_error",
            Self::FetchingUserInfo { .. } => "fetching_user_info",
            Self::UserInfoReady { .. } => "user_info_ready",
            Self::UserInfoError { .. } => "user_info_error",
            Self::SigningIn => "signing_in",
            Self::Redirecting { .. } => "redirecting",
            Self::SignInError { .. } => "sign_in_error",
            Self::SigningOut => "signing_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Page opened. `returned` is set when the URL carried `code` or `error`.
    PageLoaded { returned: bool, error: Option<String> },
    SessionChecked(Option<SessionInfo>),
    SessionCheckFailed,
    TokenRequested,
    /// JWT from the token endpoint; `None` when the body had none.
    TokenFetched(Option<String>),
    TokenFetchFailed,
    UserInfoRequested,
    UserInfoFetched(Value),
    /// Protected resource answered with a non-success status.
    UserInfoFailed(String),
    SignInRequested,
    SignInStarted(String),
    SignInFailed(String),
    SignOutRequested,
    SignedOut,
    SignOutFailed(String),
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CheckSession,
    FetchToken { access_token: String },
    FetchUserInfo { jwt: String },
    StartSignIn,
    Redirect { url: String },
    /// Remove `code`/`error` from the address bar.
    StripQuery,
    SignOut,
    /// Queue a follow-up event.
    Dispatch(Event),
}

/// The state machine plus the notice line shown above it.
#[derive(Debug, Clone, PartialEq)]
pub struct Bridge {
    pub state: BridgeState,
    /// Message from the OAuth redirect or a failed session check
    pub notice: Option<String>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self {
            state: BridgeState::Idle,
            notice: None,
        }
    }
}

impl Bridge {
    fn with(state: BridgeState, notice: Option<String>) -> Self {
        Self { state, notice }
    }
}

/// Next bridge and its effects. Events that make no sense in the current
/// state leave it untouched.
pub fn transition(bridge: Bridge, event: Event) -> (Bridge, Vec<Effect>) {
    use BridgeState as S;

    let Bridge { state, notice } = bridge;
    match (state, event) {
        (S::Idle | S::Unauthenticated | S::SignInError { .. }, Event::PageLoaded { returned, error }) => {
            let mut effects = Vec::new();
            if returned {
                effects.push(Effect::StripQuery);
            }
            effects.push(Effect::CheckSession);
            let notice = error.map(|e| format!("OAuth error: {e}"));
            (Bridge::with(S::CheckingSession, notice), effects)
        }

        (S::CheckingSession, Event::SessionChecked(Some(session))) => (
            Bridge::with(S::Authenticated { session }, notice),
            vec![Effect::Dispatch(Event::TokenRequested)],
        ),
        (S::CheckingSession, Event::SessionChecked(None)) => {
            (Bridge::with(S::Unauthenticated, notice), vec![])
        }
        (S::CheckingSession, Event::SessionCheckFailed) => (
            Bridge::with(S::Unauthenticated, Some(MSG_CHECK_SESSION.to_string())),
            vec![],
        ),

        (
            S::Authenticated { session } | S::TokenError { session, .. },
            Event::TokenRequested,
        ) => {
            if session.access_token.is_empty() {
                let message = MSG_NO_ACCESS_TOKEN.to_string();
                return (Bridge::with(S::TokenError { session, message }, notice), vec![]);
            }
            let access_token = session.access_token.clone();
            (
                Bridge::with(S::FetchingToken { session }, notice),
                vec![Effect::FetchToken { access_token }],
            )
        }
        (S::FetchingToken { session }, Event::TokenFetched(Some(jwt))) => (
            Bridge::with(S::TokenReady { session, jwt }, notice),
            vec![Effect::Dispatch(Event::UserInfoRequested)],
        ),
        (S::FetchingToken { session }, Event::TokenFetched(None)) => {
            let message = MSG_NO_JWT.to_string();
            (Bridge::with(S::TokenError { session, message }, notice), vec![])
        }
        (S::FetchingToken { session }, Event::TokenFetchFailed) => {
            let message = MSG_TOKEN_FAILED.to_string();
            (Bridge::with(S::TokenError { session, message }, notice), vec![])
        }

        (S::TokenReady { session, jwt }, Event::UserInfoRequested) => {
            let effect = Effect::FetchUserInfo { jwt: jwt.clone() };
            (Bridge::with(S::FetchingUserInfo { session, jwt }, notice), vec![effect])
        }
        (S::FetchingUserInfo { session, jwt }, Event::UserInfoFetched(claims)) => (
            Bridge::with(S::UserInfoReady { session, jwt, claims }, None),
            vec![],
        ),
        (S::FetchingUserInfo { session, .. }, Event::UserInfoFailed(status)) => {
            let message = format!("Failed to fetch user info: {status}");
            (Bridge::with(S::UserInfoError { session, message }, notice), vec![])
        }

        (S::Idle | S::Unauthenticated | S::SignInError { .. }, Event::SignInRequested) => {
            (Bridge::with(S::SigningIn, notice), vec![Effect::StartSignIn])
        }
        (S::SigningIn, Event::SignInStarted(url)) => (
            Bridge::with(S::Redirecting { url: url.clone() }, notice),
            vec![Effect::Redirect { url }],
        ),
        (S::SigningIn, Event::SignInFailed(message)) => {
            (Bridge::with(S::SignInError { message }, notice), vec![])
        }

        (state, Event::SignOutRequested) if state.session().is_some() => {
            (Bridge::with(S::SigningOut, None), vec![Effect::SignOut])
        }
        (S::SigningOut, Event::SignedOut) => (Bridge::default(), vec![]),
        (S::SigningOut, Event::SignOutFailed(message)) => {
            (Bridge::with(S::Idle, Some(message)), vec![])
        }

        (state, _) => (Bridge::with(state, notice), vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> SessionInfo {
        SessionInfo {
            access_token: "access".into(),
            subject: "user-1".into(),
            email: Some("alice@example.com".into()),
            name: Some("Alice".into()),
        }
    }

    fn at(state: BridgeState) -> Bridge {
        Bridge { state, notice: None }
    }

    #[test]
    fn page_load_checks_session() {
        let (bridge, effects) = transition(
            Bridge::default(),
            Event::PageLoaded { returned: false, error: None },
        );
        assert_eq!(bridge.state, BridgeState::CheckingSession);
        assert_eq!(effects, vec![Effect::CheckSession]);
    }

    #[test]
    fn oauth_return_strips_query_and_reports_error() {
        let (bridge, effects) = transition(
            Bridge::default(),
            Event::PageLoaded {
                returned: true,
                error: Some("access_denied".into()),
            },
        );
        assert_eq!(bridge.notice.as_deref(), Some("OAuth error: access_denied"));
        assert_eq!(effects, vec![Effect::StripQuery, Effect::CheckSession]);
    }

    #[test]
    fn session_found_requests_token() {
        let (bridge, effects) = transition(
            at(BridgeState::CheckingSession),
            Event::SessionChecked(Some(session())),
        );
        assert_eq!(bridge.state, BridgeState::Authenticated { session: session() });
        assert_eq!(effects, vec![Effect::Dispatch(Event::TokenRequested)]);

        let (bridge, effects) = transition(bridge, Event::TokenRequested);
        assert_eq!(bridge.state.name(), "fetching_token");
        assert_eq!(
            effects,
            vec![Effect::FetchToken { access_token: "access".into() }]
        );
    }

    #[test]
    fn no_session_is_unauthenticated() {
        let (bridge, effects) =
            transition(at(BridgeState::CheckingSession), Event::SessionChecked(None));
        assert_eq!(bridge.state, BridgeState::Unauthenticated);
        assert!(effects.is_empty());

        let (bridge, _) = transition(at(BridgeState::CheckingSession), Event::SessionCheckFailed);
        assert_eq!(bridge.state, BridgeState::Unauthenticated);
        assert_eq!(bridge.notice.as_deref(), Some(MSG_CHECK_SESSION));
    }

    #[test]
    fn missing_access_token_is_an_error() {
        let mut s = session();
        s.access_token.clear();
        let (bridge, effects) =
            transition(at(BridgeState::Authenticated { session: s }), Event::TokenRequested);
        assert_eq!(bridge.state.error(), Some(MSG_NO_ACCESS_TOKEN));
        assert!(effects.is_empty());
    }

    #[test]
    fn token_outcomes() {
        let fetching = || at(BridgeState::FetchingToken { session: session() });

        let (bridge, effects) = transition(fetching(), Event::TokenFetched(Some("jwt".into())));
        assert_eq!(bridge.state.name(), "token_ready");
        assert_eq!(effects, vec![Effect::Dispatch(Event::UserInfoRequested)]);

        let (bridge, _) = transition(fetching(), Event::TokenFetched(None));
        assert_eq!(bridge.state.error(), Some(MSG_NO_JWT));

        let (bridge, _) = transition(fetching(), Event::TokenFetchFailed);
        assert_eq!(bridge.state.error(), Some(MSG_TOKEN_FAILED));
    }

    #[test]
    fn resource_is_only_called_with_a_jwt() {
        for state in [
            BridgeState::Authenticated { session: session() },
            BridgeState::FetchingToken { session: session() },
            BridgeState::TokenError {
                session: session(),
                message: MSG_TOKEN_FAILED.into(),
            },
        ] {
            let (_, effects) = transition(at(state), Event::UserInfoRequested);
            assert!(effects.is_empty());
        }

        let (bridge, effects) = transition(
            at(BridgeState::TokenReady { session: session(), jwt: "jwt".into() }),
            Event::UserInfoRequested,
        );
        assert_eq!(bridge.state.name(), "fetching_user_info");
        assert_eq!(effects, vec![Effect::FetchUserInfo { jwt: "jwt".into() }]);
    }

    #[test]
    fn user_info_outcomes() {
        let fetching = || at(BridgeState::FetchingUserInfo { session: session(), jwt: "jwt".into() });

        let (bridge, _) = transition(fetching(), Event::UserInfoFetched(json!({"sub": "user-1"})));
        assert!(matches!(
            bridge.state,
            BridgeState::UserInfoReady { ref claims, .. } if claims["sub"] == "user-1"
        ));

        let (bridge, _) = transition(fetching(), Event::UserInfoFailed("401".into()));
        assert_eq!(bridge.state.error(), Some("Failed to fetch user info: 401"));
    }

    #[test]
    fn sign_in_redirects() {
        let (bridge, effects) = transition(at(BridgeState::Unauthenticated), Event::SignInRequested);
        assert_eq!(bridge.state, BridgeState::SigningIn);
        assert_eq!(effects, vec![Effect::StartSignIn]);

        let (bridge, effects) = transition(bridge, Event::SignInStarted("http://idp/authorize".into()));
        assert_eq!(
            bridge.state,
            BridgeState::Redirecting { url: "http://idp/authorize".into() }
        );
        assert_eq!(effects, vec![Effect::Redirect { url: "http://idp/authorize".into() }]);

        let (bridge, _) = transition(at(BridgeState::SigningIn), Event::SignInFailed("down".into()));
        assert_eq!(bridge.state.error(), Some("down"));
    }

    #[test]
    fn sign_out_returns_to_idle() {
        let start = Bridge {
            state: BridgeState::UserInfoReady {
                session: session(),
                jwt: "jwt".into(),
                claims: json!({}),
            },
            notice: Some("old".into()),
        };
        let (bridge, effects) = transition(start, Event::SignOutRequested);
        assert_eq!(bridge.state, BridgeState::SigningOut);
        assert_eq!(effects, vec![Effect::SignOut]);

        let (bridge, _) = transition(bridge, Event::SignedOut);
        assert_eq!(bridge, Bridge::default());
    }

    #[test]
    fn sign_out_needs_a_session() {
        let (bridge, effects) = transition(at(BridgeState::Unauthenticated), Event::SignOutRequested);
        assert_eq!(bridge.state, BridgeState::Unauthenticated);
        assert!(effects.is_empty());
    }

    #[test]
    fn stray_events_are_ignored() {
        let (bridge, effects) =
            transition(at(BridgeState::Idle), Event::TokenFetched(Some("jwt".into())));
        assert_eq!(bridge.state, BridgeState::Idle);
        assert!(effects.is_empty());
    }
}
