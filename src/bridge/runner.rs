// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Event queue and effect execution.

use std::collections::VecDeque;
use std::future::Future;

use serde_json::Value;
use tracing::debug;

use super::machine::{transition, Bridge, Effect, Event, SessionInfo};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("request failed: {0}")]
    Transport(String),
    /// Non-success HTTP status from a service
    #[error("{0}")]
    Status(u16),
}

/// I/O the bridge needs. Each call is awaited before the next event runs.
pub trait BridgeTransport: Send + Sync {
    fn check_session(&self) -> impl Future<Output = Result<Option<SessionInfo>, BridgeError>> + Send;

    /// JWT for the access token; `Ok(None)` when the response carried none.
    fn fetch_token(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<Option<String>, BridgeError>> + Send;

    /// Call the protected resource with the JWT.
    fn fetch_user_info(&self, jwt: &str) -> impl Future<Output = Result<Value, BridgeError>> + Send;

    /// Authorization URL to send the browser to.
    fn start_sign_in(&self) -> impl Future<Output = Result<String, BridgeError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

/// Browser-side effects left for the page to apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageEffects {
    pub redirect: Option<String>,
    pub strip_query: bool,
}

pub struct BridgeRunner<T> {
    transport: T,
    bridge: Bridge,
    queue: VecDeque<Event>,
    page: PageEffects,
}

impl<T: BridgeTransport> BridgeRunner<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            bridge: Bridge::default(),
            queue: VecDeque::new(),
            page: PageEffects::default(),
        }
    }

    /// Resume from a known bridge, e.g. a session already looked up.
    pub fn with_bridge(transport: T, bridge: Bridge) -> Self {
        Self {
            bridge,
            ..Self::new(transport)
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn page_effects(&self) -> &PageEffects {
        &self.page
    }

    pub fn into_parts(self) -> (Bridge, PageEffects) {
        (self.bridge, self.page)
    }

    pub fn dispatch(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    /// Dispatch `event` and process the queue until it is empty.
    pub async fn send(&mut self, event: Event) -> &Bridge {
        self.dispatch(event);
        self.run().await;
        &self.bridge
    }

    /// Process queued events in order.
    pub async fn run(&mut self) {
        while let Some(event) = self.queue.pop_front() {
            let from = self.bridge.state.name();
            let (next, effects) = transition(std::mem::take(&mut self.bridge), event);
            self.bridge = next;
            debug!(from, to = self.bridge.state.name(), "Bridge transition");

            for effect in effects {
                let follow_up = self.execute(effect).await;
                if let Some(event) = follow_up {
                    self.queue.push_back(event);
                }
            }
        }
    }

    async fn execute(&mut self, effect: Effect) -> Option<Event> {
        let t = &self.transport;
        let event = match effect {
            Effect::Dispatch(event) => event,
            Effect::CheckSession => match t.check_session().await {
                Ok(session) => Event::SessionChecked(session),
                Err(e) => {
                    debug!(error = %e, "Session check failed");
                    Event::SessionCheckFailed
                }
            },
            Effect::FetchToken { access_token } => match t.fetch_token(&access_token).await {
                Ok(jwt) => Event::TokenFetched(jwt),
                Err(e) => {
                    debug!(error = %e, "Token fetch failed");
                    Event::TokenFetchFailed
                }
            },
            Effect::FetchUserInfo { jwt } => match t.fetch_user_info(&jwt).await {
                Ok(claims) => Event::UserInfoFetched(claims),
                Err(e) => Event::UserInfoFailed(e.to_string()),
            },
            Effect::StartSignIn => match t.start_sign_in().await {
                Ok(url) => Event::SignInStarted(url),
                Err(e) => Event::SignInFailed(format!("Sign-in failed: {e}")),
            },
            Effect::SignOut => match t.sign_out().await {
                Ok(()) => Event::SignedOut,
                Err(e) => Event::SignOutFailed(format!("Sign-out failed: {e}")),
            },
            Effect::Redirect { url } => {
                self.page.redirect = Some(url);
                return None;
            }
            Effect::StripQuery => {
                self.page.strip_query = true;
                return None;
            }
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::machine::{BridgeState, MSG_TOKEN_FAILED};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        session: Option<SessionInfo>,
        token: Option<Result<Option<String>, u16>>,
        resource_status: Option<u16>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeTransport {
        fn signed_in() -> Self {
            Self {
                session: Some(SessionInfo {
                    access_token: "access".into(),
                    subject: "user-1".into(),
                    email: None,
                    name: None,
                }),
                token: Some(Ok(Some("jwt".into()))),
                ..Default::default()
            }
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl BridgeTransport for FakeTransport {
        async fn check_session(&self) -> Result<Option<SessionInfo>, BridgeError> {
            self.record("check_session");
            Ok(self.session.clone())
        }

        async fn fetch_token(&self, access_token: &str) -> Result<Option<String>, BridgeError> {
            assert_eq!(access_token, "access");
            self.record("fetch_token");
            match self.token.clone() {
                Some(Ok(jwt)) => Ok(jwt),
                Some(Err(status)) => Err(BridgeError::Status(status)),
                None => Err(BridgeError::Transport("unreachable".into())),
            }
        }

        async fn fetch_user_info(&self, jwt: &str) -> Result<Value, BridgeError> {
            self.record("fetch_user_info");
            match self.resource_status {
                Some(status) => Err(BridgeError::Status(status)),
                None => Ok(json!({ "sub": "user-1", "jwt": jwt })),
            }
        }

        async fn start_sign_in(&self) -> Result<String, BridgeError> {
            self.record("start_sign_in");
            Ok("http://idp/authorize?state=s".into())
        }

        async fn sign_out(&self) -> Result<(), BridgeError> {
            self.record("sign_out");
            Ok(())
        }
    }

    fn loaded() -> Event {
        Event::PageLoaded { returned: false, error: None }
    }

    #[tokio::test]
    async fn page_load_runs_the_whole_chain() {
        let mut runner = BridgeRunner::new(FakeTransport::signed_in());
        let bridge = runner.send(loaded()).await;

        assert!(matches!(
            &bridge.state,
            BridgeState::UserInfoReady { claims, .. } if claims["jwt"] == "jwt"
        ));
        assert_eq!(
            runner.transport.calls(),
            vec!["check_session", "fetch_token", "fetch_user_info"]
        );
    }

    #[tokio::test]
    async fn token_failure_never_reaches_the_resource() {
        let mut transport = FakeTransport::signed_in();
        transport.token = Some(Err(401));
        let mut runner = BridgeRunner::new(transport);

        let bridge = runner.send(loaded()).await;
        assert_eq!(bridge.state.error(), Some(MSG_TOKEN_FAILED));
        assert_eq!(runner.transport.calls(), vec!["check_session", "fetch_token"]);
    }

    #[tokio::test]
    async fn resource_status_is_reported() {
        let mut transport = FakeTransport::signed_in();
        transport.resource_status = Some(401);
        let mut runner = BridgeRunner::new(transport);

        let bridge = runner.send(loaded()).await;
        assert_eq!(bridge.state.error(), Some("Failed to fetch user info: 401"));
    }

    #[tokio::test]
    async fn anonymous_page_then_sign_in() {
        let mut runner = BridgeRunner::new(FakeTransport::default());
        runner
            .send(Event::PageLoaded {
                returned: true,
                error: Some("access_denied".into()),
            })
            .await;
        assert_eq!(runner.bridge().state, BridgeState::Unauthenticated);
        assert_eq!(runner.bridge().notice.as_deref(), Some("OAuth error: access_denied"));

        runner.send(Event::SignInRequested).await;
        let (bridge, page) = runner.into_parts();
        assert_eq!(bridge.state.name(), "redirecting");
        assert_eq!(page.redirect.as_deref(), Some("http://idp/authorize?state=s"));
        assert!(page.strip_query);
    }

    #[tokio::test]
    async fn sign_out_ends_idle() {
        let mut runner = BridgeRunner::new(FakeTransport::signed_in());
        runner.send(loaded()).await;
        let bridge = runner.send(Event::SignOutRequested).await;

        assert_eq!(bridge.state, BridgeState::Idle);
        assert_eq!(runner.transport.calls().last(), Some(&"sign_out"));
    }
}
