//! CDP Session - one attached target on a shared connection
//!
//! Design: lightweight wrapper around `Client` with a session id.
//! All sessions share the client's transport; the id is only routing data.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::client::Client;
use super::protocol::{SessionId, TargetId};
use super::router::Subscription;
use crate::error::Result;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachToTargetResult {
    session_id: SessionId,
}

/// Session bound to a specific target
#[derive(Clone)]
pub struct Session {
    client: Arc<Client>,

    /// Target this session is attached to
    pub target_id: TargetId,

    /// Session ID assigned by the remote
    pub session_id: SessionId,
}

impl Session {
    /// Attach to a target in flat mode
    pub async fn attach(client: Arc<Client>, target_id: impl Into<TargetId>) -> Result<Self> {
        let target_id = target_id.into();
        let result = client
            .send(
                "Target.attachToTarget",
                Some(json!({
                    "targetId": target_id,
                    "flatten": true,
                })),
                None,
            )
            .await?;

        let AttachToTargetResult { session_id } = serde_json::from_value(result)?;
        tracing::debug!("Attached to {} as session {}", target_id, session_id);

        Ok(Self {
            client,
            target_id,
            session_id,
        })
    }

    /// Attach, then enable `domains` in parallel
    ///
    /// Individual enable failures are logged, not returned.
    pub async fn attach_with_domains(
        client: Arc<Client>,
        target_id: impl Into<TargetId>,
        domains: &[&str],
    ) -> Result<Self> {
        let session = Self::attach(client, target_id).await?;

        let enables = domains.iter().map(|domain| {
            let method = format!("{}.enable", domain);
            let session = session.clone();
            async move { session.send(&method, None).await }
        });
        let results = futures_util::future::join_all(enables).await;

        let failures = results.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            tracing::warn!(
                "Some domain enables failed: {}/{}",
                failures,
                results.len()
            );
        }

        Ok(session)
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Send command within this session's context
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.client
            .send(method, params, Some(&self.session_id))
            .await
    }

    /// Listen to `method` from this session only
    pub fn on<F>(&self, method: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.client
            .on_session(method, self.session_id.clone(), listener)
    }

    /// Params of this session's next `method` event
    pub async fn next_event(&self, method: &str) -> Result<Value> {
        self.client.once(method, Some(&self.session_id)).await
    }

    pub async fn detach(&self) -> Result<()> {
        self.client
            .send(
                "Target.detachFromTarget",
                Some(json!({ "sessionId": &self.session_id })),
                None,
            )
            .await?;
        tracing::debug!("Detached session {}", self.session_id);
        Ok(())
    }
}
