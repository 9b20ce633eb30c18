//! Scripted agent client (tests and offline runs)
//!
//! `ScriptedAgentClient` answers each `(role, subject)` pair with a canned
//! reply and records every call it receives. Unscripted targets fail with an
//! invocation error, the same way an unreachable agent would.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::invoker::{AgentCall, AgentClient, AgentError, AgentResult, AgentRole};

/// What the scripted agent does when called.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Answer with this raw payload.
    Respond(serde_json::Value),
    /// Fail with this error.
    Fail(AgentError),
    /// Wait, then behave like the inner reply.
    Delayed(Duration, Box<ScriptedReply>),
    /// Panic inside the client, simulating a crashing transport.
    Panic(String),
}

#[derive(Debug, Default)]
pub struct ScriptedAgentClient {
    replies: HashMap<(AgentRole, String), ScriptedReply>,
    calls: Mutex<Vec<AgentCall>>,
}

impl ScriptedAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(
        mut self,
        role: AgentRole,
        subject: impl Into<String>,
        reply: ScriptedReply,
    ) -> Self {
        self.replies.insert((role, subject.into()), reply);
        self
    }

    /// Build a client from a script document:
    ///
    /// ```json
    /// {
    ///   "scorer":    { "communication": { "score": 70, "confidence": 0.8 } },
    ///   "mediator":  { "S1": { "primary_competency": "communication" } },
    ///   "validator": { "leadership": { "error": "agent offline" } }
    /// }
    /// ```
    ///
    /// An object with a single string `error` field scripts a failure.
    pub fn from_script(script: serde_json::Value) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Script {
            #[serde(default)]
            scorer: BTreeMap<String, serde_json::Value>,
            #[serde(default)]
            mediator: BTreeMap<String, serde_json::Value>,
            #[serde(default)]
            validator: BTreeMap<String, serde_json::Value>,
        }

        let script: Script = serde_json::from_value(script)?;
        let mut client = Self::new();
        for (role, entries) in [
            (AgentRole::Scorer, script.scorer),
            (AgentRole::Mediator, script.mediator),
            (AgentRole::Validator, script.validator),
        ] {
            for (subject, value) in entries {
                let reply = match value.get("error").and_then(|e| e.as_str()) {
                    Some(detail) if value.as_object().map(|o| o.len()) == Some(1) => {
                        ScriptedReply::Fail(AgentError::invocation(
                            format!("{role}:{subject}"),
                            detail,
                        ))
                    }
                    _ => ScriptedReply::Respond(value),
                };
                client = client.with_reply(role, subject, reply);
            }
        }
        Ok(client)
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls received for `role`.
    pub fn call_count(&self, role: AgentRole) -> usize {
        self.calls().iter().filter(|c| c.role == role).count()
    }
}

#[async_trait]
impl AgentClient for ScriptedAgentClient {
    async fn call(&self, call: AgentCall) -> AgentResult<serde_json::Value> {
        let target = call.target();
        let key = (call.role, call.subject.clone());
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }

        let mut reply = match self.replies.get(&key) {
            Some(reply) => reply.clone(),
            None => {
                return Err(AgentError::invocation(target, "no scripted reply"));
            }
        };
        loop {
            match reply {
                ScriptedReply::Respond(value) => return Ok(value),
                ScriptedReply::Fail(err) => return Err(err),
                ScriptedReply::Delayed(wait, inner) => {
                    tokio::time::sleep(wait).await;
                    reply = *inner;
                }
                ScriptedReply::Panic(message) => panic!("{message}"),
            }
        }
    }
}
