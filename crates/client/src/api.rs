//! Per-connection protocol API
//!
//! `Api::attach` turns a loaded schema into a lookup table of method names.
//! Handles (`Domain`, `Command`, `Event`) are cheap views over that table
//! plus the owning client; nothing is global and two clients with different
//! schemas never see each other's names.
//!
//! Schema metadata never hangs off a handle. It stays in the schema and is
//! reached through `metadata()` / `Client::help`.

use cdp_schema::{DomainIndex, Item, Schema};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cdp::client::Client;
use crate::cdp::protocol::SessionId;
use crate::cdp::router::Subscription;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct DomainTable {
    name: Arc<str>,
    /// short name -> "Domain.name"
    commands: HashMap<String, Arc<str>>,
    events: HashMap<String, Arc<str>>,
    types: Vec<String>,
}

fn qualify<'a>(domain: &str, names: impl Iterator<Item = &'a str>) -> HashMap<String, Arc<str>> {
    names
        .map(|name| (name.to_string(), Arc::from(format!("{}.{}", domain, name))))
        .collect()
}

/// Method-name table generated from one schema
#[derive(Debug, Clone, Default)]
pub struct Api {
    domains: Vec<DomainTable>,
    index: HashMap<String, usize>,
}

impl Api {
    pub fn attach(schema: &Schema) -> Self {
        let mut api = Self::default();
        for domain in schema.domains() {
            let table = DomainTable {
                name: Arc::from(domain.name.as_str()),
                commands: qualify(&domain.name, domain.command_names().into_iter()),
                events: qualify(&domain.name, domain.event_names().into_iter()),
                types: domain.type_names().into_iter().map(str::to_string).collect(),
            };
            api.index.insert(domain.name.clone(), api.domains.len());
            api.domains.push(table);
        }
        tracing::debug!(
            "Generated API: {} domains, {} commands, {} events",
            api.domains.len(),
            api.command_count(),
            api.event_count()
        );
        api
    }

    fn table(&self, domain: &str) -> Option<&DomainTable> {
        self.index.get(domain).map(|&i| &self.domains[i])
    }

    pub fn has_domain(&self, domain: &str) -> bool {
        self.index.contains_key(domain)
    }

    /// Domain names in schema order
    pub fn domain_names(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(|d| d.name.as_ref())
    }

    /// Fully qualified method for `domain.command`
    pub fn command(&self, domain: &str, command: &str) -> Option<&Arc<str>> {
        self.table(domain)?.commands.get(command)
    }

    pub fn event(&self, domain: &str, event: &str) -> Option<&Arc<str>> {
        self.table(domain)?.events.get(event)
    }

    /// Sorted short command names of a domain
    pub fn command_names(&self, domain: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .table(domain)
            .map(|t| t.commands.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    pub fn event_names(&self, domain: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .table(domain)
            .map(|t| t.events.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    pub fn type_names(&self, domain: &str) -> Vec<&str> {
        self.table(domain)
            .map(|t| t.types.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn command_count(&self) -> usize {
        self.domains.iter().map(|d| d.commands.len()).sum()
    }

    pub fn event_count(&self) -> usize {
        self.domains.iter().map(|d| d.events.len()).sum()
    }
}

/// One domain of a connected client
#[derive(Clone)]
pub struct Domain {
    client: Arc<Client>,
    name: Arc<str>,
}

impl Domain {
    pub(crate) fn new(client: Arc<Client>, name: &str) -> Result<Self> {
        let name = client
            .api()
            .table(name)
            .map(|t| t.name.clone())
            .ok_or_else(|| Error::unknown("domain", name))?;
        Ok(Self { client, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self, name: &str) -> Result<Command> {
        let method = self
            .client
            .api()
            .command(&self.name, name)
            .cloned()
            .ok_or_else(|| Error::unknown("command", format!("{}.{}", self.name, name)))?;
        Ok(Command {
            client: self.client.clone(),
            method,
        })
    }

    pub fn event(&self, name: &str) -> Result<Event> {
        let method = self
            .client
            .api()
            .event(&self.name, name)
            .cloned()
            .ok_or_else(|| Error::unknown("event", format!("{}.{}", self.name, name)))?;
        Ok(Event {
            client: self.client.clone(),
            method,
        })
    }

    /// One handle per declared command, sorted by name
    pub fn commands(&self) -> Vec<Command> {
        self.client
            .api()
            .command_names(&self.name)
            .into_iter()
            .filter_map(|name| self.command(name).ok())
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.client
            .api()
            .event_names(&self.name)
            .into_iter()
            .filter_map(|name| self.event(name).ok())
            .collect()
    }

    /// Additive listener for one of this domain's events, all sessions
    pub fn on<F>(&self, event: &str, listener: F) -> Result<Subscription>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Ok(self.event(event)?.subscribe(None, listener))
    }

    pub fn metadata(&self) -> Option<&DomainIndex> {
        self.client.schema().domain(&self.name)
    }
}

/// Callable handle for one command
#[derive(Clone)]
pub struct Command {
    client: Arc<Client>,
    method: Arc<str>,
}

impl Command {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub async fn call(&self, params: Option<Value>, session_id: Option<&str>) -> Result<Value> {
        self.client.send(&self.method, params, session_id).await
    }

    pub fn call_with<F>(&self, params: Option<Value>, session_id: Option<SessionId>, callback: F)
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        self.client
            .send_with(self.method.to_string(), params, session_id, callback);
    }

    pub fn metadata(&self) -> Option<&Item> {
        self.client.schema().lookup(&self.method)
    }
}

/// Handle for one event
#[derive(Clone)]
pub struct Event {
    client: Arc<Client>,
    method: Arc<str>,
}

impl Event {
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Set the handler for this event (and session), replacing the one set
    /// here before
    pub fn handle<F>(&self, session_id: Option<&str>, listener: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.client.router().set_handler(
            self.method.to_string(),
            session_id.map(str::to_string),
            Arc::new(listener),
        )
    }

    /// Additional listener, stacks with everything else
    pub fn subscribe<F>(&self, session_id: Option<&str>, listener: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.client.router().subscribe(
            self.method.to_string(),
            session_id.map(str::to_string),
            Arc::new(listener),
        )
    }

    /// Params of the next occurrence
    pub async fn next(&self, session_id: Option<&str>) -> Result<Value> {
        self.client.once(&self.method, session_id).await
    }

    pub fn metadata(&self) -> Option<&Item> {
        self.client.schema().lookup(&self.method)
    }
}
