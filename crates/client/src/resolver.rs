//! Target Resolver - turns a selector into a debugger WebSocket URL
//!
//! URL and path selectors are answered locally. Everything else lists the
//! remote's targets through a `TargetSource` first.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::discovery::DiscoveryClient;
use crate::error::{Result, TargetError};
use crate::options::Endpoint;
use crate::target::Target;

/// What a selector function picked
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Position in the listing; out of range (negative included) is an error
    Index(i64),
    Target(Target),
    None,
}

impl From<Option<usize>> for Selection {
    fn from(index: Option<usize>) -> Self {
        match index {
            Some(i) => Selection::Index(i as i64),
            None => Selection::None,
        }
    }
}

pub type SelectFn = Arc<dyn Fn(&[Target]) -> Selection + Send + Sync>;

#[derive(Clone, Default)]
pub enum TargetSelector {
    /// First page target, else first inspectable target
    #[default]
    Default,
    Id(String),
    /// `ws://` / `wss://` debugger URL, used as-is
    Url(String),
    /// `/devtools/...`, joined to the endpoint
    Path(String),
    Target(Box<Target>),
    Select(SelectFn),
}

impl TargetSelector {
    pub fn select<F>(f: F) -> Self
    where
        F: Fn(&[Target]) -> Selection + Send + Sync + 'static,
    {
        TargetSelector::Select(Arc::new(f))
    }

    /// Classify a user supplied string
    pub fn parse(s: &str) -> Self {
        if s.starts_with('/') {
            TargetSelector::Path(s.to_string())
        } else if is_ws_url(s) {
            TargetSelector::Url(s.to_string())
        } else {
            TargetSelector::Id(s.to_string())
        }
    }

    /// True when resolving needs a target listing
    pub fn needs_listing(&self) -> bool {
        !matches!(self, TargetSelector::Url(_) | TargetSelector::Path(_) | TargetSelector::Target(_))
    }
}

fn is_ws_url(s: &str) -> bool {
    s.split_once(':')
        .map(|(scheme, _)| scheme.eq_ignore_ascii_case("ws") || scheme.eq_ignore_ascii_case("wss"))
        .unwrap_or(false)
}

impl From<&str> for TargetSelector {
    fn from(s: &str) -> Self {
        TargetSelector::parse(s)
    }
}

impl From<String> for TargetSelector {
    fn from(s: String) -> Self {
        TargetSelector::parse(&s)
    }
}

impl From<Target> for TargetSelector {
    fn from(target: Target) -> Self {
        TargetSelector::Target(Box::new(target))
    }
}

impl fmt::Debug for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSelector::Default => write!(f, "Default"),
            TargetSelector::Id(id) => f.debug_tuple("Id").field(id).finish(),
            TargetSelector::Url(url) => f.debug_tuple("Url").field(url).finish(),
            TargetSelector::Path(path) => f.debug_tuple("Path").field(path).finish(),
            TargetSelector::Target(target) => f.debug_tuple("Target").field(&target.id).finish(),
            TargetSelector::Select(_) => write!(f, "Select(<fn>)"),
        }
    }
}

/// Something that can list the remote's targets
#[async_trait]
pub trait TargetSource: Send + Sync {
    async fn list_targets(&self) -> Result<Vec<Target>>;
}

#[async_trait]
impl TargetSource for DiscoveryClient {
    async fn list_targets(&self) -> Result<Vec<Target>> {
        DiscoveryClient::list_targets(self).await
    }
}

/// A fixed listing
#[async_trait]
impl TargetSource for Vec<Target> {
    async fn list_targets(&self) -> Result<Vec<Target>> {
        Ok(self.clone())
    }
}

/// First inspectable page, else first inspectable anything
pub fn default_target(targets: &[Target]) -> Option<&Target> {
    targets
        .iter()
        .find(|t| t.is_inspectable() && t.is_page())
        .or_else(|| targets.iter().find(|t| t.is_inspectable()))
}

fn debugger_url(target: &Target) -> Result<String> {
    target
        .web_socket_debugger_url
        .clone()
        .ok_or_else(|| TargetError::TargetNotInspectable(target.id.clone()).into())
}

/// Resolve `selector` to the debugger URL to connect to
pub async fn resolve(
    selector: &TargetSelector,
    endpoint: &Endpoint,
    source: &dyn TargetSource,
) -> Result<String> {
    let url = match selector {
        TargetSelector::Url(url) => url.clone(),
        TargetSelector::Path(path) => format!("{}{}", endpoint.ws_base(), path),
        TargetSelector::Target(target) => debugger_url(target)?,
        TargetSelector::Default => {
            let targets = source.list_targets().await?;
            let target = default_target(&targets).ok_or(TargetError::NoInspectableTargets)?;
            debugger_url(target)?
        }
        TargetSelector::Id(id) => {
            let targets = source.list_targets().await?;
            let target = targets
                .iter()
                .find(|t| &t.id == id)
                .ok_or_else(|| TargetError::InvalidTarget(id.clone()))?;
            debugger_url(target)?
        }
        TargetSelector::Select(select) => {
            let targets = source.list_targets().await?;
            match select(&targets) {
                Selection::Index(index) => {
                    let target = usize::try_from(index)
                        .ok()
                        .and_then(|i| targets.get(i))
                        .ok_or(TargetError::InvalidTargetIndex {
                            index,
                            len: targets.len(),
                        })?;
                    debugger_url(target)?
                }
                Selection::Target(target) => debugger_url(&target)?,
                Selection::None => return Err(TargetError::NoTargetSelected.into()),
            }
        }
    };
    tracing::debug!("Resolved {:?} to {}", selector, url);
    Ok(url)
}
