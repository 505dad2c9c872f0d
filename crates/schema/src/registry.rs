//! Schema Registry - name-keyed view of a protocol descriptor
//!
//! `Schema::load` walks every domain once and builds:
//! - one `Item` per command / event / type, keyed by name within its domain
//! - parameter, return and property lists rewritten as name → `Parameter` maps
//!
//! Items double as the help/introspection side table: the client never hangs
//! metadata off its callables, it asks the schema instead.

use ahash::AHashMap;
use serde_json::{Map, Value};
use std::fmt;

use crate::descriptor::{CommandSpec, DomainSpec, EventSpec, Parameter, ProtocolDescriptor, TypeSpec, Version};
use crate::error::{Result, SchemaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Command,
    Event,
    Type,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Command => "command",
            Category::Event => "event",
            Category::Type => "type",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized command, event or type
#[derive(Debug, Clone)]
pub struct Item {
    pub category: Category,
    pub domain: String,
    pub name: String,
    pub description: Option<String>,
    pub experimental: bool,
    pub deprecated: bool,
    /// Parameters for commands/events, properties for types
    pub parameters: AHashMap<String, Parameter>,
    /// Return values (commands only)
    pub returns: AHashMap<String, Parameter>,
    /// Underlying JSON type (types only)
    pub kind: Option<String>,
    /// Every other descriptor field, verbatim
    pub extra: Map<String, Value>,
}

impl Item {
    /// `"Domain.name"`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.domain, self.name)
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    /// Names of the non-optional parameters, sorted for stable output
    pub fn required_parameters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .parameters
            .values()
            .filter(|p| !p.optional)
            .map(|p| p.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// All items of a single domain
#[derive(Debug, Clone)]
pub struct DomainIndex {
    pub name: String,
    pub description: Option<String>,
    pub experimental: bool,
    pub deprecated: bool,
    pub dependencies: Vec<String>,
    pub commands: AHashMap<String, Item>,
    pub events: AHashMap<String, Item>,
    pub types: AHashMap<String, Item>,
}

impl DomainIndex {
    fn from_spec(spec: &DomainSpec) -> Result<Self> {
        let mut index = Self {
            name: spec.domain.clone(),
            description: spec.description.clone(),
            experimental: spec.experimental,
            deprecated: spec.deprecated,
            dependencies: spec.dependencies.clone(),
            commands: AHashMap::with_capacity(spec.commands.len()),
            events: AHashMap::with_capacity(spec.events.len()),
            types: AHashMap::with_capacity(spec.types.len()),
        };

        for command in &spec.commands {
            let item = command_item(&spec.domain, command)?;
            insert_unique(&mut index.commands, item)?;
        }
        for event in &spec.events {
            let item = event_item(&spec.domain, event)?;
            insert_unique(&mut index.events, item)?;
        }
        for ty in &spec.types {
            let item = type_item(&spec.domain, ty)?;
            insert_unique(&mut index.types, item)?;
        }

        Ok(index)
    }

    /// Look an item up in commands, then events, then types
    pub fn item(&self, name: &str) -> Option<&Item> {
        self.commands
            .get(name)
            .or_else(|| self.events.get(name))
            .or_else(|| self.types.get(name))
    }

    /// Sorted command names
    pub fn command_names(&self) -> Vec<&str> {
        sorted_keys(&self.commands)
    }

    /// Sorted event names
    pub fn event_names(&self) -> Vec<&str> {
        sorted_keys(&self.events)
    }

    /// Sorted type ids
    pub fn type_names(&self) -> Vec<&str> {
        sorted_keys(&self.types)
    }
}

/// Normalized protocol schema
#[derive(Debug, Clone)]
pub struct Schema {
    version: Option<Version>,
    domains: Vec<DomainIndex>,
    by_name: AHashMap<String, usize>,
}

impl Schema {
    /// Index a descriptor. Fails on the first duplicate name found.
    pub fn load(descriptor: &ProtocolDescriptor) -> Result<Self> {
        let mut domains = Vec::with_capacity(descriptor.domains.len());
        let mut by_name = AHashMap::with_capacity(descriptor.domains.len());

        for spec in &descriptor.domains {
            if by_name.insert(spec.domain.clone(), domains.len()).is_some() {
                return Err(SchemaError::DuplicateDomain(spec.domain.clone()));
            }
            domains.push(DomainIndex::from_spec(spec)?);
        }

        Ok(Self {
            version: descriptor.version.clone(),
            domains,
            by_name,
        })
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Domains in declaration order
    pub fn domains(&self) -> impl Iterator<Item = &DomainIndex> {
        self.domains.iter()
    }

    pub fn domain(&self, name: &str) -> Option<&DomainIndex> {
        self.by_name.get(name).map(|&i| &self.domains[i])
    }

    pub fn command(&self, domain: &str, name: &str) -> Option<&Item> {
        self.domain(domain)?.commands.get(name)
    }

    pub fn event(&self, domain: &str, name: &str) -> Option<&Item> {
        self.domain(domain)?.events.get(name)
    }

    pub fn type_def(&self, domain: &str, id: &str) -> Option<&Item> {
        self.domain(domain)?.types.get(id)
    }

    /// Resolve a qualified `"Domain.name"` to its metadata
    pub fn lookup(&self, qualified: &str) -> Option<&Item> {
        let (domain, name) = qualified.split_once('.')?;
        self.domain(domain)?.item(name)
    }

    pub fn command_count(&self) -> usize {
        self.domains.iter().map(|d| d.commands.len()).sum()
    }

    pub fn event_count(&self) -> usize {
        self.domains.iter().map(|d| d.events.len()).sum()
    }

    pub fn type_count(&self) -> usize {
        self.domains.iter().map(|d| d.types.len()).sum()
    }
}

fn command_item(domain: &str, spec: &CommandSpec) -> Result<Item> {
    let mut extra = spec.extra.clone();
    if let Some(redirect) = &spec.redirect {
        extra.insert("redirect".to_string(), Value::String(redirect.clone()));
    }
    Ok(Item {
        category: Category::Command,
        domain: domain.to_string(),
        name: spec.name.clone(),
        description: spec.description.clone(),
        experimental: spec.experimental,
        deprecated: spec.deprecated,
        parameters: index_parameters(domain, &spec.name, "parameters", &spec.parameters)?,
        returns: index_parameters(domain, &spec.name, "returns", &spec.returns)?,
        kind: None,
        extra,
    })
}

fn event_item(domain: &str, spec: &EventSpec) -> Result<Item> {
    Ok(Item {
        category: Category::Event,
        domain: domain.to_string(),
        name: spec.name.clone(),
        description: spec.description.clone(),
        experimental: spec.experimental,
        deprecated: spec.deprecated,
        parameters: index_parameters(domain, &spec.name, "parameters", &spec.parameters)?,
        returns: AHashMap::new(),
        kind: None,
        extra: spec.extra.clone(),
    })
}

fn type_item(domain: &str, spec: &TypeSpec) -> Result<Item> {
    let mut extra = spec.extra.clone();
    if !spec.variants.is_empty() {
        let variants = spec.variants.iter().cloned().map(Value::String).collect();
        extra.insert("enum".to_string(), Value::Array(variants));
    }
    if let Some(items) = &spec.items {
        extra.insert("items".to_string(), items.clone());
    }
    Ok(Item {
        category: Category::Type,
        domain: domain.to_string(),
        name: spec.id.clone(),
        description: spec.description.clone(),
        experimental: spec.experimental,
        deprecated: spec.deprecated,
        parameters: index_parameters(domain, &spec.id, "properties", &spec.properties)?,
        returns: AHashMap::new(),
        kind: spec.kind.clone(),
        extra,
    })
}

fn index_parameters(
    domain: &str,
    item: &str,
    list: &'static str,
    parameters: &[Parameter],
) -> Result<AHashMap<String, Parameter>> {
    let mut map = AHashMap::with_capacity(parameters.len());
    for parameter in parameters {
        if map.insert(parameter.name.clone(), parameter.clone()).is_some() {
            return Err(SchemaError::DuplicateParameter {
                domain: domain.to_string(),
                item: item.to_string(),
                list,
                parameter: parameter.name.clone(),
            });
        }
    }
    Ok(map)
}

fn insert_unique(map: &mut AHashMap<String, Item>, item: Item) -> Result<()> {
    if map.contains_key(&item.name) {
        return Err(SchemaError::DuplicateItem {
            category: item.category.as_str(),
            domain: item.domain,
            name: item.name,
        });
    }
    map.insert(item.name.clone(), item);
    Ok(())
}

fn sorted_keys(map: &AHashMap<String, Item>) -> Vec<&str> {
    let mut names: Vec<&str> = map.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}
