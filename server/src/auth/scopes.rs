//! SMART on FHIR v1 scopes: `context/Type.access`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::serializer::ResourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeContext {
    User,
    System,
}

impl ScopeContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeContext::User => "user",
            ScopeContext::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ScopeError {
    #[error("scope '{0}' is not of the form context/Type.access")]
    Malformed(String),
    #[error("unknown scope context '{0}'")]
    UnknownContext(String),
    #[error("unknown scope access '{0}'")]
    UnknownAccess(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub context: ScopeContext,
    /// `None` for the `*` wildcard
    pub resource_type: Option<String>,
    pub read: bool,
    pub write: bool,
}

impl Scope {
    pub fn permits(&self, context: ScopeContext, resource_type: ResourceType, access: Access) -> bool {
        let type_matches = self
            .resource_type
            .as_deref()
            .map_or(true, |t| t == resource_type.as_str());
        let access_matches = match access {
            Access::Read => self.read,
            Access::Write => self.write,
        };
        self.context == context && type_matches && access_matches
    }
}

impl FromStr for Scope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (context, rest) = s
            .split_once('/')
            .ok_or_else(|| ScopeError::Malformed(s.to_string()))?;
        let (resource_type, access) = rest
            .split_once('.')
            .ok_or_else(|| ScopeError::Malformed(s.to_string()))?;
        if resource_type.is_empty() {
            return Err(ScopeError::Malformed(s.to_string()));
        }

        let context = match context {
            "user" => ScopeContext::User,
            "system" => ScopeContext::System,
            other => return Err(ScopeError::UnknownContext(other.to_string())),
        };
        let (read, write) = match access {
            "read" => (true, false),
            "write" => (false, true),
            "*" => (true, true),
            other => return Err(ScopeError::UnknownAccess(other.to_string())),
        };

        Ok(Scope {
            context,
            resource_type: (resource_type != "*").then(|| resource_type.to_string()),
            read,
            write,
        })
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let access = match (self.read, self.write) {
            (true, true) => "*",
            (false, true) => "write",
            _ => "read",
        };
        write!(
            f,
            "{}/{}.{}",
            self.context.as_str(),
            self.resource_type.as_deref().unwrap_or("*"),
            access
        )
    }
}

/// The resource scopes granted to a token. Scopes that are not resource
/// scopes (`openid`, `launch`, ...) are skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeSet {
    scopes: Vec<Scope>,
}

impl ScopeSet {
    pub fn parse(raw: &str) -> Self {
        let scopes = raw
            .split_whitespace()
            .filter_map(|s| match s.parse::<Scope>() {
                Ok(scope) => Some(scope),
                Err(err) => {
                    tracing::debug!("Ignoring scope: {}", err);
                    None
                }
            })
            .collect();
        Self { scopes }
    }

    pub fn permits(&self, context: ScopeContext, resource_type: ResourceType, access: Access) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.permits(context, resource_type, access))
    }
}
