use crate::config::Endpoints;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Reachable without credentials; never carries an `Authorization` header.
    Public,
    Protected,
}

/// Prefix allow-list deciding which backend paths are public.
#[derive(Debug, Clone)]
pub struct EndpointPolicy {
    public_prefixes: Vec<String>,
}

impl EndpointPolicy {
    pub fn new(public_prefixes: Vec<String>) -> Self {
        Self { public_prefixes }
    }

    pub fn from_endpoints(endpoints: &Endpoints) -> Self {
        Self::new(endpoints.public_prefixes.clone())
    }

    pub fn classify(&self, endpoint: &str) -> EndpointKind {
        let path = strip_query(endpoint);
        if self
            .public_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            EndpointKind::Public
        } else {
            EndpointKind::Protected
        }
    }
}

fn strip_query(endpoint: &str) -> &str {
    let end = endpoint.find(['?', '#']).unwrap_or(endpoint.len());
    &endpoint[..end]
}
