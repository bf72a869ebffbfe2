/// An addressable worker endpoint, as configured at manager startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Endpoint in `host:port` form; doubles as the node's identity.
    pub name: String,
    /// Base URL of the node's task API.
    pub api: String,
    pub role: String,
}

impl Node {
    pub fn new(name: &str, api: &str, role: &str) -> Self {
        Node {
            name: name.to_string(),
            api: api.to_string(),
            role: role.to_string(),
        }
    }
}
