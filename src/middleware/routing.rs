//! Recursive routing tree (spec.md §4.G): a literal-segment tree with a
//! per-node "has path parameter" flag, deciding per (method, path) whether
//! a route's body/response are encrypted.
//!
//! Grounded on `original_source/.../middleware/crypto/routing.py`'s
//! segment-tree model; `default_tree()` below reproduces its default
//! policy table from spec.md §4.G and §6.

use std::collections::HashSet;

/// Per-route authentication requirement, independent of body/response
/// encryption (spec.md §6's "Auth?" column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthRequirement {
    None,
    Bearer,
    #[default]
    BearerPoP,
}

#[derive(Debug, Clone)]
pub struct EncryptedRoute {
    pub encrypted_body: bool,
    pub encrypted_response: bool,
    pub auth: AuthRequirement,
    pub excluded_statuses: HashSet<u16>,
}

impl EncryptedRoute {
    fn new(encrypted_body: bool, encrypted_response: bool) -> Self {
        Self { encrypted_body, encrypted_response, auth: AuthRequirement::BearerPoP, excluded_statuses: HashSet::new() }
    }

    fn excluding(mut self, statuses: &[u16]) -> Self {
        self.excluded_statuses.extend(statuses);
        self
    }

    fn no_auth(mut self) -> Self {
        self.auth = AuthRequirement::None;
        self
    }

    fn bearer_only(mut self) -> Self {
        self.auth = AuthRequirement::Bearer;
        self
    }
}

struct RouteNode {
    segment: String,
    has_param: bool,
    children: Vec<RouteNode>,
    methods: Vec<(&'static str, EncryptedRoute)>,
}

impl RouteNode {
    fn leaf(segment: &str) -> Self {
        Self { segment: segment.to_string(), has_param: false, children: Vec::new(), methods: Vec::new() }
    }

    fn param(segment: &str) -> Self {
        Self { segment: segment.to_string(), has_param: true, children: Vec::new(), methods: Vec::new() }
    }

    fn with_child(mut self, child: RouteNode) -> Self {
        self.children.push(child);
        self
    }

    fn with_method(mut self, method: &'static str, route: EncryptedRoute) -> Self {
        self.methods.push((method, route));
        self
    }
}

/// Persistent, read-only-at-runtime routing tree.
pub struct RoutingTree {
    root: RouteNode,
}

impl RoutingTree {
    /// Looks up the `(method, path)` pair. Traversal strips the matching
    /// segment and descends by the next one; once a node with `has_param`
    /// is reached, the remainder of the path is treated as its single
    /// captured parameter and descent stops there.
    pub fn lookup(&self, method: &str, path: &str) -> Option<&EncryptedRoute> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        Self::traverse(&self.root.children, &segments, 0).and_then(|node| {
            node.methods.iter().find(|(m, _)| m.eq_ignore_ascii_case(method)).map(|(_, r)| r)
        })
    }

    fn traverse<'a>(children: &'a [RouteNode], segments: &[&str], depth: usize) -> Option<&'a RouteNode> {
        let current = segments.get(depth)?;
        let node = children.iter().find(|n| n.segment == *current)?;
        if node.has_param {
            return Some(node);
        }
        if depth + 1 == segments.len() {
            return Some(node);
        }
        Self::traverse(&node.children, segments, depth + 1)
    }
}

/// The system's default policy (spec.md §4.G, §6): file and vault routes
/// require encryption in both directions except where the surface table
/// names a narrower contract. The debug-only `/api/auth/token` route is
/// unencrypted and unauthenticated — see the comment at its tree entry.
pub fn default_tree() -> RoutingTree {
    let files = RouteNode::leaf("files")
        .with_child(RouteNode::param("upload").with_method("POST", EncryptedRoute::new(true, true)))
        .with_child(RouteNode::param("mkdir").with_method("POST", EncryptedRoute::new(true, true)))
        .with_child(RouteNode::param("download").with_method("GET", EncryptedRoute::new(false, true)))
        .with_child(RouteNode::param("list").with_method("GET", EncryptedRoute::new(false, true)))
        .with_child(RouteNode::param("delete").with_method("DELETE", EncryptedRoute::new(false, false)))
        .with_child(RouteNode::param("rename").with_method("POST", EncryptedRoute::new(false, false)))
        .with_child(
            RouteNode::leaf("check")
                .with_child(RouteNode::param("path").with_method("HEAD", EncryptedRoute::new(false, false).bearer_only())),
        );

    let users = RouteNode::leaf("users")
        .with_child(RouteNode::param("add").with_method("POST", EncryptedRoute::new(false, false).no_auth()))
        .with_child(RouteNode::param("vault").with_method("GET", EncryptedRoute::new(false, true)));

    // The debug-only `/api/auth/token` route has no real-world counterpart:
    // the genuine flow issues its token inline at the end of the SRP auth
    // channel (already holding the master key on both ends), never through
    // this REST route or its encryption middleware, so there's no session
    // key a debug caller could use to decrypt an encrypted response to the
    // very request that creates that key. It passes through unencrypted.
    let auth = RouteNode::leaf("auth").with_child(
        RouteNode::leaf("token").with_method("POST", EncryptedRoute::new(false, false).no_auth()),
    );

    let api = RouteNode::leaf("api").with_child(files).with_child(users).with_child(auth);

    RoutingTree { root: RouteNode::leaf("").with_child(api) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_requires_encryption_both_ways() {
        let tree = default_tree();
        let route = tree.lookup("POST", "/api/files/upload/docs/report.pdf").unwrap();
        assert!(route.encrypted_body);
        assert!(route.encrypted_response);
    }

    #[test]
    fn list_only_encrypts_the_response() {
        let tree = default_tree();
        let route = tree.lookup("GET", "/api/files/list/docs").unwrap();
        assert!(!route.encrypted_body);
        assert!(route.encrypted_response);
    }

    #[test]
    fn delete_requires_no_encryption() {
        let tree = default_tree();
        let route = tree.lookup("DELETE", "/api/files/delete/docs/report.pdf").unwrap();
        assert!(!route.encrypted_body);
        assert!(!route.encrypted_response);
    }

    #[test]
    fn debug_token_route_is_unencrypted_and_unauthenticated() {
        let tree = default_tree();
        let route = tree.lookup("POST", "/api/auth/token").unwrap();
        assert!(!route.encrypted_body);
        assert!(!route.encrypted_response);
        assert_eq!(route.auth, AuthRequirement::None);
    }

    #[test]
    fn check_path_requires_bearer_only() {
        let tree = default_tree();
        let route = tree.lookup("HEAD", "/api/files/check/path/docs/report.pdf").unwrap();
        assert_eq!(route.auth, AuthRequirement::Bearer);
    }

    #[test]
    fn delete_still_requires_bearer_pop_auth() {
        let tree = default_tree();
        let route = tree.lookup("DELETE", "/api/files/delete/docs/report.pdf").unwrap();
        assert_eq!(route.auth, AuthRequirement::BearerPoP);
    }

    #[test]
    fn users_add_requires_no_auth() {
        let tree = default_tree();
        let route = tree.lookup("POST", "/api/users/add/alice").unwrap();
        assert_eq!(route.auth, AuthRequirement::None);
    }

    #[test]
    fn unknown_route_passes_through() {
        let tree = default_tree();
        assert!(tree.lookup("GET", "/api/auth/group-size").is_none());
        assert!(tree.lookup("GET", "/healthz").is_none());
    }

    #[test]
    fn lookup_is_deterministic_across_repeated_calls_and_orderings() {
        let tree = default_tree();
        let first = tree.lookup("GET", "/api/users/vault/alice").map(|r| r.encrypted_response);
        let _ = tree.lookup("POST", "/api/files/upload/x");
        let second = tree.lookup("GET", "/api/users/vault/alice").map(|r| r.encrypted_response);
        assert_eq!(first, second);
    }
}
