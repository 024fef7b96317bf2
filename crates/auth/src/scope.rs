//! Scope resolution engine.
//!
//! Pure and side-effect-free: the same checks authorize token issuance,
//! refresh against the identity's current policies, and direct access checks.

use serde::{Deserialize, Serialize};

use warden_core::Namespace;

use crate::Policy;

/// A `(namespace, resources, actions)` tuple being requested or granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub namespace: Namespace,
    pub resources: Vec<String>,
    pub actions: Vec<String>,
    #[serde(default)]
    pub namespace_independent: bool,
}

impl Scope {
    pub fn new<R, A, S1, S2>(namespace: Namespace, resources: R, actions: A) -> Self
    where
        R: IntoIterator<Item = S1>,
        A: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            namespace,
            resources: resources.into_iter().map(Into::into).collect(),
            actions: actions.into_iter().map(Into::into).collect(),
            namespace_independent: false,
        }
    }
}

impl From<&Policy> for Scope {
    fn from(policy: &Policy) -> Self {
        Self {
            namespace: policy.namespace.clone(),
            resources: policy.resources.clone(),
            actions: policy.actions.clone(),
            namespace_independent: policy.namespace_independent,
        }
    }
}

/// Anything that grants resource/action pairs within a namespace.
///
/// Implemented by stored [`Policy`] records and by the [`Scope`]s frozen
/// into a token.
pub trait Grant {
    fn grant_namespace(&self) -> &Namespace;
    fn grant_resources(&self) -> &[String];
    fn grant_actions(&self) -> &[String];
    fn grant_namespace_independent(&self) -> bool;
}

impl Grant for Policy {
    fn grant_namespace(&self) -> &Namespace {
        &self.namespace
    }
    fn grant_resources(&self) -> &[String] {
        &self.resources
    }
    fn grant_actions(&self) -> &[String] {
        &self.actions
    }
    fn grant_namespace_independent(&self) -> bool {
        self.namespace_independent
    }
}

impl Grant for Scope {
    fn grant_namespace(&self) -> &Namespace {
        &self.namespace
    }
    fn grant_resources(&self) -> &[String] {
        &self.resources
    }
    fn grant_actions(&self) -> &[String] {
        &self.actions
    }
    fn grant_namespace_independent(&self) -> bool {
        self.namespace_independent
    }
}

/// Wildcard coverage of a single entry.
///
/// A non-wildcard grant never implies a wildcard request.
pub fn covers(have: &str, want: &str) -> bool {
    match (have.strip_suffix('*'), want.ends_with('*')) {
        (None, true) => false,
        (None, false) => have == want,
        (Some(prefix), _) => want.starts_with(prefix),
    }
}

/// Every element of `want` is covered by at least one element of `have`.
pub fn covers_all<H, W>(have: &[H], want: &[W]) -> bool
where
    H: AsRef<str>,
    W: AsRef<str>,
{
    want.iter()
        .all(|w| have.iter().any(|h| covers(h.as_ref(), w.as_ref())))
}

/// Does `grant` satisfy `scope` on its own?
pub fn grant_satisfies<G: Grant + ?Sized>(grant: &G, scope: &Scope) -> bool {
    let namespace_ok = if scope.namespace_independent {
        grant.grant_namespace_independent()
    } else {
        grant.grant_namespace_independent() || grant.grant_namespace() == &scope.namespace
    };
    namespace_ok
        && covers_all(grant.grant_resources(), &scope.resources)
        && covers_all(grant.grant_actions(), &scope.actions)
}

/// AND across requested scopes, OR across candidate grants.
pub fn policies_allow<G: Grant>(grants: &[G], requested: &[Scope]) -> bool {
    requested
        .iter()
        .all(|scope| grants.iter().any(|g| grant_satisfies(g, scope)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Access Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Why a set of requested scopes was (or would be) granted or denied.
#[derive(Debug, Clone, Serialize)]
pub struct AccessExplanation {
    pub granted: bool,
    pub reason: String,
    pub scopes: Vec<ScopeDecision>,
}

/// Decision for one requested scope.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeDecision {
    pub scope: Scope,
    pub granted: bool,
    /// Index (into the grant list) of the first grant that satisfied the scope.
    pub granted_by: Option<usize>,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    /// No grant applies to the scope's namespace.
    NamespaceMismatch,
    /// Some grant applies to the namespace but none covers the resources.
    MissingResource,
    /// Some grant covers the resources but none covers the actions.
    MissingAction,
}

/// Explain a [`policies_allow`] decision scope by scope.
pub fn explain_scopes<G: Grant>(grants: &[G], requested: &[Scope]) -> AccessExplanation {
    let decisions: Vec<ScopeDecision> = requested
        .iter()
        .map(|scope| explain_one(grants, scope))
        .collect();

    let denied = decisions.iter().filter(|d| !d.granted).count();
    let granted = denied == 0;
    let reason = if granted {
        format!("All {} requested scope(s) are covered", decisions.len())
    } else {
        format!(
            "{denied} of {} requested scope(s) are not covered by any of {} grant(s)",
            decisions.len(),
            grants.len()
        )
    };

    AccessExplanation {
        granted,
        reason,
        scopes: decisions,
    }
}

fn explain_one<G: Grant>(grants: &[G], scope: &Scope) -> ScopeDecision {
    if let Some(idx) = grants.iter().position(|g| grant_satisfies(g, scope)) {
        return ScopeDecision {
            scope: scope.clone(),
            granted: true,
            granted_by: Some(idx),
            denial_reason: None,
        };
    }

    let in_namespace: Vec<&G> = grants
        .iter()
        .filter(|g| {
            g.grant_namespace_independent()
                || (!scope.namespace_independent && g.grant_namespace() == &scope.namespace)
        })
        .collect();

    let denial = if in_namespace.is_empty() {
        DenialReason {
            kind: DenialKind::NamespaceMismatch,
            message: format!("No grant applies to namespace '{}'", scope.namespace),
        }
    } else if !in_namespace
        .iter()
        .any(|g| covers_all(g.grant_resources(), &scope.resources))
    {
        DenialReason {
            kind: DenialKind::MissingResource,
            message: format!("No grant covers resources {:?}", scope.resources),
        }
    } else {
        DenialReason {
            kind: DenialKind::MissingAction,
            message: format!(
                "Grants covering resources {:?} do not cover actions {:?}",
                scope.resources, scope.actions
            ),
        }
    };

    ScopeDecision {
        scope: scope.clone(),
        granted: false,
        granted_by: None,
        denial_reason: Some(denial),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use warden_core::BuiltInKind;

    use super::*;

    fn ns(s: &str) -> Namespace {
        Namespace::new(s)
    }

    fn orders_policy() -> Policy {
        Policy::new(ns("acme"), "orders", Utc::now())
            .with_resources(["order.*"])
            .with_actions(["read", "write"])
    }

    #[test]
    fn covers_basics() {
        assert!(covers("order.read", "order.read"));
        assert!(!covers("order.read", "order.write"));
        assert!(covers("a.*", "a.read"));
        assert!(covers("a.*", "a.*"));
        assert!(covers("a.*", "a.b.*"));
        assert!(!covers("a.*", "b.read"));
        assert!(!covers("a.read", "a.*"));
        assert!(covers("*", "anything.at.all"));
        assert!(covers("*", "*"));
    }

    #[test]
    fn covers_all_requires_every_wanted_entry() {
        assert!(covers_all(&["a.*"], &["a.read", "a.write"]));
        assert!(!covers_all(&["a.read"], &["a.*"]));
        assert!(!covers_all(&["a.read"], &["a.read", "a.write"]));
        assert!(covers_all::<&str, &str>(&[], &[]));
    }

    #[test]
    fn order_scenario() {
        let policies = vec![orders_policy()];
        let granted = Scope::new(ns("acme"), ["order.123"], ["read"]);
        let denied = Scope::new(ns("acme"), ["invoice.1"], ["read"]);

        assert!(policies_allow(&policies, &[granted.clone()]));
        assert!(!policies_allow(&policies, &[denied.clone()]));
        assert!(!policies_allow(&policies, &[granted, denied]));
    }

    #[test]
    fn resource_and_action_must_be_covered_by_the_same_grant() {
        let read_orders = Policy::new(ns("acme"), "r", Utc::now())
            .with_resources(["order.*"])
            .with_actions(["read"]);
        let write_invoices = Policy::new(ns("acme"), "w", Utc::now())
            .with_resources(["invoice.*"])
            .with_actions(["write"]);
        let policies = vec![read_orders, write_invoices];

        let scope = Scope::new(ns("acme"), ["order.1"], ["write"]);
        assert!(!policies_allow(&policies, &[scope]));
    }

    #[test]
    fn namespace_must_match_unless_independent() {
        let policies = vec![orders_policy()];
        let other = Scope::new(ns("globex"), ["order.1"], ["read"]);
        assert!(!policies_allow(&policies, &[other.clone()]));

        let global_root = Policy::built_in(Namespace::global(), BuiltInKind::GlobalRoot, Utc::now());
        assert!(policies_allow(&[global_root], &[other]));
    }

    #[test]
    fn independent_scope_needs_independent_grant() {
        let ns_root = Policy::built_in(ns("acme"), BuiltInKind::NamespaceRoot, Utc::now());
        let mut scope = Scope::new(ns("acme"), ["order.1"], ["read"]);
        scope.namespace_independent = true;
        assert!(!policies_allow(&[ns_root], &[scope.clone()]));

        let global_root = Policy::built_in(Namespace::global(), BuiltInKind::GlobalRoot, Utc::now());
        assert!(policies_allow(&[global_root], &[scope]));
    }

    #[test]
    fn scopes_from_policies_grant_the_same_thing() {
        let policy = orders_policy();
        let scopes = vec![Scope::from(&policy)];
        let want = Scope::new(ns("acme"), ["order.9"], ["write"]);
        assert!(policies_allow(&scopes, &[want]));
    }

    #[test]
    fn empty_policy_grants_nothing() {
        let empty = Policy::built_in(ns("acme"), BuiltInKind::Empty, Utc::now());
        let scope = Scope::new(ns("acme"), ["order.1"], ["read"]);
        assert!(!policies_allow(&[empty], &[scope]));
    }

    #[test]
    fn explain_reports_grant_index_and_denial_kind() {
        let policies = vec![
            Policy::built_in(ns("acme"), BuiltInKind::Empty, Utc::now()),
            orders_policy(),
        ];
        let explanation = explain_scopes(
            &policies,
            &[
                Scope::new(ns("acme"), ["order.1"], ["read"]),
                Scope::new(ns("acme"), ["invoice.1"], ["read"]),
                Scope::new(ns("acme"), ["order.1"], ["delete"]),
                Scope::new(ns("globex"), ["order.1"], ["read"]),
            ],
        );

        assert!(!explanation.granted);
        assert_eq!(explanation.scopes[0].granted_by, Some(1));
        let kinds: Vec<Option<DenialKind>> = explanation
            .scopes
            .iter()
            .map(|d| d.denial_reason.as_ref().map(|r| r.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                None,
                Some(DenialKind::MissingResource),
                Some(DenialKind::MissingAction),
                Some(DenialKind::NamespaceMismatch),
            ]
        );
    }

    #[test]
    fn explain_agrees_with_policies_allow_when_granted() {
        let policies = vec![orders_policy()];
        let requested = vec![Scope::new(ns("acme"), ["order.1"], ["read", "write"])];
        let explanation = explain_scopes(&policies, &requested);
        assert!(explanation.granted);
        assert_eq!(explanation.granted, policies_allow(&policies, &requested));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn entry() -> impl Strategy<Value = String> {
            "[a-c]{1,3}(\\.[a-c]{1,3}){0,2}\\*?"
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: every entry covers itself.
            #[test]
            fn covers_is_reflexive(x in entry()) {
                prop_assert!(covers(&x, &x));
            }

            /// Property: a non-wildcard grant never covers a wildcard request.
            #[test]
            fn specific_never_covers_wildcard(have in "[a-c.]{0,6}", want in "[a-c.]{0,6}") {
                let want = format!("{want}*");
                prop_assert!(!covers(&have, &want));
            }

            /// Property: a wildcard covers exactly the strings extending its prefix.
            #[test]
            fn wildcard_is_prefix_match(prefix in "[a-c.]{0,4}", want in "[a-c.]{0,8}") {
                let have = format!("{prefix}*");
                prop_assert_eq!(covers(&have, &want), want.starts_with(&prefix));
            }

            /// Property: coverage is transitive.
            #[test]
            fn covers_is_transitive(a in entry(), b in entry(), c in entry()) {
                if covers(&a, &b) && covers(&b, &c) {
                    prop_assert!(covers(&a, &c));
                }
            }

            /// Property: explanation and decision never disagree.
            #[test]
            fn explain_matches_decision(
                have in proptest::collection::vec(entry(), 0..4),
                want in proptest::collection::vec(entry(), 1..4),
            ) {
                let policy = Policy::new(Namespace::new("acme"), "p", Utc::now())
                    .with_resources(have.clone())
                    .with_actions(["*"]);
                let scope = Scope::new(Namespace::new("acme"), want, ["read"]);
                let policies = vec![policy];
                let requested = vec![scope];
                prop_assert_eq!(
                    explain_scopes(&policies, &requested).granted,
                    policies_allow(&policies, &requested)
                );
            }
        }
    }
}
