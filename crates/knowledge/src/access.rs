//! Tenant and visibility access rules.
//!
//! Every read against a vector database goes through [`access_filter`], so a
//! caller can narrow a query but never widen it past their organization and
//! the documents they are allowed to see.

use crate::filter::Filter;
use crate::types::{Metadata, ASSOCIATED_AGENTS, ORGANIZATION_ID, TIMESTAMP, USER_ID, VISIBILITY};
use pulse_core::Principal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who may read a document besides its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Only the owning user
    Private,
    /// Everyone in the owning organization
    Shared,
    /// Everyone
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Shared => "shared",
            Self::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "private" => Some(Self::Private),
            "shared" => Some(Self::Shared),
            "public" => Some(Self::Public),
            _ => None,
        }
    }

    /// Parse, downgrading anything unrecognised to `Private`.
    pub fn parse_lenient(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| {
            tracing::warn!(visibility = s, "Invalid visibility, defaulting to private");
            Self::Private
        })
    }

    /// Visibility recorded in a metadata map; absent means private.
    pub fn of(metadata: &Metadata) -> Self {
        match metadata.get(VISIBILITY) {
            Some(Value::String(s)) => Self::parse(s).unwrap_or(Self::Private),
            _ => Self::Private,
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys a caller filter may never constrain directly.
const PROTECTED_KEYS: [&str; 2] = [ORGANIZATION_ID, USER_ID];

fn visibility_values(levels: &[Visibility]) -> Vec<Value> {
    levels.iter().map(|v| Value::from(v.as_str())).collect()
}

fn visibility_policy(user_id: &str, visibility: Option<&[Visibility]>) -> Filter {
    let own = Filter::eq(USER_ID, user_id);

    let Some(levels) = visibility else {
        return Filter::Or(vec![
            own,
            Filter::In(
                VISIBILITY.to_string(),
                visibility_values(&[Visibility::Shared, Visibility::Public]),
            ),
        ]);
    };

    let others: Vec<Visibility> = levels
        .iter()
        .copied()
        .filter(|v| *v != Visibility::Private)
        .collect();

    match (levels.contains(&Visibility::Private), others.is_empty()) {
        (true, true) => own,
        (true, false) => Filter::Or(vec![
            own,
            Filter::In(VISIBILITY.to_string(), visibility_values(&others)),
        ]),
        (false, _) => Filter::In(VISIBILITY.to_string(), visibility_values(levels)),
    }
}

/// Security filter for reads by `(organization_id, user_id)`.
///
/// The organization condition is always the first conjunct, followed by the
/// visibility policy and then whatever survives of `extra`. Caller
/// conjuncts touching `organization_id` or `user_id`, and caller `Or`
/// groups, are dropped.
pub fn access_filter(
    organization_id: &str,
    user_id: &str,
    visibility: Option<&[Visibility]>,
    extra: Option<&Filter>,
) -> Filter {
    let mut conjuncts = vec![
        Filter::eq(ORGANIZATION_ID, organization_id),
        visibility_policy(user_id, visibility),
    ];

    if let Some(extra) = extra {
        conjuncts.extend(caller_conjuncts(extra.clone()));
    }

    Filter::And(conjuncts)
}

/// Top-level caller conjuncts that do not touch protected keys.
pub(crate) fn caller_conjuncts(filter: Filter) -> Vec<Filter> {
    filter
        .into_conjuncts()
        .into_iter()
        .filter(|conjunct| {
            let protected = matches!(conjunct, Filter::Or(_))
                || PROTECTED_KEYS.iter().any(|key| conjunct.references(key));
            if protected {
                tracing::debug!(filter = %conjunct.to_json(), "Dropping caller filter on protected key");
            }
            !protected
        })
        .collect()
}

/// Filter for the documents an agent may draw on.
///
/// The caller's access filter, restricted to documents associated with the
/// agent and to every key of the agent's `document_filter`.
pub fn agent_scope_filter(
    organization_id: &str,
    user_id: &str,
    agent_id: &str,
    document_filter: Option<&Metadata>,
) -> Filter {
    let mut filter = access_filter(organization_id, user_id, None, None)
        .and(Filter::eq(ASSOCIATED_AGENTS, agent_id));

    for (key, value) in document_filter.into_iter().flatten() {
        if PROTECTED_KEYS.contains(&key.as_str()) || key == ASSOCIATED_AGENTS {
            continue;
        }
        filter = filter.and(Filter::Eq(key.clone(), value.clone()));
    }

    filter
}

/// Normalize metadata before a write.
///
/// Ownership is forced to the principal, visibility defaults to private and
/// a `timestamp` is added when missing.
pub fn sanitize_metadata(mut metadata: Metadata, organization_id: &str, user_id: &str) -> Metadata {
    metadata.insert(ORGANIZATION_ID.to_string(), Value::from(organization_id));
    metadata.insert(USER_ID.to_string(), Value::from(user_id));

    let visibility = match metadata.get(VISIBILITY) {
        Some(Value::String(s)) => Visibility::parse_lenient(s),
        Some(other) => Visibility::parse_lenient(&other.to_string()),
        None => Visibility::Private,
    };
    metadata.insert(VISIBILITY.to_string(), Value::from(visibility.as_str()));

    if !metadata.contains_key(TIMESTAMP) {
        metadata.insert(
            TIMESTAMP.to_string(),
            Value::from(chrono::Utc::now().to_rfc3339()),
        );
    }

    metadata
}

/// Whether `(organization_id, user_id)` may read a document.
pub fn document_access_check(metadata: &Metadata, organization_id: &str, user_id: &str) -> bool {
    let visibility = Visibility::of(metadata);
    let same_org = metadata.get(ORGANIZATION_ID).and_then(Value::as_str) == Some(organization_id);

    if !same_org {
        return visibility == Visibility::Public;
    }

    metadata.get(USER_ID).and_then(Value::as_str) == Some(user_id)
        || matches!(visibility, Visibility::Shared | Visibility::Public)
}

/// Whether the principal may act on other users' resources.
///
/// No role grants this yet.
pub fn is_admin(_principal: &Principal) -> bool {
    false
}
