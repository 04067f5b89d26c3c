//! Three-way classification of one resource.

use std::fmt;

use triad_core::{ContentSource, ProgressMonitor, Resource, SyncToken, TokenPolicy};

use crate::compare::ComparisonCriteria;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Addition,
    Deletion,
    Change,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Addition => write!(f, "addition"),
            ChangeType::Deletion => write!(f, "deletion"),
            ChangeType::Change => write!(f, "change"),
        }
    }
}

/// Direction and nature of a difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    InSync,
    /// Remote changed, local did not.
    Incoming(ChangeType),
    /// Local changed, remote did not.
    Outgoing(ChangeType),
    /// Both changed. A pseudo conflict is one where both sides ended up equal.
    Conflicting { change: ChangeType, pseudo: bool },
}

impl SyncKind {
    pub fn is_in_sync(&self) -> bool {
        matches!(self, SyncKind::InSync)
    }

    pub fn change(&self) -> Option<ChangeType> {
        match self {
            SyncKind::InSync => None,
            SyncKind::Incoming(change) | SyncKind::Outgoing(change) => Some(*change),
            SyncKind::Conflicting { change, .. } => Some(*change),
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncKind::InSync => write!(f, "in-sync"),
            SyncKind::Incoming(change) => write!(f, "incoming {change}"),
            SyncKind::Outgoing(change) => write!(f, "outgoing {change}"),
            SyncKind::Conflicting { change, pseudo: false } => write!(f, "conflicting {change}"),
            SyncKind::Conflicting { change, pseudo: true } => {
                write!(f, "conflicting {change} (pseudo)")
            }
        }
    }
}

/// Computed classification plus the tokens it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncInfo {
    pub resource: Resource,
    pub kind: SyncKind,
    pub base: Option<SyncToken>,
    pub remote: Option<SyncToken>,
}

impl SyncInfo {
    pub fn in_sync(resource: Resource) -> Self {
        Self {
            resource,
            kind: SyncKind::InSync,
            base: None,
            remote: None,
        }
    }
}

/// One side of the comparison: its token plus a way to read its content.
pub struct Side<'a> {
    pub token: SyncToken,
    pub content: &'a dyn ContentSource,
}

/// Inputs for [`classify`].
pub struct ThreeWay<'a> {
    pub resource: &'a Resource,
    /// `None` when the resource does not exist locally (phantoms included).
    pub local: Option<&'a dyn ContentSource>,
    pub base: Option<Side<'a>>,
    pub remote: Option<Side<'a>>,
}

/// Classify `input`.
///
/// Local is compared to base with `base_criteria` and to remote with
/// `remote_criteria`; base and remote are compared by revision only.
/// Containers compare by existence.
pub fn classify(
    input: ThreeWay<'_>,
    policy: &dyn TokenPolicy,
    base_criteria: &dyn ComparisonCriteria,
    remote_criteria: &dyn ComparisonCriteria,
    monitor: &mut dyn ProgressMonitor,
) -> SyncInfo {
    let ThreeWay {
        resource,
        local,
        base,
        remote,
    } = input;
    let container = resource.is_container();
    let mut same = |criteria: &dyn ComparisonCriteria, other: &Side<'_>| match local {
        Some(local) if !container => criteria.compare(local, other.content, monitor),
        _ => true,
    };

    use ChangeType::*;
    let kind = match (&base, &remote, local.is_some()) {
        (None, None, false) => SyncKind::InSync,
        (None, None, true) => SyncKind::Outgoing(Addition),
        (None, Some(_), false) => SyncKind::Incoming(Addition),
        (None, Some(remote), true) => SyncKind::Conflicting {
            change: Addition,
            pseudo: same(remote_criteria, remote),
        },
        (Some(_), None, false) => SyncKind::Conflicting {
            change: Deletion,
            pseudo: true,
        },
        (Some(base), Some(remote), false) => {
            if policy.revision_eq(&base.token, &remote.token) {
                SyncKind::Outgoing(Deletion)
            } else {
                SyncKind::Conflicting {
                    change: Change,
                    pseudo: false,
                }
            }
        }
        (Some(base), None, true) => {
            if same(base_criteria, base) {
                SyncKind::Incoming(Deletion)
            } else {
                SyncKind::Conflicting {
                    change: Change,
                    pseudo: false,
                }
            }
        }
        (Some(base), Some(remote), true) => {
            let unmodified = same(base_criteria, base);
            if policy.revision_eq(&base.token, &remote.token) {
                if unmodified {
                    SyncKind::InSync
                } else {
                    SyncKind::Outgoing(Change)
                }
            } else if unmodified {
                SyncKind::Incoming(Change)
            } else {
                SyncKind::Conflicting {
                    change: Change,
                    pseudo: same(remote_criteria, remote),
                }
            }
        }
    };

    SyncInfo {
        resource: resource.clone(),
        kind,
        base: base.map(|side| side.token),
        remote: remote.map(|side| side.token),
    }
}
