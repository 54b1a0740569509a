//! Existence prober
//!
//! Lists the full collection of a resource kind and looks for an exact name
//! match. There is no caching and no pagination handling: every probe is a
//! fresh snapshot, and a truncated listing reads as absence.

use crate::error::{DeployError, Result};
use crate::kubectl::{Kubectl, ResourceKind};
use serde::Deserialize;
use tracing::{debug, info, instrument};

/// Outcome of an existence probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Exists,
    Absent,
}

impl Presence {
    pub fn exists(&self) -> bool {
        matches!(self, Presence::Exists)
    }
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    metadata: ItemMetadata,
}

#[derive(Debug, Deserialize)]
struct ItemMetadata {
    name: String,
}

/// Decide presence from a JSON collection listing
pub fn presence_in_listing(listing: &str, name: &str) -> serde_json::Result<Presence> {
    let list: ObjectList = serde_json::from_str(listing)?;
    Ok(if list.items.iter().any(|item| item.metadata.name == name) {
        Presence::Exists
    } else {
        Presence::Absent
    })
}

/// Queries the control plane for named resources
#[derive(Debug, Clone)]
pub struct ExistenceProber {
    kubectl: Kubectl,
}

impl ExistenceProber {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }

    /// Probe for a resource of `kind` named `name`
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn probe(&self, kind: ResourceKind, name: &str) -> Result<Presence> {
        debug!("Checking if {} exists", kind);

        let listing = self
            .kubectl
            .list(kind)
            .await
            .map_err(|source| DeployError::Query {
                resource: kind.collection().into(),
                source,
            })?;

        let presence =
            presence_in_listing(&listing, name).map_err(|source| DeployError::Parse {
                resource: kind.collection().into(),
                source,
            })?;

        match presence {
            Presence::Exists => info!("Found target {}", kind),
            Presence::Absent => info!("Target {} is missing", kind),
        }

        Ok(presence)
    }
}
