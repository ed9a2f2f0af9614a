//! Caller identity
//!
//! Authentication happens outside the engine. Services receive an already
//! resolved [`Caller`] and only check ownership at their boundary.
//!
//! # Example
//!
//! ```rust
//! use blueprint_engine::auth::Caller;
//!
//! let caller = Caller::new(7).with_organizations([3]);
//! assert!(caller.can_access(7, None));
//! assert!(caller.can_access(1, Some(3)));
//! assert!(!caller.can_access(1, Some(4)));
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::store::Id;

/// Resolved identity of the user behind a request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Caller {
    pub id: Id,
    /// Administrators can access every blueprint and job
    #[serde(default)]
    pub is_admin: bool,
    /// Organizations the caller is a member of
    #[serde(default)]
    pub organization_ids: BTreeSet<Id>,
}

impl Caller {
    pub fn new(id: Id) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn admin(id: Id) -> Self {
        Self {
            id,
            is_admin: true,
            ..Self::default()
        }
    }

    pub fn with_organizations(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.organization_ids.extend(ids);
        self
    }

    pub fn is_member_of(&self, organization_id: Id) -> bool {
        self.organization_ids.contains(&organization_id)
    }

    /// Admin, owner or member of the owning organization
    pub fn can_access(&self, owner_id: Id, organization_id: Option<Id>) -> bool {
        self.is_admin
            || self.id == owner_id
            || organization_id.is_some_and(|org| self.is_member_of(org))
    }
}
