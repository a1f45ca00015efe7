// src/transaction/mod.rs

//! Pending transaction model
//!
//! The engine describes a transaction as a flat list of members. Each member
//! carries a terse state code plus relations to other members: `updates` and
//! `obsoletes` point backwards to what the member replaces, `replaced_by`
//! points forward from a replaced member to its replacement.
//!
//! Relations are plain `PackageRef` keys. `Transaction` owns the members in an
//! arena and resolves keys through an index, so no member ever borrows another.

pub mod recap;

pub use recap::{recap, Category, DependencyPolicy, RecapEntry, RecapPolicy, RecapReport};

use crate::package::PackageRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Role of a member in the pending transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemberState {
    /// Fresh install ("i")
    NewInstall,
    /// New half of an update, or an install pulled into an update ("u")
    Update,
    /// Old half of an update ("ud")
    UpdateReplaced,
    /// New half of an obsoletion ("o")
    Obsoleting,
    /// Old half of an obsoletion ("od")
    ObsoleteReplaced,
    /// Removal ("e")
    Erase,
    /// A code this crate does not know; rejected by the recap
    Unrecognized(String),
}

impl MemberState {
    /// Map an engine state code to a state
    pub fn from_code(code: &str) -> Self {
        match code {
            "i" => Self::NewInstall,
            "u" => Self::Update,
            "ud" => Self::UpdateReplaced,
            "o" => Self::Obsoleting,
            "od" => Self::ObsoleteReplaced,
            "e" => Self::Erase,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// The engine state code
    pub fn code(&self) -> &str {
        match self {
            Self::NewInstall => "i",
            Self::Update => "u",
            Self::UpdateReplaced => "ud",
            Self::Obsoleting => "o",
            Self::ObsoleteReplaced => "od",
            Self::Erase => "e",
            Self::Unrecognized(code) => code,
        }
    }

    /// True for the old half of an update or obsoletion
    pub fn is_replaced(&self) -> bool {
        matches!(self, Self::UpdateReplaced | Self::ObsoleteReplaced)
    }
}

impl From<String> for MemberState {
    fn from(code: String) -> Self {
        Self::from_code(&code)
    }
}

impl From<MemberState> for String {
    fn from(state: MemberState) -> Self {
        state.code().to_string()
    }
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One package's participation in a pending transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMember {
    pub package: PackageRef,
    pub state: MemberState,
    /// Pulled in by the engine rather than requested
    #[serde(default)]
    pub is_dependency: bool,
    /// Packages this member replaces through an update
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<PackageRef>,
    /// Packages this member replaces through an obsoletion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obsoletes: Vec<PackageRef>,
    /// Members replacing this one (replaced states only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replaced_by: Vec<PackageRef>,
}

impl TransactionMember {
    pub fn new(package: PackageRef, state: MemberState) -> Self {
        Self {
            package,
            state,
            is_dependency: false,
            updates: Vec::new(),
            obsoletes: Vec::new(),
            replaced_by: Vec::new(),
        }
    }

    /// Mark as pulled in as a dependency
    pub fn as_dependency(mut self) -> Self {
        self.is_dependency = true;
        self
    }

    pub fn with_update_of(mut self, old: PackageRef) -> Self {
        self.updates.push(old);
        self
    }

    pub fn with_obsoletion_of(mut self, old: PackageRef) -> Self {
        self.obsoletes.push(old);
        self
    }

    pub fn with_replaced_by(mut self, new: PackageRef) -> Self {
        self.replaced_by.push(new);
        self
    }
}

/// Index of a member inside a `Transaction`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberId(usize);

/// The engine's pending transaction: members plus a lookup index
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    members: Vec<TransactionMember>,
    index: HashMap<PackageRef, MemberId>,
}

impl Transaction {
    pub fn new(members: Vec<TransactionMember>) -> Self {
        let mut index = HashMap::with_capacity(members.len());
        for (i, member) in members.iter().enumerate() {
            index.entry(member.package.clone()).or_insert(MemberId(i));
        }
        Self { members, index }
    }

    pub fn members(&self) -> &[TransactionMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Resolve a relation key to the member it names
    pub fn find(&self, package: &PackageRef) -> Option<MemberId> {
        self.index.get(package).copied()
    }

    pub fn get(&self, id: MemberId) -> Option<&TransactionMember> {
        self.members.get(id.0)
    }

    pub fn into_members(self) -> Vec<TransactionMember> {
        self.members
    }
}

impl From<Vec<TransactionMember>> for Transaction {
    fn from(members: Vec<TransactionMember>) -> Self {
        Self::new(members)
    }
}
