// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Installation types for multi-tenant webhook ingestion.
//!
//! An installation is the unit of tenancy: one hosting-platform app install
//! on an organization or user account, scoped to all or some of its
//! repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for an installation.
///
/// Assigned by the hosting platform; never minted locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InstallationId(pub i64);

impl fmt::Display for InstallationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for InstallationId {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(s.parse()?))
	}
}

/// Repository identity in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RepoKey(pub String);

impl RepoKey {
	pub fn new(owner: &str, name: &str) -> Self {
		Self(format!("{owner}/{name}"))
	}

	/// Validate an `owner/name` string.
	pub fn parse(s: &str) -> Result<Self, String> {
		let mut parts = s.splitn(2, '/');
		let owner = parts.next().unwrap_or_default();
		let name = parts.next().unwrap_or_default();
		if owner.is_empty() || name.is_empty() || name.contains('/') {
			return Err(format!("invalid repository key: {}", s));
		}
		if s.chars().any(|c| c.is_whitespace()) {
			return Err(format!("invalid repository key: {}", s));
		}
		Ok(Self(s.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn owner(&self) -> &str {
		self.0.split('/').next().unwrap_or_default()
	}

	pub fn name(&self) -> &str {
		self.0.splitn(2, '/').nth(1).unwrap_or_default()
	}
}

impl fmt::Display for RepoKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for RepoKey {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

/// Kind of account an installation is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
	Organization,
	User,
}

impl fmt::Display for AccountType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Organization => write!(f, "organization"),
			Self::User => write!(f, "user"),
		}
	}
}

impl FromStr for AccountType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		// Hosting platforms capitalize these in payloads.
		match s.to_ascii_lowercase().as_str() {
			"organization" => Ok(Self::Organization),
			"user" => Ok(Self::User),
			_ => Err(format!("unknown account type: {}", s)),
		}
	}
}

/// The account an installation belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AccountRef {
	pub login: String,
	pub account_type: AccountType,
}

impl AccountRef {
	pub fn organization(login: impl Into<String>) -> Self {
		Self {
			login: login.into(),
			account_type: AccountType::Organization,
		}
	}

	pub fn user(login: impl Into<String>) -> Self {
		Self {
			login: login.into(),
			account_type: AccountType::User,
		}
	}
}

/// Permission level granted for a resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
	Read,
	Write,
	Admin,
}

impl fmt::Display for PermissionLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Read => write!(f, "read"),
			Self::Write => write!(f, "write"),
			Self::Admin => write!(f, "admin"),
		}
	}
}

impl FromStr for PermissionLevel {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"read" => Ok(Self::Read),
			"write" => Ok(Self::Write),
			"admin" => Ok(Self::Admin),
			_ => Err(format!("unknown permission level: {}", s)),
		}
	}
}

/// Which repositories of the account the installation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RepositorySelection {
	All,
	Selected,
}

impl fmt::Display for RepositorySelection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::All => write!(f, "all"),
			Self::Selected => write!(f, "selected"),
		}
	}
}

impl FromStr for RepositorySelection {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"all" => Ok(Self::All),
			"selected" => Ok(Self::Selected),
			_ => Err(format!("unknown repository selection: {}", s)),
		}
	}
}

/// Installation lifecycle state.
///
/// `Deleted` is a tombstone: the record is retained for audit and to absorb
/// out-of-order webhook deliveries, but grants no access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum InstallationStatus {
	Active,
	Suspended,
	Deleted,
}

impl fmt::Display for InstallationStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Active => write!(f, "active"),
			Self::Suspended => write!(f, "suspended"),
			Self::Deleted => write!(f, "deleted"),
		}
	}
}

impl FromStr for InstallationStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"active" => Ok(Self::Active),
			"suspended" => Ok(Self::Suspended),
			"deleted" => Ok(Self::Deleted),
			_ => Err(format!("unknown installation status: {}", s)),
		}
	}
}

/// One app installation on one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Installation {
	pub id: InstallationId,
	pub account: AccountRef,

	/// Permission scopes granted by the account, e.g. `contents -> read`.
	pub permissions: BTreeMap<String, PermissionLevel>,
	/// Webhook event names the installation subscribes to.
	pub events: Vec<String>,

	pub repository_selection: RepositorySelection,
	/// Populated only when `repository_selection` is `Selected`.
	pub selected_repositories: BTreeSet<RepoKey>,

	pub status: InstallationStatus,

	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Installation {
	/// New active installation covering all repositories of the account.
	pub fn new(id: InstallationId, account: AccountRef) -> Self {
		let now = Utc::now();
		Self {
			id,
			account,
			permissions: BTreeMap::new(),
			events: Vec::new(),
			repository_selection: RepositorySelection::All,
			selected_repositories: BTreeSet::new(),
			status: InstallationStatus::Active,
			created_at: now,
			updated_at: now,
		}
	}

	pub fn is_active(&self) -> bool {
		self.status == InstallationStatus::Active
	}

	/// Whether this installation grants access to a repository.
	///
	/// Fails closed: anything but an active installation grants nothing.
	pub fn has_repository_access(&self, repo: &RepoKey) -> bool {
		if !self.is_active() {
			return false;
		}
		match self.repository_selection {
			RepositorySelection::All => true,
			RepositorySelection::Selected => self.selected_repositories.contains(repo),
		}
	}

	/// Bump the modification timestamp.
	pub fn touch(&mut self) {
		self.updated_at = Utc::now();
	}
}
