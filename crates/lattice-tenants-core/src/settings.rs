// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-tenant subscription, capability, and compliance settings.
//!
//! Capabilities form a closed enum rather than string-keyed flags so that
//! entitlement checks are exhaustive at compile time. Plans are ordered by
//! entitlement: every capability available on a plan is available on every
//! higher plan.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::TenantsError;

/// Subscription tier. Ordered: `Free < Team < Enterprise`.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
	#[default]
	Free,
	Team,
	Enterprise,
}

impl SubscriptionPlan {
	/// Every capability this plan may enable.
	pub fn entitlements(&self) -> &'static [Capability] {
		match self {
			Self::Free => &[Capability::Traceability],
			Self::Team => &[
				Capability::Traceability,
				Capability::RiskManagement,
				Capability::ComplianceReports,
			],
			Self::Enterprise => &[
				Capability::Traceability,
				Capability::RiskManagement,
				Capability::ComplianceReports,
				Capability::AuditStreaming,
				Capability::PrioritySync,
			],
		}
	}

	pub fn entitles(&self, capability: Capability) -> bool {
		self.entitlements().contains(&capability)
	}
}

impl fmt::Display for SubscriptionPlan {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Free => write!(f, "free"),
			Self::Team => write!(f, "team"),
			Self::Enterprise => write!(f, "enterprise"),
		}
	}
}

impl FromStr for SubscriptionPlan {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"free" => Ok(Self::Free),
			"team" => Ok(Self::Team),
			"enterprise" => Ok(Self::Enterprise),
			_ => Err(format!("unknown subscription plan: {}", s)),
		}
	}
}

/// Product capability a tenant can have enabled.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Capability {
	/// Requirement/test/risk/config-item graph maintenance.
	Traceability,
	/// Risk entities and risk-facing reports.
	RiskManagement,
	/// Compliance report generation.
	ComplianceReports,
	/// Streaming of audit entries to external sinks.
	AuditStreaming,
	/// Preferential scheduling for repository synchronization.
	PrioritySync,
}

impl Capability {
	pub const ALL: [Capability; 5] = [
		Capability::Traceability,
		Capability::RiskManagement,
		Capability::ComplianceReports,
		Capability::AuditStreaming,
		Capability::PrioritySync,
	];
}

impl fmt::Display for Capability {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Traceability => write!(f, "traceability"),
			Self::RiskManagement => write!(f, "risk_management"),
			Self::ComplianceReports => write!(f, "compliance_reports"),
			Self::AuditStreaming => write!(f, "audit_streaming"),
			Self::PrioritySync => write!(f, "priority_sync"),
		}
	}
}

impl FromStr for Capability {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"traceability" => Ok(Self::Traceability),
			"risk_management" => Ok(Self::RiskManagement),
			"compliance_reports" => Ok(Self::ComplianceReports),
			"audit_streaming" => Ok(Self::AuditStreaming),
			"priority_sync" => Ok(Self::PrioritySync),
			_ => Err(format!("unknown capability: {}", s)),
		}
	}
}

/// Depth of the per-project audit trail a tenant receives.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
	#[default]
	Basic,
	Standard,
	Enterprise,
}

impl AuditLevel {
	/// Capability the plan must entitle before this level can be selected.
	pub fn required_capability(&self) -> Option<Capability> {
		match self {
			Self::Basic | Self::Standard => None,
			Self::Enterprise => Some(Capability::AuditStreaming),
		}
	}
}

impl fmt::Display for AuditLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Basic => write!(f, "basic"),
			Self::Standard => write!(f, "standard"),
			Self::Enterprise => write!(f, "enterprise"),
		}
	}
}

impl FromStr for AuditLevel {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"basic" => Ok(Self::Basic),
			"standard" => Ok(Self::Standard),
			"enterprise" => Ok(Self::Enterprise),
			_ => Err(format!("unknown audit level: {}", s)),
		}
	}
}

/// Tenant-level configuration attached to an installation.
///
/// Invariant: `features` is always a subset of `plan.entitlements()`.
/// [`TenantSettings::apply`] validates the post-patch state before mutating,
/// so a rejected patch leaves the settings untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TenantSettings {
	pub plan: SubscriptionPlan,
	pub features: BTreeSet<Capability>,
	/// Compliance standards the tenant tracks against, e.g. `ISO 13485`.
	pub standards: BTreeSet<String>,
	pub audit_level: AuditLevel,
}

impl Default for TenantSettings {
	fn default() -> Self {
		Self::defaults_for(SubscriptionPlan::Free)
	}
}

impl TenantSettings {
	/// Default settings for a plan: all of its entitlements enabled, no
	/// standards, basic audit.
	pub fn defaults_for(plan: SubscriptionPlan) -> Self {
		Self {
			plan,
			features: plan.entitlements().iter().copied().collect(),
			standards: BTreeSet::new(),
			audit_level: AuditLevel::Basic,
		}
	}

	/// Whether a capability is enabled for this tenant.
	///
	/// Checks both the enabled set and the plan entitlement, so a stale
	/// feature set still fails closed.
	pub fn has_feature(&self, capability: Capability) -> bool {
		self.features.contains(&capability) && self.plan.entitles(capability)
	}

	/// Apply a settings patch, validating the resulting state first.
	///
	/// Either every field of the patch lands or none do.
	pub fn apply(&mut self, patch: SettingsPatch) -> Result<(), TenantsError> {
		let plan = patch.plan.unwrap_or(self.plan);

		let mut features = self.features.clone();
		for capability in &patch.disable_features {
			features.remove(capability);
		}
		for capability in &patch.enable_features {
			features.insert(*capability);
		}

		for capability in &features {
			if !plan.entitles(*capability) {
				return Err(TenantsError::FeatureNotEntitled {
					feature: *capability,
					plan,
				});
			}
		}

		let audit_level = patch.audit_level.unwrap_or(self.audit_level);
		if let Some(required) = audit_level.required_capability() {
			if !plan.entitles(required) {
				return Err(TenantsError::AuditLevelNotEntitled { audit_level, plan });
			}
		}

		let standards = match patch.standards {
			Some(standards) => {
				for standard in &standards {
					if standard.trim().is_empty() {
						return Err(TenantsError::Validation(
							"compliance standard must not be blank".to_string(),
						));
					}
				}
				standards
			}
			None => self.standards.clone(),
		};

		self.plan = plan;
		self.features = features;
		self.standards = standards;
		self.audit_level = audit_level;
		Ok(())
	}
}

/// Partial update to [`TenantSettings`]. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SettingsPatch {
	pub plan: Option<SubscriptionPlan>,
	#[serde(default)]
	pub enable_features: Vec<Capability>,
	#[serde(default)]
	pub disable_features: Vec<Capability>,
	pub standards: Option<BTreeSet<String>>,
	pub audit_level: Option<AuditLevel>,
}

impl SettingsPatch {
	pub fn plan(plan: SubscriptionPlan) -> Self {
		Self {
			plan: Some(plan),
			..Default::default()
		}
	}

	pub fn enable(capability: Capability) -> Self {
		Self {
			enable_features: vec![capability],
			..Default::default()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	mod plan {
		use super::*;

		#[test]
		fn test_ordering() {
			assert!(SubscriptionPlan::Free < SubscriptionPlan::Team);
			assert!(SubscriptionPlan::Team < SubscriptionPlan::Enterprise);
		}

		#[test]
		fn test_free_entitles_traceability_only() {
			assert!(SubscriptionPlan::Free.entitles(Capability::Traceability));
			assert!(!SubscriptionPlan::Free.entitles(Capability::RiskManagement));
			assert!(!SubscriptionPlan::Free.entitles(Capability::AuditStreaming));
		}

		#[test]
		fn test_enterprise_entitles_everything() {
			for capability in Capability::ALL {
				assert!(SubscriptionPlan::Enterprise.entitles(capability));
			}
		}

		#[test]
		fn test_display_fromstr_roundtrip() {
			for plan in [
				SubscriptionPlan::Free,
				SubscriptionPlan::Team,
				SubscriptionPlan::Enterprise,
			] {
				let parsed: SubscriptionPlan = plan.to_string().parse().unwrap();
				assert_eq!(parsed, plan);
			}
		}
	}

	mod defaults {
		use super::*;

		#[test]
		fn test_default_is_free_plan() {
			let settings = TenantSettings::default();
			assert_eq!(settings.plan, SubscriptionPlan::Free);
			assert_eq!(settings.audit_level, AuditLevel::Basic);
			assert!(settings.standards.is_empty());
			assert!(settings.has_feature(Capability::Traceability));
			assert!(!settings.has_feature(Capability::RiskManagement));
		}

		#[test]
		fn test_defaults_for_team_enables_team_set() {
			let settings = TenantSettings::defaults_for(SubscriptionPlan::Team);
			assert!(settings.has_feature(Capability::ComplianceReports));
			assert!(!settings.has_feature(Capability::PrioritySync));
		}
	}

	mod apply {
		use super::*;

		#[test]
		fn test_upgrade_plan_keeps_features() {
			let mut settings = TenantSettings::default();
			settings
				.apply(SettingsPatch::plan(SubscriptionPlan::Team))
				.unwrap();
			assert_eq!(settings.plan, SubscriptionPlan::Team);
			// Upgrades do not auto-enable new capabilities.
			assert!(!settings.has_feature(Capability::RiskManagement));
			assert!(settings.has_feature(Capability::Traceability));
		}

		#[test]
		fn test_enable_within_entitlement() {
			let mut settings = TenantSettings::defaults_for(SubscriptionPlan::Team);
			settings.features.remove(&Capability::RiskManagement);
			settings
				.apply(SettingsPatch::enable(Capability::RiskManagement))
				.unwrap();
			assert!(settings.has_feature(Capability::RiskManagement));
		}

		#[test]
		fn test_enable_beyond_entitlement_rejected() {
			let mut settings = TenantSettings::default();
			let err = settings
				.apply(SettingsPatch::enable(Capability::AuditStreaming))
				.unwrap_err();
			assert!(matches!(
				err,
				TenantsError::FeatureNotEntitled {
					feature: Capability::AuditStreaming,
					plan: SubscriptionPlan::Free,
				}
			));
			// Nothing was applied.
			assert!(!settings.features.contains(&Capability::AuditStreaming));
		}

		#[test]
		fn test_downgrade_with_excess_features_rejected() {
			let mut settings = TenantSettings::defaults_for(SubscriptionPlan::Enterprise);
			let err = settings
				.apply(SettingsPatch::plan(SubscriptionPlan::Free))
				.unwrap_err();
			assert!(matches!(err, TenantsError::FeatureNotEntitled { .. }));
			assert_eq!(settings.plan, SubscriptionPlan::Enterprise);
		}

		#[test]
		fn test_downgrade_with_simultaneous_disable() {
			let mut settings = TenantSettings::defaults_for(SubscriptionPlan::Team);
			let patch = SettingsPatch {
				plan: Some(SubscriptionPlan::Free),
				disable_features: vec![Capability::RiskManagement, Capability::ComplianceReports],
				..Default::default()
			};
			settings.apply(patch).unwrap();
			assert_eq!(settings.plan, SubscriptionPlan::Free);
			assert!(settings.has_feature(Capability::Traceability));
		}

		#[test]
		fn test_enterprise_audit_level_needs_entitlement() {
			let mut settings = TenantSettings::defaults_for(SubscriptionPlan::Team);
			let patch = SettingsPatch {
				audit_level: Some(AuditLevel::Enterprise),
				..Default::default()
			};
			let err = settings.apply(patch).unwrap_err();
			assert!(matches!(err, TenantsError::AuditLevelNotEntitled { .. }));
			assert_eq!(settings.audit_level, AuditLevel::Basic);
		}

		#[test]
		fn test_enterprise_audit_level_on_enterprise_plan() {
			let mut settings = TenantSettings::defaults_for(SubscriptionPlan::Enterprise);
			let patch = SettingsPatch {
				audit_level: Some(AuditLevel::Enterprise),
				..Default::default()
			};
			settings.apply(patch).unwrap();
			assert_eq!(settings.audit_level, AuditLevel::Enterprise);
		}

		#[test]
		fn test_blank_standard_rejected() {
			let mut settings = TenantSettings::default();
			let patch = SettingsPatch {
				standards: Some(BTreeSet::from(["  ".to_string()])),
				..Default::default()
			};
			let err = settings.apply(patch).unwrap_err();
			assert!(matches!(err, TenantsError::Validation(_)));
			assert!(settings.standards.is_empty());
		}

		#[test]
		fn test_standards_replace_wholesale() {
			let mut settings = TenantSettings::default();
			let patch = SettingsPatch {
				standards: Some(BTreeSet::from([
					"ISO 13485".to_string(),
					"IEC 62304".to_string(),
				])),
				..Default::default()
			};
			settings.apply(patch).unwrap();
			assert_eq!(settings.standards.len(), 2);

			let patch = SettingsPatch {
				standards: Some(BTreeSet::from(["ISO 14971".to_string()])),
				..Default::default()
			};
			settings.apply(patch).unwrap();
			assert_eq!(settings.standards.len(), 1);
			assert!(settings.standards.contains("ISO 14971"));
		}

		#[test]
		fn test_rejected_patch_is_fully_discarded() {
			let mut settings = TenantSettings::defaults_for(SubscriptionPlan::Team);
			let before = settings.clone();
			let patch = SettingsPatch {
				standards: Some(BTreeSet::from(["ISO 27001".to_string()])),
				enable_features: vec![Capability::PrioritySync],
				..Default::default()
			};
			assert!(settings.apply(patch).is_err());
			assert_eq!(settings, before);
		}
	}
}
