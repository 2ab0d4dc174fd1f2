//! Compatibility pre-validation of a batch selection.
//!
//! Runs before any network call. Hard errors block the batch; soft warnings
//! must be acknowledged by the user before it may start.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::batch::job::{BatchKind, TargetDescriptor};

/// Special ad category value that means "no special category".
const NO_SPECIAL_CATEGORY: &str = "NONE";

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Already-fetched metadata for a campaign referenced by the selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignMeta {
    pub campaign_id: String,
    pub account_id: String,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub special_ad_categories: Vec<String>,
}

impl CampaignMeta {
    /// Categories with the `NONE` sentinel removed, normalized to upper case.
    fn normalized_categories(&self) -> BTreeSet<String> {
        self.special_ad_categories
            .iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty() && c != NO_SPECIAL_CATEGORY)
            .collect()
    }
}

/// Compatibility facts derived from the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityConstraint {
    pub single_account: bool,
    pub single_objective: bool,
    pub special_category_consistent: bool,
}

/// Conditions that block the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    /// Nothing was selected.
    EmptySelection,
    /// Targets span several ad accounts for a kind that needs one.
    MultipleAccounts {
        accounts: Vec<String>,
    },
    MissingCampaignId {
        target: String,
    },
    MissingAdSetId {
        target: String,
    },
}

impl ValidationError {
    pub fn message(&self) -> String {
        match self {
            ValidationError::EmptySelection => "Select at least one target".to_string(),
            ValidationError::MultipleAccounts { accounts } => format!(
                "All selected targets must belong to the same ad account (found {})",
                accounts.len()
            ),
            ValidationError::MissingCampaignId { target } => {
                format!("{} has no campaign to apply the operation to", target)
            }
            ValidationError::MissingAdSetId { target } => {
                format!("{} has no ad set to apply the operation to", target)
            }
        }
    }
}

/// Conditions the platform may reject, shown to the user for confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationWarning {
    /// Parent campaigns have different objectives.
    MixedObjectives { objectives: Vec<String> },
    /// Parent campaigns disagree on special ad categories.
    MixedSpecialCategories,
}

impl ValidationWarning {
    pub fn message(&self) -> String {
        match self {
            ValidationWarning::MixedObjectives { objectives } => format!(
                "The selected campaigns have different objectives ({}); some targets may be rejected",
                objectives.join(", ")
            ),
            ValidationWarning::MixedSpecialCategories => {
                "The selected campaigns have different special ad categories; some targets may be rejected"
                    .to_string()
            }
        }
    }
}

/// Result of pre-validating a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// No hard errors.
    pub ok: bool,
    pub hard_errors: Vec<ValidationError>,
    pub soft_warnings: Vec<ValidationWarning>,
    pub constraint: CompatibilityConstraint,
}

impl ValidationReport {
    pub fn error_messages(&self) -> Vec<String> {
        self.hard_errors.iter().map(ValidationError::message).collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.soft_warnings.iter().map(ValidationWarning::message).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Checks that `targets` can be processed together as a `kind` batch.
///
/// `campaigns` holds metadata for the campaigns the targets reference;
/// targets whose campaign is unknown are skipped by the objective and
/// category checks.
pub fn validate(
    targets: &[TargetDescriptor],
    kind: BatchKind,
    campaigns: &[CampaignMeta],
) -> ValidationReport {
    let mut hard_errors = Vec::new();
    let mut soft_warnings = Vec::new();

    if targets.is_empty() {
        hard_errors.push(ValidationError::EmptySelection);
    }

    // Distinct accounts in selection order
    let mut accounts: Vec<String> = Vec::new();
    for target in targets {
        if !accounts.contains(&target.account_id) {
            accounts.push(target.account_id.clone());
        }
    }
    let single_account = accounts.len() <= 1;
    if !single_account && kind.requires_single_account() {
        hard_errors.push(ValidationError::MultipleAccounts { accounts });
    }

    for target in targets {
        let name = target.display_name().to_string();
        match kind {
            BatchKind::DuplicateCampaign | BatchKind::CreateAdSetMulti
                if target.campaign_id.is_none() =>
            {
                hard_errors.push(ValidationError::MissingCampaignId { target: name });
            }
            BatchKind::DuplicateAdSet | BatchKind::CreateAdMulti if target.ad_set_id.is_none() => {
                hard_errors.push(ValidationError::MissingAdSetId { target: name });
            }
            _ => {}
        }
    }

    // Parent campaigns of the selection, each counted once
    let by_id: HashMap<&str, &CampaignMeta> = campaigns
        .iter()
        .map(|c| (c.campaign_id.as_str(), c))
        .collect();
    let mut seen = BTreeSet::new();
    let parents: Vec<&CampaignMeta> = targets
        .iter()
        .filter_map(|t| t.campaign_id.as_deref())
        .filter(|id| seen.insert(*id))
        .filter_map(|id| by_id.get(id).copied())
        .collect();

    let objectives: BTreeSet<&str> = parents
        .iter()
        .filter_map(|c| c.objective.as_deref())
        .collect();
    let single_objective = objectives.len() <= 1;
    if !single_objective {
        soft_warnings.push(ValidationWarning::MixedObjectives {
            objectives: objectives.iter().map(|o| o.to_string()).collect(),
        });
    }

    let category_sets: BTreeSet<BTreeSet<String>> = parents
        .iter()
        .map(|c| c.normalized_categories())
        .collect();
    let special_category_consistent = category_sets.len() <= 1;
    if !special_category_consistent {
        soft_warnings.push(ValidationWarning::MixedSpecialCategories);
    }

    ValidationReport {
        ok: hard_errors.is_empty(),
        hard_errors,
        soft_warnings,
        constraint: CompatibilityConstraint {
            single_account,
            single_objective,
            special_category_consistent,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, account: &str, objective: &str, categories: &[&str]) -> CampaignMeta {
        CampaignMeta {
            campaign_id: id.to_string(),
            account_id: account.to_string(),
            objective: Some(objective.to_string()),
            special_ad_categories: categories.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn cross_account_create_is_rejected() {
        let targets = vec![
            TargetDescriptor::campaign("act_1", "c1"),
            TargetDescriptor::campaign("act_2", "c2"),
        ];
        let report = validate(&targets, BatchKind::CreateAdSetMulti, &[]);

        assert!(!report.ok);
        assert_eq!(
            report.hard_errors,
            vec![ValidationError::MultipleAccounts {
                accounts: vec!["act_1".into(), "act_2".into()]
            }]
        );
        assert!(!report.constraint.single_account);
    }

    #[test]
    fn cross_account_duplicate_is_allowed() {
        let targets = vec![
            TargetDescriptor::campaign("act_1", "c1"),
            TargetDescriptor::campaign("act_2", "c2"),
        ];
        let report = validate(&targets, BatchKind::DuplicateCampaign, &[]);
        assert!(report.ok);
        assert!(!report.constraint.single_account);
    }

    #[test]
    fn empty_selection_is_hard_error() {
        let report = validate(&[], BatchKind::UploadCreatives, &[]);
        assert_eq!(report.hard_errors, vec![ValidationError::EmptySelection]);
    }

    #[test]
    fn missing_ids_are_hard_errors() {
        let targets = vec![TargetDescriptor::account("act_1").with_label("Main account")];
        let report = validate(&targets, BatchKind::CreateAdMulti, &[]);
        assert_eq!(
            report.error_messages(),
            vec!["Main account has no ad set to apply the operation to".to_string()]
        );

        let report = validate(&targets, BatchKind::DuplicateCampaign, &[]);
        assert!(matches!(
            report.hard_errors[0],
            ValidationError::MissingCampaignId { .. }
        ));
    }

    #[test]
    fn mixed_objectives_warn() {
        let targets = vec![
            TargetDescriptor::campaign("act_1", "c1"),
            TargetDescriptor::campaign("act_1", "c2"),
        ];
        let campaigns = vec![
            meta("c1", "act_1", "OUTCOME_SALES", &[]),
            meta("c2", "act_1", "OUTCOME_TRAFFIC", &[]),
        ];
        let report = validate(&targets, BatchKind::CreateAdSetMulti, &campaigns);

        assert!(report.ok);
        assert_eq!(report.soft_warnings.len(), 1);
        assert!(!report.constraint.single_objective);
        assert!(report.warning_messages()[0].contains("OUTCOME_SALES, OUTCOME_TRAFFIC"));
    }

    #[test]
    fn none_category_equals_empty() {
        let targets = vec![
            TargetDescriptor::campaign("act_1", "c1"),
            TargetDescriptor::campaign("act_1", "c2"),
        ];
        let campaigns = vec![
            meta("c1", "act_1", "OUTCOME_SALES", &["NONE"]),
            meta("c2", "act_1", "OUTCOME_SALES", &[]),
        ];
        let report = validate(&targets, BatchKind::CreateAdSetMulti, &campaigns);
        assert!(report.soft_warnings.is_empty());
        assert!(report.constraint.special_category_consistent);
    }

    #[test]
    fn flagged_and_unflagged_categories_warn() {
        let targets = vec![
            TargetDescriptor::ad_set("act_1", Some("c1".into()), "as1"),
            TargetDescriptor::ad_set("act_1", Some("c2".into()), "as2"),
            TargetDescriptor::ad_set("act_1", Some("c1".into()), "as3"),
        ];
        let campaigns = vec![
            meta("c1", "act_1", "OUTCOME_SALES", &["HOUSING"]),
            meta("c2", "act_1", "OUTCOME_SALES", &["NONE"]),
        ];
        let report = validate(&targets, BatchKind::CreateAdMulti, &campaigns);
        assert_eq!(
            report.soft_warnings,
            vec![ValidationWarning::MixedSpecialCategories]
        );
    }

    #[test]
    fn validate_is_pure() {
        let targets = vec![TargetDescriptor::campaign("act_1", "c1")];
        let campaigns = vec![meta("c1", "act_1", "OUTCOME_SALES", &[])];
        assert_eq!(
            validate(&targets, BatchKind::DuplicateCampaign, &campaigns),
            validate(&targets, BatchKind::DuplicateCampaign, &campaigns)
        );
    }
}
