//! Business rules that derive the `resiliation` label.
//!
//! Each rule is a standalone predicate. All three rules yield the same label,
//! so the label is their plain OR; there is no priority between them.

use crate::motif::MOTIF_OTHER;
use crate::schema::FeatureRow;
use serde::{Deserialize, Serialize};

/// More than two invoices and at least one paid late.
pub fn frequent_late_payer(row: &FeatureRow) -> bool {
    row.nb_facture > 2 && !row.is_payed_on_time
}

/// Wants to cancel before the last recorded connection while still owing
/// more than the paid threshold. A missing `daysrc` never matches.
pub fn cancels_with_outstanding_balance(row: &FeatureRow) -> bool {
    matches!(row.daysrc, Some(days) if days < 0) && !row.is_paied
}

/// Cancellation reason outside the whitelist and at least one late invoice.
pub fn unlisted_motif_late_payer(row: &FeatureRow) -> bool {
    row.motif == MOTIF_OTHER && !row.is_payed_on_time
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChurnRule {
    FrequentLatePayer,
    CancelsWithOutstandingBalance,
    UnlistedMotifLatePayer,
}

impl ChurnRule {
    pub const ALL: [ChurnRule; 3] = [
        ChurnRule::FrequentLatePayer,
        ChurnRule::CancelsWithOutstandingBalance,
        ChurnRule::UnlistedMotifLatePayer,
    ];

    pub fn matches(self, row: &FeatureRow) -> bool {
        match self {
            ChurnRule::FrequentLatePayer => frequent_late_payer(row),
            ChurnRule::CancelsWithOutstandingBalance => cancels_with_outstanding_balance(row),
            ChurnRule::UnlistedMotifLatePayer => unlisted_motif_late_payer(row),
        }
    }
}

/// 1 when any rule matches, else 0.
pub fn churn_label(row: &FeatureRow) -> u8 {
    let churned = frequent_late_payer(row)
        | cancels_with_outstanding_balance(row)
        | unlisted_motif_late_payer(row);
    u8::from(churned)
}

/// Every rule that matches `row`, in declaration order.
pub fn matching_rules(row: &FeatureRow) -> Vec<ChurnRule> {
    ChurnRule::ALL
        .into_iter()
        .filter(|rule| rule.matches(row))
        .collect()
}

/// Sets `resiliation` on every row.
pub fn label_rows(rows: &mut [FeatureRow]) {
    for row in rows.iter_mut() {
        row.resiliation = Some(churn_label(row));
    }
}
