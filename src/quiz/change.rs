use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    NoChange,
    /// Same identities, different prompt/options/answer content.
    TextOnly,
    OnlyAdded,
    /// An identity disappeared or was swapped for a new one.
    RemovedOrModified,
}

/// Compares question identities only.
///
/// Never returns [`Classification::TextOnly`]; see [`classify_edit`] for that.
pub fn classify_change<S: AsRef<str>>(old_ids: &[S], new_ids: &[S]) -> Classification {
    let old_set: HashSet<&str> = old_ids.iter().map(AsRef::as_ref).collect();
    let new_set: HashSet<&str> = new_ids.iter().map(AsRef::as_ref).collect();

    if old_set == new_set && old_ids.len() == new_ids.len() {
        return Classification::NoChange;
    }
    if old_set.is_subset(&new_set) && new_set.len() > old_set.len() && new_ids.len() > old_ids.len() {
        return Classification::OnlyAdded;
    }
    Classification::RemovedOrModified
}

pub fn classify_edit(old: &[Question], new: &[Question]) -> Classification {
    let old_ids: Vec<&str> = old.iter().map(|q| q.id.as_str()).collect();
    let new_ids: Vec<&str> = new.iter().map(|q| q.id.as_str()).collect();

    let classification = classify_change(&old_ids, &new_ids);
    if classification != Classification::NoChange {
        log::debug!("question ids changed: {classification:?}");
        return classification;
    }

    let content_changed = old.iter().any(|before| {
        new.iter()
            .find(|after| after.id == before.id)
            .map_or(true, |after| after != before)
    });
    if content_changed {
        Classification::TextOnly
    } else {
        Classification::NoChange
    }
}
