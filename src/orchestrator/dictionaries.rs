//! Dictionary iteration order.
//!
//! Small dictionaries first, so cheap attempts run before the expensive ones.
//! The order is a pure function of the dictionary set.

use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{Dictionary, JobDictionary};

/// Order by size ascending, then name, then id.
pub fn ordered_dictionaries(mut dictionaries: Vec<Dictionary>) -> Vec<Dictionary> {
    dictionaries.sort_by(|a, b| {
        a.size
            .cmp(&b.size)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
    dictionaries
}

/// Drop dictionaries already attempted during `run_id`.
pub fn remaining_for_run(
    ordered: Vec<Dictionary>,
    attempts: &[JobDictionary],
    run_id: Uuid,
) -> Vec<Dictionary> {
    let tried: HashSet<Uuid> = attempts
        .iter()
        .filter(|a| a.run_id == run_id)
        .map(|a| a.dictionary_id)
        .collect();
    ordered
        .into_iter()
        .filter(|d| !tried.contains(&d.id))
        .collect()
}
