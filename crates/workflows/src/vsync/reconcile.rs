//! Three-way diff between the registry and the local directory.
//!
//! Pure and deterministic: the same inputs always produce the same
//! discrepancies, in key order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use dict_domain::{Discrepancy, DiscrepancyKind, Entry, RemoteEntry};

/// Outcome of comparing one registry snapshot with the local entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub discrepancies: Vec<Discrepancy>,
    /// Distinct keys looked at across both passes.
    pub compared: u64,
    /// Local entries missing from the registry that already carry a
    /// review flag.
    pub awaiting_review: u64,
}

/// Compare `remote` against `local`.
///
/// `local` must hold live (not soft-deleted) entries. Every remote entry is
/// matched against all of `local`; only local entries updated at or after
/// `pass_two_since` are checked for absence from the registry.
pub fn compare(
    remote: &[RemoteEntry],
    local: &[Entry],
    pass_two_since: Option<OffsetDateTime>,
) -> Comparison {
    let remote_by_key: HashMap<&str, &RemoteEntry> =
        remote.iter().map(|r| (r.key.as_str(), r)).collect();
    let local_by_key: HashMap<&str, &Entry> = local
        .iter()
        .filter(|e| !e.is_deleted())
        .map(|e| (e.key.as_str(), e))
        .collect();

    let mut out = Comparison::default();

    for (key, remote) in &remote_by_key {
        out.compared += 1;
        match local_by_key.get(key) {
            None => out.discrepancies.push(Discrepancy {
                kind: DiscrepancyKind::MissingLocal,
                key: key.to_string(),
                entry_id: None,
                remote: Some((*remote).clone()),
                fields: Vec::new(),
            }),
            Some(local) => {
                let fields = remote.differing_fields(local);
                if !fields.is_empty() {
                    out.discrepancies.push(Discrepancy {
                        kind: DiscrepancyKind::OutdatedLocal,
                        key: key.to_string(),
                        entry_id: Some(local.entry_id.clone()),
                        remote: Some((*remote).clone()),
                        fields: fields.into_iter().map(String::from).collect(),
                    });
                }
            }
        }
    }

    let in_scope = |entry: &Entry| pass_two_since.map_or(true, |since| entry.updated_at >= since);
    for (key, local) in &local_by_key {
        if remote_by_key.contains_key(key) || !in_scope(local) {
            continue;
        }
        out.compared += 1;
        if local.review.is_some() {
            out.awaiting_review += 1;
            continue;
        }
        out.discrepancies.push(Discrepancy {
            kind: DiscrepancyKind::MissingBacen,
            key: key.to_string(),
            entry_id: Some(local.entry_id.clone()),
            remote: None,
            fields: Vec::new(),
        });
    }

    out.discrepancies.sort_by(|a, b| a.key.cmp(&b.key));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dict_domain::{Account, EntryStatus, Ispb, Owner};
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-03-01 00:00 UTC);

    fn remote(key: &str, number: &str) -> RemoteEntry {
        RemoteEntry {
            key: key.into(),
            key_type: "EMAIL".into(),
            participant_ispb: Ispb::parse("12345678").unwrap(),
            account: Account {
                branch: "0001".into(),
                number: number.into(),
                account_type: "CACC".into(),
            },
            owner: Owner {
                owner_type: "NATURAL_PERSON".into(),
                name: "Maria".into(),
                tax_id: "12345678901".into(),
            },
            status: EntryStatus::Active,
            created_at: NOW,
            updated_at: NOW,
        }
    }

    fn local(key: &str, number: &str) -> Entry {
        Entry::from_remote(format!("E-{key}"), &remote(key, number), NOW)
    }

    #[test]
    fn classifies_all_three_kinds() {
        let remote = vec![remote("a@x", "1"), remote("b@x", "2"), remote("c@x", "3")];
        let local = vec![local("b@x", "2"), local("c@x", "99"), local("d@x", "4")];

        let out = compare(&remote, &local, None);
        let kinds: Vec<_> = out.discrepancies.iter().map(|d| (d.key.as_str(), d.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("a@x", DiscrepancyKind::MissingLocal),
                ("c@x", DiscrepancyKind::OutdatedLocal),
                ("d@x", DiscrepancyKind::MissingBacen),
            ]
        );
        assert_eq!(out.compared, 4);
        assert_eq!(out.discrepancies[1].fields, vec!["account_number".to_string()]);
        assert_eq!(out.discrepancies[2].entry_id.as_deref(), Some("E-d@x"));
    }

    #[test]
    fn identical_snapshots_have_no_discrepancies() {
        let remote = vec![remote("a@x", "1"), remote("b@x", "2")];
        let local = vec![local("a@x", "1"), local("b@x", "2")];
        let out = compare(&remote, &local, None);
        assert!(out.discrepancies.is_empty());
        assert_eq!(out.compared, 2);
    }

    #[test]
    fn flagged_entries_are_awaiting_review_not_new_discrepancies() {
        let mut flagged = local("d@x", "4");
        flagged.flag_for_review("missing from registry", NOW);
        let out = compare(&[], &[flagged], None);
        assert!(out.discrepancies.is_empty());
        assert_eq!(out.awaiting_review, 1);
    }

    #[test]
    fn incremental_scope_limits_pass_two_only() {
        let mut stale = local("old@x", "1");
        stale.updated_at = datetime!(2025-02-01 00:00 UTC);
        let mut outdated = local("b@x", "1");
        outdated.updated_at = datetime!(2025-02-01 00:00 UTC);

        let out = compare(&[remote("b@x", "2")], &[stale, outdated], Some(datetime!(2025-02-28 00:00 UTC)));
        assert_eq!(out.discrepancies.len(), 1);
        assert_eq!(out.discrepancies[0].kind, DiscrepancyKind::OutdatedLocal);
    }

    #[test]
    fn soft_deleted_local_entries_are_ignored() {
        let mut gone = local("a@x", "1");
        gone.deleted_at = Some(NOW);
        let out = compare(&[remote("a@x", "1")], &[gone], None);
        assert_eq!(out.discrepancies.len(), 1);
        assert_eq!(out.discrepancies[0].kind, DiscrepancyKind::MissingLocal);
    }
}
