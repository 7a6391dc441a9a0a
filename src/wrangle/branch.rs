use crate::{
    table::Row,
    wrangle::config::{first_value, ResolvedGroup},
};

/// Number of the group's fields holding a value in this row. A field counts
/// once when any of its candidate columns is populated.
pub fn populated_count(row: &Row<'_>, group: &ResolvedGroup) -> usize {
    group
        .fields()
        .filter(|candidates| first_value(row, candidates).is_some())
        .count()
}

/// Chooses the branch with the most populated fields.
///
/// Ties go to the lower branch index. When no branch has any data the result
/// is `None`; that is a data-quality signal, not branch 1.
pub fn pick_branch<I>(counts: I) -> Option<u8>
where
    I: IntoIterator<Item = (u8, usize)>,
{
    let mut best: Option<(u8, usize)> = None;
    for (branch, count) in counts {
        if count == 0 {
            continue;
        }
        best = match best {
            Some((best_branch, best_count))
                if best_count > count || (best_count == count && best_branch < branch) =>
            {
                Some((best_branch, best_count))
            }
            _ => Some((branch, count)),
        };
    }
    best.map(|(branch, _)| branch)
}

pub fn resolve_branch(row: &Row<'_>, branches: &[(u8, ResolvedGroup)]) -> Option<u8> {
    pick_branch(
        branches
            .iter()
            .map(|(branch, group)| (*branch, populated_count(row, group))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Metric, Slot},
        table::RawTable,
        wrangle::config::ResolvedDuration,
    };

    fn group(branch: u8) -> (u8, ResolvedGroup) {
        let mut group = ResolvedGroup::default();
        group.metrics.insert(
            Metric::Total,
            ResolvedDuration {
                hours: vec![format!("d{branch}_h")],
                minutes: vec![format!("d{branch}_m")],
            },
        );
        group
            .screenshots
            .insert(Slot::Total, vec![format!("d{branch}_ss"), format!("d_{branch}_ss")]);
        (branch, group)
    }

    fn table(cells: &[(&str, &str)]) -> RawTable {
        RawTable::new(
            "responses",
            cells.iter().map(|(column, _)| column.to_string()).collect(),
            vec![cells.iter().map(|(_, value)| value.to_string()).collect()],
        )
    }

    #[test]
    fn branch_with_data_wins() {
        let branches: Vec<_> = (1..=7).map(group).collect();
        let table = table(&[("d3_h", "2"), ("d3_m", "15"), ("d3_ss", "F_1"), ("d1_h", "")]);
        assert_eq!(resolve_branch(&table.row(0), &branches), Some(3));
    }

    #[test]
    fn equal_counts_resolve_to_lower_branch() {
        let branches: Vec<_> = (1..=7).map(group).collect();
        let table = table(&[("d6_h", "1"), ("d4_m", "30")]);
        assert_eq!(resolve_branch(&table.row(0), &branches), Some(4));
        assert_eq!(pick_branch([(6, 2), (4, 2), (5, 1)]), Some(4));
    }

    #[test]
    fn alternate_column_counts_once_per_field() {
        let branches: Vec<_> = (1..=7).map(group).collect();
        let table = table(&[("d2_ss", ""), ("d_2_ss", "F_2"), ("d_5_ss", "F_5"), ("d5_ss", "F_5")]);
        assert_eq!(populated_count(&table.row(0), &branches[1].1), 1);
        assert_eq!(populated_count(&table.row(0), &branches[4].1), 1);
        assert_eq!(resolve_branch(&table.row(0), &branches), Some(2));
    }

    #[test]
    fn higher_count_beats_lower_index() {
        assert_eq!(pick_branch([(1, 1), (2, 3), (3, 3)]), Some(2));
    }

    #[test]
    fn no_data_anywhere_is_none_not_branch_one() {
        let branches: Vec<_> = (1..=7).map(group).collect();
        let table = table(&[("d1_h", ""), ("d2_m", "NA")]);
        assert_eq!(resolve_branch(&table.row(0), &branches), None);
        assert_eq!(pick_branch([(1, 0), (2, 0)]), None);
    }
}
