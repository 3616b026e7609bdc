//! Offset planning
//!
//! Offsets run `0, page_size, 2 * page_size, ...` while below `total`. The
//! total comes from the first page and is trusted for the whole export.

/// Every page offset needed to cover `total` records, produced lazily
pub fn plan_offsets(total: u64, page_size: u64) -> impl Iterator<Item = u64> {
    std::iter::successors(Some(0u64), move |offset| offset.checked_add(page_size))
        .take_while(move |offset| page_size > 0 && *offset < total)
}

/// Offsets still to dispatch once page 0 has been fetched synchronously
pub fn remaining_offsets(total: u64, page_size: u64) -> impl Iterator<Item = u64> {
    plan_offsets(total, page_size).skip(1)
}

/// Number of pages covering `total` records
pub fn page_count(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plan(total: u64, page_size: u64) -> Vec<u64> {
        plan_offsets(total, page_size).collect()
    }

    #[test]
    fn test_plan_offsets_examples() {
        assert_eq!(plan(2500, 1000), vec![0, 1000, 2000]);
        assert_eq!(plan(2000, 1000), vec![0, 1000]);
        assert_eq!(plan(1, 1000), vec![0]);
        assert!(plan(0, 1000).is_empty());
    }

    #[test]
    fn test_remaining_offsets_skip_first_page() {
        assert_eq!(remaining_offsets(2500, 1000).collect::<Vec<_>>(), vec![1000, 2000]);
        assert_eq!(remaining_offsets(999, 1000).count(), 0);
        assert_eq!(remaining_offsets(0, 1000).count(), 0);
    }

    #[test]
    fn test_zero_page_size_plans_nothing() {
        assert!(plan(10, 0).is_empty());
        assert_eq!(page_count(10, 0), 0);
    }

    #[test]
    fn test_plan_near_u64_max_terminates() {
        assert_eq!(plan(u64::MAX, u64::MAX / 2 + 1), vec![0, u64::MAX / 2 + 1]);
    }

    #[test]
    fn test_huge_plan_is_produced_lazily() {
        let first: Vec<u64> = remaining_offsets(u64::MAX, 1).take(3).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(page_count(u64::MAX, 1), u64::MAX);
    }

    proptest! {
        #[test]
        fn prop_plan_covers_total(total in 0u64..50_000, page_size in 1u64..2_000) {
            let offsets = plan(total, page_size);

            prop_assert_eq!(offsets.len() as u64, page_count(total, page_size));
            prop_assert!(offsets.iter().all(|o| o % page_size == 0 && *o < total));
            prop_assert!(offsets.windows(2).all(|w| w[1] - w[0] == page_size));
            if total > 0 {
                prop_assert_eq!(offsets[0], 0);
                prop_assert!(offsets[offsets.len() - 1] + page_size >= total);
            }
        }
    }
}
