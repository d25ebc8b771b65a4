use cardrank_core::rank::lexorank::{validate_rank_order, Rank, RankError, RankSpace};
use proptest::prelude::*;

fn rank(value: &str) -> Rank {
    Rank::parse(value).unwrap()
}

/// Inserts at each position (taken modulo the current length + 1),
/// rebalancing the whole sequence whenever a seam runs out.
fn insert_all(space: &RankSpace, positions: &[usize]) -> Vec<Rank> {
    let mut ranks: Vec<Rank> = Vec::new();
    for &position in positions {
        let index = position % (ranks.len() + 1);
        let lower = index.checked_sub(1).map(|prev| &ranks[prev]);
        let upper = ranks.get(index);
        let next = match space.rank_between(lower, upper) {
            Ok(next) => next,
            Err(RankError::NeedsRebalance { .. }) => {
                ranks = space.balanced_ranks(ranks.len()).unwrap();
                let lower = index.checked_sub(1).map(|prev| &ranks[prev]);
                space.rank_between(lower, ranks.get(index)).unwrap()
            }
            Err(other) => panic!("unexpected rank error: {other}"),
        };
        ranks.insert(index, next);
    }
    ranks
}

proptest! {
    #[test]
    fn prop_between_is_strictly_inside_bounds(a in "[a-z]{1,6}", b in "[a-z]{1,6}") {
        prop_assume!(a != b);
        let (low, high) = if a < b { (rank(&a), rank(&b)) } else { (rank(&b), rank(&a)) };
        let space = RankSpace::default();

        match space.rank_between(Some(&low), Some(&high)) {
            Ok(mid) => {
                prop_assert!(low < mid && mid < high, "{low} < {mid} < {high}");
                prop_assert!(mid.len() <= space.max_rank_length());
            }
            Err(RankError::NeedsRebalance { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }

    #[test]
    fn prop_open_ends_stay_outside_bound(a in "[a-z]{1,8}") {
        let bound = rank(&a);
        let space = RankSpace::default();

        if let Ok(after) = space.rank_between(Some(&bound), None) {
            prop_assert!(after > bound);
        }
        match space.rank_between(None, Some(&bound)) {
            Ok(before) => prop_assert!(before < bound),
            // Only an all-`a` key has nothing before it.
            Err(_) => prop_assert!(a.bytes().all(|byte| byte == b'a')),
        }
    }

    #[test]
    fn prop_inserts_with_rebalance_keep_strict_order(
        positions in prop::collection::vec(0usize..64, 1..300)
    ) {
        let space = RankSpace::new(6);
        let ranks = insert_all(&space, &positions);

        prop_assert_eq!(ranks.len(), positions.len());
        prop_assert!(validate_rank_order(&ranks));
        prop_assert!(ranks.iter().all(|rank| rank.len() <= space.max_rank_length()));
    }

    #[test]
    fn prop_balanced_ranks_leave_room_everywhere(count in 1usize..3_000) {
        let space = RankSpace::default();
        let ranks = space.balanced_ranks(count).unwrap();

        prop_assert_eq!(ranks.len(), count);
        prop_assert!(validate_rank_order(&ranks));
        prop_assert!(space.rank_between(None, ranks.first()).is_ok());
        prop_assert!(space.rank_between(ranks.last(), None).is_ok());
        for pair in ranks.windows(2) {
            prop_assert!(space.rank_between(Some(&pair[0]), Some(&pair[1])).is_ok());
        }
    }
}
