// ==========================================
// 引擎集成测试
// ==========================================
// 职责: 评分 + 子集匹配 + 贪心规划的组合行为
// ==========================================


#[cfg(test)]
mod engine_integration_test {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use regain_allocation::domain::{DonationBag, Order};
    use regain_allocation::engine::{
        AllocationPlanner, ClaimedBags, EngineError, ImportanceScorer, MatchStrategy,
        SubsetMatcher,
    };
    use std::collections::HashSet;

    use crate::test_helpers::{days_ago, test_now};

    fn bags(spec: &[(&str, f64)]) -> Vec<DonationBag> {
        spec.iter()
            .map(|(id, w)| DonationBag::available(*id, *w))
            .collect()
    }

    // ==========================================
    // 示例场景
    // ==========================================

    #[test]
    fn test_example_plan() {
        let bags = bags(&[("A", 3.0), ("B", 4.0), ("C", 5.0)]);
        // O2 排在前面，验证排序与输入顺序无关
        let orders = vec![
            Order::pending("O2", 1, 3.0, days_ago(1)),
            Order::pending("O1", 3, 4.0, days_ago(2)),
        ];

        for strategy in [MatchStrategy::Exhaustive, MatchStrategy::BranchAndBound] {
            let planner = AllocationPlanner::new(SubsetMatcher::new(strategy));
            let report = planner.plan(&bags, &orders, test_now()).unwrap();

            let scores: Vec<(String, i64)> = report
                .scored
                .iter()
                .map(|s| (s.order.order_id.clone(), s.importance_score))
                .collect();
            assert_eq!(
                scores,
                vec![("O1".to_string(), 32), ("O2".to_string(), 11)]
            );

            let plan = &report.plan;
            assert_eq!(plan.allocations.len(), 2);
            assert_eq!(plan.allocations[0].order_id, "O1");
            assert_eq!(plan.allocations[0].bag_ids, vec!["B".to_string()]);
            assert_eq!(plan.allocations[1].order_id, "O2");
            assert_eq!(plan.allocations[1].bag_ids, vec!["A".to_string()]);
            assert_eq!(plan.total_bags_used(), 2);
            assert!(!plan.bag_ids().contains(&"C"));

            // 快照只包含方案涉及的实体
            assert_eq!(report.snapshot.bag_revisions.len(), 2);
            assert_eq!(report.snapshot.order_revisions.len(), 2);
        }
    }

    // ==========================================
    // 规划性质
    // ==========================================

    #[test]
    fn test_unmatched_high_priority_does_not_block_others() {
        let bags = bags(&[("A", 2.0), ("B", 2.0)]);
        let orders = vec![
            Order::pending("BIG", 5, 100.0, days_ago(3)),
            Order::pending("SMALL", 1, 2.0, days_ago(0)),
        ];

        let report = AllocationPlanner::default()
            .plan(&bags, &orders, test_now())
            .unwrap();

        assert_eq!(report.unmatched, vec!["BIG".to_string()]);
        assert_eq!(report.plan.allocations.len(), 1);
        assert_eq!(report.plan.allocations[0].order_id, "SMALL");
        assert_eq!(report.plan.allocations[0].bag_ids, vec!["A".to_string()]);
    }

    #[test]
    fn test_invalid_orders_are_rejected_not_fatal() {
        let bags = bags(&[("A", 2.0)]);
        let mut missing_priority = Order::pending("NO_PRIORITY", 1, 1.0, days_ago(1));
        missing_priority.priority = None;
        let mut missing_created = Order::pending("NO_CREATED", 1, 1.0, days_ago(1));
        missing_created.created_at = None;
        let zero_quantity = Order::pending("ZERO", 1, 0.0, days_ago(1));
        let valid = Order::pending("OK", 1, 1.5, days_ago(1));

        let report = AllocationPlanner::default()
            .plan(
                &bags,
                &[missing_priority, missing_created, zero_quantity, valid],
                test_now(),
            )
            .unwrap();

        let rejected: Vec<&str> = report.rejected.iter().map(|r| r.order_id.as_str()).collect();
        assert_eq!(rejected, vec!["NO_PRIORITY", "NO_CREATED", "ZERO"]);
        assert_eq!(report.plan.allocations.len(), 1);
        assert_eq!(report.plan.allocations[0].order_id, "OK");
    }

    #[test]
    fn test_equal_scores_keep_input_order() {
        let bags = bags(&[("A", 1.0), ("B", 1.0), ("C", 1.0)]);
        let orders = vec![
            Order::pending("X", 2, 1.0, days_ago(1)),
            Order::pending("Y", 2, 1.0, days_ago(1)),
            Order::pending("Z", 2, 1.0, days_ago(1)),
        ];

        let report = AllocationPlanner::default()
            .plan(&bags, &orders, test_now())
            .unwrap();

        let order_ids: Vec<&str> = report
            .plan
            .allocations
            .iter()
            .map(|a| a.order_id.as_str())
            .collect();
        assert_eq!(order_ids, vec!["X", "Y", "Z"]);
        // 同等超额取枚举最早的子集: 依次拿到 A / B / C
        let bag_ids: Vec<&str> = report.plan.bag_ids();
        assert_eq!(bag_ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_random_inventories_satisfy_plan_invariants() {
        let mut rng = StdRng::seed_from_u64(20260310);
        let scorer = ImportanceScorer::new();

        for round in 0..40 {
            let bag_count = rng.random_range(0..12);
            let bags: Vec<DonationBag> = (0..bag_count)
                .map(|i| {
                    let grams: u32 = rng.random_range(100..6000);
                    DonationBag::available(format!("B{}-{}", round, i), grams as f64 / 1000.0)
                })
                .collect();

            let order_count = rng.random_range(1..6);
            let orders: Vec<Order> = (0..order_count)
                .map(|i| {
                    let grams: u32 = rng.random_range(500..9000);
                    Order::pending(
                        format!("O{}-{}", round, i),
                        rng.random_range(1..=3),
                        grams as f64 / 1000.0,
                        days_ago(rng.random_range(0..10)),
                    )
                })
                .collect();

            let exhaustive = AllocationPlanner::new(SubsetMatcher::new(MatchStrategy::Exhaustive))
                .plan(&bags, &orders, test_now())
                .unwrap();
            let pruned = AllocationPlanner::new(SubsetMatcher::new(MatchStrategy::BranchAndBound))
                .plan(&bags, &orders, test_now())
                .unwrap();

            // 两种策略结果一致
            assert_eq!(exhaustive.plan, pruned.plan, "round {}", round);

            let plan = &pruned.plan;
            assert!(plan.is_disjoint(), "round {}", round);

            let mut last_score = i64::MAX;
            let mut seen = HashSet::new();
            for allocation in &plan.allocations {
                let order = orders
                    .iter()
                    .find(|o| o.order_id == allocation.order_id)
                    .unwrap();
                assert!(
                    allocation.total_weight_kg + 1e-9 >= order.requested_quantity_kg,
                    "round {}: {} underfilled",
                    round,
                    order.order_id
                );
                assert!(!allocation.bag_ids.is_empty());
                assert!(seen.insert(order.order_id.clone()));

                let score = scorer.score(order, test_now()).unwrap();
                assert!(score <= last_score, "round {}: score order", round);
                last_score = score;
            }
        }
    }

    // ==========================================
    // 子集匹配
    // ==========================================

    #[test]
    fn test_matcher_tie_break_prefers_enumeration_order() {
        // 目标 5: {A,D}=5 与 {B,C}=5 超额都为 0
        // 掩码升序: {B,C}=0b0110 先于 {A,D}=0b1001
        let candidates = bags(&[("A", 1.0), ("B", 2.0), ("C", 3.0), ("D", 4.0)]);

        for strategy in [MatchStrategy::Exhaustive, MatchStrategy::BranchAndBound] {
            let matcher = SubsetMatcher::new(strategy);
            for _ in 0..3 {
                let found = matcher
                    .find_best_subset(&candidates, &ClaimedBags::new(), 5.0)
                    .unwrap()
                    .unwrap();
                assert_eq!(found.bag_ids(&candidates), vec!["B", "C"], "{}", strategy);
                assert_eq!(found.excess_kg, 0.0);
            }
        }
    }

    #[test]
    fn test_matcher_skips_claimed_bags() {
        let candidates = bags(&[("A", 3.0), ("B", 4.0), ("C", 5.0)]);
        let mut claimed = ClaimedBags::new();
        claimed.claim(["B"]);

        let found = SubsetMatcher::default()
            .find_best_subset(&candidates, &claimed, 4.0)
            .unwrap()
            .unwrap();
        assert_eq!(found.bag_ids(&candidates), vec!["C"]);

        claimed.claim(["A", "C"]);
        assert!(SubsetMatcher::default()
            .find_best_subset(&candidates, &claimed, 1.0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_exhaustive_candidate_limit() {
        let candidates: Vec<DonationBag> = (0..8)
            .map(|i| DonationBag::available(format!("B{}", i), 1.0))
            .collect();
        let matcher =
            SubsetMatcher::new(MatchStrategy::Exhaustive).with_exhaustive_max_candidates(4);

        let err = matcher
            .find_best_subset(&candidates, &ClaimedBags::new(), 2.0)
            .unwrap_err();
        assert!(matches!(err, EngineError::CandidateLimitExceeded { .. }));

        // 占用后未占用候选回到上限内
        let mut claimed = ClaimedBags::new();
        claimed.claim(["B0", "B1", "B2", "B3"]);
        let found = matcher
            .find_best_subset(&candidates, &claimed, 2.0)
            .unwrap()
            .unwrap();
        assert_eq!(found.bag_ids(&candidates), vec!["B4", "B5"]);
    }
}
