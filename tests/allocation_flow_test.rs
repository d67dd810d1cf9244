// ==========================================
// 两阶段分配流程集成测试
// ==========================================
// 职责: propose -> confirm / decline / expire 全流程，以及过期方案拒绝
// ==========================================


#[cfg(test)]
mod allocation_flow_test {
    use chrono::{Duration, NaiveDate};
    use regain_allocation::api::{AbortReason, ApiError};
    use regain_allocation::db::open_sqlite_connection;
    use regain_allocation::domain::{ActionType, BagStatus, OrderStatus, ProposalStatus};

    use crate::test_helpers::{setup_test_env, test_now, TestEnv};

    fn assert_untouched(env: &TestEnv) {
        for id in ["A", "B", "C"] {
            let bag = env.bag_repo.find_by_id(id).unwrap().unwrap();
            assert_eq!(bag.status, BagStatus::Available, "bag {}", id);
        }
        for id in ["O1", "O2"] {
            let order = env.order_repo.find_by_id(id).unwrap().unwrap();
            assert_eq!(order.status, OrderStatus::Pending, "order {}", id);
            assert!(order.fulfilled_by.is_empty());
            assert!(order.pickup_date.is_none());
        }
    }

    // ==========================================
    // 正常流程
    // ==========================================

    #[tokio::test]
    async fn test_propose_then_confirm_commits_example_plan() {
        let env = setup_test_env();
        env.seed_example();

        let proposal = env.allocation_api.propose("alice", test_now()).await.unwrap();

        // 方案: O1 <- {B}, O2 <- {A}，C 未分配
        let allocations = &proposal.report.plan.allocations;
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].order_id, "O1");
        assert_eq!(allocations[0].bag_ids, vec!["B".to_string()]);
        assert_eq!(allocations[1].order_id, "O2");
        assert_eq!(allocations[1].bag_ids, vec!["A".to_string()]);
        assert_eq!(proposal.summary.total_bags_used, 2);
        assert_eq!(proposal.expires_at, test_now() + Duration::minutes(30));

        // 提案阶段不修改任何捐赠袋/订单
        assert_untouched(&env);

        let confirm_at = test_now() + Duration::minutes(5);
        let result = env
            .allocation_api
            .confirm(&proposal.proposal_id, "bob", confirm_at)
            .await
            .unwrap();
        assert_eq!(result.receipt.orders_updated, 2);
        assert_eq!(result.receipt.bags_updated, 2);

        let o1 = env.order_repo.find_by_id("O1").unwrap().unwrap();
        assert_eq!(o1.status, OrderStatus::Allocated);
        assert_eq!(o1.fulfilled_by, vec!["B".to_string()]);
        assert_eq!(o1.pickup_date, NaiveDate::from_ymd_opt(2026, 3, 11));

        let o2 = env.order_repo.find_by_id("O2").unwrap().unwrap();
        assert_eq!(o2.fulfilled_by, vec!["A".to_string()]);

        assert_eq!(
            env.bag_repo.find_by_id("B").unwrap().unwrap().status,
            BagStatus::Delivered
        );
        assert_eq!(
            env.bag_repo.find_by_id("C").unwrap().unwrap().status,
            BagStatus::Available
        );

        let stored = env
            .allocation_api
            .get_proposal(&proposal.proposal_id)
            .unwrap();
        assert_eq!(stored.status, ProposalStatus::Committed);
        assert_eq!(stored.decided_by.as_deref(), Some("bob"));

        let history = env
            .allocation_api
            .proposal_history(&proposal.proposal_id)
            .unwrap();
        let types: Vec<ActionType> = history.iter().map(|l| l.action_type).collect();
        assert_eq!(types, vec![ActionType::Propose, ActionType::Commit]);
    }

    #[tokio::test]
    async fn test_committed_proposal_cannot_be_confirmed_twice() {
        let env = setup_test_env();
        env.seed_example();

        let proposal = env.allocation_api.propose("alice", test_now()).await.unwrap();
        env.allocation_api
            .confirm(&proposal.proposal_id, "bob", test_now())
            .await
            .unwrap();

        let err = env
            .allocation_api
            .confirm(&proposal.proposal_id, "bob", test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ProposalClosed { .. }));
    }

    // ==========================================
    // 中止路径
    // ==========================================

    #[tokio::test]
    async fn test_decline_leaves_state_untouched() {
        let env = setup_test_env();
        env.seed_example();

        let proposal = env.allocation_api.propose("alice", test_now()).await.unwrap();
        let notice = env
            .allocation_api
            .decline(&proposal.proposal_id, "bob", Some("重量不合适"), test_now())
            .unwrap();

        assert_eq!(notice.reason, AbortReason::ConfirmationDeclined);
        assert_eq!(notice.proposal_id.as_deref(), Some(proposal.proposal_id.as_str()));
        assert_untouched(&env);

        let stored = env
            .allocation_api
            .get_proposal(&proposal.proposal_id)
            .unwrap();
        assert_eq!(stored.status, ProposalStatus::Declined);
        assert_eq!(stored.failure_reason.as_deref(), Some("重量不合适"));

        // 已拒绝的提案不能再确认
        let err = env
            .allocation_api
            .confirm(&proposal.proposal_id, "bob", test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ProposalClosed { .. }));
    }

    #[tokio::test]
    async fn test_no_eligible_bags_aborts_before_planning() {
        let env = setup_test_env();
        env.seed_orders(&[("O1", 3, 4.0, 2)]);

        let err = env.allocation_api.propose("alice", test_now()).await.unwrap_err();
        assert!(matches!(err, ApiError::NoEligibleBags));
        assert_eq!(err.notice().unwrap().reason, AbortReason::NoEligibleBags);
        assert!(env.allocation_api.list_proposals(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_eligible_orders_aborts_before_planning() {
        let env = setup_test_env();
        env.seed_bags(&[("A", 3.0)]);

        let err = env.allocation_api.propose("alice", test_now()).await.unwrap_err();
        assert!(matches!(err, ApiError::NoEligibleOrders));
    }

    #[tokio::test]
    async fn test_infeasible_plan_is_not_persisted() {
        let env = setup_test_env();
        env.seed_bags(&[("A", 1.0), ("B", 1.5)]);
        env.seed_orders(&[("O1", 3, 10.0, 1)]);

        let err = env.allocation_api.propose("alice", test_now()).await.unwrap_err();
        match &err {
            ApiError::Infeasible { rejected, unmatched } => {
                assert_eq!(*rejected, 0);
                assert_eq!(*unmatched, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.notice().unwrap().reason, AbortReason::Infeasible);
        assert!(env.allocation_api.list_proposals(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dirty_bags_are_not_candidates() {
        let env = setup_test_env();
        env.seed_example();
        let mut dirty = env.bag_repo.find_by_id("B").unwrap().unwrap();
        dirty.needs_cleaning = true;
        env.bag_repo.batch_upsert(&[dirty]).unwrap();

        let proposal = env.allocation_api.propose("alice", test_now()).await.unwrap();
        let used: Vec<&str> = proposal.report.plan.bag_ids();
        assert!(!used.contains(&"B"));
        // O1 需 4kg: {C}=5 超额 1
        assert_eq!(
            proposal.report.plan.allocations[0].bag_ids,
            vec!["C".to_string()]
        );
    }

    #[tokio::test]
    async fn test_commit_stands_when_audit_write_fails() {
        let env = setup_test_env();
        env.seed_example();

        let proposal = env.allocation_api.propose("alice", test_now()).await.unwrap();

        // 另一连接挂上触发器，使 COMMIT 审计记录写入失败
        {
            let conn = open_sqlite_connection(&env.db_path).unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_commit_log BEFORE INSERT ON action_log
                 WHEN NEW.action_type = 'COMMIT'
                 BEGIN SELECT RAISE(ABORT, 'audit store offline'); END;",
            )
            .unwrap();
        }

        let result = env
            .allocation_api
            .confirm(&proposal.proposal_id, "bob", test_now() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(result.receipt.orders_updated, 2);

        let o1 = env.order_repo.find_by_id("O1").unwrap().unwrap();
        assert_eq!(o1.status, OrderStatus::Allocated);
        assert_eq!(
            env.bag_repo.find_by_id("B").unwrap().unwrap().status,
            BagStatus::Delivered
        );
        assert_eq!(
            env.allocation_api
                .get_proposal(&proposal.proposal_id)
                .unwrap()
                .status,
            ProposalStatus::Committed
        );

        let history = env
            .allocation_api
            .proposal_history(&proposal.proposal_id)
            .unwrap();
        assert!(history.iter().all(|log| log.action_type != ActionType::Commit));
        assert!(history.iter().all(|log| log.action_type != ActionType::CommitFailed));
    }

    // ==========================================
    // 过期方案检测
    // ==========================================

    #[tokio::test]
    async fn test_stale_plan_fails_whole_commit() {
        let env = setup_test_env();
        env.seed_example();

        let proposal = env.allocation_api.propose("alice", test_now()).await.unwrap();

        // 提案后捐赠袋 A 被库存子系统修改（修订号 +1）
        env.inventory_api
            .mark_cleaned("A", "warehouse", test_now())
            .unwrap();

        let err = env
            .allocation_api
            .confirm(&proposal.proposal_id, "bob", test_now() + Duration::minutes(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::StalePlan(_)), "got {:?}", err);
        assert_eq!(err.notice().unwrap().reason, AbortReason::CommitFailed);

        // 整批回滚: B / O1 也未改变
        assert_untouched(&env);

        let stored = env
            .allocation_api
            .get_proposal(&proposal.proposal_id)
            .unwrap();
        assert_eq!(stored.status, ProposalStatus::Failed);
        assert!(stored.failure_reason.is_some());

        let failures = env
            .action_log_repo
            .list_by_action_type(ActionType::CommitFailed, 10)
            .unwrap();
        assert_eq!(failures.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_proposals_only_first_commit_wins() {
        let env = setup_test_env();
        env.seed_example();

        let first = env.allocation_api.propose("alice", test_now()).await.unwrap();
        let second = env
            .allocation_api
            .propose("carol", test_now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(first.report.plan, second.report.plan);

        env.allocation_api
            .confirm(&first.proposal_id, "bob", test_now() + Duration::minutes(1))
            .await
            .unwrap();

        let err = env
            .allocation_api
            .confirm(&second.proposal_id, "dave", test_now() + Duration::minutes(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::StalePlan(_)), "got {:?}", err);

        // 第一个提案的结果保持不变
        let o1 = env.order_repo.find_by_id("O1").unwrap().unwrap();
        assert_eq!(o1.status, OrderStatus::Allocated);
        assert_eq!(
            env.allocation_api.get_proposal(&second.proposal_id).unwrap().status,
            ProposalStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_rerun_after_commit_uses_remaining_stock() {
        let env = setup_test_env();
        env.seed_example();

        let proposal = env.allocation_api.propose("alice", test_now()).await.unwrap();
        env.allocation_api
            .confirm(&proposal.proposal_id, "bob", test_now())
            .await
            .unwrap();

        env.seed_orders(&[("O3", 2, 5.0, 0)]);
        let next = env
            .allocation_api
            .propose("alice", test_now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(next.report.plan.allocations.len(), 1);
        assert_eq!(next.report.plan.allocations[0].order_id, "O3");
        assert_eq!(
            next.report.plan.allocations[0].bag_ids,
            vec!["C".to_string()]
        );
    }

    // ==========================================
    // 超时策略
    // ==========================================

    #[tokio::test]
    async fn test_confirm_after_ttl_expires_proposal() {
        let env = setup_test_env();
        env.seed_example();

        let proposal = env.allocation_api.propose("alice", test_now()).await.unwrap();
        let err = env
            .allocation_api
            .confirm(&proposal.proposal_id, "bob", test_now() + Duration::minutes(31))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::ProposalExpired(_)));
        assert_eq!(err.notice().unwrap().reason, AbortReason::ProposalExpired);
        assert_untouched(&env);
        assert_eq!(
            env.allocation_api
                .get_proposal(&proposal.proposal_id)
                .unwrap()
                .status,
            ProposalStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_expire_stale_closes_only_overdue_proposals() {
        let env = setup_test_env();
        env.seed_example();

        let old = env.allocation_api.propose("alice", test_now()).await.unwrap();
        let fresh = env
            .allocation_api
            .propose("alice", test_now() + Duration::minutes(20))
            .await
            .unwrap();

        let expired = env
            .allocation_api
            .expire_stale(test_now() + Duration::minutes(40))
            .unwrap();
        assert_eq!(expired, 1);

        assert_eq!(
            env.allocation_api.get_proposal(&old.proposal_id).unwrap().status,
            ProposalStatus::Expired
        );
        assert_eq!(
            env.allocation_api.get_proposal(&fresh.proposal_id).unwrap().status,
            ProposalStatus::Proposed
        );

        let open = env
            .allocation_api
            .list_proposals(Some(ProposalStatus::Proposed))
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].proposal_id, fresh.proposal_id);

        // 再次执行不重复过期
        assert_eq!(
            env.allocation_api
                .expire_stale(test_now() + Duration::minutes(40))
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_unknown_proposal() {
        let env = setup_test_env();

        let err = env
            .allocation_api
            .confirm("missing", "bob", test_now())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ProposalNotFound(_)));

        let err = env
            .allocation_api
            .decline("missing", "bob", None, test_now())
            .unwrap_err();
        assert!(matches!(err, ApiError::ProposalNotFound(_)));
    }

    #[tokio::test]
    async fn test_blank_actor_is_rejected() {
        let env = setup_test_env();
        env.seed_example();

        let err = env.allocation_api.propose("  ", test_now()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }
}
