// ==========================================
// 库存导入集成测试
// ==========================================
// 职责: CSV 导入 -> 仓储 -> 可分配查询 -> 规划
// ==========================================


#[cfg(test)]
mod inventory_import_test {
    use regain_allocation::api::ApiError;
    use regain_allocation::domain::{ActionType, BagStatus, OrderStatus};
    use std::path::Path;

    use crate::test_helpers::{setup_test_env, test_now, write_csv};

    #[test]
    fn test_import_bags_skips_invalid_rows() {
        let env = setup_test_env();
        let csv = write_csv(
            "\u{feff}Bag_ID,Weight_KG,Status,Needs_Cleaning\n\
             A,3,AVAILABLE,false\n\
             B,4,,\n\
             C,-1,,\n\
             D,abc,,\n\
             E,5,AVAILABLE,yes\n\
             A,9,,\n\
             F,2,SHIPPED,\n",
        );

        let summary = env
            .inventory_api
            .import_bags(csv.path(), "warehouse", test_now())
            .unwrap();

        assert_eq!(summary.total_rows, 7);
        assert_eq!(summary.imported, 3);
        let rejected_rows: Vec<usize> = summary.rejected.iter().map(|r| r.row).collect();
        assert_eq!(rejected_rows, vec![4, 5, 7, 8]);

        let eligible: Vec<String> = env
            .inventory_api
            .list_eligible_bags()
            .unwrap()
            .into_iter()
            .map(|b| b.bag_id)
            .collect();
        assert_eq!(eligible, vec!["A".to_string(), "B".to_string()]);

        let dirty = env.inventory_api.get_bag("E").unwrap();
        assert!(dirty.needs_cleaning);
        assert_eq!(dirty.status, BagStatus::Available);

        let logs = env
            .action_log_repo
            .list_by_action_type(ActionType::ImportBags, 10)
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].actor, "warehouse");
        assert!(logs[0].payload_json.is_some());
    }

    #[test]
    fn test_import_orders_keeps_rows_missing_priority() {
        let env = setup_test_env();
        let csv = write_csv(
            "order_id,requested_quantity_kg,priority,created_at\n\
             O1,4,High,2026-03-08\n\
             O2,3,1,2026-03-09T00:00:00Z\n\
             O3,2,,2026-03-09 12:00:00\n\
             O4,2,urgent,\n",
        );

        let summary = env
            .inventory_api
            .import_orders(csv.path(), "intake", test_now())
            .unwrap();
        assert_eq!(summary.imported, 3);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.rejected[0].row, 5);

        let o3 = env.inventory_api.get_order("O3").unwrap();
        assert_eq!(o3.priority, None);
        assert_eq!(o3.status, OrderStatus::Pending);
        assert_eq!(env.inventory_api.list_eligible_orders().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_imported_data_flows_into_proposal() {
        let env = setup_test_env();
        let bags = write_csv("bag_id,weight_kg\nA,3\nB,4\nC,5\n");
        let orders = write_csv(
            "order_id,requested_quantity_kg,priority,created_at\n\
             O1,4,3,2026-03-08T09:00:00Z\n\
             O2,3,1,2026-03-09T09:00:00Z\n\
             O3,1,,2026-03-09T09:00:00Z\n",
        );

        env.inventory_api
            .import_bags(bags.path(), "warehouse", test_now())
            .unwrap();
        env.inventory_api
            .import_orders(orders.path(), "intake", test_now())
            .unwrap();

        let proposal = env.allocation_api.propose("alice", test_now()).await.unwrap();

        // O3 缺少优先级: 被剔除，不影响其它订单
        assert_eq!(proposal.report.rejected.len(), 1);
        assert_eq!(proposal.report.rejected[0].order_id, "O3");
        assert_eq!(proposal.report.plan.bag_ids(), vec!["B", "A"]);
    }

    #[test]
    fn test_reimport_bumps_revision() {
        let env = setup_test_env();
        let first = write_csv("bag_id,weight_kg\nA,3\n");
        let second = write_csv("bag_id,weight_kg\nA,3.5\n");

        env.inventory_api
            .import_bags(first.path(), "warehouse", test_now())
            .unwrap();
        env.inventory_api
            .import_bags(second.path(), "warehouse", test_now())
            .unwrap();

        let bag = env.inventory_api.get_bag("A").unwrap();
        assert_eq!(bag.weight_kg, 3.5);
        assert_eq!(bag.revision, 1);
    }

    #[test]
    fn test_mark_cleaned_makes_bag_eligible() {
        let env = setup_test_env();
        let csv = write_csv("bag_id,weight_kg,needs_cleaning\nA,3,1\n");
        env.inventory_api
            .import_bags(csv.path(), "warehouse", test_now())
            .unwrap();
        assert!(env.inventory_api.list_eligible_bags().unwrap().is_empty());

        env.inventory_api
            .mark_cleaned("A", "cleaner", test_now())
            .unwrap();
        assert_eq!(env.inventory_api.list_eligible_bags().unwrap().len(), 1);

        let err = env
            .inventory_api
            .mark_cleaned("missing", "cleaner", test_now())
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_missing_required_column_and_file() {
        let env = setup_test_env();
        let csv = write_csv("bag_id,weight\nA,3\n");

        let err = env
            .inventory_api
            .import_bags(csv.path(), "warehouse", test_now())
            .unwrap_err();
        assert!(matches!(err, ApiError::ImportError(_)));

        let err = env
            .inventory_api
            .import_orders(Path::new("/nonexistent/orders.csv"), "intake", test_now())
            .unwrap_err();
        assert!(matches!(err, ApiError::ImportError(_)));
    }
}
