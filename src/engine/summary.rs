// ==========================================
// 捐赠物资分配引擎 - 方案摘要
// ==========================================
// 用途: 确认环节展示给审核人的可读摘要
// 内容: 每个分配的订单/捐赠袋/袋数/总重量，以及全局使用袋数
// ==========================================

use crate::engine::planner::{PlanningReport, RejectedOrder};
use crate::i18n::{t, t_with_args};
use serde::{Deserialize, Serialize};

// ==========================================
// SummaryLine - 单个分配的摘要行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryLine {
    pub order_id: String,
    pub bag_ids: Vec<String>,
    pub bag_count: usize,
    pub total_weight_kg: f64,
}

// ==========================================
// PlanSummary - 方案摘要
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub lines: Vec<SummaryLine>,
    pub total_bags_used: usize,
    pub total_weight_kg: f64,
    pub rejected: Vec<RejectedOrder>,
    pub unmatched: Vec<String>,
}

impl PlanSummary {
    pub fn from_report(report: &PlanningReport) -> Self {
        let lines = report
            .plan
            .allocations
            .iter()
            .map(|a| SummaryLine {
                order_id: a.order_id.clone(),
                bag_ids: a.bag_ids.clone(),
                bag_count: a.bag_count(),
                total_weight_kg: a.total_weight_kg,
            })
            .collect();

        Self {
            lines,
            total_bags_used: report.plan.total_bags_used(),
            total_weight_kg: report.plan.total_weight_kg(),
            rejected: report.rejected.clone(),
            unmatched: report.unmatched.clone(),
        }
    }

    /// 按当前语言渲染为多行文本
    pub fn render(&self) -> String {
        let mut out = vec![t("summary.title")];

        if self.lines.is_empty() {
            out.push(t("summary.empty"));
        }

        for line in &self.lines {
            let bag_ids = line.bag_ids.join(", ");
            let bag_count = line.bag_count.to_string();
            let total_weight = format_kg(line.total_weight_kg);
            out.push(t_with_args(
                "summary.line",
                &[
                    ("order_id", line.order_id.as_str()),
                    ("bag_ids", bag_ids.as_str()),
                    ("bag_count", bag_count.as_str()),
                    ("total_weight", total_weight.as_str()),
                ],
            ));
        }

        let total_bags = self.total_bags_used.to_string();
        let total_weight = format_kg(self.total_weight_kg);
        out.push(t_with_args(
            "summary.total",
            &[
                ("total_bags", total_bags.as_str()),
                ("total_weight", total_weight.as_str()),
            ],
        ));

        for rejected in &self.rejected {
            out.push(t_with_args(
                "summary.rejected",
                &[
                    ("order_id", rejected.order_id.as_str()),
                    ("reason", rejected.reason.as_str()),
                ],
            ));
        }

        if !self.unmatched.is_empty() {
            let order_ids = self.unmatched.join(", ");
            out.push(t_with_args(
                "summary.unmatched",
                &[("order_ids", order_ids.as_str())],
            ));
        }

        out.join("\n")
    }
}

fn format_kg(kg: f64) -> String {
    let text = format!("{:.3}", kg);
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
