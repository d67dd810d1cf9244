// ==========================================
// 捐赠物资分配引擎 - 命令行入口
// ==========================================
// 用法:
//   regain-allocation propose
//   regain-allocation confirm <proposal_id>
//   regain-allocation decline <proposal_id> [reason]
//   regain-allocation show <proposal_id>
//   regain-allocation list [status]
//   regain-allocation expire
//   regain-allocation import-bags <csv>
//   regain-allocation import-orders <csv>
//   regain-allocation mark-cleaned <bag_id>
// ==========================================

use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use regain_allocation::api::{ApiError, ApiResult};
use regain_allocation::app::{get_default_db_path, AppState};
use regain_allocation::domain::ProposalStatus;
use regain_allocation::engine::PlanSummary;
use regain_allocation::importer::ImportSummary;
use regain_allocation::{i18n, logging};
use std::path::Path;

const USAGE: &str = "用法: regain-allocation <propose|confirm <id>|decline <id> [reason]|show <id>|list [status]|expire|import-bags <csv>|import-orders <csv>|mark-cleaned <bag_id>>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    if let Ok(locale) = std::env::var("REGAIN_LOCALE") {
        i18n::set_locale(&locale);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        bail!(USAGE);
    };

    let db_path = get_default_db_path();
    tracing::info!("{} v{}，使用数据库: {}", regain_allocation::APP_NAME, regain_allocation::VERSION, db_path);
    let state = AppState::new(db_path).map_err(|e| anyhow!(e))?;

    let actor = std::env::var("USER").unwrap_or_else(|_| "cli".to_string());
    let now = Utc::now();
    let arg = |idx: usize, name: &str| -> anyhow::Result<String> {
        args.get(idx)
            .cloned()
            .with_context(|| format!("缺少参数 <{}>\n{}", name, USAGE))
    };

    match command {
        "propose" => {
            let result = report(state.allocation_api.propose(&actor, now).await)?;
            println!("{}", result.summary.render());
            println!("proposal_id: {}", result.proposal_id);
            println!("expires_at:  {}", result.expires_at.to_rfc3339());
        }
        "confirm" => {
            let id = arg(1, "proposal_id")?;
            let result = report(state.allocation_api.confirm(&id, &actor, now).await)?;
            println!("{}", result.summary.render());
            for (order_id, date) in &result.receipt.pickup_dates {
                println!("{} -> {}", order_id, date);
            }
        }
        "decline" => {
            let id = arg(1, "proposal_id")?;
            let reason = args.get(2).map(String::as_str);
            let notice = report(state.allocation_api.decline(&id, &actor, reason, now))?;
            println!("{}", notice);
        }
        "show" => {
            let id = arg(1, "proposal_id")?;
            let proposal = report(state.allocation_api.get_proposal(&id))?;
            println!("{} [{}]", proposal.proposal_id, proposal.status);
            println!("{}", summary_of(&proposal.plan).render());
            for log in report(state.allocation_api.proposal_history(&id))? {
                println!(
                    "  {} {} {}",
                    log.action_ts.to_rfc3339(),
                    log.action_type.as_str(),
                    log.actor
                );
            }
        }
        "list" => {
            let status = args
                .get(1)
                .map(|raw| raw.parse::<ProposalStatus>())
                .transpose()
                .map_err(|e| anyhow!(e))?;
            for proposal in report(state.allocation_api.list_proposals(status))? {
                println!(
                    "{}  {:<9}  {}  allocations={}",
                    proposal.proposal_id,
                    proposal.status.as_str(),
                    proposal.created_at.to_rfc3339(),
                    proposal.plan.allocations.len()
                );
            }
        }
        "expire" => {
            let count = report(state.allocation_api.expire_stale(now))?;
            println!("expired: {}", count);
        }
        "import-bags" => {
            let path = arg(1, "csv")?;
            let summary = report(state.inventory_api.import_bags(Path::new(&path), &actor, now))?;
            print_import(&summary);
        }
        "import-orders" => {
            let path = arg(1, "csv")?;
            let summary =
                report(state.inventory_api.import_orders(Path::new(&path), &actor, now))?;
            print_import(&summary);
        }
        "mark-cleaned" => {
            let bag_id = arg(1, "bag_id")?;
            report(state.inventory_api.mark_cleaned(&bag_id, &actor, now))?;
            println!("{}", i18n::t("common.success"));
        }
        other => bail!("未知命令: {}\n{}", other, USAGE),
    }

    Ok(())
}

/// 中止类错误打印结构化通知，其余错误原样返回
fn report<T>(result: ApiResult<T>) -> anyhow::Result<T> {
    result.map_err(|err: ApiError| {
        if let Some(notice) = err.notice() {
            eprintln!("{}", notice);
        }
        match &err {
            ApiError::ProposalNotFound(id) => eprintln!(
                "{}",
                i18n::t_with_args("notice.proposal_not_found", &[("proposal_id", id.as_str())])
            ),
            ApiError::ProposalClosed {
                proposal_id,
                status,
            } => eprintln!(
                "{}",
                i18n::t_with_args(
                    "notice.proposal_closed",
                    &[
                        ("proposal_id", proposal_id.as_str()),
                        ("status", status.as_str())
                    ]
                )
            ),
            _ => {}
        }
        anyhow!(err)
    })
}

fn summary_of(plan: &regain_allocation::domain::AllocationPlan) -> PlanSummary {
    PlanSummary::from_report(&regain_allocation::engine::PlanningReport {
        plan: plan.clone(),
        ..Default::default()
    })
}

fn print_import(summary: &ImportSummary) {
    println!(
        "total={} imported={} rejected={}",
        summary.total_rows,
        summary.imported,
        summary.rejected.len()
    );
    for rejection in &summary.rejected {
        println!("  row {}: {}", rejection.row, rejection.reason);
    }
}
