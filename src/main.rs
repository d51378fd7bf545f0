// ==========================================
// 合作社后台 - 命令行入口
// ==========================================
// 输出: 成功/失败结果均以 JSON 写到 stdout，日志写到 stderr
// ==========================================

use clap::{Parser, Subcommand, ValueEnum};
use coop_backoffice::api::ApiError;
use coop_backoffice::app::{get_default_db_path, AppState, DB_PATH_ENV};
use coop_backoffice::{BatchStatus, DomainKind};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Kind {
    Member,
    Loan,
    Contribution,
    Transaction,
}

impl From<Kind> for DomainKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Member => DomainKind::Member,
            Kind::Loan => DomainKind::Loan,
            Kind::Contribution => DomainKind::Contribution,
            Kind::Transaction => DomainKind::Transaction,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StatusFilter {
    Pending,
    Validated,
    PendingValidation,
    Processed,
    Rejected,
}

impl From<StatusFilter> for BatchStatus {
    fn from(status: StatusFilter) -> Self {
        match status {
            StatusFilter::Pending => BatchStatus::Pending,
            StatusFilter::Validated => BatchStatus::Validated,
            StatusFilter::PendingValidation => BatchStatus::PendingValidation,
            StatusFilter::Processed => BatchStatus::Processed,
            StatusFilter::Rejected => BatchStatus::Rejected,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "coop-backoffice", version, about = "合作社后台 - 批量导入、审核与入账")]
struct Cli {
    /// 数据库文件路径（缺省读取 COOP_BACKOFFICE_DB_PATH，再缺省为用户数据目录）
    #[arg(long, global = true)]
    db: Option<String>,

    /// 以 JSON 格式输出日志
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 上传表格（.xlsx / .csv）并暂存为新批次
    Ingest {
        #[arg(value_enum)]
        kind: Kind,
        file: PathBuf,
        /// 上传人
        #[arg(long)]
        user: String,
    },
    /// 列出待审核行
    Pending {
        #[arg(value_enum)]
        kind: Kind,
    },
    /// 审批批次并入账
    Approve {
        batch_id: String,
        /// 审批人
        #[arg(long)]
        user: String,
    },
    /// 驳回批次
    Reject {
        batch_id: String,
        /// 驳回人
        #[arg(long)]
        user: String,
        /// 驳回原因
        #[arg(long)]
        reason: String,
    },
    /// 按业务域列出批次
    Batches {
        #[arg(value_enum)]
        kind: Kind,
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,
    },
    /// 查看单个批次的暂存行
    Rows { batch_id: String },
    /// 写入默认科目
    SeedCategories,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.json_log {
        coop_backoffice::logging::init_json();
    } else {
        coop_backoffice::logging::init();
    }

    let db_path = cli.db.clone().unwrap_or_else(get_default_db_path);
    tracing::debug!(db_path = %db_path, env = DB_PATH_ENV, "使用数据库");

    let state = match AppState::new(db_path) {
        Ok(state) => state,
        Err(e) => {
            print_json(&json!({ "error": "DATABASE_ERROR", "message": e, "retryable": false }));
            return ExitCode::FAILURE;
        }
    };

    match run(&state, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "命令执行失败");
            print_json(&json!({
                "error": e.code(),
                "message": e.to_string(),
                "retryable": e.is_retryable(),
            }));
            ExitCode::FAILURE
        }
    }
}

async fn run(state: &AppState, command: Command) -> Result<(), ApiError> {
    let api = &state.batch_api;
    match command {
        Command::Ingest { kind, file, user } => {
            let bytes = tokio::fs::read(&file)
                .await
                .map_err(|e| ApiError::InvalidInput(format!("无法读取文件 {}: {}", file.display(), e)))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            print_json(&api.ingest_batch(kind.into(), &file_name, bytes, &user).await?);
        }
        Command::Pending { kind } => print_json(&api.list_pending_rows(kind.into())?),
        Command::Approve { batch_id, user } => {
            print_json(&api.approve_batch(&batch_id, &user).await?)
        }
        Command::Reject {
            batch_id,
            user,
            reason,
        } => print_json(&api.reject_batch(&batch_id, &user, &reason).await?),
        Command::Batches { kind, status } => {
            print_json(&api.list_batches(kind.into(), status.map(BatchStatus::from))?)
        }
        Command::Rows { batch_id } => print_json(&api.list_batch_rows(&batch_id)?),
        Command::SeedCategories => {
            let count = state
                .seed_default_categories()
                .map_err(ApiError::DatabaseError)?;
            print_json(&json!({ "seeded": count }));
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("JSON 序列化失败: {}", e),
    }
}
