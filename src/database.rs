//! # 数据库模块
//!
//! 数据库连接和迁移管理

use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, linfo};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;

/// 隐藏连接串中的凭据部分
fn redact_url(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => database_url.to_string(),
    }
}

/// SQLite 文件路径（内存库返回 None）
fn sqlite_file_path(database_url: &str) -> Option<&Path> {
    if !database_url.starts_with("sqlite:") || database_url.contains(":memory:") {
        return None;
    }
    let raw = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = raw.split('?').next().unwrap_or(raw);
    Some(Path::new(path))
}

/// 初始化数据库连接
pub async fn init_database(
    database_url: &str,
    max_connections: u32,
) -> Result<DatabaseConnection, DbErr> {
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Database,
        "connect",
        "正在连接数据库",
        url = redact_url(database_url)
    );

    // SQLite 文件数据库需要先创建父目录
    if let Some(parent) = sqlite_file_path(database_url).and_then(Path::parent) {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbErr::Custom(format!("无法创建数据库目录 {}: {e}", parent.display()))
            })?;
            ldebug!(
                "system",
                LogStage::Startup,
                LogComponent::Database,
                "create_db_dir",
                "创建数据库目录",
                path = parent.display().to_string()
            );
        }
    }

    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(max_connections.max(1))
        .connect_timeout(Duration::from_secs(30))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Database,
        "connected",
        "数据库连接成功"
    );
    Ok(db)
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    match ::migration::Migrator::up(db, None).await {
        Ok(()) => {
            linfo!(
                "system",
                LogStage::Startup,
                LogComponent::Database,
                "migrated",
                "数据库迁移完成"
            );
            Ok(())
        }
        Err(e) => {
            lerror!(
                "system",
                LogStage::Startup,
                LogComponent::Database,
                "migration_failed",
                "数据库迁移失败",
                error = e.to_string()
            );
            Err(e)
        }
    }
}
