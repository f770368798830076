//! 选举管理服务主入口

use election_service::{
    config::AppConfig, db, middleware::AppState, repository::Repositories, routes, telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("election-service {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    // 按优先级加载：.env.local > .env.development > .env
    if let Ok(env) = std::env::var("APP_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::from_filename(".env.development").ok();
    }
    dotenv::dotenv().ok();

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.server.environment,
        "Election service starting..."
    );

    // 3. 存储后端：内存或 PostgreSQL
    let repos = if config.database.is_memory() {
        tracing::warn!("Using in-memory storage, data will not survive a restart");
        Repositories::in_memory()
    } else {
        let pool = db::create_pool(&config.database).await?;
        if config.database.run_migrations {
            db::run_migrations(&pool).await?;
        }
        spawn_pool_metrics(pool.clone());
        Repositories::postgres(pool)
    };

    tracing::info!(backend = repos.backend_name(), "Storage initialized");

    // 4. 构建应用状态
    let app_state = Arc::new(AppState::build(config.clone(), repos)?);

    app_state
        .auth_service
        .ensure_bootstrap_admin(&config.bootstrap)
        .await?;

    // 5. 构建路由
    let app = routes::create_router(app_state);

    // 6. 启动服务器
    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(addr = %addr, "Server listening");

    // 7. 优雅关闭
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.server.graceful_shutdown_timeout_secs))
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 定期上报连接池指标
fn spawn_pool_metrics(pool: sqlx::PgPool) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(15));
        loop {
            interval.tick().await;
            if pool.is_closed() {
                break;
            }
            db::record_pool_metrics(&pool);
        }
    });
}

/// 优雅关闭信号处理
///
/// 收到信号后开始排空连接，超时后强制退出进程。
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }

    // 超时后强制关闭
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        std::process::exit(1);
    });
}

/// 打印帮助信息
fn print_help() {
    println!("election-service {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: election-service [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 ELECTION_ 前缀的环境变量完成，例如");
    println!("  ELECTION_SERVER__ADDR、ELECTION_DATABASE__URL、ELECTION_SECURITY__JWT_SECRET");
    println!("  兼容 PORT、DATABASE_URL、JWT_SECRET、JWT_EXPIRES_IN");
    println!("  DATABASE_URL=memory:// 使用内存存储");
}
