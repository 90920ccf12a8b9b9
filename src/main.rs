//! Health Map 命令行入口
//! 通过客户端库完成登录、登出与数据查询

use std::io::{BufRead, Write};

use health_map_client::{
    config::ClientConfig,
    models::{auth::RegisterRequest, gamification::LeaderboardPeriod},
    telemetry, ApiError, AuthState, HealthMap,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().skip(1).collect();

    let Some(command) = args.first().map(String::as_str) else {
        print_help();
        return Ok(());
    };

    match command {
        "--version" | "-V" => {
            println!("health-map {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        "--help" | "-h" => {
            print_help();
            return Ok(());
        }
        _ => {}
    }

    // 加载 .env 文件（开发环境）
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();

    // 1. 加载配置
    let config = ClientConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config.logging);

    // 3. 构建客户端并恢复会话
    let app = HealthMap::from_config(config)?;
    let state = app.auth.initialize().await;
    tracing::debug!(authenticated = state.is_authenticated(), "Session initialized");

    let result = run(&app, command, &args[1..]).await;

    if let Err(e) = &result {
        if let Some(api_error) = e.downcast_ref::<ApiError>() {
            report(api_error);
            std::process::exit(if api_error.is_session_expired() { 2 } else { 1 });
        }
    }

    result
}

async fn run(app: &HealthMap, command: &str, args: &[String]) -> anyhow::Result<()> {
    match command {
        "login" => {
            let username = args
                .first()
                .ok_or_else(|| anyhow::anyhow!("Usage: health-map login <username>"))?;
            let password = read_password()?;
            let user = app.auth.login(username, &password).await?;
            println!("Logged in as {}", user.display_name());
        }
        "register" => {
            let (Some(username), Some(email)) = (args.first(), args.get(1)) else {
                anyhow::bail!("Usage: health-map register <username> <email>");
            };
            let password = read_password()?;
            let request = RegisterRequest {
                username: username.clone(),
                email: email.clone(),
                password: password.clone(),
                password_confirm: password,
                first_name: None,
                last_name: None,
            };
            let user = app.auth.register(&request).await?;
            println!("Welcome, {}!", user.display_name());
        }
        "logout" => {
            app.auth.logout();
            println!("Logged out");
        }
        "whoami" => match app.auth.state() {
            AuthState::Authenticated(user) => {
                let role = if user.is_moderator() { " (moderator)" } else { "" };
                println!("{} <{}>{}", user.username, user.email, role);
            }
            _ => println!("Not logged in"),
        },
        "categories" => {
            for category in app.maps.categories().await? {
                println!("{:>4}  {}", category.id, category.name);
            }
        }
        "leaderboard" => {
            let period = match args.first() {
                Some(p) => p.parse::<LeaderboardPeriod>().map_err(anyhow::Error::msg)?,
                None => LeaderboardPeriod::default(),
            };
            for entry in app.gamification.leaderboard(period).await? {
                println!("{:>3}. {:<24} {:>8}", entry.rank, entry.username, entry.points);
            }
        }
        other => {
            eprintln!("未知命令: {}", other);
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

/// 密码优先从 HEALTHMAP_PASSWORD 读取，否则从标准输入读取一行
fn read_password() -> anyhow::Result<String> {
    if let Ok(password) = std::env::var("HEALTHMAP_PASSWORD") {
        if !password.is_empty() {
            return Ok(password);
        }
    }

    eprint!("Password: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn report(error: &ApiError) {
    if error.is_session_expired() {
        eprintln!("Session expired. Run `health-map login <username>` to sign in again.");
        return;
    }

    eprintln!("Error: {}", error.user_message());
    if let Some(fields) = error.field_errors() {
        for (field, messages) in fields {
            for message in messages {
                eprintln!("  {}: {}", field, message);
            }
        }
    }
}

fn print_help() {
    println!(
        r#"health-map {}

用法: health-map <命令> [参数]

命令:
  login <username>             登录（密码读取自 HEALTHMAP_PASSWORD 或标准输入）
  register <username> <email>  注册新账户
  logout                       清除本地会话
  whoami                       显示当前用户
  categories                   列出兴趣点分类
  leaderboard [period]         排行榜（weekly, monthly, all_time）

选项:
  --version    显示版本信息
  --help       显示帮助信息

环境变量:
  HEALTHMAP_API__BASE_URL      后端地址（默认 http://localhost:8000/api）
  HEALTHMAP_STORAGE__PATH      凭据文件路径
  HEALTHMAP_LOGGING__LEVEL     日志级别"#,
        env!("CARGO_PKG_VERSION")
    );
}
