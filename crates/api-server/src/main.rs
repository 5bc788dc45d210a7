use std::process::ExitCode;

/// CLI surface:
///   --serve / --webui            HTTP server + daily scheduler
///   --serve-only / --webui-only  HTTP server only
///   --schedule                   scheduler daemon only
///   --no-notify                  skip the dispatcher
///   --single-notify              dispatch per ticker instead of batch
///   --force-run                  bypass the trading-calendar gate
/// With no mode flag, one batch runs and the process exits.
fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let flag = |name: &str| args.iter().any(|a| a == name);
    let options = api_server::CliOptions {
        serve: flag("--serve") || flag("--webui") || flag("--serve-only") || flag("--webui-only"),
        serve_only: flag("--serve-only") || flag("--webui-only"),
        schedule: flag("--schedule"),
        no_notify: flag("--no-notify"),
        single_notify: flag("--single-notify"),
        force_run: flag("--force-run"),
    };

    if let Some(unknown) = args.iter().find(|a| {
        a.starts_with("--")
            && ![
                "--serve",
                "--serve-only",
                "--webui",
                "--webui-only",
                "--schedule",
                "--no-notify",
                "--single-notify",
                "--force-run",
            ]
            .contains(&a.as_str())
    }) {
        eprintln!("unknown flag: {unknown}");
        return ExitCode::from(2);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(api_server::run(options)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(api_server::RunError::Config(e)) => {
            eprintln!("configuration error: {e}");
            ExitCode::from(2)
        }
        Err(api_server::RunError::Fatal(e)) => {
            eprintln!("fatal: {e:#}");
            ExitCode::from(1)
        }
    }
}
