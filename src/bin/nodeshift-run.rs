use nodeshift::cli::{exit_on_parse_error, run_command};
use nodeshift::{NodeshiftConfig, RunTarget, TaskRunner};

#[tokio::main]
async fn main() {
    nodeshift::logging::init();

    let matches = run_command()
        .try_get_matches()
        .unwrap_or_else(|e| exit_on_parse_error(e));

    let arg = matches
        .get_one::<String>("target")
        .map(String::as_str)
        .unwrap_or_default();

    let config = match NodeshiftConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let target = RunTarget::resolve(arg);
    tracing::debug!(?target, "resolved run target");

    let mut runner = TaskRunner::new(config.runner, std::io::stdout());
    if let Err(e) = runner.run(&target).await {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}
