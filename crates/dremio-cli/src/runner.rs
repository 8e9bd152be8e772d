use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use dremio_client::error::DremioError;
use dremio_client::{PollOptions, ReflectionSpec, SourceSpec};
use dremio_common::config::AppConfig;
use dremio_operators::connection_store::EnvConnectionStore;
use dremio_operators::context::{Operator, TaskContext};
use dremio_operators::error::OperatorError;
use dremio_operators::hook::DremioHook;
use dremio_operators::reflection::CreateReflectionOperator;
use dremio_operators::registry::PROVIDER_INFO;
use dremio_operators::sensor::JobSensor;
use dremio_operators::source::{ConflictPolicy, CreateSourceOperator};
use dremio_telemetry::telemetry::{init_telemetry, shutdown_telemetry, ResourceOptions};
use log::{info, warn};
use serde_json::Value;

/// The time an interrupted operator is given to stop on its own.
const INTERRUPT_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(version, name = "dremio-provider", about = "Run Dremio operators")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConnectionArgs {
    /// The connection id, read from the `DREMIO_CONN_<ID>` environment variable
    #[arg(long, default_value = DremioHook::DEFAULT_CONN_ID)]
    conn_id: String,
}

#[derive(Args)]
struct PollArgs {
    /// Seconds between two status checks
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    check_interval: Option<u64>,
    /// Seconds to wait before giving up
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the provider registration table
    Providers,
    /// Create or update a reflection on a dataset
    CreateReflection {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// The dataset path, e.g. `space.folder.table`
        #[arg(long)]
        source: String,
        /// The reflection spec as JSON, or `@path` to a JSON file
        #[arg(long, value_name = "JSON")]
        spec: String,
        #[arg(long)]
        auto_inference: bool,
        /// Wait for the reflection refresh to complete
        #[arg(long)]
        wait: bool,
        #[command(flatten)]
        poll: PollArgs,
        /// Required for virtual datasets
        #[arg(long)]
        sql_query: Option<String>,
        #[arg(long)]
        reflection_queue: Option<String>,
        /// The acceleration refresh policy as JSON, or `@path` to a JSON file
        #[arg(long, value_name = "JSON")]
        refresh_settings: Option<String>,
    },
    /// Create a source
    CreateSource {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// The source spec as JSON, or `@path` to a JSON file
        #[arg(long, value_name = "JSON")]
        spec: String,
        #[arg(long, default_value_t = ConflictPolicy::Fail)]
        on_conflict: ConflictPolicy,
    },
    /// Wait for a job to complete
    WaitJob {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[arg(long)]
        job_id: String,
        #[command(flatten)]
        poll: PollArgs,
    },
}

fn read_json(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => arg.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

fn poll_options(config: &AppConfig, args: &PollArgs) -> PollOptions {
    let mut options = PollOptions::from_config(&config.poll);
    if let Some(interval) = args.check_interval {
        options = options.with_interval(Duration::from_secs(interval));
    }
    if let Some(timeout) = args.timeout {
        options = options.with_timeout(Duration::from_secs(timeout));
    }
    options
}

fn hook(config: &AppConfig, connection: ConnectionArgs) -> DremioHook {
    DremioHook::new(connection.conn_id, Arc::new(EnvConnectionStore))
        .with_client_config(config.client.clone())
}

fn build_operator(
    config: &AppConfig,
    command: Command,
) -> Result<Box<dyn Operator>, Box<dyn std::error::Error>> {
    let operator: Box<dyn Operator> = match command {
        Command::Providers => return Err(OperatorError::invalid("not an operator command").into()),
        Command::CreateReflection {
            connection,
            source,
            spec,
            auto_inference,
            wait,
            poll,
            sql_query,
            reflection_queue,
            refresh_settings,
        } => {
            let spec = ReflectionSpec::from_value(read_json(&spec)?)?;
            let refresh_settings = refresh_settings.as_deref().map(read_json).transpose()?;
            Box::new(
                CreateReflectionOperator::new(hook(config, connection), source, spec)
                    .with_auto_inference(auto_inference)
                    .with_wait_for_completion(wait)
                    .with_poll_options(poll_options(config, &poll))
                    .with_sql_query(sql_query)
                    .with_reflection_queue(reflection_queue)
                    .with_refresh_settings(refresh_settings),
            )
        }
        Command::CreateSource {
            connection,
            spec,
            on_conflict,
        } => {
            let spec = SourceSpec::from_value(read_json(&spec)?)?;
            Box::new(
                CreateSourceOperator::new(hook(config, connection), spec)
                    .with_conflict_policy(on_conflict),
            )
        }
        Command::WaitJob {
            connection,
            job_id,
            poll,
        } => Box::new(
            JobSensor::new(hook(config, connection), job_id)
                .with_poll_options(poll_options(config, &poll)),
        ),
    };
    Ok(operator)
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for interrupts: {e}");
        std::future::pending::<()>().await
    }
}

/// Runs the operator until it finishes. Ctrl-C asks the operator to stop polling.
async fn run_operator(operator: &dyn Operator) -> Result<Value, OperatorError> {
    run_operator_until(operator, ctrl_c).await
}

/// Runs the operator until it finishes or is interrupted.
///
/// The first interrupt cancels the task context. The run is abandoned on a second
/// interrupt, or when the operator has not stopped within the grace period.
async fn run_operator_until<S, F>(operator: &dyn Operator, interrupt: S) -> Result<Value, OperatorError>
where
    S: Fn() -> F,
    F: Future<Output = ()>,
{
    let context = TaskContext::new(operator.name());
    let name = operator.name();
    let interrupted = async {
        interrupt().await;
        warn!("interrupt received, cancelling {name}");
        context.cancel();
        tokio::select! {
            () = interrupt() => warn!("second interrupt received, stopping {name}"),
            () = tokio::time::sleep(INTERRUPT_GRACE_PERIOD) => {
                warn!(
                    "{name} did not stop within {} seconds",
                    INTERRUPT_GRACE_PERIOD.as_secs()
                );
            }
        }
    };
    tokio::select! {
        result = operator.execute(&context) => result,
        () = interrupted => Err(DremioError::Interrupted(format!("{name} was interrupted")).into()),
    }
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(args);

    if let Command::Providers = cli.command {
        println!("{}", serde_json::to_string_pretty(&PROVIDER_INFO)?);
        return Ok(());
    }

    let config = AppConfig::load()?;
    let operator = build_operator(&config, cli.command)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let resource = ResourceOptions { kind: "cli" };
        init_telemetry(&config.telemetry, resource)
    })?;

    info!("running {}", operator.name());
    let result = runtime.block_on(run_operator(operator.as_ref()));

    shutdown_telemetry();

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use clap::CommandFactory;
    use dremio_operators::error::OperatorResult;
    use figment::Jail;
    use serde_json::json;
    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create_source() {
        let cli = Cli::parse_from([
            "dremio-provider",
            "create-source",
            "--spec",
            r#"{"name": "lake"}"#,
            "--on-conflict",
            "ignore",
        ]);
        match cli.command {
            Command::CreateSource {
                connection,
                on_conflict,
                ..
            } => {
                assert_eq!(connection.conn_id, "dremio_default");
                assert_eq!(on_conflict, ConflictPolicy::Ignore);
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn test_read_json() {
        Jail::expect_with(|jail| {
            jail.create_file("spec.json", r#"{"name": "raw", "type": "RAW"}"#)?;
            let value = read_json("@spec.json").map_err(|e| e.to_string())?;
            assert_eq!(value, json!({"name": "raw", "type": "RAW"}));
            assert_eq!(read_json("[1]").unwrap(), json!([1]));
            assert!(read_json("{name").is_err());
            assert!(read_json("@missing.json").is_err());
            Ok(())
        });
    }

    #[test]
    fn test_poll_options_override_config() {
        Jail::expect_with(|jail| {
            jail.set_env("DREMIO__POLL__INTERVAL_SECS", "5");
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            let options = poll_options(
                &config,
                &PollArgs {
                    check_interval: None,
                    timeout: Some(30),
                },
            );
            assert_eq!(options.interval, Duration::from_secs(5));
            assert_eq!(options.timeout, Duration::from_secs(30));
            Ok(())
        });
    }

    #[test]
    fn test_poll_args_reject_zero() {
        let parse = |flag: &str, value: &str| {
            Cli::try_parse_from(["dremio-provider", "wait-job", "--job-id", "j1", flag, value])
        };
        assert!(parse("--check-interval", "0").is_err());
        assert!(parse("--timeout", "0").is_err());
        assert!(parse("--check-interval", "5").is_ok());
        assert!(parse("--timeout", "30").is_ok());
    }

    struct StuckOperator;

    #[async_trait]
    impl Operator for StuckOperator {
        fn name(&self) -> &'static str {
            "stuck"
        }

        async fn execute(&self, _context: &TaskContext) -> OperatorResult<Value> {
            std::future::pending().await
        }
    }

    struct CooperativeOperator;

    #[async_trait]
    impl Operator for CooperativeOperator {
        fn name(&self) -> &'static str {
            "cooperative"
        }

        async fn execute(&self, context: &TaskContext) -> OperatorResult<Value> {
            context.cancelled().await;
            Ok(json!("stopped"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_cancels_operator() {
        let start = Instant::now();
        let result = run_operator_until(&CooperativeOperator, || {
            tokio::time::sleep(Duration::from_secs(1))
        })
        .await;
        assert_eq!(result.unwrap(), json!("stopped"));
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_interrupt_stops_operator() {
        let start = Instant::now();
        let result = run_operator_until(&StuckOperator, || {
            tokio::time::sleep(Duration::from_secs(1))
        })
        .await;
        assert!(matches!(
            result,
            Err(OperatorError::Client(DremioError::Interrupted(_)))
        ));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_stops_operator() {
        let calls = AtomicUsize::new(0);
        let start = Instant::now();
        let result = run_operator_until(&StuckOperator, || {
            let delay = match calls.fetch_add(1, Ordering::SeqCst) {
                0 => 1,
                _ => 3600,
            };
            tokio::time::sleep(Duration::from_secs(delay))
        })
        .await;
        assert!(matches!(
            result,
            Err(OperatorError::Client(DremioError::Interrupted(_)))
        ));
        assert_eq!(
            start.elapsed(),
            Duration::from_secs(1) + INTERRUPT_GRACE_PERIOD
        );
    }
}
