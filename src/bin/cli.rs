use clap::{Parser, Subcommand};
use smart_certify::transport::{
    RedirectOnlyFlowFactory, RemoteValidationService, ReqwestClient,
};
use smart_certify::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "smart-certify")]
#[command(about = "Certify a SMART-on-FHIR server against the built-in test suite")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered tests
    List {
        /// Only tests supporting this use case (EHR, Financial, Security)
        #[arg(short, long)]
        use_case: Option<String>,
    },
    /// Show the execution stages for a configuration
    Plan {
        /// Path to the JSON configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the suite against the configured server
    Run {
        /// Path to the JSON configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::List { use_case } => list_tests(use_case.as_deref())?,
        Commands::Plan { config } => show_plan(&config).await?,
        Commands::Run { config, format } => run_suite(&config, &format).await?,
    }

    Ok(())
}

fn list_tests(use_case: Option<&str>) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let registry = TestRegistry::standard()?;

    let tests: Vec<_> = match use_case {
        Some(name) => {
            let use_case = UseCase::parse_str(name)
                .ok_or_else(|| CertifyError::config(format!("unknown use case \"{name}\"")))?;
            registry.by_use_case(use_case).to_vec()
        }
        None => registry.iter().cloned().collect(),
    };

    println!("Registered tests:");
    println!("=================");
    for test in tests {
        let versions: Vec<_> = test.versions.iter().map(ToString::to_string).collect();
        let use_cases: Vec<_> = test.use_cases.iter().map(ToString::to_string).collect();
        println!(
            "  {:<28} {:<12} [{}] ({})",
            test.slug,
            test.kind.label(),
            versions.join(", "),
            use_cases.join(", ")
        );
    }

    Ok(())
}

fn probe_context(
    config: CertifyConfig,
) -> std::result::Result<ProbeContext, Box<dyn std::error::Error>> {
    let http: Arc<ReqwestClient> = Arc::new(ReqwestClient::new()?);
    let validation = RemoteValidationService::new(config.validator.clone());
    Ok(ProbeContext {
        config: Arc::new(config),
        http: http.clone(),
        auth_flows: Arc::new(RedirectOnlyFlowFactory::new(http)),
        validation: Arc::new(validation),
    })
}

async fn show_plan(config_path: &PathBuf) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = CertifyConfig::from_file(config_path)?;
    let registry = Arc::new(TestRegistry::standard()?);
    let suite = SuiteRun::new(
        registry,
        probe_context(config)?,
        Arc::new(MemoryRecorder::new()),
    )
    .await?;

    let slugs: std::collections::HashMap<_, _> = suite
        .runs()
        .iter()
        .map(|r| (r.run_id, r.slug.as_str()))
        .collect();
    for (index, stage) in suite.plan().stages().iter().enumerate() {
        let names: Vec<_> = stage
            .iter()
            .filter_map(|run_id| slugs.get(run_id).copied())
            .collect();
        println!("Stage {}: {}", index + 1, names.join(", "));
    }

    Ok(())
}

async fn run_suite(
    config_path: &PathBuf,
    format: &str,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = CertifyConfig::from_file(config_path)?;
    let registry = Arc::new(TestRegistry::standard()?);
    let recorder = Arc::new(MemoryRecorder::new());

    let suite = SuiteRun::new(registry, probe_context(config)?, recorder.clone()).await?;
    suite.dispatch(&StagedDispatcher::new()).await;

    let reports = recorder.reports().await;
    let verdict = suite_verdict(reports.iter().filter_map(|r| r.verdict));

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        _ => {
            for report in &reports {
                match (&report.verdict, &report.message) {
                    (Some(verdict), _) => println!("  {:<28} {verdict}", report.slug),
                    (None, Some(reason)) => {
                        println!("  {:<28} {} ({reason})", report.slug, report.status)
                    }
                    (None, None) => println!("  {:<28} {}", report.slug, report.status),
                }
                for scenario in &report.scenarios {
                    if let Some(message) = &scenario.message {
                        println!("      - {}: {message}", scenario.title);
                    }
                }
            }
            match verdict {
                Verdict::Pass => println!("✅ Suite passed"),
                Verdict::Warn => println!("⚠️  Suite passed with warnings"),
                Verdict::Fail => println!("❌ Suite failed"),
            }
        }
    }

    Ok(())
}
