use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{self, filter::EnvFilter};

use dmn_task_config::{
    DecisionKey, DecisionService, Variables,
    config::ServiceConfig,
    scenario::{ScenarioFile, ScenarioRunner},
};

/// DMN task configuration checker - evaluate decision tables and verify scenarios
#[derive(Parser, Debug)]
#[command(name = "dmn-task-config")]
#[command(about = "Evaluate DMN task configuration tables and check expected rows")]
#[command(version)]
struct Args {
    /// Directories holding `<decision-id>.dmn` resources (can be specified multiple times)
    #[arg(
        short = 'r',
        long = "resource-dir",
        help = "Resource directory (default: ./resources and ~/.dmn-task-config/resources)",
        value_name = "PATH",
        global = true
    )]
    resource_directories: Vec<PathBuf>,

    /// Maximum DMN resource size (in bytes)
    #[arg(
        long = "max-resource-size",
        default_value = "5242880", // 5MB
        help = "Maximum DMN resource size in bytes",
        global = true
    )]
    max_resource_size: u64,

    /// Maximum number of parsed decisions to cache
    #[arg(
        long = "decision-cache-size",
        default_value = "64",
        help = "Maximum number of parsed decisions to cache (0 disables caching)",
        global = true
    )]
    decision_cache_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one decision and print its results as JSON
    Evaluate {
        #[arg(long, default_value = dmn_task_config::TASK_CONFIGURATION_DMN)]
        domain: String,
        #[arg(long)]
        jurisdiction: String,
        #[arg(long = "case-type")]
        case_type: String,
        /// Input variable as name=value; JSON values are parsed, anything else is a string
        #[arg(long = "var", value_name = "NAME=VALUE")]
        variables: Vec<String>,
        /// JSON object file with input variables, applied before --var
        #[arg(long = "vars-file", value_name = "PATH")]
        variables_file: Option<PathBuf>,
        /// Print name/value rows instead of the full result
        #[arg(long)]
        rows: bool,
    },
    /// Run YAML scenario files and report mismatches
    Check {
        #[arg(required = true, value_name = "SCENARIO")]
        files: Vec<PathBuf>,
    },
    /// List available decision resources
    List {
        /// Glob applied to decision ids, e.g. 'wa-task-configuration-*'
        #[arg(long)]
        filter: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::debug!("Starting with arguments: {:?}", args);

    let config = create_config_from_args(&args);
    let service = DecisionService::new(config);

    match args.command {
        Command::Evaluate {
            domain,
            jurisdiction,
            case_type,
            variables,
            variables_file,
            rows,
        } => {
            let key = DecisionKey::new(domain, jurisdiction, case_type);
            let variables = collect_variables(variables_file.as_deref(), &variables)?;
            let result = service
                .evaluate(&key, &variables)
                .with_context(|| format!("Failed to evaluate {key}"))?;

            let output = if rows {
                serde_json::to_string_pretty(&result.output_rows()?)?
            } else {
                serde_json::to_string_pretty(&result)?
            };
            println!("{output}");
        }
        Command::Check { files } => run_checks(&service, &files)?,
        Command::List { filter } => {
            for resource in service.list_decisions(filter.as_deref())? {
                println!("{}\t{}", resource.decision_id, resource.file_path);
            }
        }
    }

    Ok(())
}

/// Create a ServiceConfig from command line arguments
fn create_config_from_args(args: &Args) -> ServiceConfig {
    let resource_directories = if args.resource_directories.is_empty() {
        vec![
            PathBuf::from("resources"),
            ServiceConfig::default_resource_directory(),
        ]
    } else {
        args.resource_directories.clone()
    };

    ServiceConfig {
        resource_directories,
        max_resource_size: args.max_resource_size,
        decision_cache_size: args.decision_cache_size,
    }
}

fn collect_variables(file: Option<&std::path::Path>, assignments: &[String]) -> Result<Variables> {
    let mut variables = match file {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Variables::from_json(&json)?
        }
        None => Variables::new(),
    };
    for assignment in assignments {
        let (name, value) = Variables::parse_assignment(assignment)?;
        variables.put_value(name, value);
    }
    Ok(variables)
}

fn run_checks(service: &DecisionService, files: &[PathBuf]) -> Result<()> {
    let runner = ScenarioRunner::new(service);
    let mut failed = 0usize;
    let mut total = 0usize;

    for path in files {
        let file = ScenarioFile::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        let reports = runner
            .run(&file)
            .with_context(|| format!("Failed to run {}", path.display()))?;

        for report in reports {
            total += 1;
            if report.passed {
                println!("PASS {} :: {}", file.decision, report.name);
            } else {
                failed += 1;
                println!("FAIL {} :: {}", file.decision, report.name);
                if let Some(summary) = report.mismatch_summary() {
                    println!("     {summary}");
                }
            }
        }
    }

    println!("{} passed, {failed} failed", total - failed);
    if failed > 0 {
        bail!("{failed} scenario(s) failed");
    }
    Ok(())
}
