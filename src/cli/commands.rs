use crate::{
    cli::args::{ExplainArgs, ExplainFormat, ListArgs, NextArgs, RunArgs, ServeArgs},
    cli::CommandOutcome,
    core::{
        config::effective_schedule,
        error::FlowError,
        flow::{build_explain_output, flow_to_dot, parse_assignment_for, ParameterValues},
        ConfigLoader, CronSchedule, FlowGraph, FlowRunner, HomeflowConfig, RunResult, Scheduler,
    },
    jobs::{self, JobDefinition, JobDeps},
    Result,
};
use anyhow::{anyhow, bail, Context};
use chrono::Local;
use std::path::Path;

fn load_config(path: Option<&Path>) -> Result<HomeflowConfig> {
    ConfigLoader::load(path).context("loading configuration")
}

fn find_job(name: &str) -> Result<&'static JobDefinition> {
    jobs::find(name)
        .ok_or_else(|| anyhow!("unknown job '{}' (run `homeflow list` to see jobs)", name))
}

fn parse_params(graph: &FlowGraph, raw: &[String]) -> Result<ParameterValues> {
    let mut values = ParameterValues::new();
    for assignment in raw {
        let (name, value) = parse_assignment_for(graph.parameters(), assignment)
            .map_err(|err| anyhow!("[{}] {}", err.code(), err))?;
        values.insert(name, value);
    }
    Ok(values)
}

fn flow_error(err: FlowError) -> anyhow::Error {
    anyhow!("[{}] {}", err.code(), err)
}

fn build_flow(job: &JobDefinition, config: &HomeflowConfig, deps: &JobDeps) -> Result<FlowGraph> {
    job.build(config, deps)
        .map_err(flow_error)
        .with_context(|| format!("building flow for job '{}'", job.name))
}

fn print_run_table(result: &RunResult) {
    println!(
        "{} {} {} ({} ms)",
        result.flow,
        result.run_id,
        match result.status() {
            crate::core::RunStatus::Success => "succeeded",
            crate::core::RunStatus::Failed => "failed",
        },
        result.duration_ms()
    );
    let width = result.tasks.keys().map(String::len).max().unwrap_or(0);
    for (name, record) in &result.tasks {
        let mut line = format!("  {:<width$}  {:<8}", name, record.state.as_str(), width = width);
        if !record.children.is_empty() {
            line.push_str(&format!("  [{} children]", record.children.len()));
        }
        if let Some(error) = &record.error {
            line.push_str(&format!("  {}", error));
        }
        println!("{}", line.trim_end());
    }
}

pub async fn run(args: RunArgs) -> Result<CommandOutcome> {
    let job = find_job(&args.job)?;
    let mut config = load_config(args.config.as_deref())?;
    if let Some(parallel) = args.parallel {
        if parallel == 0 {
            bail!("--parallel must be at least 1");
        }
        config.runner.parallel_limit = parallel;
    }
    let deps = JobDeps::from_config(&config).context("preparing job collaborators")?;
    let graph = build_flow(job, &config, &deps)?;
    let params = parse_params(&graph, &args.params)?;
    let runner =
        FlowRunner::new(config.runner.runner_config()).with_secrets(deps.secrets.clone());

    tracing::info!(job = job.name, tasks = graph.len(), "running job");
    let result = runner
        .run(&graph, params)
        .await
        .map_err(|err| anyhow!("[{}] {}", err.code(), err))
        .with_context(|| format!("starting job '{}'", job.name))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_run_table(&result);
    }

    if result.is_success() {
        Ok(CommandOutcome::Success)
    } else {
        if let Some((task, error)) = result.first_error() {
            tracing::warn!(job = job.name, task, code = %error.code, "job finished with failures");
        }
        Ok(CommandOutcome::TasksFailed)
    }
}

pub async fn serve(args: ServeArgs) -> Result<CommandOutcome> {
    let job = find_job(&args.job)?;
    let config = load_config(args.config.as_deref())?;

    let schedule = match &args.cron {
        Some(expr) => Some(
            CronSchedule::parse(expr)
                .map_err(|err| anyhow!("[{}] {}", err.code(), err))
                .context("parsing --cron")?,
        ),
        None => effective_schedule(&config, job.name, job.default_schedule)?,
    };
    let schedule = schedule.ok_or_else(|| {
        anyhow!(
            "job '{}' has no schedule; pass --cron or set jobs.{}.schedule",
            job.name,
            job.name
        )
    })?;

    let deps = JobDeps::from_config(&config).context("preparing job collaborators")?;
    let graph = build_flow(job, &config, &deps)?;
    let params = parse_params(&graph, &args.params)?;
    let runner =
        FlowRunner::new(config.runner.runner_config()).with_secrets(deps.secrets.clone());
    let scheduler = Scheduler::new(schedule);

    println!("serving {} on '{}'", job.name, scheduler.schedule());
    let mut failed_runs = 0usize;
    let served = tokio::select! {
        summary = scheduler.serve(&graph, &runner, params, args.max_runs, |result| {
            if !result.is_success() {
                failed_runs += 1;
            }
            print_run_table(result);
        }) => Some(summary.map_err(flow_error)?),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(job = job.name, "interrupted, stopping scheduler");
            None
        }
    };

    if let Some(summary) = served {
        println!(
            "{} runs, {} failed, {} ticks skipped",
            summary.runs, summary.failed_runs, summary.missed_ticks
        );
    }
    if failed_runs > 0 {
        Ok(CommandOutcome::TasksFailed)
    } else {
        Ok(CommandOutcome::Success)
    }
}

pub fn list(args: ListArgs) -> Result<CommandOutcome> {
    let config = load_config(args.config.as_deref())?;
    let width = jobs::registry().iter().map(|job| job.name.len()).max().unwrap_or(0);
    for job in jobs::registry() {
        let schedule = config
            .jobs
            .schedule_override(job.name)
            .or(job.default_schedule)
            .unwrap_or("manual");
        println!(
            "{:<width$}  {:<12}  {}",
            job.name,
            schedule,
            job.description,
            width = width
        );
    }
    Ok(CommandOutcome::Success)
}

pub fn explain(args: ExplainArgs) -> Result<CommandOutcome> {
    let job = find_job(&args.job)?;
    let config = load_config(args.config.as_deref())?;
    let deps = JobDeps::from_config(&config).context("preparing job collaborators")?;
    let graph = build_flow(job, &config, &deps)?;

    match args.format {
        ExplainFormat::Text => print!("{}", build_explain_output(&graph).to_text()),
        ExplainFormat::Dot => println!("{}", flow_to_dot(&graph)),
        ExplainFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&build_explain_output(&graph))?
        ),
    }
    Ok(CommandOutcome::Success)
}

pub fn next(args: NextArgs) -> Result<CommandOutcome> {
    let schedule = CronSchedule::parse(&args.expr).map_err(|err| anyhow!("[{}] {}", err.code(), err))?;
    for instant in schedule
        .upcoming(&Local::now(), args.count)
        .map_err(|err| anyhow!("[{}] {}", err.code(), err))?
    {
        println!("{}", instant.to_rfc3339());
    }
    Ok(CommandOutcome::Success)
}
