use clap::Parser;
use console::style;
use env_logger::Env;
use std::sync::Arc;
use swarm::cli::{read_targets, Args, ModuleKind};
use swarm::module::{http_probe, HttpProbe};
use swarm::ui::BatchProgress;
use swarm::work::{CommandUnit, ModuleUnit};
use swarm::{SwarmConfig, SwarmResult, TaskDispatcher, WorkUnit};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let log_level = if args.quiet {
        "error"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    log::info!("Swarm starting with args: {:?}", args);

    let targets = read_targets(args.input.as_deref())?;
    let config = match &args.config {
        Some(path) => SwarmConfig::load(path)?,
        None => SwarmConfig::default(),
    };

    let mut dispatcher = TaskDispatcher::new(args.dispatch_config()?)?;
    if !args.fail_fast {
        dispatcher = dispatcher.with_progress(BatchProgress::new(targets.len() as u64, args.quiet));
    }

    match (args.module, args.command.as_deref()) {
        (Some(ModuleKind::HttpProbe), _) => {
            let options = Arc::new(config.module(http_probe::NAME));
            let overrides = args.retry_overrides()?;
            let unit = ModuleUnit::new(move || {
                HttpProbe::new(Arc::clone(&options), overrides.clone())
            })
            .plain(args.plain);
            execute(&dispatcher, unit, "", &targets, &args)?;
        }
        (None, Some(command)) => {
            execute(&dispatcher, CommandUnit::new(), command, &targets, &args)?;
        }
        (None, None) => return Err("either a command template or --module is required".into()),
    }

    Ok(())
}

fn execute<W>(
    dispatcher: &TaskDispatcher,
    unit: W,
    command: &str,
    targets: &[String],
    args: &Args,
) -> SwarmResult<()>
where
    W: WorkUnit<(), Output = Vec<String>>,
{
    if args.fail_fast {
        let active: Vec<String> = targets
            .iter()
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect();
        let commands = vec![command.to_string(); active.len()];
        let aux = vec![(); active.len()];

        let outputs = dispatcher.run_mapped(&unit, &active, &commands, &aux)?;
        for (target, lines) in active.iter().zip(&outputs) {
            print_lines(target, lines, args.plain);
        }
        return Ok(());
    }

    let report = dispatcher.run_batch(Arc::new(unit), command, targets, Arc::new(()))?;
    for result in &report.results {
        print_lines(&result.target, &result.value, args.plain);
    }

    if !args.quiet {
        eprintln!();
        eprintln!("{}", report.summary());
    }
    Ok(())
}

fn print_lines(target: &str, lines: &[String], plain: bool) {
    for line in lines {
        if plain {
            println!("{}\t{}", target, line);
        } else {
            println!("{} {}", style(format!("[{}]", target)).cyan().bold(), line);
        }
    }
}
