use clap::{CommandFactory, Parser};
use console::style;

use dandori::cli::{Args, Command};
use dandori::pipeline::{Pipeline, Registry, TaskId};
use dandori::task::Context;
use dandori::{Mode, Project, logging, scaffold, watch};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init();

    // The one place where the environment decides anything.
    let mode = Mode::from_env();
    let project = Project::locate(mode)?;

    eprintln!(
        "Running {} in {} mode.",
        style("dandori").red(),
        style(mode.as_str()).blue()
    );

    match args.command {
        Command::Clean => run_pipeline(Pipeline::single(TaskId::Clean), &project)?,
        Command::Copy => run_pipeline(Pipeline::single(TaskId::Copy), &project)?,
        Command::CopyChange => run_pipeline(Pipeline::single(TaskId::CopyChange), &project)?,
        Command::CompileTs => run_pipeline(Pipeline::single(TaskId::Scripts), &project)?,
        Command::CompileLess => run_pipeline(Pipeline::single(TaskId::Styles), &project)?,
        Command::MinifyWxml => run_pipeline(Pipeline::single(TaskId::Markup), &project)?,
        Command::MinifyJson => run_pipeline(Pipeline::single(TaskId::Data), &project)?,
        Command::MinifyImage => run_pipeline(Pipeline::single(TaskId::Images), &project)?,
        Command::Compile => run_pipeline(Pipeline::compile(), &project)?,
        Command::Build => run_pipeline(Pipeline::build(), &project)?,
        Command::Watch => {
            let registry = Registry::standard(&project)?;
            let ctx = Context { project: &project };

            let report = Pipeline::compile().run(&registry, &ctx)?;
            report.log();

            watch::run(&project, &registry, watch::WATCHED_TASKS)?;
        }
        Command::Create(create) => match create.target() {
            Some((kind, name)) => {
                scaffold::create(&project, kind, name, &create.src)?;
            }
            None => print_create_help()?,
        },
    }

    Ok(())
}

fn run_pipeline(pipeline: Pipeline, project: &Project) -> anyhow::Result<()> {
    let registry = Registry::standard(project)?;
    let ctx = Context { project };

    let report = pipeline.run(&registry, &ctx)?;
    report.log();

    let failed = report.failed();
    if failed > 0 {
        tracing::warn!("{failed} files failed, see the log above");
    }

    Ok(())
}

fn print_create_help() -> anyhow::Result<()> {
    let mut command = Args::command();
    if let Some(create) = command.find_subcommand_mut("create") {
        create.print_help()?;
    }
    Ok(())
}
