// Command line entry point.
//
// Usage:
//   beatwalk [PROJECT.ron] [OPTIONS]
//     --bpm <N>                    Starting tempo (overrides the project)
//     --output <log|samples|midi>  Where onsets go (overrides the project)
//
// Without a project file the built-in defaults are used and relative paths
// resolve against the working directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use beatwalk::audio::{LogTrigger, MidiTrigger, SampleOutput, SoundTrigger, start_sample_output};
use beatwalk::project::resolve;
use beatwalk::timing::{Scheduler, SystemClock, seeded_source};
use beatwalk::ui::LineEndings;
use beatwalk::{Output, Project, Result, midi, spawn_engine, ui};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

struct Args {
    project: Option<PathBuf>,
    bpm: Option<u32>,
    output: Option<Output>,
}

fn main() {
    let args = parse_args();
    if let Err(e) = run(args) {
        error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn parse_args() -> Args {
    let mut parsed = Args {
        project: None,
        bpm: None,
        output: None,
    };
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--bpm" => {
                i += 1;
                parsed.bpm = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .filter(|&bpm: &u32| bpm > 0)
                    .or_else(|| {
                        eprintln!("--bpm requires a positive integer");
                        std::process::exit(1);
                    });
            }
            "--output" => {
                i += 1;
                parsed.output = match args.get(i).map(String::as_str) {
                    Some("log") => Some(Output::Log),
                    Some("samples") => Some(Output::Samples),
                    Some("midi") => Some(Output::Midi { port: None }),
                    _ => {
                        eprintln!("--output requires one of: log, samples, midi");
                        std::process::exit(1);
                    }
                };
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
            path => {
                if parsed.project.replace(PathBuf::from(path)).is_some() {
                    eprintln!("Only one project file can be given");
                    std::process::exit(1);
                }
            }
        }
        i += 1;
    }

    parsed
}

fn print_usage() {
    println!("Usage: beatwalk [PROJECT.ron] [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --bpm <N>                    Starting tempo");
    println!("  --output <log|samples|midi>  Where onsets go");
    println!("  --help, -h                   Show this help");
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(|| LineEndings(std::io::stderr()))
                .init();
        }
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let (mut project, base) = match &args.project {
        Some(path) => {
            let base = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            (Project::load(path)?, base)
        }
        None => (Project::default(), PathBuf::from(".")),
    };
    if let Some(bpm) = args.bpm {
        project.bpm = bpm;
    }
    if let Some(output) = args.output {
        // `--output midi` keeps a port chosen in the project file.
        let keep_port = matches!(
            (&output, &project.output),
            (Output::Midi { port: None }, Output::Midi { port: Some(_) })
        );
        if !keep_port {
            project.output = output;
        }
    }
    project.validate()?;

    let log_file = project.log_file.as_deref().map(|p| resolve(&base, p));
    init_logging(log_file.as_deref())?;

    project.verify_assets(&base)?;
    let config = project.scheduler_config(&base)?;

    // The sample stream has to stay on this thread for as long as the
    // scheduler plays.
    let mut _sample_output: Option<SampleOutput> = None;
    let trigger: Box<dyn SoundTrigger> = match &project.output {
        Output::Log => Box::new(LogTrigger),
        Output::Samples => {
            let (output, trigger) = start_sample_output(&project.sample_paths(&base))?;
            info!(sample_rate = output.sample_rate, "sample output ready");
            _sample_output = Some(output);
            Box::new(trigger)
        }
        Output::Midi { port } => Box::new(MidiTrigger::connect(port.as_deref(), project.pitches())?),
    };

    let scheduler = Scheduler::new(
        config,
        trigger,
        Box::new(SystemClock::new()),
        Box::new(seeded_source(project.seed)),
    )?;
    info!("{scheduler}");
    println!("{scheduler}");

    let engine = spawn_engine(scheduler);
    let interrupter = engine.interrupter();
    ctrlc::set_handler(move || {
        info!("interrupted");
        interrupter.interrupt();
    })?;
    let console_result = ui::run_console(&engine, &project.track_names());
    // The signal handler keeps the command channel open, so dropping the
    // handle alone would not stop a scheduler the console left running.
    engine.interrupter().interrupt();
    let scheduler = engine.join()?;
    console_result?;

    if let Some(path) = &project.export_on_quit {
        let path = resolve(&base, path);
        midi::write_midi(scheduler.tracks(), scheduler.bpm(), scheduler.meter(), &path)?;
        info!(path = %path.display(), "exported on quit");
        println!("exported {}", path.display());
    }
    Ok(())
}
