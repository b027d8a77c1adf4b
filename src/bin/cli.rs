//! amuse CLI: inspect subprojects, render trigger sequences to WAV and play
//! them in real time.
//!
//! Without a project path every command works on the built-in demo.

use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use am_ir::{Event, EventPayload, Group, TriggerTable};
use am_master::{demo_events, Controller, Settings};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(version, about = "SoundMacro runtime player and renderer.")]
struct Cli {
    /// Settings file (YAML). `AMUSE__*` environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

/// What to trigger when rendering or playing.
#[derive(clap::Args)]
struct Trigger {
    /// Subproject file; the built-in demo when omitted.
    project: Option<PathBuf>,
    /// Song group to play a single note from, instead of the demo pattern.
    #[arg(short, long)]
    group: Option<String>,
    /// Program within the group's normal page table.
    #[arg(short, long, default_value_t = 0)]
    program: u16,
    /// Note to hold for the first half of the duration.
    #[arg(short, long, default_value_t = 60)]
    note: u8,
    /// Duration in seconds.
    #[arg(short, long, default_value_t = 3.0)]
    seconds: f32,
}

#[derive(Subcommand)]
enum Commands {
    /// Prints a summary of a subproject and any configuration problems.
    Info {
        /// Subproject file; the built-in demo when omitted.
        project: Option<PathBuf>,
    },
    /// Renders triggers offline to a WAV file.
    Render {
        #[clap(flatten)]
        trigger: Trigger,
        /// Output WAV path.
        #[arg(short, long)]
        wav: PathBuf,
    },
    /// Plays triggers through the default audio device.
    Play {
        #[clap(flatten)]
        trigger: Trigger,
    },
    /// Writes the built-in demo subproject to a file.
    Demo {
        /// Output path.
        out: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { project } => {
            let controller = open(settings, project.as_deref())?;
            print_info(&controller);
        }
        Commands::Render { trigger, wav } => {
            let controller = open(settings, trigger.project.as_deref())?;
            let events = events(&controller, &trigger)?;
            println!(
                "Rendering {:.1}s to {} at {} Hz...",
                trigger.seconds,
                wav.display(),
                controller.settings().sample_rate
            );
            let bytes = controller.render_to_wav(&events, trigger.seconds);
            std::fs::write(&wav, &bytes)?;
            println!("Rendered {} bytes", bytes.len());
        }
        Commands::Play { trigger } => {
            let mut controller = open(settings, trigger.project.as_deref())?;
            let events = events(&controller, &trigger)?;
            play(&mut controller, events, trigger.seconds);
        }
        Commands::Demo { out } => {
            Controller::demo(settings).save_project_file(&out)?;
            println!("Wrote demo subproject to {}", out.display());
        }
    }
    Ok(())
}

fn open(settings: Settings, project: Option<&Path>) -> Result<Controller, Box<dyn Error>> {
    match project {
        Some(path) => {
            let mut controller = Controller::new(settings);
            let problems = controller.load_project_file(path)?;
            if !problems.is_empty() {
                eprintln!("{}: {} configuration problem(s), see log", path.display(), problems.len());
            }
            Ok(controller)
        }
        None => Ok(Controller::demo(settings)),
    }
}

fn print_info(controller: &Controller) {
    let sp = controller.subproject();
    println!("Subproject: {}", sp.name);
    println!("Macros:     {}", sp.macros.len());
    println!("ADSRs:      {}", sp.adsrs.len());
    println!("Curves:     {}", sp.curves.len());
    println!("Keymaps:    {}", sp.keymaps.len());
    println!("Layers:     {}", sp.layers.len());
    println!("Samples:    {}", sp.samples.len());
    println!();

    for (id, group) in sp.groups.iter() {
        match group {
            Group::Song(song) => println!(
                "{id}: song group '{}' ({} normal, {} drum pages, {} setups)",
                song.name,
                song.normal.len(),
                song.drum.len(),
                song.setups.len()
            ),
            Group::Sfx(sfx) => println!("{id}: sfx group '{}' ({} effects)", sfx.name, sfx.sfx.len()),
        }
    }

    let problems = controller.validate();
    if problems.is_empty() {
        println!("\nNo configuration problems.");
    } else {
        println!("\n{} configuration problem(s):", problems.len());
        for problem in problems {
            println!("  {problem}");
        }
    }
}

/// The demo pattern, or one held note from `--group`.
fn events(controller: &Controller, trigger: &Trigger) -> Result<Vec<Event>, Box<dyn Error>> {
    let tick_rate = controller.settings().tick_rate;
    let Some(name) = &trigger.group else {
        let events = demo_events(controller.subproject(), tick_rate);
        if events.is_empty() {
            return Err("subproject has no demo groups; pass --group".into());
        }
        return Ok(events);
    };

    let group = controller
        .subproject()
        .find_group_by_name(name)
        .ok_or_else(|| format!("no group named '{name}'"))?;
    let release = (trigger.seconds.max(0.0) * tick_rate as f32 / 2.0) as u64;
    Ok(vec![
        Event::new(
            0,
            EventPayload::NoteOn {
                table: TriggerTable::normal(group),
                program: trigger.program,
                note: trigger.note,
                velocity: 100,
                channel: 0,
            },
        ),
        Event::new(release, EventPayload::NoteOff { channel: 0, note: trigger.note }),
    ])
}

fn play(controller: &mut Controller, events: Vec<Event>, seconds: f32) {
    controller.play_events(events);
    println!("Playing...");
    println!();

    let deadline = Instant::now() + Duration::from_secs_f32(seconds.max(0.0));
    while controller.is_playing() && Instant::now() < deadline {
        if let (Some(tick), Some(voices)) = (controller.current_tick(), controller.active_voices()) {
            print!("\rTick: {tick:>6} | Voices: {voices:>3}");
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    controller.stop();

    println!("\rDone.                          ");
}
