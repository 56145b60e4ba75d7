use anyhow::Result;
use colored::Colorize;
use orizon::format::{format_digital, timezone_display_name, utc_offset_string, DigitalFormat};
use orizon::prelude::*;
use orizon::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );

    println!("{}", "-----------------------------------------------------------------".dimmed());
    println!("{}", version_string);
    println!("{}", "-----------------------------------------------------------------".dimmed());
}

/// Shared observer state fed by bus subscriptions.
struct Observed {
    last_sample: Mutex<Option<Arc<TimeSample>>>,
    watching: AtomicBool,
}

/// Subscribes the shell's observers to the engine's bus. The returned
/// subscriptions must stay alive for as long as the shell runs.
fn wire_observers(bus: &EventBus, observed: Arc<Observed>) -> Vec<Subscription> {
    let mut subscriptions = Vec::new();

    let sample_sink = observed.clone();
    subscriptions.push(bus.subscribe(topic::SECOND_BOUNDARY, move |_, message| {
        if let BusMessage::SecondBoundary(sample) = message {
            if let Ok(mut slot) = sample_sink.last_sample.lock() {
                *slot = Some(sample.clone());
            }
        }
    }));

    let watcher = observed.clone();
    subscriptions.push(bus.subscribe(topic::ROTATION_UPDATE, move |_, message| {
        if !watcher.watching.load(Ordering::Relaxed) {
            return;
        }
        if let BusMessage::Rotation(snapshot) = message {
            // One line per second is plenty; rotation updates arrive per
            // frame but only whole-degree second-hand motion is printed.
            if snapshot.second_angle.fract() < 0.1 {
                println!(
                    "\n<-- [HANDS] h {:.1}° m {:.1}° s {:.1}°{}",
                    snapshot.hour_angle,
                    snapshot.minute_angle,
                    snapshot.second_angle,
                    if snapshot.discontinuous { " (jump)" } else { "" }
                );
            }
        }
    }));

    subscriptions.push(bus.subscribe(topic::AUDIO_CUE, |_, message| {
        if let BusMessage::Cue(cue) = message {
            if cue.kind == CueKind::Chime {
                println!("\n<-- [CUE] chime");
            }
        }
    }));

    subscriptions
}

fn publish_setting(bus: &EventBus, change: SettingChange) {
    if !bus.publish(topic::SETTING_CHANGED, &BusMessage::Setting(change)) {
        println!("--> Warning: no listener picked the setting up.");
    }
}

fn parse_toggle(word: Option<&&str>) -> Option<bool> {
    match word.copied() {
        Some("on") => Some(true),
        Some("off") => Some(false),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .init();

    let config = OrizonConfig::load("orizon")?;
    let engine = Arc::new(OrizonEngine::new(config));
    let bus = engine.bus();

    let observed = Arc::new(Observed {
        last_sample: Mutex::new(None),
        watching: AtomicBool::new(false),
    });
    let _subscriptions = wire_observers(&bus, observed.clone());

    // The shell's (logging) audio backend, driven off the cue topic.
    let backend = Arc::new(Mutex::new(NullAudioBackend::new()));
    let backend_sink = backend.clone();
    let _cue_sub = bus.subscribe(topic::AUDIO_CUE, move |_, message| {
        if let BusMessage::Cue(cue) = message {
            if let Ok(mut backend) = backend_sink.lock() {
                backend.trigger(cue.kind);
            }
        }
    });

    info!("Spawning {} in the background...", ENGINE_NAME);
    if !engine.start() {
        eprintln!("Engine failed to start; exiting.");
        return Ok(());
    }

    let mut rl = Editor::new()?;
    rl.set_helper(Some(MyHighlighter {}));

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.trim().split_whitespace().collect::<Vec<_>>();

                match args.first().copied() {
                    Some("tz") => {
                        if let Some(zone) = args.get(1) {
                            publish_setting(&bus, SettingChange::Timezone(zone.to_string()));
                            println!("--> Timezone set to {} ({}).",
                                timezone_display_name(zone), utc_offset_string(zone));
                        } else {
                            println!("Usage: tz <ZONE|local>  e.g. tz Europe/Lisbon");
                        }
                    }
                    Some("cadence") => match args.get(1).copied() {
                        Some("active") => {
                            publish_setting(&bus, SettingChange::Cadence(CadenceMode::Active));
                            println!("--> Cadence: active (~60 Hz).");
                        }
                        Some("powersaver") => {
                            publish_setting(&bus, SettingChange::Cadence(CadenceMode::PowerSaver));
                            println!("--> Cadence: powersaver (1 Hz).");
                        }
                        _ => println!("Usage: cadence <active|powersaver>"),
                    },
                    Some("audio") => match parse_toggle(args.get(1)) {
                        Some(on) => {
                            publish_setting(&bus, SettingChange::AudioEnabled(on));
                            println!("--> Audio master switch: {}.", if on { "on" } else { "off" });
                        }
                        None => println!("Usage: audio <on|off>"),
                    },
                    Some("tick") => match parse_toggle(args.get(1)) {
                        Some(on) => {
                            publish_setting(&bus, SettingChange::TickEnabled(on));
                            println!("--> Tick cues: {}.", if on { "on" } else { "off" });
                        }
                        None => println!("Usage: tick <on|off>"),
                    },
                    Some("chime") => match parse_toggle(args.get(1)) {
                        Some(on) => {
                            publish_setting(&bus, SettingChange::ChimeEnabled(on));
                            println!("--> Chime cues: {}.", if on { "on" } else { "off" });
                        }
                        None => println!("Usage: chime <on|off>"),
                    },
                    Some("unlock") => {
                        let unlocked = match backend.lock() {
                            Ok(mut backend) => engine.unlock_audio(&mut *backend),
                            Err(_) => false,
                        };
                        if unlocked {
                            println!("--> Audio backend unlocked.");
                        } else {
                            println!("--> Unlock failed; cues stay muted.");
                        }
                    }
                    Some("watch") => match parse_toggle(args.get(1)) {
                        Some(on) => {
                            observed.watching.store(on, Ordering::Relaxed);
                            println!("--> Hand watch: {}.", if on { "on" } else { "off" });
                        }
                        None => println!("Usage: watch <on|off>"),
                    },
                    Some("time") => {
                        let sample = observed
                            .last_sample
                            .lock()
                            .ok()
                            .and_then(|slot| slot.clone());
                        match sample {
                            Some(sample) => println!(
                                "--> {} ({}, UTC{})",
                                format_digital(&sample, &DigitalFormat::default()).bold(),
                                timezone_display_name(&sample.timezone_id),
                                utc_offset_string(&sample.timezone_id)
                            ),
                            None => println!("--> No sample observed yet."),
                        }
                    }
                    Some("stats") => {
                        println!("Engine running: {}", engine.is_running());
                        println!("Audio unlocked: {}", engine.gate().is_unlocked());
                        let mut names = bus.topic_names();
                        names.sort();
                        for name in names {
                            println!("  {:<16} {} listener(s)", name, bus.listener_count(&name));
                        }
                    }
                    Some("help") => {
                        println!("Available commands:");
                        println!("  tz <ZONE>             - Switch timezone (IANA name or 'local').");
                        println!("  cadence <MODE>        - active | powersaver.");
                        println!("  audio <on|off>        - Master audio switch.");
                        println!("  tick <on|off>         - Per-second tick cues.");
                        println!("  chime <on|off>        - Hourly chime cues.");
                        println!("  unlock                - Perform the audio unlock gesture.");
                        println!("  watch <on|off>        - Print hand angles as they sweep.");
                        println!("  time                  - Show the latest digital readout.");
                        println!("  stats                 - Engine and bus diagnostics.");
                        println!("  exit                  - Quits the shell.");
                    }
                    Some("exit") => break,
                    Some("") | None => {}
                    Some(other) => println!("Unknown command: '{}'. Type 'help'.", other),
                }
            }
            Err(_) => {
                println!("Exiting orizonsh...");
                break;
            }
        }
    }

    engine.shutdown();
    Ok(())
}
