use anyhow::Result;
use colored::Colorize;
use orizon::audio::NullAudioBackend;
use orizon::format::{format_digital, timezone_display_name, DigitalFormat};
use orizon::prelude::*;
use std::sync::{Arc, Mutex};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    // 2. Load configuration from orizon.toml / ORIZON_* env vars, falling
    //    back to defaults when neither is present.
    let config = OrizonConfig::load("orizon")?;
    info!(
        "{} v{} sampling '{}' at {:?} cadence.",
        orizon::ENGINE_NAME.cyan(),
        orizon::VERSION,
        timezone_display_name(&config.timezone),
        config.cadence
    );

    // 3. Create the engine.
    let engine = OrizonEngine::new(config);

    // 4. Wire the demo collaborators to the bus.
    let _subscriptions = wire_console_collaborators(&engine);

    // 5. Unlock the (logging) audio backend and let cues through.
    let mut backend = NullAudioBackend::new();
    engine.unlock_audio(&mut backend);
    let backend = Arc::new(Mutex::new(backend));
    let bus = engine.bus();
    let _cue_sub = bus.subscribe(topic::AUDIO_CUE, move |_, message| {
        if let BusMessage::Cue(cue) = message {
            if let Ok(mut backend) = backend.lock() {
                backend.trigger(cue.kind);
            }
        }
    });

    // 6. Run the engine. It shuts down on Ctrl+C.
    engine.run().await?;

    Ok(())
}

/// Subscribes a console "renderer" and a digital display to the engine's
/// derived streams. Returns the subscriptions so they outlive setup.
fn wire_console_collaborators(engine: &OrizonEngine) -> Vec<Subscription> {
    let bus = engine.bus();
    let mut subscriptions = Vec::new();

    // A stand-in renderer: prints the hand angles once per second boundary
    // rather than per frame, to keep the console readable.
    let latest = Arc::new(Mutex::new(None::<RotationSnapshot>));
    let latest_in = latest.clone();
    subscriptions.push(bus.subscribe(topic::ROTATION_UPDATE, move |_, message| {
        if let BusMessage::Rotation(snapshot) = message {
            if let Ok(mut slot) = latest_in.lock() {
                *slot = Some(*snapshot);
            }
        }
    }));
    subscriptions.push(bus.subscribe(topic::SECOND_BOUNDARY, move |_, _| {
        if let Ok(slot) = latest.lock() {
            if let Some(snapshot) = *slot {
                let marker = if snapshot.discontinuous { " (jump)" } else { "" };
                info!(
                    "[HANDS] hour {:7.2}°  minute {:7.2}°  second {:7.2}°{}",
                    snapshot.hour_angle, snapshot.minute_angle, snapshot.second_angle, marker
                );
            }
        }
    }));

    // A digital display on the minute boundary, like the original date line.
    let format = DigitalFormat::default();
    subscriptions.push(bus.subscribe(topic::MINUTE_BOUNDARY, move |_, message| {
        if let BusMessage::MinuteBoundary(sample) = message {
            info!(
                "[DIGITAL] {} ({})",
                format_digital(sample, &format).bold(),
                timezone_display_name(&sample.timezone_id)
            );
        }
    }));

    // Cue log, independent of the backend.
    subscriptions.push(bus.subscribe(topic::AUDIO_CUE, |_, message| {
        if let BusMessage::Cue(cue) = message {
            match cue.kind {
                CueKind::Chime => info!("[CUE] {}", "chime".yellow().bold()),
                CueKind::Tick => {}
            }
        }
    }));

    subscriptions
}
