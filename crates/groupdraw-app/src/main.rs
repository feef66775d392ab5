//! GroupDraw terminal peer.
//!
//! Joins a relay room and lets you draw strokes by typing their points. Every
//! change to the shared drawing is reported as it happens.

mod command;

use command::{Input, parse, print_help};
use groupdraw_core::{
    DriverStopped, InkStyle, RelayConfig, RelaySource, SessionDriver, Stroke, SyncHandle,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() {
    env_logger::init();
    log::info!("Starting GroupDraw");

    let config = RelayConfig::from_env();
    println!("Relay {} / room {:?}", config.url, config.room);

    let (handle, driver) = SessionDriver::spawn(RelaySource::new(config));
    tokio::spawn(report_changes(handle.clone()));
    print_help();

    let mut style = InkStyle::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let input = match parse(&line) {
            Ok(input) => input,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        match execute(&handle, &mut style, input) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                log::error!("{}", e);
                break;
            }
        }
    }

    let _ = handle.shutdown();
    if let Err(e) = driver.await {
        log::error!("Session driver failed: {}", e);
    }
}

/// Run one command. Returns `Ok(false)` when the user asked to quit.
fn execute(handle: &SyncHandle, style: &mut InkStyle, input: Input) -> Result<bool, DriverStopped> {
    match input {
        Input::Draw(points) => handle.draw(Stroke::with_style(points, *style))?,
        Input::Undo => handle.undo()?,
        Input::Redo => handle.redo()?,
        Input::Clear => handle.clear()?,
        Input::Tool(kind) => style.kind = kind,
        Input::Color(color) => style.color = color,
        Input::Width(width) => style.width = width,
        Input::Start => handle.start()?,
        Input::End => handle.end()?,
        Input::Show => show(handle),
        Input::Help => print_help(),
        Input::Quit => return Ok(false),
    }
    Ok(true)
}

fn show(handle: &SyncHandle) {
    let drawing = handle.drawing();
    println!(
        "Session {:?}, {} participant(s), {} stroke(s)",
        handle.state(),
        handle.participants().len(),
        drawing.stroke_count()
    );
    for (i, stroke) in drawing.strokes().iter().enumerate() {
        let bounds = stroke.bounds();
        println!(
            "  {:3}: {:?} {} point(s), width {}, bounds ({:.1}, {:.1})-({:.1}, {:.1})",
            i,
            stroke.style().kind,
            stroke.len(),
            stroke.style().width,
            bounds.x0,
            bounds.y0,
            bounds.x1,
            bounds.y1
        );
    }
}

/// Print session and drawing changes until the driver stops.
async fn report_changes(handle: SyncHandle) {
    let mut drawing = handle.subscribe_drawing();
    let mut state = handle.subscribe_state();
    let mut participants = handle.subscribe_participants();

    loop {
        tokio::select! {
            changed = drawing.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = drawing.borrow_and_update().stroke_count();
                println!("Drawing now has {} stroke(s)", count);
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("Session {:?}", *state.borrow_and_update());
            }
            changed = participants.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{} participant(s)", participants.borrow_and_update().len());
            }
        }
    }
}
