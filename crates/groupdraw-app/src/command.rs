//! Terminal command parsing and help.

use groupdraw_core::{InkColor, InkKind};
use kurbo::Point;
use thiserror::Error;

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Commit a stroke through the given points.
    Draw(Vec<Point>),
    Undo,
    Redo,
    Clear,
    /// Set the tool used for following strokes.
    Tool(InkKind),
    Color(InkColor),
    Width(f64),
    Start,
    End,
    Show,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command: {0} (try `help`)")]
    Unknown(String),
    #[error("Invalid point {0:?}, expected x,y")]
    InvalidPoint(String),
    #[error("A stroke needs at least one point")]
    NoPoints,
    #[error("Unknown tool {0:?}, expected pen, pencil or marker")]
    UnknownTool(String),
    #[error("Invalid color {0:?}, expected #rrggbb or #rrggbbaa")]
    InvalidColor(String),
    #[error("Invalid width {0:?}")]
    InvalidWidth(String),
    #[error("Missing argument for `{0}`")]
    MissingArgument(&'static str),
    #[error("`{0}` takes no arguments")]
    UnexpectedArguments(&'static str),
}

/// Parse one line of input.
pub fn parse(line: &str) -> Result<Input, ParseError> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Err(ParseError::Empty);
    };
    let args: Vec<&str> = words.collect();

    let bare = |input: Input, name: &'static str| {
        if args.is_empty() {
            Ok(input)
        } else {
            Err(ParseError::UnexpectedArguments(name))
        }
    };

    match name.to_ascii_lowercase().as_str() {
        "draw" | "d" => {
            let points = args.iter().map(|arg| parse_point(arg)).collect::<Result<Vec<_>, _>>()?;
            if points.is_empty() {
                return Err(ParseError::NoPoints);
            }
            Ok(Input::Draw(points))
        }
        "undo" | "u" => bare(Input::Undo, "undo"),
        "redo" | "r" => bare(Input::Redo, "redo"),
        "clear" => bare(Input::Clear, "clear"),
        "tool" => parse_tool(single(&args, "tool")?).map(Input::Tool),
        "color" => parse_color(single(&args, "color")?).map(Input::Color),
        "width" => {
            let arg = single(&args, "width")?;
            match arg.parse::<f64>() {
                Ok(width) if width.is_finite() && width > 0.0 => Ok(Input::Width(width)),
                _ => Err(ParseError::InvalidWidth(arg.to_string())),
            }
        }
        "start" => bare(Input::Start, "start"),
        "end" => bare(Input::End, "end"),
        "show" | "s" => bare(Input::Show, "show"),
        "help" | "?" => bare(Input::Help, "help"),
        "quit" | "exit" | "q" => bare(Input::Quit, "quit"),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

fn single<'a>(args: &[&'a str], name: &'static str) -> Result<&'a str, ParseError> {
    match args {
        [arg] => Ok(*arg),
        [] => Err(ParseError::MissingArgument(name)),
        _ => Err(ParseError::UnexpectedArguments(name)),
    }
}

fn parse_point(arg: &str) -> Result<Point, ParseError> {
    let invalid = || ParseError::InvalidPoint(arg.to_string());
    let (x, y) = arg.split_once(',').ok_or_else(invalid)?;
    let x: f64 = x.trim().parse().map_err(|_| invalid())?;
    let y: f64 = y.trim().parse().map_err(|_| invalid())?;
    if !x.is_finite() || !y.is_finite() {
        return Err(invalid());
    }
    Ok(Point::new(x, y))
}

fn parse_tool(arg: &str) -> Result<InkKind, ParseError> {
    match arg.to_ascii_lowercase().as_str() {
        "pen" => Ok(InkKind::Pen),
        "pencil" => Ok(InkKind::Pencil),
        "marker" => Ok(InkKind::Marker),
        _ => Err(ParseError::UnknownTool(arg.to_string())),
    }
}

fn parse_color(arg: &str) -> Result<InkColor, ParseError> {
    let invalid = || ParseError::InvalidColor(arg.to_string());
    let hex = arg.strip_prefix('#').ok_or_else(invalid)?;
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return Err(invalid());
    }

    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    let a = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok(InkColor::new(channel(0)?, channel(2)?, channel(4)?, a))
}

/// A documented command.
#[derive(Debug, Clone)]
pub struct CommandHelp {
    pub usage: &'static str,
    pub description: &'static str,
}

impl CommandHelp {
    pub const fn new(usage: &'static str, description: &'static str) -> Self {
        Self { usage, description }
    }
}

/// Every command the terminal peer understands.
pub fn all_commands() -> Vec<CommandHelp> {
    vec![
        CommandHelp::new("draw x,y x,y ...", "Draw a stroke through the points"),
        CommandHelp::new("undo", "Remove the last stroke (shared)"),
        CommandHelp::new("redo", "Restore the last undone stroke (this device only)"),
        CommandHelp::new("clear", "Clear the drawing (shared)"),
        CommandHelp::new("tool pen|pencil|marker", "Set the tool for new strokes"),
        CommandHelp::new("color #rrggbb[aa]", "Set the ink color for new strokes"),
        CommandHelp::new("width <n>", "Set the stroke width for new strokes"),
        CommandHelp::new("start", "Start or join a shared session"),
        CommandHelp::new("end", "Leave the shared session"),
        CommandHelp::new("show", "Show the session and drawing"),
        CommandHelp::new("help", "Show this help"),
        CommandHelp::new("quit", "Exit"),
    ]
}

/// Print all commands to the console.
pub fn print_help() {
    println!("\n=== Commands ===");
    for command in all_commands() {
        println!("  {:24} {}", command.usage, command.description);
    }
    println!();
}
