//! Dashboard colors (xterm 256-color indices).

use ratatui::style::{Color, Modifier, Style};

pub const FRAME: Style = Style::new().fg(Color::Indexed(250)).bg(Color::Indexed(234));
pub const FRAME_BRIGHT: Style = FRAME.fg(Color::Indexed(231));
pub const USER_ONE: Style = FRAME.fg(Color::Indexed(197));
pub const USER_TWO: Style = FRAME.fg(Color::Indexed(106));

pub const GRAPH: Style = Style::new().fg(Color::Indexed(240)).bg(Color::Indexed(16));
pub const GRAPH_BRIGHT: Style = GRAPH.fg(Color::Indexed(250));
pub const GRAPH_AXIS: Style = GRAPH.add_modifier(Modifier::UNDERLINED);
pub const BAR_ONE_TO_TWO: Style = GRAPH.fg(Color::Indexed(161));
pub const BAR_TWO_TO_ONE: Style = GRAPH.fg(Color::Indexed(64));
